//! In-process transport for tests and the console.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use futures_util::stream::{self, BoxStream};
use tokio::sync::mpsc;
use tracing::debug;

use super::{RemoteEvent, Transport};
use crate::entities::{ChatMessage, TypingEvent};
use crate::types::{ChatError, ChatResult};

/// Acknowledges every delivery after a fixed delay.
///
/// Deliveries can be made to fail on demand, and remote events can be injected
/// through an unbounded channel whose receiving side is handed out once as a
/// stream.
pub struct LoopbackTransport {
    ack_delay: Duration,
    pending_failures: AtomicUsize,
    delivered: Mutex<Vec<ChatMessage>>,
    typing: Mutex<Vec<TypingEvent>>,
    remote_tx: mpsc::UnboundedSender<RemoteEvent>,
    remote_rx: Mutex<Option<mpsc::UnboundedReceiver<RemoteEvent>>>,
}

impl Default for LoopbackTransport {
    fn default() -> Self {
        Self::new(Duration::ZERO)
    }
}

impl LoopbackTransport {
    pub fn new(ack_delay: Duration) -> Self {
        let (remote_tx, remote_rx) = mpsc::unbounded_channel();
        Self {
            ack_delay,
            pending_failures: AtomicUsize::new(0),
            delivered: Mutex::new(Vec::new()),
            typing: Mutex::new(Vec::new()),
            remote_tx,
            remote_rx: Mutex::new(Some(remote_rx)),
        }
    }

    /// Make the next `count` deliveries fail
    pub fn fail_next(&self, count: usize) {
        self.pending_failures.fetch_add(count, Ordering::SeqCst);
    }

    /// Messages acknowledged so far, one entry per message id
    pub fn delivered(&self) -> Vec<ChatMessage> {
        self.delivered
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Typing signals forwarded so far
    pub fn typing_signals(&self) -> Vec<TypingEvent> {
        self.typing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Inject a remote event. Returns false once the feed has been dropped.
    pub fn inject(&self, event: RemoteEvent) -> bool {
        self.remote_tx.send(event).is_ok()
    }

    /// The remote feed. Only the first call gets it.
    pub fn remote_feed(&self) -> Option<BoxStream<'static, RemoteEvent>> {
        let rx = self
            .remote_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()?;

        let feed = stream::unfold(rx, |mut rx| async move {
            let event = rx.recv().await?;
            Some((event, rx))
        });
        Some(Box::pin(feed))
    }

    fn take_failure(&self) -> bool {
        self.pending_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl Transport for LoopbackTransport {
    async fn deliver(&self, message: &ChatMessage) -> ChatResult<()> {
        if !self.ack_delay.is_zero() {
            tokio::time::sleep(self.ack_delay).await;
        }

        if self.take_failure() {
            debug!(message_id = %message.id, "Loopback delivery failing on request");
            return Err(ChatError::delivery_failed(&message.id, "loopback: injected failure"));
        }

        let mut delivered = self.delivered.lock().unwrap_or_else(PoisonError::into_inner);
        if !delivered.iter().any(|m| m.id == message.id) {
            delivered.push(message.clone());
        }
        Ok(())
    }

    async fn send_typing(&self, event: &TypingEvent) -> ChatResult<()> {
        self.typing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
        Ok(())
    }
}
