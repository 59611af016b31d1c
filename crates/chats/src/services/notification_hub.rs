//! Ordered fan-out of chat events to subscribers.

use std::error::Error;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::types::{ChatEvent, EventKind, DEFAULT_EVENT_CAPACITY};

/// Result returned by subscription handlers
pub type HandlerResult = Result<(), Box<dyn Error + Send + Sync>>;

type Handler = Arc<dyn Fn(&ChatEvent) -> HandlerResult + Send + Sync>;

/// Handle returned by `subscribe`, used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionToken(u64);

/// A handler that failed while receiving an event
#[derive(Debug, Clone, PartialEq)]
pub struct HandlerFailure {
    pub token: SubscriptionToken,
    pub message: String,
}

/// Outcome of a single publish
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PublishReport {
    /// Handlers that completed successfully
    pub delivered: usize,
    /// Handlers that returned an error or panicked
    pub failures: Vec<HandlerFailure>,
}

impl PublishReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

struct Subscription {
    token: SubscriptionToken,
    kind: Option<EventKind>,
    handler: Handler,
}

/// Subscription registry and event broadcaster.
///
/// Handlers run synchronously on the publishing thread, in subscription order.
/// A failing handler is logged and reported but never stops the others. Every
/// published event is also sent on a broadcast channel for async consumers.
pub struct NotificationHub {
    subscriptions: RwLock<Vec<Subscription>>,
    next_token: AtomicU64,
    broadcaster: broadcast::Sender<ChatEvent>,
}

impl Default for NotificationHub {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

impl NotificationHub {
    /// Create a hub whose broadcast stream buffers `capacity` events
    pub fn new(capacity: usize) -> Self {
        let (broadcaster, _) = broadcast::channel(capacity.max(1));
        Self {
            subscriptions: RwLock::new(Vec::new()),
            next_token: AtomicU64::new(1),
            broadcaster,
        }
    }

    /// Subscribe to one kind of event
    pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> SubscriptionToken
    where
        F: Fn(&ChatEvent) -> HandlerResult + Send + Sync + 'static,
    {
        self.insert(Some(kind), Arc::new(handler))
    }

    /// Subscribe to every event
    pub fn subscribe_all<F>(&self, handler: F) -> SubscriptionToken
    where
        F: Fn(&ChatEvent) -> HandlerResult + Send + Sync + 'static,
    {
        self.insert(None, Arc::new(handler))
    }

    fn insert(&self, kind: Option<EventKind>, handler: Handler) -> SubscriptionToken {
        let token = SubscriptionToken(self.next_token.fetch_add(1, Ordering::Relaxed));
        self.subscriptions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Subscription {
                token,
                kind,
                handler,
            });

        debug!(token = token.0, kind = ?kind, "Subscribed");
        token
    }

    /// Remove a subscription. Returns false for unknown tokens.
    pub fn unsubscribe(&self, token: SubscriptionToken) -> bool {
        let mut subscriptions = self
            .subscriptions
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = subscriptions.len();
        subscriptions.retain(|s| s.token != token);
        before != subscriptions.len()
    }

    /// Number of handlers that would receive an event of `kind`
    pub fn handler_count(&self, kind: EventKind) -> usize {
        self.subscriptions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|s| s.kind.map_or(true, |k| k == kind))
            .count()
    }

    /// Receiver of every event published after this call
    pub fn events(&self) -> broadcast::Receiver<ChatEvent> {
        self.broadcaster.subscribe()
    }

    /// Deliver an event to matching handlers, then to the broadcast stream
    pub fn publish(&self, event: &ChatEvent) -> PublishReport {
        let kind = event.kind();

        // Handlers run without the registry lock so they may subscribe or
        // unsubscribe re-entrantly.
        let handlers: Vec<(SubscriptionToken, Handler)> = self
            .subscriptions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|s| s.kind.map_or(true, |k| k == kind))
            .map(|s| (s.token, Arc::clone(&s.handler)))
            .collect();

        let mut report = PublishReport::default();
        for (token, handler) in handlers {
            let outcome = catch_unwind(AssertUnwindSafe(|| handler(event)));
            let failure = match outcome {
                Ok(Ok(())) => {
                    report.delivered += 1;
                    continue;
                }
                Ok(Err(err)) => err.to_string(),
                Err(panic) => panic_message(panic.as_ref()),
            };

            warn!(
                token = token.0,
                event = event.event_type_name(),
                error = %failure,
                "Event handler failed"
            );
            report.failures.push(HandlerFailure {
                token,
                message: failure,
            });
        }

        // No receivers is fine
        let _ = self.broadcaster.send(event.clone());
        report
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        format!("handler panicked: {message}")
    } else if let Some(message) = panic.downcast_ref::<String>() {
        format!("handler panicked: {message}")
    } else {
        "handler panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn typing_event() -> ChatEvent {
        ChatEvent::TypingChanged {
            conversation_id: "c1".to_string(),
            user_id: "bob".to_string(),
            is_typing: true,
        }
    }

    #[test]
    fn test_handlers_run_in_subscription_order() {
        let hub = NotificationHub::default();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for n in 0..3 {
            let seen = Arc::clone(&seen);
            hub.subscribe(EventKind::TypingChanged, move |_| {
                seen.lock().unwrap().push(n);
                Ok(())
            });
        }

        let report = hub.publish(&typing_event());
        assert_eq!(report.delivered, 3);
        assert!(report.is_clean());
        assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn test_failing_handlers_are_isolated() {
        let hub = NotificationHub::default();
        let calls = Arc::new(Mutex::new(0));

        let failing = hub.subscribe(EventKind::TypingChanged, |_| Err("boom".into()));
        let panicking = hub.subscribe_all(|_| panic!("kaboom"));
        let counter = Arc::clone(&calls);
        hub.subscribe(EventKind::TypingChanged, move |_| {
            *counter.lock().unwrap() += 1;
            Ok(())
        });

        let report = hub.publish(&typing_event());
        assert_eq!(report.delivered, 1);
        assert_eq!(report.failures.len(), 2);
        assert_eq!(report.failures[0].token, failing);
        assert_eq!(report.failures[0].message, "boom");
        assert_eq!(report.failures[1].token, panicking);
        assert!(report.failures[1].message.contains("kaboom"));
        assert_eq!(*calls.lock().unwrap(), 1);
    }

    #[test]
    fn test_kind_filter_and_unsubscribe() {
        let hub = NotificationHub::default();
        let token = hub.subscribe(EventKind::MessageAdded, |_| Ok(()));
        hub.subscribe_all(|_| Ok(()));

        assert_eq!(hub.handler_count(EventKind::MessageAdded), 2);
        assert_eq!(hub.handler_count(EventKind::TypingChanged), 1);
        assert_eq!(hub.publish(&typing_event()).delivered, 1);

        assert!(hub.unsubscribe(token));
        assert!(!hub.unsubscribe(token));
        assert_eq!(hub.handler_count(EventKind::MessageAdded), 1);
    }

    #[test]
    fn test_handler_may_unsubscribe_during_publish() {
        let hub = Arc::new(NotificationHub::default());
        let slot: Arc<Mutex<Option<SubscriptionToken>>> = Arc::new(Mutex::new(None));

        let inner_hub = Arc::clone(&hub);
        let inner_slot = Arc::clone(&slot);
        let token = hub.subscribe_all(move |_| {
            if let Some(token) = inner_slot.lock().unwrap().take() {
                inner_hub.unsubscribe(token);
            }
            Ok(())
        });
        *slot.lock().unwrap() = Some(token);

        assert_eq!(hub.publish(&typing_event()).delivered, 1);
        assert_eq!(hub.publish(&typing_event()).delivered, 0);
    }

    #[tokio::test]
    async fn test_broadcast_stream_receives_events() {
        let hub = NotificationHub::new(8);
        let mut events = hub.events();

        hub.publish(&typing_event());
        assert_eq!(events.recv().await.unwrap(), typing_event());
    }
}
