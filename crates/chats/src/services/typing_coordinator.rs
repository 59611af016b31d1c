//! Throttled typing propagation with automatic expiry.
//!
//! Every (conversation, user) pair has its own throttle window and at most one
//! live expiry timer. Timers are tokio tasks that sleep until the deadline;
//! a fresher call aborts the previous timer, and each timer carries a
//! generation so a timer that already woke up cannot clear a newer flag.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use tokio::task::AbortHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::entities::TypingEvent;
use crate::services::ConversationStore;
use crate::transport::Transport;
use crate::types::{ChatError, ChatEvent, ChatResult, ConversationId, TypingRequest, TypingSettings, UserId};
use crate::utils::Throttle;

type TypingKey = (ConversationId, UserId);

/// What a typing notification did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypingOutcome {
    /// A TypingChanged(true) event was published
    Propagated,
    /// Inside the throttle window; only the expiry deadline moved
    Throttled,
    /// The flag was cleared and TypingChanged(false) published
    Cleared,
    /// Stop signal for a user who was not typing
    Unchanged,
    /// Dropped without an event
    Suppressed(SuppressReason),
}

/// Why a typing notification was dropped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuppressReason {
    UnknownConversation,
    NotParticipant,
}

struct ExpiryTimer {
    generation: u64,
    handle: AbortHandle,
}

#[derive(Default)]
struct TimerTable {
    next_generation: u64,
    entries: HashMap<TypingKey, ExpiryTimer>,
}

struct TypingInner<T> {
    store: Arc<ConversationStore>,
    transport: Arc<T>,
    settings: TypingSettings,
    throttle: Mutex<Throttle<TypingKey>>,
    timers: Mutex<TimerTable>,
}

/// Coordinates typing flags for every conversation in the store
pub struct TypingCoordinator<T: Transport> {
    inner: Arc<TypingInner<T>>,
}

impl<T: Transport> Clone for TypingCoordinator<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Transport> TypingCoordinator<T> {
    pub fn new(store: Arc<ConversationStore>, transport: Arc<T>, settings: TypingSettings) -> Self {
        Self {
            inner: Arc::new(TypingInner {
                store,
                transport,
                settings,
                throttle: Mutex::new(Throttle::new()),
                timers: Mutex::new(TimerTable::default()),
            }),
        }
    }

    pub fn settings(&self) -> TypingSettings {
        self.inner.settings
    }

    /// Record a typing signal.
    ///
    /// Never fails: unknown conversations and non-participants are reported
    /// through the returned outcome only.
    pub async fn notify_typing(&self, request: TypingRequest) -> TypingOutcome {
        let store = &self.inner.store;
        let conversation_id = request.conversation_id.as_str();
        let user_id = request.user_id.as_str();

        match store.read(conversation_id, |c| c.participant_exists(user_id)) {
            Err(_) => {
                debug!(conversation_id = %conversation_id, user_id = %user_id, "Typing for unknown conversation suppressed");
                return TypingOutcome::Suppressed(SuppressReason::UnknownConversation);
            }
            Ok(false) => {
                debug!(conversation_id = %conversation_id, user_id = %user_id, "Typing from non-participant suppressed");
                return TypingOutcome::Suppressed(SuppressReason::NotParticipant);
            }
            Ok(true) => {}
        }

        if request.is_typing {
            self.start(request).await
        } else {
            self.stop(request).await
        }
    }

    async fn start(&self, request: TypingRequest) -> TypingOutcome {
        let inner = &self.inner;
        let key: TypingKey = (request.conversation_id.clone(), request.user_id.clone());
        let now = Instant::now();
        let window = request.throttle.window(inner.settings.throttle);

        let accepted = match window {
            Some(window) => inner
                .throttle
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .check(&key, now, window)
                .is_allowed(),
            None => true,
        };

        // expiry is measured from every call, suppressed ones included
        self.schedule_expiry(key.clone(), now);

        let expires_at = Utc::now()
            + chrono::Duration::from_std(inner.settings.expiry).unwrap_or_else(|_| chrono::Duration::zero());
        let result = inner.store.mutate(&key.0, |conversation, events| {
            if !conversation.participant_exists(&key.1) {
                return Err(ChatError::participant_not_found(&key.0, &key.1));
            }

            let newly_typing = conversation.refresh_typing(&key.1, expires_at);
            let propagate = accepted || newly_typing;
            if propagate {
                events.push(ChatEvent::TypingChanged {
                    conversation_id: key.0.clone(),
                    user_id: key.1.clone(),
                    is_typing: true,
                });
            }
            Ok(propagate)
        });

        match result {
            Ok(true) => {
                if !accepted {
                    // the flag had been cleared inside the window; start a new one
                    inner
                        .throttle
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .record(&key, now);
                }

                let mut event = TypingEvent::new(&key.0, &key.1, true);
                event.throttle_ms = window.map(|w| w.as_millis() as u64);
                event.content = request.content;
                inner.forward(event);
                TypingOutcome::Propagated
            }
            Ok(false) => TypingOutcome::Throttled,
            Err(err) => {
                // the participant left or the conversation went away meanwhile
                self.forget(&key.0, &key.1);
                debug!(conversation_id = %key.0, user_id = %key.1, error = %err, "In-flight typing signal suppressed");
                match err {
                    ChatError::ConversationNotFound { .. } => {
                        TypingOutcome::Suppressed(SuppressReason::UnknownConversation)
                    }
                    _ => TypingOutcome::Suppressed(SuppressReason::NotParticipant),
                }
            }
        }
    }

    async fn stop(&self, request: TypingRequest) -> TypingOutcome {
        let inner = &self.inner;
        self.forget(&request.conversation_id, &request.user_id);

        match inner.clear(&request.conversation_id, &request.user_id) {
            Ok(true) => {
                let mut event = TypingEvent::new(&request.conversation_id, &request.user_id, false);
                event.content = request.content;
                inner.forward(event);
                TypingOutcome::Cleared
            }
            Ok(false) => TypingOutcome::Unchanged,
            Err(_) => TypingOutcome::Suppressed(SuppressReason::UnknownConversation),
        }
    }

    fn schedule_expiry(&self, key: TypingKey, from: Instant) {
        let deadline = from + self.inner.settings.expiry;
        let mut timers = self.inner.timers.lock().unwrap_or_else(PoisonError::into_inner);
        timers.next_generation += 1;
        let generation = timers.next_generation;

        let inner = Arc::clone(&self.inner);
        let task_key = key.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            inner.expire(&task_key, generation);
        });

        let timer = ExpiryTimer {
            generation,
            handle: task.abort_handle(),
        };
        if let Some(previous) = timers.entries.insert(key, timer) {
            previous.handle.abort();
        }
    }

    /// Cancel the expiry timer and throttle window of a pair
    pub fn forget(&self, conversation_id: &str, user_id: &str) {
        let key: TypingKey = (conversation_id.to_string(), user_id.to_string());
        if let Some(timer) = self
            .inner
            .timers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .remove(&key)
        {
            timer.handle.abort();
        }
        self.inner
            .throttle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .reset(&key);
    }

    /// Cancel every timer and throttle window belonging to a conversation
    pub fn forget_conversation(&self, conversation_id: &str) {
        self.inner
            .timers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .retain(|key, timer| {
                if key.0 == conversation_id {
                    timer.handle.abort();
                    false
                } else {
                    true
                }
            });
        self.inner
            .throttle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|key| key.0 != conversation_id);
    }

    /// Number of live expiry timers
    pub fn pending_timers(&self) -> usize {
        self.inner
            .timers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .len()
    }

    pub fn typing_users(&self, conversation_id: &str) -> ChatResult<Vec<UserId>> {
        self.inner.store.typing_users(conversation_id)
    }

    pub fn current_typing_user(&self, conversation_id: &str) -> ChatResult<Option<UserId>> {
        self.inner.store.current_typing_user(conversation_id)
    }
}

impl<T: Transport> TypingInner<T> {
    /// Drop a typing flag, publishing TypingChanged(false) if one was set
    fn clear(&self, conversation_id: &str, user_id: &str) -> ChatResult<bool> {
        self.store.mutate(conversation_id, |conversation, events| {
            if !conversation.clear_typing(user_id) {
                return Ok(false);
            }
            events.push(ChatEvent::TypingChanged {
                conversation_id: conversation_id.to_string(),
                user_id: user_id.to_string(),
                is_typing: false,
            });
            Ok(true)
        })
    }

    fn expire(&self, key: &TypingKey, generation: u64) {
        // The generation check runs on the conversation writer, so a call
        // that refreshed the flag after this timer woke up wins.
        let result = self.store.mutate(&key.0, |conversation, events| {
            {
                let mut timers = self.timers.lock().unwrap_or_else(PoisonError::into_inner);
                match timers.entries.get(key) {
                    Some(timer) if timer.generation == generation => {
                        timers.entries.remove(key);
                    }
                    _ => return Ok(false),
                }
            }
            self.throttle
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .reset(key);

            if !conversation.clear_typing(&key.1) {
                return Ok(false);
            }
            events.push(ChatEvent::TypingChanged {
                conversation_id: key.0.clone(),
                user_id: key.1.clone(),
                is_typing: false,
            });
            Ok(true)
        });

        match result {
            Ok(true) => {
                debug!(conversation_id = %key.0, user_id = %key.1, "Typing expired");
                self.forward(TypingEvent::new(&key.0, &key.1, false));
            }
            Ok(false) => {}
            Err(_) => {
                self.timers
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .entries
                    .retain(|k, timer| !(k == key && timer.generation == generation));
            }
        }
    }

    /// Send a local user's typing signal to the transport in the background
    fn forward(&self, event: TypingEvent) {
        if !self.store.is_local_user(&event.user_id) {
            return;
        }

        let transport = Arc::clone(&self.transport);
        tokio::spawn(async move {
            if let Err(err) = transport.send_typing(&event).await {
                warn!(
                    conversation_id = %event.conversation_id,
                    user_id = %event.user_id,
                    error = %err,
                    "Failed to forward typing signal"
                );
            }
        });
    }
}
