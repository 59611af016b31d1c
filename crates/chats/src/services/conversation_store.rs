//! Conversation state and session-scoped state.
//!
//! Each conversation lives in its own cell: a writer lock that serializes
//! mutations and a `watch` channel holding the latest snapshot. Readers borrow
//! the snapshot and never wait on the writer. Events describing a mutation are
//! published while the writer lock is still held, so subscribers observe a
//! conversation's events in mutation order. Session-level events (creation,
//! removal, active conversation and draft) are published after every lock is
//! released, so their handlers may call back into the store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use parley_users::UserRegistry;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::entities::{
    ChatMessage, Conversation, MessageDirection, MessageStatus, Participant, ParticipantRole,
};
use crate::services::NotificationHub;
use crate::types::{
    ChatError, ChatEvent, ChatResult, ConversationId, ConversationOrder,
    CreateConversationRequest, UserId,
};
use crate::utils::Validator;

/// Result of applying a status to a message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusChange {
    /// The status advanced
    Applied {
        previous: MessageStatus,
        current: MessageStatus,
    },
    /// The status would not move forward and was left as is
    Ignored { current: MessageStatus },
}

impl StatusChange {
    pub fn is_applied(&self) -> bool {
        matches!(self, StatusChange::Applied { .. })
    }

    /// Status of the message after the call
    pub fn current(&self) -> MessageStatus {
        match self {
            StatusChange::Applied { current, .. } | StatusChange::Ignored { current } => *current,
        }
    }
}

struct ConversationCell {
    write_lock: Mutex<()>,
    state: watch::Sender<Conversation>,
}

#[derive(Default)]
struct StoreIndex {
    cells: HashMap<ConversationId, Arc<ConversationCell>>,
    order: Vec<ConversationId>,
    next_sequence: u64,
}

#[derive(Default)]
struct SessionState {
    local_user: Option<UserId>,
    active: Option<ConversationId>,
    draft: String,
}

/// Store of conversations plus the local session's state
pub struct ConversationStore {
    users: Arc<UserRegistry>,
    hub: Arc<NotificationHub>,
    index: RwLock<StoreIndex>,
    activity: AtomicU64,
    // Serializes session writers; taken before any conversation writer lock
    session_write: Mutex<()>,
    session: RwLock<SessionState>,
}

impl ConversationStore {
    pub fn new(users: Arc<UserRegistry>, hub: Arc<NotificationHub>) -> Self {
        Self {
            users,
            hub,
            index: RwLock::new(StoreIndex::default()),
            activity: AtomicU64::new(0),
            session_write: Mutex::new(()),
            session: RwLock::new(SessionState::default()),
        }
    }

    pub fn users(&self) -> &Arc<UserRegistry> {
        &self.users
    }

    pub fn hub(&self) -> &Arc<NotificationHub> {
        &self.hub
    }

    fn cell(&self, conversation_id: &str) -> ChatResult<Arc<ConversationCell>> {
        self.index
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .cells
            .get(conversation_id)
            .cloned()
            .ok_or_else(|| ChatError::conversation_not_found(conversation_id))
    }

    fn next_activity(&self) -> u64 {
        self.activity.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Run `f` against a snapshot without taking the writer lock
    pub(crate) fn read<R>(
        &self,
        conversation_id: &str,
        f: impl FnOnce(&Conversation) -> R,
    ) -> ChatResult<R> {
        let cell = self.cell(conversation_id)?;
        let snapshot = cell.state.borrow();
        Ok(f(&snapshot))
    }

    /// Mutate a conversation on its writer.
    ///
    /// `f` must validate before it changes anything: an `Err` is returned to
    /// the caller as is and its events are discarded. On success the collected
    /// events are published before the writer lock is released.
    pub(crate) fn mutate<R>(
        &self,
        conversation_id: &str,
        f: impl FnOnce(&mut Conversation, &mut Vec<ChatEvent>) -> ChatResult<R>,
    ) -> ChatResult<R> {
        let cell = self.cell(conversation_id)?;
        let _writer = cell.write_lock.lock().unwrap_or_else(PoisonError::into_inner);

        // removed while we waited for the writer
        self.cell(conversation_id)?;

        let mut events = Vec::new();
        let mut result = None;
        cell.state.send_if_modified(|conversation| {
            let outcome = f(conversation, &mut events);
            let modified = outcome.is_ok();
            result = Some(outcome);
            modified
        });

        let result = result
            .unwrap_or_else(|| Err(ChatError::internal("conversation writer did not run")));
        if result.is_ok() {
            for event in &events {
                self.hub.publish(event);
            }
        }
        result
    }

    /// Append a message built against the current snapshot.
    ///
    /// `build` returns `Ok(None)` to skip the append (for example a duplicate
    /// remote message). Incoming messages bump the unread counter unless the
    /// conversation is active.
    pub(crate) fn append(
        &self,
        conversation_id: &str,
        build: impl FnOnce(&Conversation) -> ChatResult<Option<ChatMessage>>,
    ) -> ChatResult<Option<ChatMessage>> {
        self.mutate(conversation_id, |conversation, events| {
            let Some(message) = build(conversation)? else {
                return Ok(None);
            };

            if message.direction == MessageDirection::Incoming && !self.is_active(conversation_id) {
                conversation.unread_count = conversation.unread_count.saturating_add(1);
            }
            conversation.push_message(message.clone(), self.next_activity());

            debug!(
                conversation_id = %conversation_id,
                message_id = %message.id,
                sender_id = %message.sender_id,
                "Message appended"
            );
            events.push(ChatEvent::MessageAdded {
                conversation_id: conversation_id.to_string(),
                message: message.clone(),
            });
            Ok(Some(message))
        })
    }

    /// Create a conversation from registered users
    pub fn create(&self, request: CreateConversationRequest) -> ChatResult<Conversation> {
        if let Some(title) = &request.title {
            Validator::title(title)?;
        }

        let mut participant_ids: Vec<UserId> = Vec::with_capacity(request.participant_ids.len());
        for user_id in request.participant_ids {
            if !participant_ids.contains(&user_id) {
                participant_ids.push(user_id);
            }
        }
        if participant_ids.is_empty() {
            return Err(ChatError::validation(
                "A conversation needs at least one participant",
            ));
        }
        for user_id in &participant_ids {
            self.users.get(user_id)?;
        }

        let participants: Vec<Participant> = participant_ids
            .iter()
            .enumerate()
            .map(|(position, user_id)| {
                let role = if position == 0 {
                    ParticipantRole::Owner
                } else {
                    ParticipantRole::Member
                };
                Participant::new(user_id.clone(), role)
            })
            .collect();

        let mut index = self.index.write().unwrap_or_else(PoisonError::into_inner);
        index.next_sequence += 1;
        let conversation = Conversation::new(
            request.title,
            participants,
            index.next_sequence,
            self.next_activity(),
        );
        let conversation_id = conversation.id.clone();

        let (state, _) = watch::channel(conversation.clone());
        let cell = Arc::new(ConversationCell {
            write_lock: Mutex::new(()),
            state,
        });
        index.cells.insert(conversation_id.clone(), cell);
        index.order.push(conversation_id.clone());
        drop(index);

        info!(
            conversation_id = %conversation_id,
            participants = participant_ids.len(),
            "Conversation created"
        );
        self.hub.publish(&ChatEvent::ConversationCreated {
            conversation_id,
            participant_ids,
        });

        Ok(conversation)
    }

    /// Snapshot of a conversation
    pub fn get(&self, conversation_id: &str) -> ChatResult<Conversation> {
        self.read(conversation_id, Conversation::clone)
    }

    pub fn exists(&self, conversation_id: &str) -> bool {
        self.cell(conversation_id).is_ok()
    }

    /// Whether `user_id` is a current participant. False for unknown conversations.
    pub fn participant_exists(&self, conversation_id: &str, user_id: &str) -> bool {
        self.read(conversation_id, |c| c.participant_exists(user_id))
            .unwrap_or(false)
    }

    /// Snapshots of every conversation in the requested order
    pub fn list(&self, order: ConversationOrder) -> Vec<Conversation> {
        let cells: Vec<Arc<ConversationCell>> = {
            let index = self.index.read().unwrap_or_else(PoisonError::into_inner);
            index
                .order
                .iter()
                .filter_map(|id| index.cells.get(id).cloned())
                .collect()
        };

        let mut conversations: Vec<Conversation> =
            cells.iter().map(|cell| cell.state.borrow().clone()).collect();
        if order == ConversationOrder::RecentActivity {
            conversations.sort_by(|a, b| b.activity_seq.cmp(&a.activity_seq));
        }
        conversations
    }

    pub fn len(&self) -> usize {
        self.index
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .order
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Add a registered user. Existing members are returned unchanged.
    pub fn add_participant(
        &self,
        conversation_id: &str,
        user_id: &str,
        role: ParticipantRole,
    ) -> ChatResult<Participant> {
        self.users.get(user_id)?;

        self.mutate(conversation_id, |conversation, events| {
            if let Some(existing) = conversation.participant(user_id) {
                return Ok(existing.clone());
            }

            let participant = Participant::new(user_id, role);
            conversation.participants.push(participant.clone());
            conversation.former_participants.retain(|id| id != user_id);

            info!(conversation_id = %conversation_id, user_id = %user_id, "Participant added");
            events.push(ChatEvent::ParticipantAdded {
                conversation_id: conversation_id.to_string(),
                participant: participant.clone(),
            });
            Ok(participant)
        })
    }

    /// Remove a current participant, keeping their messages in history.
    ///
    /// Callers outside the crate go through `ChatSession`, which also drops
    /// the participant's typing state.
    pub(crate) fn remove_participant(&self, conversation_id: &str, user_id: &str) -> ChatResult<()> {
        self.mutate(conversation_id, |conversation, events| {
            if !conversation.participant_exists(user_id) {
                return Err(ChatError::participant_not_found(conversation_id, user_id));
            }
            if conversation.participants.len() == 1 {
                return Err(ChatError::validation(
                    "Cannot remove the last participant of a conversation",
                ));
            }

            conversation.participants.retain(|p| p.user_id != user_id);
            if !conversation.former_participants.iter().any(|id| id == user_id) {
                conversation.former_participants.push(user_id.to_string());
            }

            if conversation.clear_typing(user_id) {
                events.push(ChatEvent::TypingChanged {
                    conversation_id: conversation_id.to_string(),
                    user_id: user_id.to_string(),
                    is_typing: false,
                });
            }

            info!(conversation_id = %conversation_id, user_id = %user_id, "Participant removed");
            events.push(ChatEvent::ParticipantRemoved {
                conversation_id: conversation_id.to_string(),
                user_id: user_id.to_string(),
            });
            Ok(())
        })
    }

    /// Drop a conversation, clearing the active flag if it pointed at it
    pub(crate) fn remove(&self, conversation_id: &str) -> ChatResult<Conversation> {
        let (snapshot, was_active) = {
            let _session = self.session_write.lock().unwrap_or_else(PoisonError::into_inner);
            let cell = self.cell(conversation_id)?;
            let _writer = cell.write_lock.lock().unwrap_or_else(PoisonError::into_inner);

            {
                let mut index = self.index.write().unwrap_or_else(PoisonError::into_inner);
                if index.cells.remove(conversation_id).is_none() {
                    return Err(ChatError::conversation_not_found(conversation_id));
                }
                index.order.retain(|id| id != conversation_id);
            }

            let mut session = self.session.write().unwrap_or_else(PoisonError::into_inner);
            let was_active = session.active.as_deref() == Some(conversation_id);
            if was_active {
                session.active = None;
            }
            let snapshot = cell.state.borrow().clone();
            (snapshot, was_active)
        };

        info!(conversation_id = %conversation_id, "Conversation removed");
        if was_active {
            self.hub.publish(&ChatEvent::ActiveConversationChanged {
                previous: Some(conversation_id.to_string()),
                current: None,
            });
        }
        self.hub.publish(&ChatEvent::ConversationRemoved {
            conversation_id: conversation_id.to_string(),
        });
        Ok(snapshot)
    }

    /// Make a conversation the active one, replacing any previous choice
    pub fn set_active(&self, conversation_id: &str) -> ChatResult<()> {
        let _session = self.session_write.lock().unwrap_or_else(PoisonError::into_inner);
        if !self.exists(conversation_id) {
            return Err(ChatError::conversation_not_found(conversation_id));
        }

        let previous = {
            let mut session = self.session.write().unwrap_or_else(PoisonError::into_inner);
            if session.active.as_deref() == Some(conversation_id) {
                None
            } else {
                Some(session.active.replace(conversation_id.to_string()))
            }
        };

        // The flag is set first so an incoming message racing with us is
        // either counted and then reset, or not counted at all.
        self.mutate(conversation_id, |conversation, _| {
            conversation.unread_count = 0;
            Ok(())
        })?;
        drop(_session);

        if let Some(previous) = previous {
            debug!(conversation_id = %conversation_id, "Active conversation changed");
            self.hub.publish(&ChatEvent::ActiveConversationChanged {
                previous,
                current: Some(conversation_id.to_string()),
            });
        }
        Ok(())
    }

    /// Clear the active conversation. Returns the one that was active.
    pub fn clear_active(&self) -> Option<ConversationId> {
        let previous = {
            let _session = self.session_write.lock().unwrap_or_else(PoisonError::into_inner);
            self.session
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .active
                .take()
        };

        if previous.is_some() {
            self.hub.publish(&ChatEvent::ActiveConversationChanged {
                previous: previous.clone(),
                current: None,
            });
        }
        previous
    }

    pub fn active_conversation_id(&self) -> Option<ConversationId> {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .active
            .clone()
    }

    pub fn is_active(&self, conversation_id: &str) -> bool {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .active
            .as_deref()
            == Some(conversation_id)
    }

    /// Snapshot of the active conversation
    pub fn active_conversation(&self) -> Option<Conversation> {
        let id = self.active_conversation_id()?;
        self.get(&id).ok()
    }

    /// Set the local user, who must be registered
    pub fn set_local_user(&self, user_id: &str) -> ChatResult<()> {
        self.users.get(user_id)?;

        let _session = self.session_write.lock().unwrap_or_else(PoisonError::into_inner);
        self.session
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .local_user = Some(user_id.to_string());

        info!(user_id = %user_id, "Local user set");
        Ok(())
    }

    pub fn local_user_id(&self) -> Option<UserId> {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .local_user
            .clone()
    }

    pub fn is_local_user(&self, user_id: &str) -> bool {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .local_user
            .as_deref()
            == Some(user_id)
    }

    /// Replace the draft text. Returns true if it changed.
    pub fn set_draft(&self, draft: impl Into<String>) -> bool {
        let draft = draft.into();
        {
            let _session = self.session_write.lock().unwrap_or_else(PoisonError::into_inner);
            let mut session = self.session.write().unwrap_or_else(PoisonError::into_inner);
            if session.draft == draft {
                return false;
            }
            session.draft = draft.clone();
        }

        self.hub.publish(&ChatEvent::DraftChanged { draft });
        true
    }

    pub fn draft(&self) -> String {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .draft
            .clone()
    }

    /// Typing participants in the order they started
    pub fn typing_users(&self, conversation_id: &str) -> ChatResult<Vec<UserId>> {
        self.read(conversation_id, Conversation::typing_user_ids)
    }

    /// First typing participant
    pub fn current_typing_user(&self, conversation_id: &str) -> ChatResult<Option<UserId>> {
        Ok(self.typing_users(conversation_id)?.into_iter().next())
    }

    /// Receiver of snapshots, notified after every successful write
    pub fn watch(&self, conversation_id: &str) -> ChatResult<watch::Receiver<Conversation>> {
        Ok(self.cell(conversation_id)?.state.subscribe())
    }

    /// Apply a status if it moves the message forward.
    ///
    /// A failed message stays failed here: only a delivery acknowledgement
    /// after a retry moves it on.
    pub fn apply_status(
        &self,
        conversation_id: &str,
        message_id: &str,
        status: MessageStatus,
        reason: Option<String>,
    ) -> ChatResult<StatusChange> {
        self.write_status(conversation_id, message_id, status, reason, false)
    }

    /// Record the transport's answer to a delivery attempt
    pub(crate) fn apply_delivery(
        &self,
        conversation_id: &str,
        message_id: &str,
        outcome: Result<(), String>,
    ) -> ChatResult<StatusChange> {
        match outcome {
            Ok(()) => self.write_status(
                conversation_id,
                message_id,
                MessageStatus::Delivered,
                None,
                true,
            ),
            Err(reason) => self.write_status(
                conversation_id,
                message_id,
                MessageStatus::Failed,
                Some(reason),
                false,
            ),
        }
    }

    fn write_status(
        &self,
        conversation_id: &str,
        message_id: &str,
        status: MessageStatus,
        reason: Option<String>,
        acknowledged: bool,
    ) -> ChatResult<StatusChange> {
        self.mutate(conversation_id, |conversation, events| {
            let message = conversation
                .message_mut(message_id)
                .ok_or_else(|| ChatError::message_not_found(conversation_id, message_id))?;

            let current = message.status;
            let allowed = if acknowledged {
                current.can_acknowledge_to(status)
            } else {
                current.can_transition_to(status)
            };
            if !allowed {
                return Ok(StatusChange::Ignored { current });
            }

            let previous = match status {
                MessageStatus::Failed => {
                    message.fail(reason.unwrap_or_else(|| "delivery failed".to_string()))?
                }
                MessageStatus::Delivered if acknowledged => message.acknowledge()?,
                _ => message.transition(status)?,
            };

            debug!(
                conversation_id = %conversation_id,
                message_id = %message_id,
                from = ?previous,
                to = ?status,
                "Message status changed"
            );
            events.push(ChatEvent::MessageStatusChanged {
                conversation_id: conversation_id.to_string(),
                message_id: message_id.to_string(),
                previous,
                current: status,
            });
            Ok(StatusChange::Applied {
                previous,
                current: status,
            })
        })
    }
}
