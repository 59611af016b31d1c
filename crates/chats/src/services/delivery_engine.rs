//! Message delivery engine.
//!
//! Appends messages on the conversation's writer and drives their status
//! through the transport. Acknowledgments are applied from spawned tasks, so
//! `send` returns as soon as the message is in history.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::entities::{ChatMessage, ContentType, MessageContent, MessageDirection, MessageStatus};
use crate::services::{ConversationStore, StatusChange};
use crate::transport::{RemoteMessage, Transport};
use crate::types::{ChatError, ChatResult, DeliverySettings};
use crate::utils::Validator;

/// Accepts outgoing messages and normalizes remote ones
pub struct DeliveryEngine<T: Transport> {
    store: Arc<ConversationStore>,
    transport: Arc<T>,
    settings: DeliverySettings,
    in_flight: Arc<watch::Sender<usize>>,
}

impl<T: Transport> Clone for DeliveryEngine<T> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            transport: Arc::clone(&self.transport),
            settings: self.settings,
            in_flight: Arc::clone(&self.in_flight),
        }
    }
}

/// Counts a delivery as in flight until dropped
struct InFlightGuard(Arc<watch::Sender<usize>>);

impl InFlightGuard {
    fn enter(counter: &Arc<watch::Sender<usize>>) -> Self {
        counter.send_modify(|n| *n += 1);
        Self(Arc::clone(counter))
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.send_modify(|n| *n = n.saturating_sub(1));
    }
}

impl<T: Transport> DeliveryEngine<T> {
    pub fn new(store: Arc<ConversationStore>, transport: Arc<T>, settings: DeliverySettings) -> Self {
        let (in_flight, _) = watch::channel(0);
        Self {
            store,
            transport,
            settings,
            in_flight: Arc::new(in_flight),
        }
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    /// Validate and append a message, then deliver it in the background.
    ///
    /// The returned message has status `Sent`. Transport failures are recorded
    /// on the message, never returned here.
    pub async fn send(
        &self,
        conversation_id: &str,
        sender_id: &str,
        content: MessageContent,
        content_type: ContentType,
    ) -> ChatResult<ChatMessage> {
        let message = self.append_outgoing(conversation_id, sender_id, content, content_type)?;
        self.spawn_delivery(message.clone());
        Ok(message)
    }

    /// Like `send`, but waits for the transport and returns the message in
    /// its post-delivery state
    pub async fn send_and_confirm(
        &self,
        conversation_id: &str,
        sender_id: &str,
        content: MessageContent,
        content_type: ContentType,
    ) -> ChatResult<ChatMessage> {
        let message = self.append_outgoing(conversation_id, sender_id, content, content_type)?;
        let _guard = InFlightGuard::enter(&self.in_flight);
        self.deliver(message).await
    }

    fn append_outgoing(
        &self,
        conversation_id: &str,
        sender_id: &str,
        content: MessageContent,
        content_type: ContentType,
    ) -> ChatResult<ChatMessage> {
        Validator::message_content(&content, content_type, self.settings.max_content_length)?;

        let direction = if self.store.is_local_user(sender_id) {
            MessageDirection::Outgoing
        } else {
            MessageDirection::Incoming
        };

        self.store
            .append(conversation_id, |conversation| {
                if !conversation.participant_exists(sender_id) {
                    return Err(ChatError::participant_not_found(conversation_id, sender_id));
                }
                Ok(Some(ChatMessage::new(
                    conversation_id,
                    sender_id,
                    content,
                    content_type,
                    direction,
                )))
            })?
            .ok_or_else(|| ChatError::internal("message was not appended"))
    }

    fn spawn_delivery(&self, message: ChatMessage) -> JoinHandle<ChatResult<ChatMessage>> {
        let guard = InFlightGuard::enter(&self.in_flight);
        let engine = self.clone();
        tokio::spawn(async move {
            let _guard = guard;
            engine.deliver(message).await
        })
    }

    async fn deliver(&self, message: ChatMessage) -> ChatResult<ChatMessage> {
        let conversation_id = message.conversation_id.clone();
        let message_id = message.id.clone();

        let outcome = match self.transport.deliver(&message).await {
            Ok(()) => Ok(()),
            Err(err) => {
                warn!(
                    conversation_id = %conversation_id,
                    message_id = %message_id,
                    error = %err,
                    "Message delivery failed"
                );
                Err(err.reason())
            }
        };

        match self
            .store
            .apply_delivery(&conversation_id, &message_id, outcome)
        {
            Ok(StatusChange::Ignored { current }) => {
                debug!(message_id = %message_id, ?current, "Delivery result arrived after a later status");
            }
            Ok(StatusChange::Applied { .. }) => {}
            Err(ChatError::ConversationNotFound { .. }) => {
                debug!(conversation_id = %conversation_id, "Conversation removed before delivery completed");
                return Err(ChatError::conversation_not_found(conversation_id));
            }
            Err(err) => return Err(err),
        }

        self.store
            .read(&conversation_id, |c| c.message(&message_id).cloned())?
            .ok_or_else(|| ChatError::message_not_found(&conversation_id, &message_id))
    }

    /// Re-deliver a failed message under its original id
    pub async fn retry(&self, conversation_id: &str, message_id: &str) -> ChatResult<ChatMessage> {
        let message = self
            .store
            .read(conversation_id, |c| c.message(message_id).cloned())?
            .ok_or_else(|| ChatError::message_not_found(conversation_id, message_id))?;

        if !message.is_failed() {
            return Err(ChatError::InvalidStatusTransition {
                message_id: message.id,
                from: message.status,
                to: MessageStatus::Delivered,
            });
        }

        info!(conversation_id = %conversation_id, message_id = %message_id, "Retrying delivery");
        self.spawn_delivery(message.clone());
        Ok(message)
    }

    /// Apply a status with monotonic checking
    pub fn update_status(
        &self,
        conversation_id: &str,
        message_id: &str,
        status: MessageStatus,
    ) -> ChatResult<StatusChange> {
        self.store.apply_status(conversation_id, message_id, status, None)
    }

    pub fn mark_seen(&self, conversation_id: &str, message_id: &str) -> ChatResult<StatusChange> {
        self.update_status(conversation_id, message_id, MessageStatus::Seen)
    }

    /// Append a message produced remotely.
    ///
    /// Returns `Ok(None)` for a duplicate external id.
    pub fn receive_remote(&self, remote: RemoteMessage) -> ChatResult<Option<ChatMessage>> {
        Validator::message_content(
            &remote.content,
            remote.content_type,
            self.settings.max_content_length,
        )?;

        let direction = if self.store.is_local_user(&remote.sender_id) {
            MessageDirection::Outgoing
        } else {
            MessageDirection::Incoming
        };

        let conversation_id = remote.conversation_id.clone();
        self.store.append(&conversation_id, |conversation| {
            if !conversation.was_participant(&remote.sender_id) {
                return Err(ChatError::participant_not_found(
                    &remote.conversation_id,
                    &remote.sender_id,
                ));
            }

            if let Some(external_id) = &remote.external_id {
                if conversation.message_by_external_id(external_id).is_some() {
                    debug!(
                        conversation_id = %remote.conversation_id,
                        external_id = %external_id,
                        "Dropping duplicate remote message"
                    );
                    return Ok(None);
                }
            }

            let mut message = ChatMessage::new(
                &remote.conversation_id,
                &remote.sender_id,
                remote.content,
                remote.content_type,
                direction,
            );
            message.external_id = remote.external_id;
            message.status = MessageStatus::Delivered;
            if let Some(sent_at) = remote.sent_at {
                message.created_at = sent_at;
                message.updated_at = sent_at;
            }
            Ok(Some(message))
        })
    }

    /// Apply a remote status receipt; stale receipts are ignored
    pub fn apply_receipt(
        &self,
        conversation_id: &str,
        message_id: &str,
        status: MessageStatus,
    ) -> ChatResult<StatusChange> {
        let change = self.update_status(conversation_id, message_id, status)?;
        if let StatusChange::Ignored { current } = change {
            debug!(
                conversation_id = %conversation_id,
                message_id = %message_id,
                receipt = ?status,
                ?current,
                "Ignoring stale receipt"
            );
        }
        Ok(change)
    }

    /// Number of deliveries still waiting on the transport
    pub fn in_flight(&self) -> usize {
        *self.in_flight.borrow()
    }

    /// Wait until no delivery is in flight
    pub async fn wait_idle(&self) {
        let mut rx = self.in_flight.subscribe();
        // the sender lives in self, so the channel cannot close here
        let _ = rx.wait_for(|n| *n == 0).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::NotificationHub;
    use crate::transport::LoopbackTransport;
    use crate::types::CreateConversationRequest;
    use parley_users::{User, UserRegistry};

    struct Fixture {
        store: Arc<ConversationStore>,
        transport: Arc<LoopbackTransport>,
        engine: DeliveryEngine<LoopbackTransport>,
        conversation_id: String,
    }

    fn fixture() -> Fixture {
        let users = Arc::new(UserRegistry::new());
        users.register(User::new("alice", "Alice")).unwrap();
        users.register(User::new("bob", "Bob")).unwrap();
        users.register(User::new("carol", "Carol")).unwrap();

        let store = Arc::new(ConversationStore::new(users, Arc::new(NotificationHub::default())));
        store.set_local_user("alice").unwrap();
        let conversation_id = store
            .create(CreateConversationRequest::new(["alice", "bob"]))
            .unwrap()
            .id;

        let transport = Arc::new(LoopbackTransport::default());
        let engine = DeliveryEngine::new(
            Arc::clone(&store),
            Arc::clone(&transport),
            DeliverySettings::default(),
        );
        Fixture {
            store,
            transport,
            engine,
            conversation_id,
        }
    }

    fn text(body: &str) -> MessageContent {
        MessageContent::text(body)
    }

    #[tokio::test]
    async fn test_send_then_ack() {
        let f = fixture();
        let message = f
            .engine
            .send(&f.conversation_id, "alice", text("hi"), ContentType::TextPlain)
            .await
            .unwrap();
        assert_eq!(message.status, MessageStatus::Sent);
        assert_eq!(message.direction, MessageDirection::Outgoing);

        f.engine.wait_idle().await;
        let stored = f.store.get(&f.conversation_id).unwrap();
        assert_eq!(stored.messages[0].status, MessageStatus::Delivered);
        assert_eq!(f.transport.delivered().len(), 1);
    }

    #[tokio::test]
    async fn test_send_preconditions_do_not_mutate() {
        let f = fixture();

        let unknown = f
            .engine
            .send("missing", "alice", text("hi"), ContentType::TextPlain)
            .await;
        assert!(matches!(unknown, Err(ChatError::ConversationNotFound { .. })));

        let outsider = f
            .engine
            .send(&f.conversation_id, "carol", text("hi"), ContentType::TextPlain)
            .await;
        assert!(matches!(outsider, Err(ChatError::ParticipantNotFound { .. })));

        let invalid = f
            .engine
            .send(&f.conversation_id, "alice", text(""), ContentType::TextPlain)
            .await;
        assert!(matches!(invalid, Err(ChatError::InvalidContent { .. })));

        assert!(f.store.get(&f.conversation_id).unwrap().messages.is_empty());
    }

    #[tokio::test]
    async fn test_failure_is_recorded_and_retry_keeps_id() {
        let f = fixture();
        f.transport.fail_next(1);

        let failed = f
            .engine
            .send_and_confirm(&f.conversation_id, "alice", text("hi"), ContentType::TextPlain)
            .await
            .unwrap();
        assert_eq!(failed.status, MessageStatus::Failed);
        assert!(failed.failure_reason.is_some());

        let retried = f.engine.retry(&f.conversation_id, &failed.id).await.unwrap();
        assert_eq!(retried.id, failed.id);
        f.engine.wait_idle().await;

        let stored = f.store.get(&f.conversation_id).unwrap();
        assert_eq!(stored.messages.len(), 1);
        assert_eq!(stored.messages[0].status, MessageStatus::Delivered);
        assert!(stored.messages[0].failure_reason.is_none());

        assert!(matches!(
            f.engine.retry(&f.conversation_id, &failed.id).await,
            Err(ChatError::InvalidStatusTransition { .. })
        ));
    }

    #[tokio::test]
    async fn test_failed_message_ignores_receipts_until_retried() {
        let f = fixture();
        f.transport.fail_next(1);
        let failed = f
            .engine
            .send_and_confirm(&f.conversation_id, "alice", text("hi"), ContentType::TextPlain)
            .await
            .unwrap();
        let reason = failed.failure_reason.clone();
        assert!(reason.is_some());

        let seen = f.engine.mark_seen(&f.conversation_id, &failed.id).unwrap();
        assert_eq!(seen, StatusChange::Ignored { current: MessageStatus::Failed });
        let receipt = f
            .engine
            .apply_receipt(&f.conversation_id, &failed.id, MessageStatus::Delivered)
            .unwrap();
        assert_eq!(receipt, StatusChange::Ignored { current: MessageStatus::Failed });

        let stored = f.store.get(&f.conversation_id).unwrap();
        assert!(stored.messages[0].is_failed());
        assert_eq!(stored.messages[0].failure_reason, reason);

        f.engine.retry(&f.conversation_id, &failed.id).await.unwrap();
        f.engine.wait_idle().await;
        assert!(f
            .engine
            .mark_seen(&f.conversation_id, &failed.id)
            .unwrap()
            .is_applied());
    }

    #[tokio::test]
    async fn test_remote_messages_dedupe_by_external_id() {
        let f = fixture();
        let remote = RemoteMessage::text(&f.conversation_id, "bob", "yo").with_external_id("ext-1");

        let first = f.engine.receive_remote(remote.clone()).unwrap().unwrap();
        assert_eq!(first.status, MessageStatus::Delivered);
        assert_eq!(first.direction, MessageDirection::Incoming);
        assert!(f.engine.receive_remote(remote).unwrap().is_none());

        let stored = f.store.get(&f.conversation_id).unwrap();
        assert_eq!(stored.messages.len(), 1);
        assert_eq!(stored.unread_count, 1);
    }

    #[tokio::test]
    async fn test_former_participant_history_is_accepted() {
        let f = fixture();
        f.store
            .add_participant(&f.conversation_id, "carol", Default::default())
            .unwrap();
        f.store.remove_participant(&f.conversation_id, "carol").unwrap();

        let late = RemoteMessage::text(&f.conversation_id, "carol", "sent before I left");
        assert!(f.engine.receive_remote(late).unwrap().is_some());

        let stranger = RemoteMessage::text(&f.conversation_id, "mallory", "hi");
        assert!(matches!(
            f.engine.receive_remote(stranger),
            Err(ChatError::ParticipantNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_receipts_never_regress() {
        let f = fixture();
        let message = f
            .engine
            .send_and_confirm(&f.conversation_id, "alice", text("hi"), ContentType::TextPlain)
            .await
            .unwrap();

        assert!(f
            .engine
            .apply_receipt(&f.conversation_id, &message.id, MessageStatus::Seen)
            .unwrap()
            .is_applied());
        let stale = f
            .engine
            .apply_receipt(&f.conversation_id, &message.id, MessageStatus::Delivered)
            .unwrap();
        assert_eq!(stale, StatusChange::Ignored { current: MessageStatus::Seen });
    }
}
