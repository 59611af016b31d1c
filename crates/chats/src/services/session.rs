//! Session facade.
//!
//! `ChatSession` wires the registry, store, delivery engine, typing
//! coordinator and hub together and exposes what a chat UI binds to: a read
//! model of the local session and the operations that change it.

use std::sync::Arc;

use futures_util::{Stream, StreamExt};
use parley_users::{UpdateUserRequest, User, UserRegistry};
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use crate::entities::{ChatMessage, ContentType, Conversation, MessageContent, Participant, ParticipantRole};
use crate::services::{
    ConversationStore, DeliveryEngine, HandlerResult, NotificationHub, StatusChange,
    SubscriptionToken, TypingCoordinator, TypingOutcome,
};
use crate::transport::{RemoteEvent, Transport};
use crate::types::{
    ChatError, ChatEvent, ChatResult, ChatSettings, ConversationId, ConversationOrder,
    CreateConversationRequest, EventKind, SendMessageRequest, TypingRequest, TypingThrottle,
};

/// Who is typing in the active conversation
#[derive(Debug, Clone, PartialEq)]
pub struct TypingIndicator {
    pub conversation_id: ConversationId,
    pub user: User,
}

impl TypingIndicator {
    /// Text shown under the message list
    pub fn label(&self) -> String {
        format!("{} is typing", self.user.display_name)
    }
}

/// A local chat session over a transport
pub struct ChatSession<T: Transport> {
    users: Arc<UserRegistry>,
    hub: Arc<NotificationHub>,
    store: Arc<ConversationStore>,
    delivery: DeliveryEngine<T>,
    typing: TypingCoordinator<T>,
    settings: ChatSettings,
}

impl<T: Transport> ChatSession<T> {
    pub fn new(transport: Arc<T>, settings: ChatSettings) -> Self {
        Self::with_registry(Arc::new(UserRegistry::new()), transport, settings)
    }

    /// Build a session over an existing registry
    pub fn with_registry(users: Arc<UserRegistry>, transport: Arc<T>, settings: ChatSettings) -> Self {
        let hub = Arc::new(NotificationHub::new(settings.event_capacity));
        let store = Arc::new(ConversationStore::new(Arc::clone(&users), Arc::clone(&hub)));
        let delivery = DeliveryEngine::new(Arc::clone(&store), Arc::clone(&transport), settings.delivery);
        let typing = TypingCoordinator::new(Arc::clone(&store), transport, settings.typing);

        Self {
            users,
            hub,
            store,
            delivery,
            typing,
            settings,
        }
    }

    pub fn users(&self) -> &Arc<UserRegistry> {
        &self.users
    }

    pub fn hub(&self) -> &Arc<NotificationHub> {
        &self.hub
    }

    pub fn store(&self) -> &Arc<ConversationStore> {
        &self.store
    }

    pub fn delivery(&self) -> &DeliveryEngine<T> {
        &self.delivery
    }

    pub fn typing(&self) -> &TypingCoordinator<T> {
        &self.typing
    }

    pub fn transport(&self) -> &Arc<T> {
        self.delivery.transport()
    }

    pub fn settings(&self) -> &ChatSettings {
        &self.settings
    }

    // Read model

    pub fn active_conversation(&self) -> Option<Conversation> {
        self.store.active_conversation()
    }

    pub fn conversations(&self, order: ConversationOrder) -> Vec<Conversation> {
        self.store.list(order)
    }

    /// Messages of the active conversation, empty when none is active
    pub fn current_messages(&self) -> Vec<ChatMessage> {
        self.active_conversation()
            .map(|c| c.messages)
            .unwrap_or_default()
    }

    /// First participant of the active conversation who is typing
    pub fn typing_indicator(&self) -> Option<TypingIndicator> {
        let conversation = self.active_conversation()?;
        let user_id = conversation.typing_user_ids().into_iter().next()?;
        Some(TypingIndicator {
            conversation_id: conversation.id,
            user: self.users.resolve(&user_id),
        })
    }

    /// Typing participants of a conversation, resolved to profiles
    pub fn typing_users(&self, conversation_id: &str) -> ChatResult<Vec<User>> {
        Ok(self
            .store
            .typing_users(conversation_id)?
            .iter()
            .map(|id| self.users.resolve(id))
            .collect())
    }

    pub fn current_draft(&self) -> String {
        self.store.draft()
    }

    pub fn current_user(&self) -> Option<User> {
        let id = self.store.local_user_id()?;
        self.users.get(&id).ok()
    }

    /// First participant who is not the local user
    pub fn counterpart(&self, conversation_id: &str) -> ChatResult<Option<User>> {
        let local = self.store.local_user_id();
        let counterpart = self.store.read(conversation_id, |c| {
            c.participants
                .iter()
                .find(|p| Some(&p.user_id) != local.as_ref())
                .map(|p| p.user_id.clone())
        })?;
        Ok(counterpart.map(|id| self.users.resolve(&id)))
    }

    pub fn watch(&self, conversation_id: &str) -> ChatResult<watch::Receiver<Conversation>> {
        self.store.watch(conversation_id)
    }

    // Operations

    pub fn set_active_conversation(&self, conversation_id: &str) -> ChatResult<()> {
        self.store.set_active(conversation_id)
    }

    pub async fn send_message(&self, request: SendMessageRequest) -> ChatResult<ChatMessage> {
        self.delivery
            .send(
                &request.conversation_id,
                &request.sender_id,
                request.content,
                request.content_type,
            )
            .await
    }

    /// Send as the local user into the active conversation
    pub async fn send_to_active(
        &self,
        content: MessageContent,
        content_type: ContentType,
    ) -> ChatResult<ChatMessage> {
        let sender_id = self
            .store
            .local_user_id()
            .ok_or_else(|| ChatError::validation("No current user set"))?;
        let conversation_id = self
            .store
            .active_conversation_id()
            .ok_or_else(|| ChatError::validation("No active conversation"))?;

        self.delivery
            .send(&conversation_id, &sender_id, content, content_type)
            .await
    }

    pub async fn send_typing(&self, request: TypingRequest) -> TypingOutcome {
        self.typing.notify_typing(request).await
    }

    /// Update the draft and signal typing in the active conversation, the way
    /// an input's change handler would
    pub async fn compose(&self, text: impl Into<String>) -> Option<TypingOutcome> {
        let text = text.into();
        self.store.set_draft(text.clone());

        let user_id = self.store.local_user_id()?;
        let conversation_id = self.store.active_conversation_id()?;
        let request = TypingRequest::new(conversation_id, user_id, !text.is_empty()).with_content(text);
        Some(self.typing.notify_typing(request).await)
    }

    /// Make `user` the local user, registering it if unknown
    pub fn set_current_user(&self, user: User) -> ChatResult<User> {
        let user = if self.users.contains(&user.id) {
            let patch = UpdateUserRequest {
                display_name: Some(user.display_name.clone()),
                avatar_url: user.avatar_url.clone(),
                email: user.email.clone(),
                presence: Some(user.presence),
            };
            self.update_user(&user.id, &patch)?
        } else {
            self.register_user(user)?
        };

        self.store.set_local_user(&user.id)?;
        Ok(user)
    }

    /// Profile for a user id; a tombstone for removed users, `None` if never seen
    pub fn get_user(&self, user_id: &str) -> Option<User> {
        match self.users.get(user_id) {
            Ok(user) => Some(user),
            Err(_) if self.users.is_removed(user_id) => Some(User::tombstone(user_id)),
            Err(_) => None,
        }
    }

    pub fn set_draft(&self, draft: impl Into<String>) -> bool {
        self.store.set_draft(draft)
    }

    pub fn create_conversation(&self, request: CreateConversationRequest) -> ChatResult<Conversation> {
        self.store.create(request)
    }

    pub fn add_participant(&self, conversation_id: &str, user_id: &str) -> ChatResult<Participant> {
        self.store
            .add_participant(conversation_id, user_id, ParticipantRole::Member)
    }

    pub fn remove_participant(&self, conversation_id: &str, user_id: &str) -> ChatResult<()> {
        self.store.remove_participant(conversation_id, user_id)?;
        self.typing.forget(conversation_id, user_id);
        Ok(())
    }

    pub fn remove_conversation(&self, conversation_id: &str) -> ChatResult<Conversation> {
        let removed = self.store.remove(conversation_id)?;
        self.typing.forget_conversation(conversation_id);
        Ok(removed)
    }

    pub fn register_user(&self, user: User) -> ChatResult<User> {
        let user = self.users.register(user)?;
        self.hub.publish(&ChatEvent::UserRegistered { user: user.clone() });
        Ok(user)
    }

    pub fn update_user(&self, user_id: &str, request: &UpdateUserRequest) -> ChatResult<User> {
        let user = self.users.update(user_id, request)?;
        self.hub.publish(&ChatEvent::UserUpdated { user: user.clone() });
        Ok(user)
    }

    /// Remove a user from the registry. Their messages stay in history and
    /// resolve to a tombstone.
    pub fn remove_user(&self, user_id: &str) -> ChatResult<User> {
        let user = self.users.remove(user_id)?;
        self.hub.publish(&ChatEvent::UserRemoved {
            user_id: user_id.to_string(),
        });
        Ok(user)
    }

    pub async fn retry_message(&self, conversation_id: &str, message_id: &str) -> ChatResult<ChatMessage> {
        self.delivery.retry(conversation_id, message_id).await
    }

    pub fn mark_seen(&self, conversation_id: &str, message_id: &str) -> ChatResult<StatusChange> {
        self.delivery.mark_seen(conversation_id, message_id)
    }

    pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> SubscriptionToken
    where
        F: Fn(&ChatEvent) -> HandlerResult + Send + Sync + 'static,
    {
        self.hub.subscribe(kind, handler)
    }

    pub fn subscribe_all<F>(&self, handler: F) -> SubscriptionToken
    where
        F: Fn(&ChatEvent) -> HandlerResult + Send + Sync + 'static,
    {
        self.hub.subscribe_all(handler)
    }

    pub fn unsubscribe(&self, token: SubscriptionToken) -> bool {
        self.hub.unsubscribe(token)
    }

    pub fn events(&self) -> broadcast::Receiver<ChatEvent> {
        self.hub.events()
    }

    /// Wait for in-flight deliveries
    pub async fn wait_idle(&self) {
        self.delivery.wait_idle().await
    }

    // Remote feed

    /// Apply one event from the network
    pub async fn handle_remote(&self, event: RemoteEvent) -> ChatResult<()> {
        match event {
            RemoteEvent::Message(message) => {
                self.delivery.receive_remote(message)?;
            }
            RemoteEvent::Typing(event) => {
                let mut request = TypingRequest::new(event.conversation_id, event.user_id, event.is_typing)
                    .with_throttle(TypingThrottle::Disabled);
                request.content = event.content;
                let outcome = self.typing.notify_typing(request).await;
                debug!(?outcome, "Remote typing applied");
            }
            RemoteEvent::Receipt {
                conversation_id,
                message_id,
                status,
            } => {
                self.delivery
                    .apply_receipt(&conversation_id, &message_id, status)?;
            }
            RemoteEvent::Presence { user_id, presence } => {
                let user = self.users.set_presence(&user_id, presence)?;
                self.hub.publish(&ChatEvent::UserUpdated { user });
            }
        }
        Ok(())
    }

    /// Drain a remote feed until it ends. Bad events are logged and skipped.
    pub async fn run_remote_feed<S>(&self, mut feed: S) -> usize
    where
        S: Stream<Item = RemoteEvent> + Send + Unpin,
    {
        let mut applied = 0;
        while let Some(event) = feed.next().await {
            let kind = event.kind();
            match self.handle_remote(event).await {
                Ok(()) => applied += 1,
                Err(err) => warn!(event = kind, error = %err, "Dropping remote event"),
            }
        }

        info!(applied, "Remote feed ended");
        applied
    }
}
