//! # Parley Chats Crate
//!
//! Conversation and session state engine behind a chat UI: conversations and
//! their participants, message delivery with forward-only status, throttled
//! typing indicators with expiry, and ordered change notifications.
//!
//! ## Architecture
//!
//! - **Entities**: Domain models (Conversation, ChatMessage, Participant, ...)
//! - **Services**: Store, delivery engine, typing coordinator, hub and session
//! - **Transport**: Boundary with the network plus an in-process loopback
//! - **Types**: Errors, events, requests and settings
//! - **Utils**: Throttle windows and validation
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use parley_chats::{ChatSession, ChatSettings, CreateConversationRequest, LoopbackTransport, SendMessageRequest};
//! use parley_users::User;
//!
//! # async fn run() -> parley_chats::ChatResult<()> {
//! let session = ChatSession::new(Arc::new(LoopbackTransport::default()), ChatSettings::default());
//! session.set_current_user(User::new("alice", "Alice"))?;
//! session.register_user(User::new("bob", "Bob"))?;
//!
//! let conversation = session.create_conversation(CreateConversationRequest::new(["alice", "bob"]))?;
//! session
//!     .send_message(SendMessageRequest::text(&conversation.id, "alice", "hi"))
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod entities;
pub mod services;
pub mod transport;
pub mod types;
pub mod utils;

// Re-export main types for convenience
pub use entities::{
    ChatMessage, ContentType, Conversation, MessageContent, MessageDirection, MessageStatus,
    Participant, ParticipantRole, TypingEvent, TypingUser,
};
pub use services::{
    ChatSession, ConversationStore, DeliveryEngine, NotificationHub, PublishReport,
    StatusChange, SubscriptionToken, SuppressReason, TypingCoordinator, TypingIndicator,
    TypingOutcome,
};
pub use transport::{LoopbackTransport, RemoteEvent, RemoteMessage, Transport};
pub use types::{
    ChatError, ChatEvent, ChatResult, ChatSettings, ConversationId, ConversationOrder,
    CreateConversationRequest, DeliverySettings, EventKind, MessageId, SendMessageRequest,
    TypingRequest, TypingSettings, TypingThrottle,
};
