//! Boundary with the network layer.
//!
//! The core never talks to a wire protocol directly. Outgoing messages and
//! typing signals go through [`Transport`]; everything the network produces
//! arrives as a stream of [`RemoteEvent`]s.

pub mod loopback;

use std::future::Future;

use chrono::{DateTime, Utc};
use parley_users::PresenceStatus;
use serde::{Deserialize, Serialize};

use crate::entities::{ChatMessage, ContentType, MessageContent, MessageStatus, TypingEvent};
use crate::types::{ChatResult, ConversationId, MessageId, UserId};

pub use loopback::LoopbackTransport;

/// Network delivery collaborator
pub trait Transport: Send + Sync + 'static {
    /// Deliver an outgoing message. `Ok` is the acknowledgment.
    ///
    /// Messages are keyed by id; a retried message reuses the same id.
    fn deliver(&self, message: &ChatMessage) -> impl Future<Output = ChatResult<()>> + Send;

    /// Forward a local typing signal
    fn send_typing(&self, event: &TypingEvent) -> impl Future<Output = ChatResult<()>> + Send;
}

/// A message produced by a remote participant
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RemoteMessage {
    pub conversation_id: ConversationId,
    pub sender_id: UserId,
    /// Transport identifier, used to drop duplicates
    pub external_id: Option<String>,
    pub content: MessageContent,
    pub content_type: ContentType,
    /// Remote send time, when the transport knows it
    #[serde(default)]
    pub sent_at: Option<DateTime<Utc>>,
}

impl RemoteMessage {
    /// Plain-text remote message
    pub fn text(
        conversation_id: impl Into<ConversationId>,
        sender_id: impl Into<UserId>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            sender_id: sender_id.into(),
            external_id: None,
            content: MessageContent::text(text),
            content_type: ContentType::TextPlain,
            sent_at: None,
        }
    }

    pub fn with_external_id(mut self, external_id: impl Into<String>) -> Self {
        self.external_id = Some(external_id.into());
        self
    }
}

/// Everything the network can tell the core
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RemoteEvent {
    Message(RemoteMessage),
    Typing(TypingEvent),
    Receipt {
        conversation_id: ConversationId,
        message_id: MessageId,
        status: MessageStatus,
    },
    Presence {
        user_id: UserId,
        presence: PresenceStatus,
    },
}

impl RemoteEvent {
    /// Name used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            RemoteEvent::Message(_) => "message",
            RemoteEvent::Typing(_) => "typing",
            RemoteEvent::Receipt { .. } => "receipt",
            RemoteEvent::Presence { .. } => "presence",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_event_wire_shape() {
        let event = RemoteEvent::Receipt {
            conversation_id: "c1".to_string(),
            message_id: "m1".to_string(),
            status: MessageStatus::Seen,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "receipt");
        assert_eq!(json["status"], "seen");

        let parsed: RemoteEvent = serde_json::from_value(serde_json::json!({
            "type": "typing",
            "conversation_id": "c1",
            "user_id": "bob",
            "is_typing": true
        }))
        .unwrap();
        assert_eq!(parsed, RemoteEvent::Typing(TypingEvent::new("c1", "bob", true)));
        assert_eq!(parsed.kind(), "typing");
    }
}
