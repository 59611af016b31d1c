use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{ChatError, ConversationId, MessageId, UserId};

/// Declared kind of a message payload
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    TextPlain,
    TextHtml,
    TextMarkdown,
    Image,
    File,
    Other,
}

impl ContentType {
    /// Whether the payload is expected to be `MessageContent::Text`
    pub fn is_text(&self) -> bool {
        matches!(
            self,
            ContentType::TextPlain | ContentType::TextHtml | ContentType::TextMarkdown
        )
    }
}

impl From<&str> for ContentType {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "text" | "text_plain" | "text/plain" => ContentType::TextPlain,
            "html" | "text_html" | "text/html" => ContentType::TextHtml,
            "markdown" | "text_markdown" | "text/markdown" => ContentType::TextMarkdown,
            "image" => ContentType::Image,
            "file" => ContentType::File,
            _ => ContentType::Other,
        }
    }
}

/// Message payload, typed by content kind
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum MessageContent {
    Text(String),
    Image {
        url: String,
        alt: Option<String>,
    },
    File {
        name: String,
        url: String,
        size: Option<u64>,
    },
    Custom(serde_json::Value),
}

impl MessageContent {
    /// Shorthand for a text payload
    pub fn text(text: impl Into<String>) -> Self {
        MessageContent::Text(text.into())
    }

    /// The text body, if this is a text payload
    pub fn as_text(&self) -> Option<&str> {
        match self {
            MessageContent::Text(text) => Some(text),
            _ => None,
        }
    }

    /// One-line summary suitable for conversation lists and logs
    pub fn preview(&self, max_chars: usize) -> String {
        let full = match self {
            MessageContent::Text(text) => text.clone(),
            MessageContent::Image { alt: Some(alt), .. } => format!("[image: {alt}]"),
            MessageContent::Image { .. } => "[image]".to_string(),
            MessageContent::File { name, .. } => format!("[file: {name}]"),
            MessageContent::Custom(_) => "[custom content]".to_string(),
        };

        if full.chars().count() <= max_chars {
            full
        } else {
            let truncated: String = full.chars().take(max_chars).collect();
            format!("{truncated}...")
        }
    }
}

/// Direction relative to the local user
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageDirection {
    Incoming,
    Outgoing,
}

/// Delivery status of a message
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Sent,
    Delivered,
    Seen,
    Failed,
}

impl MessageStatus {
    /// Position in the forward-only ordering; `Failed` shares the rank of `Sent`
    pub fn rank(&self) -> u8 {
        match self {
            MessageStatus::Sent | MessageStatus::Failed => 0,
            MessageStatus::Delivered => 1,
            MessageStatus::Seen => 2,
        }
    }

    /// Whether moving to `next` keeps the status monotonic
    pub fn can_transition_to(&self, next: MessageStatus) -> bool {
        match (self, next) {
            (MessageStatus::Sent, MessageStatus::Delivered)
            | (MessageStatus::Sent, MessageStatus::Seen)
            | (MessageStatus::Sent, MessageStatus::Failed)
            | (MessageStatus::Delivered, MessageStatus::Seen) => true,
            _ => false,
        }
    }

    /// Moves open to a delivery acknowledgement. Only an acknowledged
    /// redelivery may leave `Failed`.
    pub fn can_acknowledge_to(&self, next: MessageStatus) -> bool {
        self.can_transition_to(next)
            || matches!((self, next), (MessageStatus::Failed, MessageStatus::Delivered))
    }
}

/// A message within a conversation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    /// Engine-assigned identifier
    pub id: MessageId,
    /// Identifier assigned by the transport for remote messages
    pub external_id: Option<String>,
    /// Conversation this message belongs to
    pub conversation_id: ConversationId,
    /// User who sent the message
    pub sender_id: UserId,
    /// Payload
    pub content: MessageContent,
    /// Declared payload kind
    pub content_type: ContentType,
    /// Direction relative to the local user
    pub direction: MessageDirection,
    /// Delivery status
    pub status: MessageStatus,
    /// Reason reported by the transport when status is `Failed`
    pub failure_reason: Option<String>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last status change
    pub updated_at: DateTime<Utc>,
}

impl ChatMessage {
    pub(crate) fn new(
        conversation_id: impl Into<ConversationId>,
        sender_id: impl Into<UserId>,
        content: MessageContent,
        content_type: ContentType,
        direction: MessageDirection,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            external_id: None,
            conversation_id: conversation_id.into(),
            sender_id: sender_id.into(),
            content,
            content_type,
            direction,
            status: MessageStatus::Sent,
            failure_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Move to `next`, returning the previous status
    pub fn transition(&mut self, next: MessageStatus) -> Result<MessageStatus, ChatError> {
        if !self.status.can_transition_to(next) {
            return Err(self.invalid_transition(next));
        }
        Ok(self.set_status(next))
    }

    /// Record the transport's acknowledgement, which also settles a failed
    /// message that was retried
    pub fn acknowledge(&mut self) -> Result<MessageStatus, ChatError> {
        if !self.status.can_acknowledge_to(MessageStatus::Delivered) {
            return Err(self.invalid_transition(MessageStatus::Delivered));
        }
        Ok(self.set_status(MessageStatus::Delivered))
    }

    fn set_status(&mut self, next: MessageStatus) -> MessageStatus {
        let previous = self.status;
        self.status = next;
        self.failure_reason = None;
        self.updated_at = Utc::now();
        previous
    }

    fn invalid_transition(&self, to: MessageStatus) -> ChatError {
        ChatError::InvalidStatusTransition {
            message_id: self.id.clone(),
            from: self.status,
            to,
        }
    }

    /// Mark as failed with the transport-reported reason
    pub fn fail(&mut self, reason: impl Into<String>) -> Result<MessageStatus, ChatError> {
        let previous = self.transition(MessageStatus::Failed)?;
        self.failure_reason = Some(reason.into());
        Ok(previous)
    }

    /// Check if the local user sent this message
    pub fn is_outgoing(&self) -> bool {
        matches!(self.direction, MessageDirection::Outgoing)
    }

    /// Check if delivery failed
    pub fn is_failed(&self) -> bool {
        matches!(self.status, MessageStatus::Failed)
    }
}
