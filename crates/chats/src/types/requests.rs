//! Request types accepted by the services.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{ConversationId, UserId};
use crate::entities::{ContentType, MessageContent};

/// Request to create a new conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateConversationRequest {
    /// Participants in join order; the first becomes owner
    pub participant_ids: Vec<UserId>,
    /// Optional title
    pub title: Option<String>,
}

impl CreateConversationRequest {
    pub fn new<I, S>(participant_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<UserId>,
    {
        Self {
            participant_ids: participant_ids.into_iter().map(Into::into).collect(),
            title: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }
}

/// Order in which conversations are listed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationOrder {
    /// Oldest first
    #[default]
    Created,
    /// Most recent message (or creation) first
    RecentActivity,
}

/// Request to send a message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendMessageRequest {
    pub conversation_id: ConversationId,
    pub sender_id: UserId,
    pub content: MessageContent,
    pub content_type: ContentType,
}

impl SendMessageRequest {
    /// Plain-text message
    pub fn text(
        conversation_id: impl Into<ConversationId>,
        sender_id: impl Into<UserId>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            sender_id: sender_id.into(),
            content: MessageContent::text(text),
            content_type: ContentType::TextPlain,
        }
    }
}

/// Per-call throttling choice for typing notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypingThrottle {
    /// Every call propagates
    Disabled,
    /// Use the configured window
    #[default]
    Default,
    /// Use an explicit window
    Window(Duration),
}

impl TypingThrottle {
    /// Shorthand for `throttle: true/false`
    pub fn enabled(enabled: bool) -> Self {
        if enabled {
            TypingThrottle::Default
        } else {
            TypingThrottle::Disabled
        }
    }

    /// Explicit window in milliseconds
    pub fn millis(ms: u64) -> Self {
        TypingThrottle::Window(Duration::from_millis(ms))
    }

    /// Resolve to a concrete window, `None` when throttling is off
    pub fn window(&self, default: Duration) -> Option<Duration> {
        match self {
            TypingThrottle::Disabled => None,
            TypingThrottle::Default => Some(default),
            TypingThrottle::Window(window) => Some(*window),
        }
    }
}

/// Request to notify typing state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypingRequest {
    pub conversation_id: ConversationId,
    pub user_id: UserId,
    pub is_typing: bool,
    #[serde(default)]
    pub throttle: TypingThrottle,
    /// Draft preview forwarded to the transport
    #[serde(default)]
    pub content: Option<String>,
}

impl TypingRequest {
    pub fn new(
        conversation_id: impl Into<ConversationId>,
        user_id: impl Into<UserId>,
        is_typing: bool,
    ) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            user_id: user_id.into(),
            is_typing,
            throttle: TypingThrottle::Default,
            content: None,
        }
    }

    pub fn with_throttle(mut self, throttle: TypingThrottle) -> Self {
        self.throttle = throttle;
        self
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_throttle_window_resolution() {
        let default = Duration::from_millis(2_000);
        assert_eq!(TypingThrottle::Disabled.window(default), None);
        assert_eq!(TypingThrottle::Default.window(default), Some(default));
        assert_eq!(
            TypingThrottle::millis(500).window(default),
            Some(Duration::from_millis(500))
        );
        assert_eq!(TypingThrottle::enabled(false), TypingThrottle::Disabled);
        assert_eq!(TypingThrottle::enabled(true), TypingThrottle::Default);
    }

    #[test]
    fn test_create_request_builder() {
        let request = CreateConversationRequest::new(["alice", "bob"]).with_title("Lunch");
        assert_eq!(request.participant_ids, vec!["alice", "bob"]);
        assert_eq!(request.title.as_deref(), Some("Lunch"));
    }
}
