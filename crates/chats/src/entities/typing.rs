use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{ConversationId, UserId};

/// Ephemeral "user is typing" signal, as exchanged with the transport
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TypingEvent {
    pub conversation_id: ConversationId,
    pub user_id: UserId,
    pub is_typing: bool,
    /// Throttle window the sender applied, in milliseconds
    #[serde(default)]
    pub throttle_ms: Option<u64>,
    /// Draft preview; most clients leave this empty for privacy
    #[serde(default)]
    pub content: Option<String>,
}

impl TypingEvent {
    pub fn new(
        conversation_id: impl Into<ConversationId>,
        user_id: impl Into<UserId>,
        is_typing: bool,
    ) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            user_id: user_id.into(),
            is_typing,
            throttle_ms: None,
            content: None,
        }
    }
}

/// Entry in a conversation's typing set
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TypingUser {
    pub user_id: UserId,
    /// When the current typing streak started
    pub started_at: DateTime<Utc>,
    /// When the flag clears unless refreshed
    pub expires_at: DateTime<Utc>,
}
