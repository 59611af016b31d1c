//! Error types for the chat core.

use parley_users::UserError;
use thiserror::Error;

use crate::entities::MessageStatus;

/// Result type alias for chat operations
pub type ChatResult<T> = Result<T, ChatError>;

/// Main error type for the chat core
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ChatError {
    #[error("Conversation not found: {id}")]
    ConversationNotFound { id: String },

    #[error("User {user_id} is not a participant of conversation {conversation_id}")]
    ParticipantNotFound {
        conversation_id: String,
        user_id: String,
    },

    #[error("Message {message_id} not found in conversation {conversation_id}")]
    MessageNotFound {
        conversation_id: String,
        message_id: String,
    },

    #[error("Delivery of message {message_id} failed: {reason}")]
    DeliveryFailed { message_id: String, reason: String },

    #[error("Invalid content: {reason}")]
    InvalidContent { reason: String },

    #[error("Message {message_id} cannot move from {from:?} to {to:?}")]
    InvalidStatusTransition {
        message_id: String,
        from: MessageStatus,
        to: MessageStatus,
    },

    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error(transparent)]
    User(#[from] UserError),

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl ChatError {
    /// Create a not found error for conversations
    pub fn conversation_not_found(id: impl Into<String>) -> Self {
        Self::ConversationNotFound { id: id.into() }
    }

    /// Create a not found error for participants
    pub fn participant_not_found(
        conversation_id: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Self {
        Self::ParticipantNotFound {
            conversation_id: conversation_id.into(),
            user_id: user_id.into(),
        }
    }

    /// Create a not found error for messages
    pub fn message_not_found(
        conversation_id: impl Into<String>,
        message_id: impl Into<String>,
    ) -> Self {
        Self::MessageNotFound {
            conversation_id: conversation_id.into(),
            message_id: message_id.into(),
        }
    }

    /// Create a transport-reported delivery failure
    pub fn delivery_failed(message_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::DeliveryFailed {
            message_id: message_id.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid content error
    pub fn invalid_content(reason: impl Into<String>) -> Self {
        Self::InvalidContent {
            reason: reason.into(),
        }
    }

    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Short human-readable reason, used when recording a failure on a message
    pub fn reason(&self) -> String {
        match self {
            ChatError::DeliveryFailed { reason, .. } => reason.clone(),
            other => other.to_string(),
        }
    }
}

impl From<serde_json::Error> for ChatError {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal {
            message: format!("JSON serialization error: {}", err),
        }
    }
}
