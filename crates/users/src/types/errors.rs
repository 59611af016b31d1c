//! Error types for the identity registry.

use thiserror::Error;

/// Result type alias for registry operations
pub type UserResult<T> = Result<T, UserError>;

/// User-related errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum UserError {
    #[error("User not found: {id}")]
    UserNotFound { id: String },

    #[error("User already exists: {id}")]
    UserAlreadyExists { id: String },

    #[error("Validation failed: {message}")]
    Validation { message: String },
}

impl UserError {
    /// Create a not found error
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::UserNotFound { id: id.into() }
    }

    /// Create an already exists error
    pub fn already_exists(id: impl Into<String>) -> Self {
        Self::UserAlreadyExists { id: id.into() }
    }

    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }
}
