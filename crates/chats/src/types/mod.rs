//! Shared types for the chat core.
//!
//! Error definitions, events, request shapes and settings used across the
//! services.

pub mod errors;
pub mod events;
pub mod requests;
pub mod settings;

pub use errors::{ChatError, ChatResult};
pub use events::{ChatEvent, EventKind};
pub use requests::*;
pub use settings::*;

// Common type aliases
pub type ConversationId = String;
pub type MessageId = String;
pub use parley_users::UserId;
