//! Shared types for the identity registry.

pub mod errors;

pub use errors::{UserError, UserResult};

/// Stable user identifier
pub type UserId = String;
