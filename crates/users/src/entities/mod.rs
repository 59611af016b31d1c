//! Domain entities for the identity registry.

pub mod user;

pub use user::{PresenceStatus, UpdateUserRequest, User, TOMBSTONE_DISPLAY_NAME};
