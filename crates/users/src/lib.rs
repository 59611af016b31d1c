//! # Parley Users Crate
//!
//! Identity registry for the Parley chat core: maps user identifiers to
//! profiles, validates registrations and hands out tombstone placeholders for
//! users that have been removed while their messages remain in history.
//!
//! ## Usage
//!
//! ```rust
//! use parley_users::{User, UserRegistry};
//!
//! let registry = UserRegistry::new();
//! registry.register(User::new("alice", "Alice")).unwrap();
//! assert_eq!(registry.get("alice").unwrap().display_name, "Alice");
//! ```

pub mod entities;
pub mod services;
pub mod types;
pub mod utils;

pub use entities::{PresenceStatus, UpdateUserRequest, User};
pub use services::UserRegistry;
pub use types::{UserError, UserId, UserResult};
