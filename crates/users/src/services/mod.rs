//! Registry services.

pub mod user_registry;

pub use user_registry::UserRegistry;
