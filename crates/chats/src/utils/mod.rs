//! Internal utilities for the chat core.
//!
//! This module contains helpers shared by several services.

pub mod throttle;
pub mod validation;

// Re-export utilities
pub use throttle::*;
pub use validation::*;
