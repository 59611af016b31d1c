//! Internal utilities for the identity registry.

pub mod validation;

pub use validation::*;
