//! Tunables for the chat core.

use std::time::Duration;

/// Default typing throttle window
pub const DEFAULT_TYPING_THROTTLE: Duration = Duration::from_millis(2_000);
/// Default typing inactivity timeout
pub const DEFAULT_TYPING_EXPIRY: Duration = Duration::from_millis(2_000);
/// Default maximum text payload length, in characters
pub const DEFAULT_MAX_CONTENT_LENGTH: usize = 100_000;
/// Default buffer of the hub's broadcast stream
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Typing coordinator settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypingSettings {
    /// Window used when a call asks for the default throttle
    pub throttle: Duration,
    /// Inactivity timeout after which a typing flag clears
    pub expiry: Duration,
}

impl Default for TypingSettings {
    fn default() -> Self {
        Self {
            throttle: DEFAULT_TYPING_THROTTLE,
            expiry: DEFAULT_TYPING_EXPIRY,
        }
    }
}

/// Delivery engine settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliverySettings {
    pub max_content_length: usize,
}

impl Default for DeliverySettings {
    fn default() -> Self {
        Self {
            max_content_length: DEFAULT_MAX_CONTENT_LENGTH,
        }
    }
}

/// Settings for a whole chat session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChatSettings {
    pub typing: TypingSettings,
    pub delivery: DeliverySettings,
    pub event_capacity: usize,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            typing: TypingSettings::default(),
            delivery: DeliverySettings::default(),
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}
