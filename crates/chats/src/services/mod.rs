//! Services of the chat core.
//!
//! The conversation store owns all conversation and session state; the
//! delivery engine and typing coordinator mutate it through the store's
//! per-conversation writer, and every change is fanned out by the
//! notification hub. `ChatSession` ties them together.

pub mod conversation_store;
pub mod delivery_engine;
pub mod notification_hub;
pub mod session;
pub mod typing_coordinator;

// Re-export all services
pub use conversation_store::{ConversationStore, StatusChange};
pub use delivery_engine::DeliveryEngine;
pub use notification_hub::{
    HandlerFailure, HandlerResult, NotificationHub, PublishReport, SubscriptionToken,
};
pub use session::{ChatSession, TypingIndicator};
pub use typing_coordinator::{SuppressReason, TypingCoordinator, TypingOutcome};
