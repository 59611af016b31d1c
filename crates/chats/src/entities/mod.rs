//! Domain entities for the chat core.
//!
//! Pure data types: conversations, participants, messages and typing
//! records. Mutation happens through the services, which own the
//! invariants.

pub mod conversation;
pub mod message;
pub mod participant;
pub mod typing;

pub use conversation::Conversation;
pub use message::{ChatMessage, ContentType, MessageContent, MessageDirection, MessageStatus};
pub use participant::{Participant, ParticipantRole};
pub use typing::{TypingEvent, TypingUser};
