//! Event types fanned out by the notification hub.

use parley_users::User;
use serde::{Deserialize, Serialize};

use super::{ConversationId, MessageId, UserId};
use crate::entities::{ChatMessage, MessageStatus, Participant};

/// State change published to subscribers
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "data")]
pub enum ChatEvent {
    /// A message was appended to a conversation
    MessageAdded {
        conversation_id: ConversationId,
        message: ChatMessage,
    },

    /// A message moved forward in its delivery lifecycle
    MessageStatusChanged {
        conversation_id: ConversationId,
        message_id: MessageId,
        previous: MessageStatus,
        current: MessageStatus,
    },

    /// A typing flag was propagated or cleared
    TypingChanged {
        conversation_id: ConversationId,
        user_id: UserId,
        is_typing: bool,
    },

    /// The session's active conversation changed
    ActiveConversationChanged {
        previous: Option<ConversationId>,
        current: Option<ConversationId>,
    },

    /// A user profile was registered
    UserRegistered { user: User },

    /// A user profile changed
    UserUpdated { user: User },

    /// A user was removed from the registry
    UserRemoved { user_id: UserId },

    /// A conversation was created
    ConversationCreated {
        conversation_id: ConversationId,
        participant_ids: Vec<UserId>,
    },

    /// A conversation was dropped from the store
    ConversationRemoved { conversation_id: ConversationId },

    /// A participant joined a conversation
    ParticipantAdded {
        conversation_id: ConversationId,
        participant: Participant,
    },

    /// A participant left a conversation
    ParticipantRemoved {
        conversation_id: ConversationId,
        user_id: UserId,
    },

    /// The local user's draft text changed
    DraftChanged { draft: String },
}

/// Discriminant used to subscribe to a class of events
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    MessageAdded,
    MessageStatusChanged,
    TypingChanged,
    ActiveConversationChanged,
    UserRegistered,
    UserUpdated,
    UserRemoved,
    ConversationCreated,
    ConversationRemoved,
    ParticipantAdded,
    ParticipantRemoved,
    DraftChanged,
}

impl ChatEvent {
    /// Kind of this event
    pub fn kind(&self) -> EventKind {
        match self {
            ChatEvent::MessageAdded { .. } => EventKind::MessageAdded,
            ChatEvent::MessageStatusChanged { .. } => EventKind::MessageStatusChanged,
            ChatEvent::TypingChanged { .. } => EventKind::TypingChanged,
            ChatEvent::ActiveConversationChanged { .. } => EventKind::ActiveConversationChanged,
            ChatEvent::UserRegistered { .. } => EventKind::UserRegistered,
            ChatEvent::UserUpdated { .. } => EventKind::UserUpdated,
            ChatEvent::UserRemoved { .. } => EventKind::UserRemoved,
            ChatEvent::ConversationCreated { .. } => EventKind::ConversationCreated,
            ChatEvent::ConversationRemoved { .. } => EventKind::ConversationRemoved,
            ChatEvent::ParticipantAdded { .. } => EventKind::ParticipantAdded,
            ChatEvent::ParticipantRemoved { .. } => EventKind::ParticipantRemoved,
            ChatEvent::DraftChanged { .. } => EventKind::DraftChanged,
        }
    }

    /// Get the conversation ID associated with this event
    pub fn conversation_id(&self) -> Option<&str> {
        match self {
            ChatEvent::MessageAdded { conversation_id, .. }
            | ChatEvent::MessageStatusChanged { conversation_id, .. }
            | ChatEvent::TypingChanged { conversation_id, .. }
            | ChatEvent::ConversationCreated { conversation_id, .. }
            | ChatEvent::ConversationRemoved { conversation_id }
            | ChatEvent::ParticipantAdded { conversation_id, .. }
            | ChatEvent::ParticipantRemoved { conversation_id, .. } => Some(conversation_id),
            ChatEvent::ActiveConversationChanged { current, .. } => current.as_deref(),
            ChatEvent::UserRegistered { .. }
            | ChatEvent::UserUpdated { .. }
            | ChatEvent::UserRemoved { .. }
            | ChatEvent::DraftChanged { .. } => None,
        }
    }

    /// Get event type name for logging
    pub fn event_type_name(&self) -> &'static str {
        self.kind().as_str()
    }
}

impl EventKind {
    /// Snake-case name of the kind
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::MessageAdded => "message_added",
            EventKind::MessageStatusChanged => "message_status_changed",
            EventKind::TypingChanged => "typing_changed",
            EventKind::ActiveConversationChanged => "active_conversation_changed",
            EventKind::UserRegistered => "user_registered",
            EventKind::UserUpdated => "user_updated",
            EventKind::UserRemoved => "user_removed",
            EventKind::ConversationCreated => "conversation_created",
            EventKind::ConversationRemoved => "conversation_removed",
            EventKind::ParticipantAdded => "participant_added",
            EventKind::ParticipantRemoved => "participant_removed",
            EventKind::DraftChanged => "draft_changed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_kind_and_conversation() {
        let event = ChatEvent::TypingChanged {
            conversation_id: "c1".to_string(),
            user_id: "bob".to_string(),
            is_typing: true,
        };
        assert_eq!(event.kind(), EventKind::TypingChanged);
        assert_eq!(event.conversation_id(), Some("c1"));
        assert_eq!(event.event_type_name(), "typing_changed");

        let draft = ChatEvent::DraftChanged {
            draft: "hel".to_string(),
        };
        assert_eq!(draft.conversation_id(), None);
    }

    #[test]
    fn test_event_serialization_shape() {
        let event = ChatEvent::ActiveConversationChanged {
            previous: None,
            current: Some("c2".to_string()),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "ActiveConversationChanged");
        assert_eq!(json["data"]["current"], "c2");
    }
}
