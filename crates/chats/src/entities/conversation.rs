use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::message::ChatMessage;
use super::participant::Participant;
use super::typing::TypingUser;
use crate::types::{ConversationId, UserId};

/// A bounded set of participants sharing an ordered message history.
///
/// Values handed out by the store are snapshots; mutating one has no effect
/// on the store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Conversation {
    /// Generated identifier
    pub id: ConversationId,
    /// Optional title shown in the sidebar
    pub title: Option<String>,
    /// Current participants, in join order. Never empty.
    pub participants: Vec<Participant>,
    /// Users who left or were removed; their messages stay in history
    pub former_participants: Vec<UserId>,
    /// Messages in conversation order
    pub messages: Vec<ChatMessage>,
    /// Users currently typing, in the order they started
    pub typing: Vec<TypingUser>,
    /// Incoming messages received while the conversation was not active
    pub unread_count: u32,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Timestamp of the last message or creation
    pub last_activity_at: DateTime<Utc>,
    /// Monotonic activity counter used for recent-activity ordering
    pub activity_seq: u64,
    /// Creation counter used for creation ordering
    pub sequence: u64,
}

impl Conversation {
    pub(crate) fn new(
        title: Option<String>,
        participants: Vec<Participant>,
        sequence: u64,
        activity_seq: u64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: cuid2::create_id(),
            title,
            participants,
            former_participants: Vec::new(),
            messages: Vec::new(),
            typing: Vec::new(),
            unread_count: 0,
            created_at: now,
            last_activity_at: now,
            activity_seq,
            sequence,
        }
    }

    /// Check if a user is a current participant
    pub fn participant_exists(&self, user_id: &str) -> bool {
        self.participants.iter().any(|p| p.user_id == user_id)
    }

    /// Check if a user is a current or former participant
    pub fn was_participant(&self, user_id: &str) -> bool {
        self.participant_exists(user_id) || self.former_participants.iter().any(|id| id == user_id)
    }

    /// Participant record for a user
    pub fn participant(&self, user_id: &str) -> Option<&Participant> {
        self.participants.iter().find(|p| p.user_id == user_id)
    }

    /// Participant ids in join order
    pub fn participant_ids(&self) -> Vec<UserId> {
        self.participants.iter().map(|p| p.user_id.clone()).collect()
    }

    /// Message by engine id
    pub fn message(&self, message_id: &str) -> Option<&ChatMessage> {
        self.messages.iter().find(|m| m.id == message_id)
    }

    pub(crate) fn message_mut(&mut self, message_id: &str) -> Option<&mut ChatMessage> {
        self.messages.iter_mut().find(|m| m.id == message_id)
    }

    /// Message by transport id
    pub fn message_by_external_id(&self, external_id: &str) -> Option<&ChatMessage> {
        self.messages
            .iter()
            .find(|m| m.external_id.as_deref() == Some(external_id))
    }

    /// Most recent message
    pub fn last_message(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }

    /// Typing users that are still participants, in the order they started
    pub fn typing_user_ids(&self) -> Vec<UserId> {
        self.typing
            .iter()
            .filter(|t| self.participant_exists(&t.user_id))
            .map(|t| t.user_id.clone())
            .collect()
    }

    /// Whether a user has a live typing flag
    pub fn is_typing(&self, user_id: &str) -> bool {
        self.typing.iter().any(|t| t.user_id == user_id)
    }

    pub(crate) fn push_message(&mut self, message: ChatMessage, activity_seq: u64) {
        self.last_activity_at = message.created_at;
        self.activity_seq = activity_seq;
        self.messages.push(message);
    }

    /// Set or refresh a typing flag. Returns true if the user was not typing before.
    pub(crate) fn refresh_typing(&mut self, user_id: &str, expires_at: DateTime<Utc>) -> bool {
        if let Some(entry) = self.typing.iter_mut().find(|t| t.user_id == user_id) {
            entry.expires_at = expires_at;
            return false;
        }

        self.typing.push(TypingUser {
            user_id: user_id.to_string(),
            started_at: Utc::now(),
            expires_at,
        });
        true
    }

    /// Drop a typing flag. Returns true if one was present.
    pub(crate) fn clear_typing(&mut self, user_id: &str) -> bool {
        let before = self.typing.len();
        self.typing.retain(|t| t.user_id != user_id);
        self.typing.len() != before
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{ContentType, MessageContent, MessageDirection, ParticipantRole};

    fn conversation() -> Conversation {
        Conversation::new(
            Some("Team".to_string()),
            vec![
                Participant::new("alice", ParticipantRole::Owner),
                Participant::new("bob", ParticipantRole::Member),
            ],
            1,
            1,
        )
    }

    #[test]
    fn test_participant_queries() {
        let mut conversation = conversation();
        assert!(conversation.participant_exists("alice"));
        assert!(!conversation.participant_exists("carol"));
        assert_eq!(conversation.participant_ids(), vec!["alice", "bob"]);

        conversation.participants.retain(|p| p.user_id != "bob");
        conversation.former_participants.push("bob".to_string());
        assert!(!conversation.participant_exists("bob"));
        assert!(conversation.was_participant("bob"));
    }

    #[test]
    fn test_typing_set_keeps_insertion_order() {
        let mut conversation = conversation();
        let later = Utc::now() + chrono::Duration::seconds(2);

        assert!(conversation.refresh_typing("bob", later));
        assert!(conversation.refresh_typing("alice", later));
        assert!(!conversation.refresh_typing("bob", later));
        assert_eq!(conversation.typing_user_ids(), vec!["bob", "alice"]);

        assert!(conversation.clear_typing("bob"));
        assert!(!conversation.clear_typing("bob"));
        assert_eq!(conversation.typing_user_ids(), vec!["alice"]);
    }

    #[test]
    fn test_typing_ids_skip_non_participants() {
        let mut conversation = conversation();
        conversation.refresh_typing("bob", Utc::now());
        conversation.participants.retain(|p| p.user_id != "bob");
        assert!(conversation.typing_user_ids().is_empty());
    }

    #[test]
    fn test_push_message_updates_activity() {
        let mut conversation = conversation();
        let message = ChatMessage::new(
            &conversation.id,
            "alice",
            MessageContent::text("hello"),
            ContentType::TextPlain,
            MessageDirection::Outgoing,
        );
        let id = message.id.clone();

        conversation.push_message(message, 7);
        assert_eq!(conversation.activity_seq, 7);
        assert_eq!(conversation.last_message().map(|m| m.id.as_str()), Some(id.as_str()));
        assert!(conversation.message(&id).is_some());
    }
}
