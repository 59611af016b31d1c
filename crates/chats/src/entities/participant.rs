use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::UserId;

/// A user's membership record within a conversation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Participant {
    /// User ID of the participant
    pub user_id: UserId,
    /// Role in this conversation
    pub role: ParticipantRole,
    /// When the participant joined
    pub joined_at: DateTime<Utc>,
}

/// Participant role enumeration
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ParticipantRole {
    Owner,
    Admin,
    #[default]
    Member,
}

impl From<&str> for ParticipantRole {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "admin" => ParticipantRole::Admin,
            "owner" => ParticipantRole::Owner,
            _ => ParticipantRole::Member,
        }
    }
}

impl From<ParticipantRole> for String {
    fn from(role: ParticipantRole) -> Self {
        match role {
            ParticipantRole::Owner => "owner".to_string(),
            ParticipantRole::Admin => "admin".to_string(),
            ParticipantRole::Member => "member".to_string(),
        }
    }
}

impl Participant {
    /// Create a new participant record joined now
    pub fn new(user_id: impl Into<UserId>, role: ParticipantRole) -> Self {
        Self {
            user_id: user_id.into(),
            role,
            joined_at: Utc::now(),
        }
    }

    /// Check if the participant owns the conversation
    pub fn is_owner(&self) -> bool {
        matches!(self.role, ParticipantRole::Owner)
    }

    /// Check if the participant can add or remove others
    pub fn can_manage_participants(&self) -> bool {
        matches!(self.role, ParticipantRole::Owner | ParticipantRole::Admin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_participant_roles() {
        let owner = Participant::new("alice", ParticipantRole::Owner);
        let member = Participant::new("bob", ParticipantRole::default());

        assert!(owner.is_owner());
        assert!(owner.can_manage_participants());
        assert!(!member.is_owner());
        assert!(!member.can_manage_participants());
        assert_eq!(member.role, ParticipantRole::Member);
    }

    #[test]
    fn test_role_conversion() {
        assert_eq!(ParticipantRole::from("owner"), ParticipantRole::Owner);
        assert_eq!(ParticipantRole::from("ADMIN"), ParticipantRole::Admin);
        assert_eq!(ParticipantRole::from("guest"), ParticipantRole::Member);
        assert_eq!(String::from(ParticipantRole::Admin), "admin");
    }
}
