use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::UserId;

/// Display name used for tombstone users.
pub const TOMBSTONE_DISPLAY_NAME: &str = "Deleted user";

/// Represents a user known to the local session
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    /// Stable identifier, never changes after registration
    pub id: UserId,
    /// Name shown in conversation lists and typing indicators
    pub display_name: String,
    /// Avatar reference (usually a URL)
    pub avatar_url: Option<String>,
    /// Optional contact email
    pub email: Option<String>,
    /// Presence status
    pub presence: PresenceStatus,
    /// When the user was registered
    pub created_at: DateTime<Utc>,
    /// When the profile was last changed
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    tombstone: bool,
}

/// Presence status enumeration
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum PresenceStatus {
    Available,
    #[default]
    Unavailable,
    Away,
    DoNotDisturb,
    Invisible,
    Eager,
}

impl From<&str> for PresenceStatus {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "available" => PresenceStatus::Available,
            "away" => PresenceStatus::Away,
            "do_not_disturb" | "dnd" => PresenceStatus::DoNotDisturb,
            "invisible" => PresenceStatus::Invisible,
            "eager" => PresenceStatus::Eager,
            _ => PresenceStatus::Unavailable,
        }
    }
}

impl From<PresenceStatus> for String {
    fn from(status: PresenceStatus) -> Self {
        match status {
            PresenceStatus::Available => "available".to_string(),
            PresenceStatus::Unavailable => "unavailable".to_string(),
            PresenceStatus::Away => "away".to_string(),
            PresenceStatus::DoNotDisturb => "do_not_disturb".to_string(),
            PresenceStatus::Invisible => "invisible".to_string(),
            PresenceStatus::Eager => "eager".to_string(),
        }
    }
}

/// Patch applied by `UserRegistry::update`; `None` leaves a field untouched
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateUserRequest {
    /// New display name (optional)
    pub display_name: Option<String>,
    /// New avatar reference (optional)
    pub avatar_url: Option<String>,
    /// New email (optional)
    pub email: Option<String>,
    /// New presence status (optional)
    pub presence: Option<PresenceStatus>,
}

impl User {
    /// Create a new user instance
    pub fn new(id: impl Into<UserId>, display_name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            display_name: display_name.into(),
            avatar_url: None,
            email: None,
            presence: PresenceStatus::default(),
            created_at: now,
            updated_at: now,
            tombstone: false,
        }
    }

    /// Placeholder returned for senders that are no longer registered
    pub fn tombstone(id: impl Into<UserId>) -> Self {
        let mut user = Self::new(id, TOMBSTONE_DISPLAY_NAME);
        user.tombstone = true;
        user
    }

    /// Builder-style avatar setter
    pub fn with_avatar(mut self, avatar_url: impl Into<String>) -> Self {
        self.avatar_url = Some(avatar_url.into());
        self
    }

    /// Builder-style email setter
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Builder-style presence setter
    pub fn with_presence(mut self, presence: PresenceStatus) -> Self {
        self.presence = presence;
        self
    }

    /// Whether this is a tombstone placeholder
    pub fn is_tombstone(&self) -> bool {
        self.tombstone
    }

    /// Whether the user currently shows as reachable
    pub fn is_online(&self) -> bool {
        matches!(self.presence, PresenceStatus::Available | PresenceStatus::Eager)
    }

    /// Apply a patch and bump `updated_at`. Returns whether anything changed.
    pub fn apply(&mut self, request: &UpdateUserRequest) -> bool {
        let mut changed = false;

        if let Some(ref display_name) = request.display_name {
            if *display_name != self.display_name {
                self.display_name = display_name.clone();
                changed = true;
            }
        }
        if let Some(ref avatar_url) = request.avatar_url {
            if self.avatar_url.as_ref() != Some(avatar_url) {
                self.avatar_url = Some(avatar_url.clone());
                changed = true;
            }
        }
        if let Some(ref email) = request.email {
            if self.email.as_ref() != Some(email) {
                self.email = Some(email.clone());
                changed = true;
            }
        }
        if let Some(presence) = request.presence {
            if presence != self.presence {
                self.presence = presence;
                changed = true;
            }
        }

        if changed {
            self.touch();
        }
        changed
    }

    /// Update the timestamp
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

impl UpdateUserRequest {
    /// Whether the patch carries no changes at all
    pub fn is_empty(&self) -> bool {
        self.display_name.is_none()
            && self.avatar_url.is_none()
            && self.email.is_none()
            && self.presence.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_creation() {
        let user = User::new("alice", "Alice")
            .with_avatar("https://example.com/alice.png")
            .with_presence(PresenceStatus::Available);

        assert_eq!(user.id, "alice");
        assert_eq!(user.display_name, "Alice");
        assert_eq!(user.avatar_url.as_deref(), Some("https://example.com/alice.png"));
        assert!(user.is_online());
        assert!(!user.is_tombstone());
        assert_eq!(user.created_at, user.updated_at);
    }

    #[test]
    fn test_tombstone() {
        let ghost = User::tombstone("bob");
        assert_eq!(ghost.id, "bob");
        assert_eq!(ghost.display_name, TOMBSTONE_DISPLAY_NAME);
        assert!(ghost.is_tombstone());
        assert!(!ghost.is_online());
    }

    #[test]
    fn test_presence_conversion() {
        assert_eq!(PresenceStatus::from("available"), PresenceStatus::Available);
        assert_eq!(PresenceStatus::from("DND"), PresenceStatus::DoNotDisturb);
        assert_eq!(PresenceStatus::from("eager"), PresenceStatus::Eager);
        assert_eq!(PresenceStatus::from("whatever"), PresenceStatus::Unavailable);

        assert_eq!(String::from(PresenceStatus::Away), "away");
        assert_eq!(String::from(PresenceStatus::DoNotDisturb), "do_not_disturb");
    }

    #[test]
    fn test_apply_patch() {
        let mut user = User::new("carol", "Carol");
        let before = user.updated_at;

        std::thread::sleep(std::time::Duration::from_millis(1));

        let changed = user.apply(&UpdateUserRequest {
            display_name: Some("Caroline".to_string()),
            presence: Some(PresenceStatus::Away),
            ..Default::default()
        });

        assert!(changed);
        assert_eq!(user.display_name, "Caroline");
        assert_eq!(user.presence, PresenceStatus::Away);
        assert!(user.updated_at > before);

        let unchanged = user.apply(&UpdateUserRequest {
            display_name: Some("Caroline".to_string()),
            ..Default::default()
        });
        assert!(!unchanged);
    }

    #[test]
    fn test_user_serialization() {
        let user = User::new("dave", "Dave").with_presence(PresenceStatus::DoNotDisturb);
        let json = serde_json::to_value(&user).unwrap();
        assert_eq!(json["presence"], "do_not_disturb");
        assert_eq!(json["tombstone"], false);

        let back: User = serde_json::from_value(json).unwrap();
        assert_eq!(back, user);
    }
}
