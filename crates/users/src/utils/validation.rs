//! Input validation utilities.

use crate::entities::{UpdateUserRequest, User};
use crate::types::UserError;

const MAX_USER_ID_LENGTH: usize = 128;
const MAX_DISPLAY_NAME_LENGTH: usize = 100;
const MAX_AVATAR_URL_LENGTH: usize = 2048;

/// Validate a user identifier
pub fn validate_user_id(id: &str) -> Result<(), UserError> {
    if id.trim().is_empty() {
        return Err(UserError::validation("User id cannot be empty"));
    }

    if id.len() > MAX_USER_ID_LENGTH {
        return Err(UserError::validation(format!(
            "User id too long (max {MAX_USER_ID_LENGTH} characters)"
        )));
    }

    if id.chars().any(char::is_whitespace) {
        return Err(UserError::validation("User id cannot contain whitespace"));
    }

    Ok(())
}

/// Validate display name
pub fn validate_display_name(display_name: &str) -> Result<(), UserError> {
    if display_name.trim().is_empty() {
        return Err(UserError::validation("Display name cannot be empty"));
    }

    if display_name.chars().count() > MAX_DISPLAY_NAME_LENGTH {
        return Err(UserError::validation(format!(
            "Display name too long (max {MAX_DISPLAY_NAME_LENGTH} characters)"
        )));
    }

    Ok(())
}

/// Validate avatar reference
pub fn validate_avatar_url(avatar_url: &str) -> Result<(), UserError> {
    if avatar_url.trim().is_empty() {
        return Err(UserError::validation("Avatar reference cannot be blank"));
    }

    if avatar_url.len() > MAX_AVATAR_URL_LENGTH {
        return Err(UserError::validation("Avatar reference too long"));
    }

    Ok(())
}

/// Validate email format
pub fn validate_email(email: &str) -> Result<(), UserError> {
    if !email.contains('@') || !email.contains('.') || email.len() > 255 {
        return Err(UserError::validation("Invalid email format"));
    }

    Ok(())
}

/// Validate a full user profile before registration
pub fn validate_user(user: &User) -> Result<(), UserError> {
    validate_user_id(&user.id)?;
    validate_display_name(&user.display_name)?;
    if let Some(ref avatar_url) = user.avatar_url {
        validate_avatar_url(avatar_url)?;
    }
    if let Some(ref email) = user.email {
        validate_email(email)?;
    }
    Ok(())
}

/// Validate a profile patch
pub fn validate_update(request: &UpdateUserRequest) -> Result<(), UserError> {
    if let Some(ref display_name) = request.display_name {
        validate_display_name(display_name)?;
    }
    if let Some(ref avatar_url) = request.avatar_url {
        validate_avatar_url(avatar_url)?;
    }
    if let Some(ref email) = request.email {
        validate_email(email)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_user_id() {
        assert!(validate_user_id("alice").is_ok());
        assert!(validate_user_id("").is_err());
        assert!(validate_user_id("   ").is_err());
        assert!(validate_user_id("has space").is_err());
        assert!(validate_user_id(&"a".repeat(129)).is_err());
    }

    #[test]
    fn test_validate_display_name() {
        assert!(validate_display_name("Alice Liddell").is_ok());
        assert!(validate_display_name("").is_err());
        assert!(validate_display_name(&"x".repeat(101)).is_err());
    }

    #[test]
    fn test_validate_update() {
        let ok = UpdateUserRequest {
            email: Some("alice@example.com".to_string()),
            ..Default::default()
        };
        assert!(validate_update(&ok).is_ok());

        let bad = UpdateUserRequest {
            email: Some("not-an-email".to_string()),
            ..Default::default()
        };
        assert!(validate_update(&bad).is_err());
    }
}
