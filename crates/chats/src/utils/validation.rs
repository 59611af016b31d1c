//! Validation utilities.

use crate::entities::{ContentType, MessageContent};
use crate::types::{ChatError, ChatResult};

/// Maximum length of a conversation title
pub const MAX_TITLE_LENGTH: usize = 255;

/// Validation utilities
pub struct Validator;

impl Validator {
    /// Validate a message payload against its declared content type
    pub fn message_content(
        content: &MessageContent,
        content_type: ContentType,
        max_length: usize,
    ) -> ChatResult<()> {
        match (content_type, content) {
            (ty, MessageContent::Text(text)) if ty.is_text() => {
                if text.trim().is_empty() {
                    return Err(ChatError::invalid_content("Message text cannot be empty"));
                }

                let length = text.chars().count();
                if length > max_length {
                    return Err(ChatError::invalid_content(format!(
                        "Message text too long ({} characters, max {})",
                        length, max_length
                    )));
                }

                Ok(())
            }
            (ContentType::Image, MessageContent::Image { url, .. }) => Self::url(url),
            (ContentType::File, MessageContent::File { name, url, .. }) => {
                if name.trim().is_empty() {
                    return Err(ChatError::invalid_content("File name cannot be empty"));
                }
                Self::url(url)
            }
            (ContentType::Other, MessageContent::Custom(value)) => {
                if value.is_null() {
                    return Err(ChatError::invalid_content("Custom content cannot be null"));
                }
                Ok(())
            }
            (ty, _) => Err(ChatError::invalid_content(format!(
                "Payload does not match content type {:?}",
                ty
            ))),
        }
    }

    /// Validate a conversation title
    pub fn title(title: &str) -> ChatResult<()> {
        if title.trim().is_empty() {
            return Err(ChatError::validation("Conversation title cannot be empty"));
        }

        if title.chars().count() > MAX_TITLE_LENGTH {
            return Err(ChatError::validation(format!(
                "Conversation title too long (max {} characters)",
                MAX_TITLE_LENGTH
            )));
        }

        Ok(())
    }

    fn url(url: &str) -> ChatResult<()> {
        if url.trim().is_empty() {
            return Err(ChatError::invalid_content("URL cannot be empty"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_content() {
        let ok = MessageContent::text("hi");
        assert!(Validator::message_content(&ok, ContentType::TextPlain, 10).is_ok());
        assert!(Validator::message_content(&ok, ContentType::TextMarkdown, 10).is_ok());

        let blank = MessageContent::text("   ");
        assert!(matches!(
            Validator::message_content(&blank, ContentType::TextPlain, 10),
            Err(ChatError::InvalidContent { .. })
        ));

        let long = MessageContent::text("x".repeat(11));
        assert!(Validator::message_content(&long, ContentType::TextPlain, 10).is_err());
    }

    #[test]
    fn test_length_counts_characters() {
        let accented = MessageContent::text("é".repeat(10));
        assert!(Validator::message_content(&accented, ContentType::TextPlain, 10).is_ok());
    }

    #[test]
    fn test_mismatched_payload() {
        let image = MessageContent::Image {
            url: "https://example.com/cat.png".to_string(),
            alt: None,
        };
        assert!(Validator::message_content(&image, ContentType::Image, 10).is_ok());
        assert!(Validator::message_content(&image, ContentType::TextPlain, 10).is_err());
        assert!(Validator::message_content(&MessageContent::text("hi"), ContentType::Image, 10).is_err());
    }

    #[test]
    fn test_file_and_custom_content() {
        let file = MessageContent::File {
            name: " ".to_string(),
            url: "https://example.com/a".to_string(),
            size: None,
        };
        assert!(Validator::message_content(&file, ContentType::File, 10).is_err());

        let custom = MessageContent::Custom(serde_json::json!({ "card": "poll" }));
        assert!(Validator::message_content(&custom, ContentType::Other, 10).is_ok());
        let null = MessageContent::Custom(serde_json::Value::Null);
        assert!(Validator::message_content(&null, ContentType::Other, 10).is_err());
    }

    #[test]
    fn test_title() {
        assert!(Validator::title("Standup").is_ok());
        assert!(Validator::title("").is_err());
        assert!(Validator::title(&"t".repeat(256)).is_err());
    }
}
