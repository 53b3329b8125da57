//! Post content rules.

use super::error::DomainError;

pub const MAX_CONTENT_CHARS: usize = 2000;
pub const MAX_ATTACHMENTS: usize = 5;

/// Trim and validate post content, returning the normalized text.
pub fn normalize_content(raw: &str) -> Result<String, DomainError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(DomainError::Blank {
            field: "post content",
        });
    }
    if trimmed.chars().count() > MAX_CONTENT_CHARS {
        return Err(DomainError::TooLong {
            field: "post content",
            limit: MAX_CONTENT_CHARS,
        });
    }
    Ok(trimmed.to_string())
}

pub fn check_attachment_count(count: usize) -> Result<(), DomainError> {
    if count > MAX_ATTACHMENTS {
        return Err(DomainError::TooManyAttachments {
            count,
            limit: MAX_ATTACHMENTS,
        });
    }
    Ok(())
}
