//! Profile field rules.

use super::error::DomainError;

pub const MAX_DISPLAY_NAME_CHARS: usize = 50;
pub const MAX_BIO_CHARS: usize = 1000;

pub fn normalize_display_name(raw: &str) -> Result<String, DomainError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(DomainError::Blank {
            field: "display name",
        });
    }
    if trimmed.chars().count() > MAX_DISPLAY_NAME_CHARS {
        return Err(DomainError::TooLong {
            field: "display name",
            limit: MAX_DISPLAY_NAME_CHARS,
        });
    }
    Ok(trimmed.to_string())
}

/// Empty bios are stored as `None`.
pub fn normalize_bio(raw: Option<&str>) -> Result<Option<String>, DomainError> {
    let Some(bio) = raw.map(str::trim).filter(|bio| !bio.is_empty()) else {
        return Ok(None);
    };
    if bio.chars().count() > MAX_BIO_CHARS {
        return Err(DomainError::TooLong {
            field: "bio",
            limit: MAX_BIO_CHARS,
        });
    }
    Ok(Some(bio.to_string()))
}
