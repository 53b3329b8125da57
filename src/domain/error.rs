//! Rule violations raised by the pure domain layer. They all surface as
//! invalid input at the edges.

use thiserror::Error;

use super::types::FeedKind;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    #[error("{field} is required")]
    Blank { field: &'static str },
    #[error("{field} exceeds {limit} characters")]
    TooLong { field: &'static str, limit: usize },
    #[error("a post may carry at most {limit} attachments, got {count}")]
    TooManyAttachments { count: usize, limit: usize },
    #[error("feed `{}` requires a user scope", .kind.as_str())]
    MissingScope { kind: FeedKind },
    #[error("feed `{}` does not take a scope", .kind.as_str())]
    UnexpectedScope { kind: FeedKind },
    #[error("malformed feed identity: {message}")]
    MalformedIdentity { message: String },
}

impl DomainError {
    pub fn malformed_identity(message: impl Into<String>) -> Self {
        Self::MalformedIdentity {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_offending_field() {
        assert_eq!(
            DomainError::TooLong {
                field: "bio",
                limit: 1000
            }
            .to_string(),
            "bio exceeds 1000 characters"
        );
        assert_eq!(
            DomainError::MissingScope {
                kind: FeedKind::LikedBy
            }
            .to_string(),
            "feed `liked-by` requires a user scope"
        );
    }
}
