//! Domain entities mirrored from persistent storage.

use feedline_api_types::MediaKind;
use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserRecord {
    pub id: Uuid,
    pub username: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub bio: Option<String>,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PostRecord {
    pub id: Uuid,
    pub author_id: Uuid,
    pub content: String,
    pub created_at: OffsetDateTime,
}

/// Uploaded media. Unattached media has no `post_id` yet.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MediaRecord {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub post_id: Option<Uuid>,
    pub kind: MediaKind,
    pub url: String,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionRecord {
    pub token_hash: String,
    pub user_id: Uuid,
    pub username: String,
    pub expires_at: OffsetDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationKind {
    Follow,
}

impl NotificationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            NotificationKind::Follow => "FOLLOW",
        }
    }
}

/// Something `issuer_id` did that `recipient_id` should hear about.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotificationRecord {
    pub id: Uuid,
    pub recipient_id: Uuid,
    pub issuer_id: Uuid,
    pub kind: NotificationKind,
    pub read: bool,
    pub created_at: OffsetDateTime,
}
