use feedline_api_types::{Attachment, Author, Post};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::repos::RepoError;
use crate::domain::entities::{
    MediaRecord, NotificationRecord, PostRecord, SessionRecord, UserRecord,
};

use super::util::{convert_count, parse_media_kind, parse_notification_kind};

#[derive(sqlx::FromRow)]
pub(crate) struct HydratedPostRow {
    pub(crate) id: Uuid,
    pub(crate) content: String,
    pub(crate) created_at: OffsetDateTime,
    pub(crate) author_id: Uuid,
    pub(crate) username: String,
    pub(crate) display_name: String,
    pub(crate) avatar_url: Option<String>,
    pub(crate) followers: i64,
    pub(crate) is_followed_by_user: bool,
    pub(crate) likes: i64,
    pub(crate) is_liked_by_user: bool,
    pub(crate) is_bookmarked_by_user: bool,
    pub(crate) comments: i64,
}

impl HydratedPostRow {
    pub(crate) fn into_post(self, attachments: Vec<Attachment>) -> Result<Post, RepoError> {
        Ok(Post {
            id: self.id,
            content: self.content,
            created_at: self.created_at,
            author: Author {
                id: self.author_id,
                username: self.username,
                display_name: self.display_name,
                avatar_url: self.avatar_url,
                followers: convert_count(self.followers)?,
                is_followed_by_user: self.is_followed_by_user,
            },
            attachments,
            likes: convert_count(self.likes)?,
            is_liked_by_user: self.is_liked_by_user,
            is_bookmarked_by_user: self.is_bookmarked_by_user,
            comments: convert_count(self.comments)?,
        })
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct PostRow {
    pub(crate) id: Uuid,
    pub(crate) author_id: Uuid,
    pub(crate) content: String,
    pub(crate) created_at: OffsetDateTime,
}

impl From<PostRow> for PostRecord {
    fn from(row: PostRow) -> Self {
        Self {
            id: row.id,
            author_id: row.author_id,
            content: row.content,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct MediaRow {
    pub(crate) id: Uuid,
    pub(crate) owner_id: Uuid,
    pub(crate) post_id: Option<Uuid>,
    pub(crate) kind: String,
    pub(crate) url: String,
    pub(crate) created_at: OffsetDateTime,
}

impl TryFrom<MediaRow> for MediaRecord {
    type Error = RepoError;

    fn try_from(row: MediaRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            owner_id: row.owner_id,
            post_id: row.post_id,
            kind: parse_media_kind(&row.kind)?,
            url: row.url,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct UserRow {
    pub(crate) id: Uuid,
    pub(crate) username: String,
    pub(crate) display_name: String,
    pub(crate) avatar_url: Option<String>,
    pub(crate) bio: Option<String>,
    pub(crate) created_at: OffsetDateTime,
}

impl From<UserRow> for UserRecord {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            username: row.username,
            display_name: row.display_name,
            avatar_url: row.avatar_url,
            bio: row.bio,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct SessionRow {
    pub(crate) token_hash: String,
    pub(crate) user_id: Uuid,
    pub(crate) username: String,
    pub(crate) expires_at: OffsetDateTime,
}

impl From<SessionRow> for SessionRecord {
    fn from(row: SessionRow) -> Self {
        Self {
            token_hash: row.token_hash,
            user_id: row.user_id,
            username: row.username,
            expires_at: row.expires_at,
        }
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct NotificationRow {
    pub(crate) id: Uuid,
    pub(crate) recipient_id: Uuid,
    pub(crate) issuer_id: Uuid,
    pub(crate) kind: String,
    pub(crate) read: bool,
    pub(crate) created_at: OffsetDateTime,
}

impl TryFrom<NotificationRow> for NotificationRecord {
    type Error = RepoError;

    fn try_from(row: NotificationRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            recipient_id: row.recipient_id,
            issuer_id: row.issuer_id,
            kind: parse_notification_kind(&row.kind)?,
            read: row.read,
            created_at: row.created_at,
        })
    }
}
