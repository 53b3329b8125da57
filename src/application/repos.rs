//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use feedline_api_types::{BookmarkInfo, FollowerInfo, LikeInfo, Post};
use thiserror::Error;
use uuid::Uuid;

use crate::application::pagination::{CursorPage, FeedCursor, PageRequest, PaginationError};
use crate::domain::entities::{
    MediaRecord, NotificationRecord, PostRecord, SessionRecord, UserRecord,
};
use crate::domain::types::{FeedIdentity, FeedKind};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("database timeout")]
    Timeout,
    #[error(transparent)]
    Pagination(#[from] PaginationError),
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }
}

/// Eligibility predicate applied before the shared keyset ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedFilter {
    All,
    LikedBy(Uuid),
    AuthoredBy(Uuid),
}

impl From<FeedIdentity> for FeedFilter {
    fn from(identity: FeedIdentity) -> Self {
        match (identity.kind(), identity.scope()) {
            (FeedKind::LikedBy, Some(user)) => FeedFilter::LikedBy(user),
            (FeedKind::AuthoredBy, Some(user)) => FeedFilter::AuthoredBy(user),
            _ => FeedFilter::All,
        }
    }
}

impl FeedFilter {
    /// The feed identity whose cursors this filter accepts.
    pub fn identity(self) -> FeedIdentity {
        match self {
            FeedFilter::All => FeedIdentity::global(),
            FeedFilter::LikedBy(user) => FeedIdentity::liked_by(user),
            FeedFilter::AuthoredBy(user) => FeedIdentity::authored_by(user),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CreatePostParams {
    pub author_id: Uuid,
    pub content: String,
    pub media_ids: Vec<Uuid>,
}

#[derive(Debug, Clone)]
pub struct UpdateProfileParams {
    pub user_id: Uuid,
    pub display_name: String,
    pub bio: Option<String>,
    /// `None` keeps the current avatar.
    pub avatar_url: Option<String>,
}

/// Read side of the feeds, hydrated for one viewer.
#[async_trait]
pub trait FeedRepo: Send + Sync {
    async fn list_feed(
        &self,
        viewer: Uuid,
        filter: FeedFilter,
        page: PageRequest<FeedCursor>,
    ) -> Result<CursorPage<Post>, RepoError>;

    async fn find_post(&self, viewer: Uuid, id: Uuid) -> Result<Option<Post>, RepoError>;
}

#[async_trait]
pub trait PostsWriteRepo: Send + Sync {
    async fn create_post(&self, params: CreatePostParams) -> Result<PostRecord, RepoError>;

    async fn find_post_record(&self, id: Uuid) -> Result<Option<PostRecord>, RepoError>;

    async fn delete_post(&self, id: Uuid) -> Result<(), RepoError>;
}

/// Likes, bookmarks and follows. Writes are idempotent.
#[async_trait]
pub trait ReactionsRepo: Send + Sync {
    async fn set_like(&self, user_id: Uuid, post_id: Uuid, liked: bool) -> Result<(), RepoError>;

    async fn set_bookmark(
        &self,
        user_id: Uuid,
        post_id: Uuid,
        bookmarked: bool,
    ) -> Result<(), RepoError>;

    /// Adding a new edge also issues a FOLLOW notification to `followed_id`;
    /// removing it deletes that notification. Edge and notification change
    /// together or not at all.
    async fn set_follow(
        &self,
        follower_id: Uuid,
        followed_id: Uuid,
        following: bool,
    ) -> Result<(), RepoError>;

    async fn like_info(&self, viewer: Uuid, post_id: Uuid) -> Result<LikeInfo, RepoError>;

    async fn bookmark_info(&self, viewer: Uuid, post_id: Uuid) -> Result<BookmarkInfo, RepoError>;

    async fn follower_info(&self, viewer: Uuid, user_id: Uuid) -> Result<FollowerInfo, RepoError>;
}

/// Read side of notifications. They are written alongside the edges that cause them.
#[async_trait]
pub trait NotificationsRepo: Send + Sync {
    /// Newest first.
    async fn list_notifications(
        &self,
        recipient_id: Uuid,
    ) -> Result<Vec<NotificationRecord>, RepoError>;

    async fn unread_count(&self, recipient_id: Uuid) -> Result<u64, RepoError>;

    /// Returns how many notifications changed.
    async fn mark_all_read(&self, recipient_id: Uuid) -> Result<u64, RepoError>;
}

#[async_trait]
pub trait UsersRepo: Send + Sync {
    async fn find_user(&self, id: Uuid) -> Result<Option<UserRecord>, RepoError>;

    async fn update_profile(&self, params: UpdateProfileParams) -> Result<UserRecord, RepoError>;
}

#[async_trait]
pub trait MediaRepo: Send + Sync {
    async fn find_media(&self, ids: &[Uuid]) -> Result<Vec<MediaRecord>, RepoError>;
}

#[async_trait]
pub trait SessionsRepo: Send + Sync {
    async fn find_session(&self, token_hash: &str) -> Result<Option<SessionRecord>, RepoError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identities_map_to_filters() {
        let user = Uuid::new_v4();
        assert_eq!(FeedFilter::from(FeedIdentity::global()), FeedFilter::All);
        assert_eq!(
            FeedFilter::from(FeedIdentity::liked_by(user)),
            FeedFilter::LikedBy(user)
        );
        assert_eq!(
            FeedFilter::from(FeedIdentity::authored_by(user)),
            FeedFilter::AuthoredBy(user)
        );
        assert_eq!(
            FeedFilter::LikedBy(user).identity(),
            FeedIdentity::liked_by(user)
        );
    }
}
