//! Collaborators the client core talks to: the feed query source and the backing writer.

use async_trait::async_trait;
use feedline_api_types::{
    BookmarkInfo, CreatePostRequest, CurrentUser, FollowerInfo, LikeInfo, Post, PostsPage,
    UpdateProfileRequest, UserProfile,
};
use uuid::Uuid;

use crate::application::error::FeedError;
use crate::domain::types::FeedIdentity;

#[async_trait]
pub trait FeedSource: Send + Sync {
    /// The session's user, or `Unauthorized`.
    async fn current_user(&self) -> Result<CurrentUser, FeedError>;

    async fn fetch_feed(
        &self,
        identity: FeedIdentity,
        cursor: Option<&str>,
        page_size: u32,
    ) -> Result<PostsPage, FeedError>;
}

/// Backing writes. Each fails with `Unauthorized` without a session and
/// `NotFound` when the target does not exist; deleting another user's post
/// is `Forbidden`.
#[async_trait]
pub trait FeedWriter: Send + Sync {
    async fn create_post(&self, request: CreatePostRequest) -> Result<Post, FeedError>;

    async fn delete_post(&self, post_id: Uuid) -> Result<Post, FeedError>;

    async fn set_like(&self, post_id: Uuid, liked: bool) -> Result<LikeInfo, FeedError>;

    async fn set_bookmark(&self, post_id: Uuid, bookmarked: bool)
    -> Result<BookmarkInfo, FeedError>;

    async fn set_follow(&self, user_id: Uuid, following: bool) -> Result<FollowerInfo, FeedError>;

    async fn update_profile(&self, request: UpdateProfileRequest)
    -> Result<UserProfile, FeedError>;
}
