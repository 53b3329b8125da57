//! In-process backend: the client core talking straight to the application services.

use async_trait::async_trait;
use feedline_api_types::{
    BookmarkInfo, CreatePostRequest, CurrentUser, FollowerInfo, LikeInfo, Post, PostsPage,
    UpdateProfileRequest, UserProfile,
};
use uuid::Uuid;

use crate::application::error::FeedError;
use crate::application::feed::FeedService;
use crate::application::session::SessionUser;
use crate::application::social::SocialService;
use crate::client::backend::{FeedSource, FeedWriter};
use crate::domain::types::FeedIdentity;

#[derive(Clone)]
pub struct LocalBackend {
    feed: FeedService,
    social: SocialService,
    viewer: Option<SessionUser>,
}

impl LocalBackend {
    pub fn new(feed: FeedService, social: SocialService, viewer: Option<SessionUser>) -> Self {
        Self {
            feed,
            social,
            viewer,
        }
    }

    fn viewer(&self) -> Result<&SessionUser, FeedError> {
        self.viewer.as_ref().ok_or(FeedError::Unauthorized)
    }
}

#[async_trait]
impl FeedSource for LocalBackend {
    async fn current_user(&self) -> Result<CurrentUser, FeedError> {
        self.viewer().cloned().map(CurrentUser::from)
    }

    async fn fetch_feed(
        &self,
        identity: FeedIdentity,
        cursor: Option<&str>,
        page_size: u32,
    ) -> Result<PostsPage, FeedError> {
        self.feed
            .resolve(self.viewer.as_ref(), identity, cursor, Some(page_size))
            .await
    }
}

#[async_trait]
impl FeedWriter for LocalBackend {
    async fn create_post(&self, request: CreatePostRequest) -> Result<Post, FeedError> {
        self.social.create_post(self.viewer()?, request).await
    }

    async fn delete_post(&self, post_id: Uuid) -> Result<Post, FeedError> {
        self.social.delete_post(self.viewer()?, post_id).await
    }

    async fn set_like(&self, post_id: Uuid, liked: bool) -> Result<LikeInfo, FeedError> {
        self.social.set_like(self.viewer()?, post_id, liked).await
    }

    async fn set_bookmark(
        &self,
        post_id: Uuid,
        bookmarked: bool,
    ) -> Result<BookmarkInfo, FeedError> {
        self.social
            .set_bookmark(self.viewer()?, post_id, bookmarked)
            .await
    }

    async fn set_follow(&self, user_id: Uuid, following: bool) -> Result<FollowerInfo, FeedError> {
        self.social
            .set_follow(self.viewer()?, user_id, following)
            .await
    }

    async fn update_profile(
        &self,
        request: UpdateProfileRequest,
    ) -> Result<UserProfile, FeedError> {
        self.social.update_profile(self.viewer()?, request).await
    }
}
