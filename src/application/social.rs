//! Social writes backing the reconciler: posts, likes, bookmarks, follows and profiles.
//!
//! Following a user also notifies them; the repository writes both atomically.

use std::collections::HashSet;
use std::sync::Arc;

use feedline_api_types::{
    BookmarkInfo, CreatePostRequest, FollowerInfo, LikeInfo, MediaKind, Post,
    UpdateProfileRequest, UserProfile,
};
use tracing::info;
use uuid::Uuid;

use crate::application::error::FeedError;
use crate::application::repos::{
    CreatePostParams, FeedRepo, MediaRepo, PostsWriteRepo, ReactionsRepo, UpdateProfileParams,
    UsersRepo,
};
use crate::application::session::SessionUser;
use crate::domain::{posts, users};

#[derive(Clone)]
pub struct SocialService {
    feed: Arc<dyn FeedRepo>,
    posts: Arc<dyn PostsWriteRepo>,
    reactions: Arc<dyn ReactionsRepo>,
    users: Arc<dyn UsersRepo>,
    media: Arc<dyn MediaRepo>,
}

impl SocialService {
    pub fn new(
        feed: Arc<dyn FeedRepo>,
        posts: Arc<dyn PostsWriteRepo>,
        reactions: Arc<dyn ReactionsRepo>,
        users: Arc<dyn UsersRepo>,
        media: Arc<dyn MediaRepo>,
    ) -> Self {
        Self {
            feed,
            posts,
            reactions,
            users,
            media,
        }
    }

    pub async fn create_post(
        &self,
        viewer: &SessionUser,
        request: CreatePostRequest,
    ) -> Result<Post, FeedError> {
        let content = posts::normalize_content(&request.content)?;
        posts::check_attachment_count(request.media_ids.len())?;

        let unique: HashSet<Uuid> = request.media_ids.iter().copied().collect();
        if unique.len() != request.media_ids.len() {
            return Err(FeedError::validation("media ids must be unique"));
        }
        if !request.media_ids.is_empty() {
            let media = self.media.find_media(&request.media_ids).await?;
            let usable = media
                .iter()
                .filter(|item| item.owner_id == viewer.id && item.post_id.is_none())
                .count();
            if usable != request.media_ids.len() {
                return Err(FeedError::validation(
                    "media must be uploaded by the author and not attached yet",
                ));
            }
        }

        let record = self
            .posts
            .create_post(CreatePostParams {
                author_id: viewer.id,
                content,
                media_ids: request.media_ids,
            })
            .await?;
        info!(post_id = %record.id, author = %viewer.id, "post created");

        self.feed
            .find_post(viewer.id, record.id)
            .await?
            .ok_or_else(|| FeedError::server("created post could not be read back"))
    }

    /// Delete a post owned by `viewer`, returning its last state.
    pub async fn delete_post(&self, viewer: &SessionUser, post_id: Uuid) -> Result<Post, FeedError> {
        let record = self
            .posts
            .find_post_record(post_id)
            .await?
            .ok_or(FeedError::NotFound)?;
        if record.author_id != viewer.id {
            return Err(FeedError::Forbidden);
        }
        let post = self
            .feed
            .find_post(viewer.id, post_id)
            .await?
            .ok_or(FeedError::NotFound)?;
        self.posts.delete_post(post_id).await?;
        info!(post_id = %post_id, author = %viewer.id, "post deleted");
        Ok(post)
    }

    pub async fn set_like(
        &self,
        viewer: &SessionUser,
        post_id: Uuid,
        liked: bool,
    ) -> Result<LikeInfo, FeedError> {
        self.ensure_post(post_id).await?;
        self.reactions.set_like(viewer.id, post_id, liked).await?;
        Ok(self.reactions.like_info(viewer.id, post_id).await?)
    }

    pub async fn like_info(&self, viewer: &SessionUser, post_id: Uuid) -> Result<LikeInfo, FeedError> {
        self.ensure_post(post_id).await?;
        Ok(self.reactions.like_info(viewer.id, post_id).await?)
    }

    pub async fn set_bookmark(
        &self,
        viewer: &SessionUser,
        post_id: Uuid,
        bookmarked: bool,
    ) -> Result<BookmarkInfo, FeedError> {
        self.ensure_post(post_id).await?;
        self.reactions
            .set_bookmark(viewer.id, post_id, bookmarked)
            .await?;
        Ok(self.reactions.bookmark_info(viewer.id, post_id).await?)
    }

    pub async fn bookmark_info(
        &self,
        viewer: &SessionUser,
        post_id: Uuid,
    ) -> Result<BookmarkInfo, FeedError> {
        self.ensure_post(post_id).await?;
        Ok(self.reactions.bookmark_info(viewer.id, post_id).await?)
    }

    pub async fn set_follow(
        &self,
        viewer: &SessionUser,
        user_id: Uuid,
        following: bool,
    ) -> Result<FollowerInfo, FeedError> {
        if user_id == viewer.id {
            return Err(FeedError::validation("users cannot follow themselves"));
        }
        self.ensure_user(user_id).await?;
        self.reactions
            .set_follow(viewer.id, user_id, following)
            .await?;
        Ok(self.reactions.follower_info(viewer.id, user_id).await?)
    }

    pub async fn follower_info(
        &self,
        viewer: &SessionUser,
        user_id: Uuid,
    ) -> Result<FollowerInfo, FeedError> {
        self.ensure_user(user_id).await?;
        Ok(self.reactions.follower_info(viewer.id, user_id).await?)
    }

    pub async fn update_profile(
        &self,
        viewer: &SessionUser,
        request: UpdateProfileRequest,
    ) -> Result<UserProfile, FeedError> {
        let display_name = users::normalize_display_name(&request.display_name)?;
        let bio = users::normalize_bio(request.bio.as_deref())?;

        let avatar_url = match request.avatar_media_id {
            Some(media_id) => {
                let media = self.media.find_media(&[media_id]).await?;
                let avatar = media
                    .into_iter()
                    .find(|item| item.id == media_id && item.owner_id == viewer.id)
                    .ok_or_else(|| FeedError::validation("avatar media is not available"))?;
                if avatar.kind != MediaKind::Image {
                    return Err(FeedError::validation("avatar must be an image"));
                }
                Some(avatar.url)
            }
            None => None,
        };

        let user = self
            .users
            .update_profile(UpdateProfileParams {
                user_id: viewer.id,
                display_name,
                bio,
                avatar_url,
            })
            .await?;
        info!(user_id = %viewer.id, "profile updated");

        Ok(UserProfile {
            id: user.id,
            username: user.username,
            display_name: user.display_name,
            avatar_url: user.avatar_url,
            bio: user.bio,
        })
    }

    async fn ensure_post(&self, post_id: Uuid) -> Result<(), FeedError> {
        self.posts
            .find_post_record(post_id)
            .await?
            .map(|_| ())
            .ok_or(FeedError::NotFound)
    }

    async fn ensure_user(&self, user_id: Uuid) -> Result<(), FeedError> {
        self.users
            .find_user(user_id)
            .await?
            .map(|_| ())
            .ok_or(FeedError::NotFound)
    }
}
