use async_trait::async_trait;
use feedline_api_types::{BookmarkInfo, FollowerInfo, LikeInfo};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::repos::{ReactionsRepo, RepoError};
use crate::domain::entities::NotificationKind;

use super::PostgresRepositories;
use super::map_sqlx_error;
use super::util::convert_count;

impl PostgresRepositories {
    /// Insert or remove one `(a, b)` edge. Both directions are idempotent.
    async fn set_edge(
        &self,
        insert: &'static str,
        delete: &'static str,
        a: Uuid,
        b: Uuid,
        present: bool,
    ) -> Result<(), RepoError> {
        let statement = if present { insert } else { delete };
        sqlx::query(statement)
            .bind(a)
            .bind(b)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }
}

#[async_trait]
impl ReactionsRepo for PostgresRepositories {
    async fn set_like(&self, user_id: Uuid, post_id: Uuid, liked: bool) -> Result<(), RepoError> {
        self.set_edge(
            "INSERT INTO likes (user_id, post_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
            "DELETE FROM likes WHERE user_id = $1 AND post_id = $2",
            user_id,
            post_id,
            liked,
        )
        .await
    }

    async fn set_bookmark(
        &self,
        user_id: Uuid,
        post_id: Uuid,
        bookmarked: bool,
    ) -> Result<(), RepoError> {
        self.set_edge(
            "INSERT INTO bookmarks (user_id, post_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
            "DELETE FROM bookmarks WHERE user_id = $1 AND post_id = $2",
            user_id,
            post_id,
            bookmarked,
        )
        .await
    }

    async fn set_follow(
        &self,
        follower_id: Uuid,
        followed_id: Uuid,
        following: bool,
    ) -> Result<(), RepoError> {
        let mut tx = self.pool().begin().await.map_err(map_sqlx_error)?;

        if following {
            let inserted = sqlx::query(
                "INSERT INTO follows (follower_id, followed_id) VALUES ($1, $2) \
                 ON CONFLICT DO NOTHING",
            )
            .bind(follower_id)
            .bind(followed_id)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?
            .rows_affected();

            if inserted > 0 {
                sqlx::query(
                    "INSERT INTO notifications (id, recipient_id, issuer_id, kind, created_at) \
                     VALUES ($1, $2, $3, $4, $5)",
                )
                .bind(Uuid::new_v4())
                .bind(followed_id)
                .bind(follower_id)
                .bind(NotificationKind::Follow.as_str())
                .bind(OffsetDateTime::now_utc())
                .execute(&mut *tx)
                .await
                .map_err(map_sqlx_error)?;
            }
        } else {
            sqlx::query("DELETE FROM follows WHERE follower_id = $1 AND followed_id = $2")
                .bind(follower_id)
                .bind(followed_id)
                .execute(&mut *tx)
                .await
                .map_err(map_sqlx_error)?;
            sqlx::query(
                "DELETE FROM notifications \
                 WHERE issuer_id = $1 AND recipient_id = $2 AND kind = $3",
            )
            .bind(follower_id)
            .bind(followed_id)
            .bind(NotificationKind::Follow.as_str())
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
        }

        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn like_info(&self, viewer: Uuid, post_id: Uuid) -> Result<LikeInfo, RepoError> {
        let (likes, is_liked_by_user): (i64, bool) = sqlx::query_as(
            "SELECT COUNT(*), COALESCE(BOOL_OR(user_id = $1), FALSE) \
             FROM likes WHERE post_id = $2",
        )
        .bind(viewer)
        .bind(post_id)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(LikeInfo {
            likes: convert_count(likes)?,
            is_liked_by_user,
        })
    }

    async fn bookmark_info(&self, viewer: Uuid, post_id: Uuid) -> Result<BookmarkInfo, RepoError> {
        let is_bookmarked_by_user: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM bookmarks WHERE user_id = $1 AND post_id = $2)",
        )
        .bind(viewer)
        .bind(post_id)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(BookmarkInfo {
            is_bookmarked_by_user,
        })
    }

    async fn follower_info(&self, viewer: Uuid, user_id: Uuid) -> Result<FollowerInfo, RepoError> {
        let (followers, is_followed_by_user): (i64, bool) = sqlx::query_as(
            "SELECT COUNT(*), COALESCE(BOOL_OR(follower_id = $1), FALSE) \
             FROM follows WHERE followed_id = $2",
        )
        .bind(viewer)
        .bind(user_id)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(FollowerInfo {
            followers: convert_count(followers)?,
            is_followed_by_user,
        })
    }
}
