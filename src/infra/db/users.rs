use async_trait::async_trait;
use uuid::Uuid;

use crate::application::repos::{
    MediaRepo, RepoError, SessionsRepo, UpdateProfileParams, UsersRepo,
};
use crate::domain::entities::{MediaRecord, SessionRecord, UserRecord};

use super::PostgresRepositories;
use super::map_sqlx_error;
use super::types::{MediaRow, SessionRow, UserRow};

#[async_trait]
impl UsersRepo for PostgresRepositories {
    async fn find_user(&self, id: Uuid) -> Result<Option<UserRecord>, RepoError> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, username, display_name, avatar_url, bio, created_at \
             FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        Ok(row.map(UserRecord::from))
    }

    async fn update_profile(&self, params: UpdateProfileParams) -> Result<UserRecord, RepoError> {
        let row = sqlx::query_as::<_, UserRow>(
            "UPDATE users SET display_name = $2, bio = $3, \
             avatar_url = COALESCE($4, avatar_url) WHERE id = $1 \
             RETURNING id, username, display_name, avatar_url, bio, created_at",
        )
        .bind(params.user_id)
        .bind(&params.display_name)
        .bind(params.bio.as_deref())
        .bind(params.avatar_url.as_deref())
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?
        .ok_or(RepoError::NotFound)?;
        Ok(UserRecord::from(row))
    }
}

#[async_trait]
impl MediaRepo for PostgresRepositories {
    async fn find_media(&self, ids: &[Uuid]) -> Result<Vec<MediaRecord>, RepoError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query_as::<_, MediaRow>(
            "SELECT id, owner_id, post_id, kind, url, created_at FROM media WHERE id = ANY($1)",
        )
        .bind(ids)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        rows.into_iter().map(MediaRecord::try_from).collect()
    }
}

#[async_trait]
impl SessionsRepo for PostgresRepositories {
    async fn find_session(&self, token_hash: &str) -> Result<Option<SessionRecord>, RepoError> {
        let row = sqlx::query_as::<_, SessionRow>(
            "SELECT s.token_hash, s.user_id, u.username, s.expires_at \
             FROM sessions s INNER JOIN users u ON u.id = s.user_id \
             WHERE s.token_hash = $1",
        )
        .bind(token_hash)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        Ok(row.map(SessionRecord::from))
    }
}
