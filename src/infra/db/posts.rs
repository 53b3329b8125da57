use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::repos::{CreatePostParams, PostsWriteRepo, RepoError};
use crate::domain::entities::PostRecord;

use super::PostgresRepositories;
use super::map_sqlx_error;
use super::types::PostRow;

#[async_trait]
impl PostsWriteRepo for PostgresRepositories {
    async fn create_post(&self, params: CreatePostParams) -> Result<PostRecord, RepoError> {
        let mut tx = self.pool().begin().await.map_err(map_sqlx_error)?;

        let row = sqlx::query_as::<_, PostRow>(
            "INSERT INTO posts (id, author_id, content, created_at) VALUES ($1, $2, $3, $4) \
             RETURNING id, author_id, content, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(params.author_id)
        .bind(&params.content)
        .bind(OffsetDateTime::now_utc())
        .fetch_one(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        if !params.media_ids.is_empty() {
            let attached = sqlx::query(
                "UPDATE media SET post_id = $1 \
                 WHERE id = ANY($2) AND owner_id = $3 AND post_id IS NULL",
            )
            .bind(row.id)
            .bind(&params.media_ids)
            .bind(params.author_id)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?
            .rows_affected();

            if attached != params.media_ids.len() as u64 {
                tx.rollback().await.map_err(map_sqlx_error)?;
                return Err(RepoError::invalid_input("media is not available"));
            }
        }

        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(PostRecord::from(row))
    }

    async fn find_post_record(&self, id: Uuid) -> Result<Option<PostRecord>, RepoError> {
        let row = sqlx::query_as::<_, PostRow>(
            "SELECT id, author_id, content, created_at FROM posts WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        Ok(row.map(PostRecord::from))
    }

    async fn delete_post(&self, id: Uuid) -> Result<(), RepoError> {
        let deleted = sqlx::query("DELETE FROM posts WHERE id = $1")
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?
            .rows_affected();
        if deleted == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }
}
