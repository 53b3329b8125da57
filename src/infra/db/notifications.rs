use async_trait::async_trait;
use uuid::Uuid;

use crate::application::repos::{NotificationsRepo, RepoError};
use crate::domain::entities::NotificationRecord;

use super::PostgresRepositories;
use super::map_sqlx_error;
use super::types::NotificationRow;
use super::util::convert_count;

#[async_trait]
impl NotificationsRepo for PostgresRepositories {
    async fn list_notifications(
        &self,
        recipient_id: Uuid,
    ) -> Result<Vec<NotificationRecord>, RepoError> {
        let rows = sqlx::query_as::<_, NotificationRow>(
            "SELECT id, recipient_id, issuer_id, kind, read, created_at FROM notifications \
             WHERE recipient_id = $1 ORDER BY created_at DESC, id DESC",
        )
        .bind(recipient_id)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter().map(NotificationRecord::try_from).collect()
    }

    async fn unread_count(&self, recipient_id: Uuid) -> Result<u64, RepoError> {
        let unread: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM notifications WHERE recipient_id = $1 AND NOT read",
        )
        .bind(recipient_id)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        convert_count(unread)
    }

    async fn mark_all_read(&self, recipient_id: Uuid) -> Result<u64, RepoError> {
        let result = sqlx::query(
            "UPDATE notifications SET read = TRUE WHERE recipient_id = $1 AND NOT read",
        )
        .bind(recipient_id)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        Ok(result.rows_affected())
    }
}
