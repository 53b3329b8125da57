//! The viewer's notification inbox. FOLLOW notifications are issued by the
//! follow edge itself; this service only reads and acknowledges them.

use std::sync::Arc;

use feedline_api_types::{NotificationsMarked, UnreadNotifications};
use tracing::info;

use crate::application::error::FeedError;
use crate::application::repos::NotificationsRepo;
use crate::application::session::SessionUser;

#[derive(Clone)]
pub struct NotificationService {
    repo: Arc<dyn NotificationsRepo>,
}

impl NotificationService {
    pub fn new(repo: Arc<dyn NotificationsRepo>) -> Self {
        Self { repo }
    }

    pub async fn unread_count(&self, viewer: &SessionUser) -> Result<UnreadNotifications, FeedError> {
        Ok(UnreadNotifications {
            unread_count: self.repo.unread_count(viewer.id).await?,
        })
    }

    /// Mark every unread notification of `viewer` as read. Repeating it is a no-op.
    pub async fn mark_all_read(&self, viewer: &SessionUser) -> Result<NotificationsMarked, FeedError> {
        let updated = self.repo.mark_all_read(viewer.id).await?;
        if updated > 0 {
            info!(user_id = %viewer.id, updated, "notifications marked as read");
        }
        Ok(NotificationsMarked { updated })
    }
}
