use axum::Json;
use axum::extract::{Extension, State};
use feedline_api_types::{NotificationsMarked, UnreadNotifications};

use crate::application::session::SessionUser;
use crate::infra::http::api::error::ApiError;
use crate::infra::http::api::state::ApiState;

pub async fn unread_notifications(
    State(state): State<ApiState>,
    Extension(viewer): Extension<SessionUser>,
) -> Result<Json<UnreadNotifications>, ApiError> {
    Ok(Json(state.notifications.unread_count(&viewer).await?))
}

pub async fn mark_notifications_read(
    State(state): State<ApiState>,
    Extension(viewer): Extension<SessionUser>,
) -> Result<Json<NotificationsMarked>, ApiError> {
    Ok(Json(state.notifications.mark_all_read(&viewer).await?))
}
