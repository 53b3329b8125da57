use axum::Json;
use axum::extract::{Extension, Path, State};
use feedline_api_types::{CurrentUser, FollowerInfo, UpdateProfileRequest, UserProfile};
use uuid::Uuid;

use crate::application::session::SessionUser;
use crate::infra::http::api::error::ApiError;
use crate::infra::http::api::state::ApiState;

pub async fn current_session(Extension(viewer): Extension<SessionUser>) -> Json<CurrentUser> {
    Json(CurrentUser::from(viewer))
}

pub async fn update_profile(
    State(state): State<ApiState>,
    Extension(viewer): Extension<SessionUser>,
    Json(request): Json<UpdateProfileRequest>,
) -> Result<Json<UserProfile>, ApiError> {
    Ok(Json(state.social.update_profile(&viewer, request).await?))
}

pub async fn follower_info(
    State(state): State<ApiState>,
    Extension(viewer): Extension<SessionUser>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<FollowerInfo>, ApiError> {
    Ok(Json(state.social.follower_info(&viewer, user_id).await?))
}

pub async fn follow_user(
    State(state): State<ApiState>,
    Extension(viewer): Extension<SessionUser>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<FollowerInfo>, ApiError> {
    Ok(Json(state.social.set_follow(&viewer, user_id, true).await?))
}

pub async fn unfollow_user(
    State(state): State<ApiState>,
    Extension(viewer): Extension<SessionUser>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<FollowerInfo>, ApiError> {
    Ok(Json(state.social.set_follow(&viewer, user_id, false).await?))
}
