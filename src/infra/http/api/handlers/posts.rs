use axum::Json;
use axum::extract::{Extension, Path, State};
use axum::http::StatusCode;
use feedline_api_types::{BookmarkInfo, CreatePostRequest, LikeInfo, Post};
use uuid::Uuid;

use crate::application::session::SessionUser;
use crate::infra::http::api::error::ApiError;
use crate::infra::http::api::state::ApiState;

pub async fn create_post(
    State(state): State<ApiState>,
    Extension(viewer): Extension<SessionUser>,
    Json(request): Json<CreatePostRequest>,
) -> Result<(StatusCode, Json<Post>), ApiError> {
    let post = state.social.create_post(&viewer, request).await?;
    Ok((StatusCode::CREATED, Json(post)))
}

pub async fn delete_post(
    State(state): State<ApiState>,
    Extension(viewer): Extension<SessionUser>,
    Path(post_id): Path<Uuid>,
) -> Result<Json<Post>, ApiError> {
    Ok(Json(state.social.delete_post(&viewer, post_id).await?))
}

pub async fn like_info(
    State(state): State<ApiState>,
    Extension(viewer): Extension<SessionUser>,
    Path(post_id): Path<Uuid>,
) -> Result<Json<LikeInfo>, ApiError> {
    Ok(Json(state.social.like_info(&viewer, post_id).await?))
}

pub async fn like_post(
    State(state): State<ApiState>,
    Extension(viewer): Extension<SessionUser>,
    Path(post_id): Path<Uuid>,
) -> Result<Json<LikeInfo>, ApiError> {
    Ok(Json(state.social.set_like(&viewer, post_id, true).await?))
}

pub async fn unlike_post(
    State(state): State<ApiState>,
    Extension(viewer): Extension<SessionUser>,
    Path(post_id): Path<Uuid>,
) -> Result<Json<LikeInfo>, ApiError> {
    Ok(Json(state.social.set_like(&viewer, post_id, false).await?))
}

pub async fn bookmark_info(
    State(state): State<ApiState>,
    Extension(viewer): Extension<SessionUser>,
    Path(post_id): Path<Uuid>,
) -> Result<Json<BookmarkInfo>, ApiError> {
    Ok(Json(state.social.bookmark_info(&viewer, post_id).await?))
}

pub async fn save_bookmark(
    State(state): State<ApiState>,
    Extension(viewer): Extension<SessionUser>,
    Path(post_id): Path<Uuid>,
) -> Result<Json<BookmarkInfo>, ApiError> {
    Ok(Json(state.social.set_bookmark(&viewer, post_id, true).await?))
}

pub async fn remove_bookmark(
    State(state): State<ApiState>,
    Extension(viewer): Extension<SessionUser>,
    Path(post_id): Path<Uuid>,
) -> Result<Json<BookmarkInfo>, ApiError> {
    Ok(Json(
        state.social.set_bookmark(&viewer, post_id, false).await?,
    ))
}
