use axum::Json;
use axum::extract::{Extension, Path, Query, State};
use feedline_api_types::PostsPage;
use serde::Deserialize;
use uuid::Uuid;

use crate::application::session::SessionUser;
use crate::domain::types::FeedIdentity;
use crate::infra::http::api::error::ApiError;
use crate::infra::http::api::state::ApiState;

#[derive(Debug, Default, Deserialize)]
pub struct FeedQuery {
    pub cursor: Option<String>,
    pub limit: Option<u32>,
}

async fn resolve(
    state: &ApiState,
    viewer: &SessionUser,
    identity: FeedIdentity,
    query: FeedQuery,
) -> Result<Json<PostsPage>, ApiError> {
    let page = state
        .feed
        .resolve(Some(viewer), identity, query.cursor.as_deref(), query.limit)
        .await?;
    Ok(Json(page))
}

pub async fn for_you_feed(
    State(state): State<ApiState>,
    Extension(viewer): Extension<SessionUser>,
    Query(query): Query<FeedQuery>,
) -> Result<Json<PostsPage>, ApiError> {
    resolve(&state, &viewer, FeedIdentity::global(), query).await
}

/// Posts liked by the session user.
pub async fn liked_feed(
    State(state): State<ApiState>,
    Extension(viewer): Extension<SessionUser>,
    Query(query): Query<FeedQuery>,
) -> Result<Json<PostsPage>, ApiError> {
    let identity = FeedIdentity::liked_by(viewer.id);
    resolve(&state, &viewer, identity, query).await
}

pub async fn user_liked_feed(
    State(state): State<ApiState>,
    Extension(viewer): Extension<SessionUser>,
    Path(user_id): Path<Uuid>,
    Query(query): Query<FeedQuery>,
) -> Result<Json<PostsPage>, ApiError> {
    resolve(&state, &viewer, FeedIdentity::liked_by(user_id), query).await
}

pub async fn authored_feed(
    State(state): State<ApiState>,
    Extension(viewer): Extension<SessionUser>,
    Path(user_id): Path<Uuid>,
    Query(query): Query<FeedQuery>,
) -> Result<Json<PostsPage>, ApiError> {
    resolve(&state, &viewer, FeedIdentity::authored_by(user_id), query).await
}
