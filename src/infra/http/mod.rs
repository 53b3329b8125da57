pub mod api;
mod middleware;

pub use api::{ApiState, build_api_router};
pub use middleware::RequestContext;

use std::sync::Arc;

use axum::extract::{FromRef, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Router, middleware as axum_middleware, routing::get};
use sqlx::Error as SqlxError;

use crate::application::error::ErrorReport;
use crate::infra::db::PostgresRepositories;

use self::api::error::{ApiError, codes};
use self::middleware::{log_responses, set_request_context};

#[derive(Clone)]
pub struct RouterState {
    pub api: ApiState,
    /// `None` when the server runs on in-memory repositories.
    pub db: Option<Arc<PostgresRepositories>>,
}

impl FromRef<RouterState> for ApiState {
    fn from_ref(state: &RouterState) -> Self {
        state.api.clone()
    }
}

/// The complete HTTP surface: health probe plus the JSON API.
pub fn build_router(state: RouterState) -> Router {
    let probes = Router::new().route("/_health/db", get(db_health));

    probes
        .merge(build_api_router(state.clone()))
        .fallback(not_found)
        .with_state(state)
        .layer(axum_middleware::from_fn(log_responses))
        .layer(axum_middleware::from_fn(set_request_context))
}

fn db_health_response(result: Result<(), SqlxError>) -> Response {
    match result {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => {
            let mut response = StatusCode::SERVICE_UNAVAILABLE.into_response();
            ErrorReport::from_error(
                "infra::http::db_health",
                StatusCode::SERVICE_UNAVAILABLE,
                &err,
            )
            .attach(&mut response);
            response
        }
    }
}

async fn db_health(State(state): State<RouterState>) -> Response {
    match state.db.as_ref() {
        Some(db) => db_health_response(db.health_check().await),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

async fn not_found() -> ApiError {
    ApiError::new(StatusCode::NOT_FOUND, codes::NOT_FOUND, "No such route")
}
