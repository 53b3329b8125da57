pub mod error;
pub mod handlers;
pub mod middleware;
pub mod state;

pub use state::ApiState;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, patch, post},
};

use crate::infra::http::RouterState;

/// Session-authenticated JSON routes. Every route requires a bearer token.
pub fn build_api_router(state: RouterState) -> Router<RouterState> {
    let auth_state = state.api.clone();

    Router::new()
        .route("/api/session", get(handlers::current_session))
        .route("/api/posts", post(handlers::create_post))
        .route("/api/posts/for-you", get(handlers::for_you_feed))
        .route("/api/posts/liked", get(handlers::liked_feed))
        .route(
            "/api/posts/{id}",
            axum::routing::delete(handlers::delete_post),
        )
        .route(
            "/api/posts/{id}/likes",
            get(handlers::like_info)
                .post(handlers::like_post)
                .delete(handlers::unlike_post),
        )
        .route(
            "/api/posts/{id}/bookmark",
            get(handlers::bookmark_info)
                .post(handlers::save_bookmark)
                .delete(handlers::remove_bookmark),
        )
        .route(
            "/api/notifications/unread-count",
            get(handlers::unread_notifications),
        )
        .route(
            "/api/notifications/mark-as-read",
            patch(handlers::mark_notifications_read),
        )
        .route("/api/users/me", patch(handlers::update_profile))
        .route("/api/users/{user_id}/posts", get(handlers::authored_feed))
        .route("/api/users/{user_id}/liked", get(handlers::user_liked_feed))
        .route(
            "/api/users/{user_id}/followers",
            get(handlers::follower_info)
                .post(handlers::follow_user)
                .delete(handlers::unfollow_user),
        )
        .layer(axum_middleware::from_fn_with_state(
            auth_state,
            middleware::session_auth,
        ))
}
