use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderValue, Request, header::AUTHORIZATION};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use super::error::ApiError;
use super::state::ApiState;

/// Resolve the bearer token into a `SessionUser` extension, or answer 401.
pub async fn session_auth(
    State(state): State<ApiState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let Some(token) = extract_token(request.headers().get(AUTHORIZATION)) else {
        return ApiError::unauthorized().into_response();
    };

    let user = match state.sessions.authenticate(&token).await {
        Ok(user) => user,
        Err(err) => return ApiError::from(err).into_response(),
    };

    request.extensions_mut().insert(user.clone());
    let mut response = next.run(request).await;
    response.extensions_mut().insert(user);
    response
}

fn extract_token(header: Option<&HeaderValue>) -> Option<String> {
    let raw = header?.to_str().ok()?;
    let bearer = raw.strip_prefix("Bearer ")?.trim();
    (!bearer.is_empty()).then(|| bearer.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_bearer_tokens_are_extracted() {
        let bearer = HeaderValue::from_static("Bearer abc");
        assert_eq!(extract_token(Some(&bearer)).as_deref(), Some("abc"));

        let basic = HeaderValue::from_static("Basic abc");
        assert!(extract_token(Some(&basic)).is_none());

        let empty = HeaderValue::from_static("Bearer ");
        assert!(extract_token(Some(&empty)).is_none());
        assert!(extract_token(None).is_none());
    }
}
