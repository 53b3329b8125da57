//! Feed backend over the JSON HTTP API.

use async_trait::async_trait;
use axum::http::HeaderValue;
use feedline_api_types::{
    ApiErrorBody, BookmarkInfo, CreatePostRequest, CurrentUser, FollowerInfo, LikeInfo, Post,
    PostsPage, UpdateProfileRequest, UserProfile,
};
use reqwest::{Client, Method, Response, StatusCode, Url};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;
use uuid::Uuid;

use crate::application::error::FeedError;
use crate::client::backend::{FeedSource, FeedWriter};
use crate::domain::types::{FeedIdentity, FeedKind};

#[derive(Clone, Debug)]
pub struct HttpBackend {
    client: Client,
    base: Url,
    token: Option<String>,
}

impl HttpBackend {
    pub fn new(site: &str, token: Option<String>) -> Result<Self, FeedError> {
        let base = Url::parse(site)
            .and_then(|url| url.join("/"))
            .map_err(|err| FeedError::validation(format!("invalid site url: {err}")))?;
        let client = Client::builder()
            .user_agent(Self::user_agent())
            .build()
            .map_err(|err| FeedError::network(err.to_string()))?;
        Ok(Self {
            client,
            base,
            token,
        })
    }

    pub fn user_agent() -> &'static str {
        concat!("feedline/", env!("CARGO_PKG_VERSION"))
    }

    fn auth_header(&self) -> Result<Option<HeaderValue>, FeedError> {
        self.token
            .as_ref()
            .map(|token| {
                HeaderValue::from_str(&format!("Bearer {token}"))
                    .map_err(|err| FeedError::validation(err.to_string()))
            })
            .transpose()
    }

    fn url(&self, path: &str, query: &[(&str, String)]) -> Result<Url, FeedError> {
        let mut url = self
            .base
            .join(path)
            .map_err(|err| FeedError::validation(format!("invalid path `{path}`: {err}")))?;
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    async fn request<T, B>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&B>,
    ) -> Result<T, FeedError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let url = self.url(path, query)?;
        let mut request = self.client.request(method.clone(), url);
        if let Some(header) = self.auth_header()? {
            request = request.header(axum::http::header::AUTHORIZATION, header);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|err| {
            debug!(%method, path, error = %err, "request failed");
            FeedError::network(err.to_string())
        })?;
        Self::handle(response).await
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, FeedError> {
        self.request::<T, ()>(Method::GET, path, query, None).await
    }

    async fn handle<T: DeserializeOwned>(response: Response) -> Result<T, FeedError> {
        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|err| FeedError::network(err.to_string()))?;
        if !status.is_success() {
            let body = serde_json::from_slice::<ApiErrorBody>(&bytes).ok();
            return Err(error_for_status(status, body));
        }
        serde_json::from_slice(&bytes)
            .map_err(|err| FeedError::server(format!("failed to parse body: {err}")))
    }

    fn feed_path(identity: &FeedIdentity) -> String {
        match (identity.kind(), identity.scope()) {
            (FeedKind::LikedBy, Some(user)) => format!("api/users/{user}/liked"),
            (FeedKind::AuthoredBy, Some(user)) => format!("api/users/{user}/posts"),
            _ => "api/posts/for-you".to_string(),
        }
    }

    fn toggle_method(enabled: bool) -> Method {
        if enabled { Method::POST } else { Method::DELETE }
    }
}

/// Map an error response onto the feed error taxonomy.
pub fn error_for_status(status: StatusCode, body: Option<ApiErrorBody>) -> FeedError {
    let (code, message) = match body {
        Some(body) => (body.error.code, body.error.message),
        None => (String::new(), status.to_string()),
    };
    match status {
        StatusCode::UNAUTHORIZED => FeedError::Unauthorized,
        StatusCode::FORBIDDEN => FeedError::Forbidden,
        StatusCode::NOT_FOUND => FeedError::NotFound,
        StatusCode::BAD_REQUEST if code == "invalid_cursor" => FeedError::InvalidCursor(message),
        status if status.is_client_error() => FeedError::Validation(message),
        _ => FeedError::Server(format!("status {status}: {message}")),
    }
}

#[async_trait]
impl FeedSource for HttpBackend {
    async fn current_user(&self) -> Result<CurrentUser, FeedError> {
        self.get("api/session", &[]).await
    }

    async fn fetch_feed(
        &self,
        identity: FeedIdentity,
        cursor: Option<&str>,
        page_size: u32,
    ) -> Result<PostsPage, FeedError> {
        let mut query = vec![("limit", page_size.to_string())];
        if let Some(cursor) = cursor {
            query.push(("cursor", cursor.to_string()));
        }
        self.get(&Self::feed_path(&identity), &query).await
    }
}

#[async_trait]
impl FeedWriter for HttpBackend {
    async fn create_post(&self, request: CreatePostRequest) -> Result<Post, FeedError> {
        self.request(Method::POST, "api/posts", &[], Some(&request))
            .await
    }

    async fn delete_post(&self, post_id: Uuid) -> Result<Post, FeedError> {
        self.request::<Post, ()>(Method::DELETE, &format!("api/posts/{post_id}"), &[], None)
            .await
    }

    async fn set_like(&self, post_id: Uuid, liked: bool) -> Result<LikeInfo, FeedError> {
        self.request::<LikeInfo, ()>(
            Self::toggle_method(liked),
            &format!("api/posts/{post_id}/likes"),
            &[],
            None,
        )
        .await
    }

    async fn set_bookmark(
        &self,
        post_id: Uuid,
        bookmarked: bool,
    ) -> Result<BookmarkInfo, FeedError> {
        self.request::<BookmarkInfo, ()>(
            Self::toggle_method(bookmarked),
            &format!("api/posts/{post_id}/bookmark"),
            &[],
            None,
        )
        .await
    }

    async fn set_follow(&self, user_id: Uuid, following: bool) -> Result<FollowerInfo, FeedError> {
        self.request::<FollowerInfo, ()>(
            Self::toggle_method(following),
            &format!("api/users/{user_id}/followers"),
            &[],
            None,
        )
        .await
    }

    async fn update_profile(
        &self,
        request: UpdateProfileRequest,
    ) -> Result<UserProfile, FeedError> {
        self.request(Method::PATCH, "api/users/me", &[], Some(&request))
            .await
    }
}

#[cfg(test)]
mod tests {
    use feedline_api_types::ApiErrorMessage;

    use super::*;

    fn body(code: &str) -> Option<ApiErrorBody> {
        Some(ApiErrorBody {
            error: ApiErrorMessage {
                code: code.to_string(),
                message: format!("{code} message"),
                hint: None,
            },
        })
    }

    #[test]
    fn statuses_map_onto_feed_errors() {
        assert_eq!(
            error_for_status(StatusCode::UNAUTHORIZED, None),
            FeedError::Unauthorized
        );
        assert_eq!(
            error_for_status(StatusCode::FORBIDDEN, body("forbidden")),
            FeedError::Forbidden
        );
        assert_eq!(
            error_for_status(StatusCode::NOT_FOUND, None),
            FeedError::NotFound
        );
        assert!(matches!(
            error_for_status(StatusCode::BAD_REQUEST, body("invalid_cursor")),
            FeedError::InvalidCursor(_)
        ));
        assert!(matches!(
            error_for_status(StatusCode::BAD_REQUEST, body("invalid_input")),
            FeedError::Validation(_)
        ));
        assert!(
            error_for_status(StatusCode::BAD_GATEWAY, None).is_transient()
        );
    }

    #[test]
    fn feed_paths_follow_identity_kind() {
        let user = Uuid::from_u128(5);
        assert_eq!(
            HttpBackend::feed_path(&FeedIdentity::global()),
            "api/posts/for-you"
        );
        assert_eq!(
            HttpBackend::feed_path(&FeedIdentity::liked_by(user)),
            format!("api/users/{user}/liked")
        );
        assert_eq!(
            HttpBackend::feed_path(&FeedIdentity::authored_by(user)),
            format!("api/users/{user}/posts")
        );
    }

    #[test]
    fn urls_keep_query_pairs_and_base() {
        let backend =
            HttpBackend::new("http://127.0.0.1:3000/ignored", Some("token".to_string()))
                .expect("backend");
        let url = backend
            .url("api/posts/for-you", &[("limit", "5".to_string())])
            .expect("url");
        assert_eq!(url.as_str(), "http://127.0.0.1:3000/api/posts/for-you?limit=5");
        assert_eq!(
            backend
                .auth_header()
                .expect("header")
                .expect("present")
                .to_str()
                .expect("ascii"),
            "Bearer token"
        );
    }

    #[test]
    fn malformed_site_is_rejected() {
        assert!(matches!(
            HttpBackend::new("not a url", None),
            Err(FeedError::Validation(_))
        ));
    }
}
