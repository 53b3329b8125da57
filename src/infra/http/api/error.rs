use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use feedline_api_types::{ApiErrorBody, ApiErrorMessage};

use crate::application::error::{ErrorReport, FeedError};

pub mod codes {
    pub const UNAUTHORIZED: &str = "unauthorized";
    pub const FORBIDDEN: &str = "forbidden";
    pub const NOT_FOUND: &str = "not_found";
    pub const INVALID_CURSOR: &str = "invalid_cursor";
    pub const INVALID_INPUT: &str = "invalid_input";
    pub const INTERNAL: &str = "internal";
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
    hint: Option<String>,
    detail: Option<String>,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            hint: None,
            detail: None,
        }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn unauthorized() -> Self {
        Self::new(
            StatusCode::UNAUTHORIZED,
            codes::UNAUTHORIZED,
            "A valid session is required",
        )
        .with_hint("Log in and retry with `Authorization: Bearer <token>`")
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, codes::INVALID_INPUT, message)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn code(&self) -> &'static str {
        self.code
    }
}

impl From<FeedError> for ApiError {
    fn from(err: FeedError) -> Self {
        match err {
            FeedError::Unauthorized => Self::unauthorized(),
            FeedError::Forbidden => Self::new(
                StatusCode::FORBIDDEN,
                codes::FORBIDDEN,
                "You are not allowed to do that",
            ),
            FeedError::NotFound => {
                Self::new(StatusCode::NOT_FOUND, codes::NOT_FOUND, "Resource not found")
            }
            FeedError::InvalidCursor(reason) => {
                Self::new(StatusCode::BAD_REQUEST, codes::INVALID_CURSOR, "Invalid cursor")
                    .with_hint(reason)
            }
            FeedError::Validation(message) => Self::invalid_input(message),
            FeedError::Network(detail) | FeedError::Server(detail) => {
                let mut error = Self::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    codes::INTERNAL,
                    "Internal server error",
                );
                // Kept out of the body; only the response log sees it.
                error.detail = Some(detail);
                error
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let diagnostic = self
            .detail
            .as_deref()
            .or(self.hint.as_deref())
            .unwrap_or(&self.message)
            .to_string();
        let body = ApiErrorBody {
            error: ApiErrorMessage {
                code: self.code.to_string(),
                message: self.message,
                hint: self.hint,
            },
        };
        let mut response = (self.status, Json(body)).into_response();
        ErrorReport::from_message(
            "infra::http::api",
            self.status,
            format!("{}: {diagnostic}", self.code),
        )
        .attach(&mut response);
        response
    }
}
