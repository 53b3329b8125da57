use std::error::Error as StdError;

use axum::{http::StatusCode, response::Response};
use thiserror::Error;

use crate::{
    application::{pagination::PaginationError, repos::RepoError},
    domain::error::DomainError,
    infra::error::InfraError,
};

/// Diagnostic chain attached to error responses for the logging middleware.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub source: &'static str,
    pub status: StatusCode,
    pub messages: Vec<String>,
}

impl ErrorReport {
    pub fn from_error(source: &'static str, status: StatusCode, error: &dyn StdError) -> Self {
        let mut messages = Vec::new();
        messages.push(error.to_string());
        let mut current = error.source();
        while let Some(inner) = current {
            messages.push(inner.to_string());
            current = inner.source();
        }
        Self {
            source,
            status,
            messages,
        }
    }

    pub fn from_message(
        source: &'static str,
        status: StatusCode,
        message: impl Into<String>,
    ) -> Self {
        Self {
            source,
            status,
            messages: vec![message.into()],
        }
    }

    pub fn attach(self, response: &mut Response) {
        response.extensions_mut().insert(self);
    }
}

/// Failures shared by feed reads and social writes, on both sides of the wire.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FeedError {
    #[error("no valid session")]
    Unauthorized,
    #[error("not permitted")]
    Forbidden,
    #[error("target not found")]
    NotFound,
    #[error("invalid cursor: {0}")]
    InvalidCursor(String),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("server error: {0}")]
    Server(String),
}

impl FeedError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn server(message: impl Into<String>) -> Self {
        Self::Server(message.into())
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::Network(message.into())
    }

    /// Errors worth retrying unchanged.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Server(_))
    }
}

impl From<RepoError> for FeedError {
    fn from(error: RepoError) -> Self {
        match error {
            RepoError::NotFound => FeedError::NotFound,
            RepoError::InvalidInput { message } => FeedError::Validation(message),
            RepoError::Duplicate { constraint } => {
                FeedError::Validation(format!("duplicate value for `{constraint}`"))
            }
            RepoError::Pagination(err) => FeedError::from(err),
            RepoError::Timeout => FeedError::Server("database timeout".to_string()),
            RepoError::Persistence(message) => FeedError::Server(message),
        }
    }
}

impl From<PaginationError> for FeedError {
    fn from(error: PaginationError) -> Self {
        match error {
            PaginationError::InvalidCursor(message) => FeedError::InvalidCursor(message),
            PaginationError::InvalidPageSize => FeedError::Validation(error.to_string()),
        }
    }
}

impl From<DomainError> for FeedError {
    fn from(error: DomainError) -> Self {
        FeedError::Validation(error.to_string())
    }
}

/// Process level failures reported by the binary.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error(transparent)]
    Feed(#[from] FeedError),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }
}
