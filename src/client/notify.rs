//! User-visible notifications raised by settled mutations.

use std::sync::RwLock;

use tracing::{info, warn};

use crate::application::error::FeedError;
use crate::cache::lock::{rw_read, rw_write};

const SOURCE: &str = "client::notify";

pub const RETRY_MESSAGE: &str = "Something went wrong. Please try again.";
pub const LOGIN_MESSAGE: &str = "Your session has expired. Please log in again.";
pub const FORBIDDEN_MESSAGE: &str = "You are not allowed to do that.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToastLevel {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toast {
    pub level: ToastLevel,
    pub message: String,
    /// The user may retry the action unchanged.
    pub retryable: bool,
}

impl Toast {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: ToastLevel::Success,
            message: message.into(),
            retryable: false,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: ToastLevel::Error,
            message: message.into(),
            retryable: false,
        }
    }

    pub fn retryable(message: impl Into<String>) -> Self {
        Self {
            level: ToastLevel::Error,
            message: message.into(),
            retryable: true,
        }
    }

    /// Failure toast for `error`; `transient_message` replaces the generic retry text.
    pub fn for_failure(error: &FeedError, transient_message: Option<&str>) -> Self {
        match error {
            FeedError::Unauthorized => Self::error(LOGIN_MESSAGE),
            FeedError::Forbidden => Self::error(FORBIDDEN_MESSAGE),
            FeedError::NotFound => Self::error("That item no longer exists."),
            FeedError::Validation(message) => Self::error(message.clone()),
            FeedError::InvalidCursor(_) | FeedError::Network(_) | FeedError::Server(_) => {
                Self::retryable(transient_message.unwrap_or(RETRY_MESSAGE))
            }
        }
    }
}

pub trait Notifier: Send + Sync {
    fn notify(&self, toast: Toast);
}

/// Writes toasts to the log. Used when no UI is attached.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, toast: Toast) {
        match toast.level {
            ToastLevel::Success => info!(message = %toast.message, "toast"),
            ToastLevel::Error => {
                warn!(message = %toast.message, retryable = toast.retryable, "toast")
            }
        }
    }
}

/// Keeps every toast in memory, for tests and headless clients.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    toasts: RwLock<Vec<Toast>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn toasts(&self) -> Vec<Toast> {
        rw_read(&self.toasts, SOURCE, "toasts").clone()
    }

    pub fn errors(&self) -> Vec<Toast> {
        self.toasts()
            .into_iter()
            .filter(|toast| toast.level == ToastLevel::Error)
            .collect()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, toast: Toast) {
        rw_write(&self.toasts, SOURCE, "notify").push(toast);
    }
}
