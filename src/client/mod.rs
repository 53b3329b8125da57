//! Client half of the feed core.
//!
//! A [`FeedClient`] owns one cache store and guard. Reads go through the
//! [`FeedLoader`]; writes go through the [`MutationReconciler`], which edits
//! the cache speculatively and settles each edit once the backing write returns.

pub mod backend;
pub mod edit;
pub mod http;
pub mod loader;
pub mod local;
pub mod mutation;
pub mod notify;
pub mod reconciler;
pub mod session;

pub use backend::{FeedSource, FeedWriter};
pub use edit::FeedEdit;
pub use http::HttpBackend;
pub use loader::{FeedLoader, LoadError, LoadOutcome};
pub use local::LocalBackend;
pub use mutation::{MutationId, MutationKind, MutationReport, MutationState, Settled};
pub use notify::{Notifier, RecordingNotifier, Toast, ToastLevel, TracingNotifier};
pub use reconciler::MutationReconciler;
pub use session::FeedClient;
