//! Explicitly constructed client session owning the cache.

use std::sync::Arc;

use feedline_api_types::CurrentUser;
use tracing::info;

use crate::application::error::FeedError;
use crate::cache::{CacheConfig, ConsistencyGuard, FeedStore};
use crate::client::backend::{FeedSource, FeedWriter};
use crate::client::loader::FeedLoader;
use crate::client::notify::Notifier;
use crate::client::reconciler::MutationReconciler;

/// One signed-in client. The store, guard, loader and reconciler live exactly
/// as long as this value.
pub struct FeedClient {
    user: CurrentUser,
    store: Arc<FeedStore>,
    guard: Arc<ConsistencyGuard>,
    loader: FeedLoader,
    reconciler: MutationReconciler,
}

impl FeedClient {
    /// Resolve the session user and build a fresh cache for it.
    pub async fn connect<B>(
        backend: Arc<B>,
        config: CacheConfig,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self, FeedError>
    where
        B: FeedSource + FeedWriter + 'static,
    {
        let user = backend.current_user().await?;
        let store = Arc::new(FeedStore::new(&config));
        let guard = Arc::new(ConsistencyGuard::new());
        let loader = FeedLoader::new(
            backend.clone(),
            store.clone(),
            guard.clone(),
            config.page_size_non_zero(),
        );
        let reconciler = MutationReconciler::new(
            backend,
            store.clone(),
            guard.clone(),
            notifier,
            user.clone(),
        );
        info!(user_id = %user.id, max_feeds = config.max_feeds, "feed client connected");

        Ok(Self {
            user,
            store,
            guard,
            loader,
            reconciler,
        })
    }

    pub fn user(&self) -> &CurrentUser {
        &self.user
    }

    pub fn store(&self) -> &Arc<FeedStore> {
        &self.store
    }

    pub fn guard(&self) -> &Arc<ConsistencyGuard> {
        &self.guard
    }

    pub fn loader(&self) -> &FeedLoader {
        &self.loader
    }

    pub fn reconciler(&self) -> &MutationReconciler {
        &self.reconciler
    }

    /// Drop every cached feed and end the session.
    pub fn logout(self) {
        self.store.clear();
        info!(user_id = %self.user.id, "feed client logged out");
    }
}
