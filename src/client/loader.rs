//! Client side feed loading through the store and the consistency guard.

use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use metrics::{counter, histogram};
use thiserror::Error;
use tracing::{debug, warn};

use crate::application::error::FeedError;
use crate::cache::{CacheEntry, ConsistencyGuard, FeedStore, FetchTicket, StoreError};
use crate::client::backend::FeedSource;
use crate::domain::types::FeedIdentity;

const METRIC_CACHE_HIT: &str = "feedline_cache_hit_total";
const METRIC_CACHE_MISS: &str = "feedline_cache_miss_total";
const METRIC_FETCH_DISCARDED: &str = "feedline_fetch_discarded_total";
const METRIC_FETCH_MS: &str = "feedline_fetch_ms";

/// Fetch attempts for an explicit load before giving up on a busy feed.
const MAX_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome {
    /// Served from the store without a fetch.
    Cached(CacheEntry),
    /// A fetched page was stored; the entry as it is now.
    Applied(CacheEntry),
    /// No further pages exist.
    Exhausted,
    /// Refresh skipped while a mutation is pending.
    Suppressed,
    /// The fetch was cancelled while in flight and its result dropped: a
    /// refresh overlapped by a mutation, or an explicit load that kept being
    /// overlapped.
    Discarded,
}

impl LoadOutcome {
    pub fn entry(&self) -> Option<&CacheEntry> {
        match self {
            LoadOutcome::Cached(entry) | LoadOutcome::Applied(entry) => Some(entry),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error(transparent)]
    Feed(#[from] FeedError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Clone)]
pub struct FeedLoader {
    source: Arc<dyn FeedSource>,
    store: Arc<FeedStore>,
    guard: Arc<ConsistencyGuard>,
    page_size: u32,
}

impl FeedLoader {
    pub fn new(
        source: Arc<dyn FeedSource>,
        store: Arc<FeedStore>,
        guard: Arc<ConsistencyGuard>,
        page_size: u32,
    ) -> Self {
        Self {
            source,
            store,
            guard,
            page_size: page_size.max(1),
        }
    }

    /// Cached pages for `identity`, fetching the first page on a miss.
    ///
    /// Waits for in-flight mutations to settle before fetching, and fetches
    /// again when a mutation overlaps the fetch.
    pub async fn load(&self, identity: FeedIdentity) -> Result<LoadOutcome, LoadError> {
        if let Some(entry) = self.store.get(&identity) {
            counter!(METRIC_CACHE_HIT, "feed" => identity.kind().as_str()).increment(1);
            return Ok(LoadOutcome::Cached(entry));
        }
        counter!(METRIC_CACHE_MISS, "feed" => identity.kind().as_str()).increment(1);

        for attempt in 1..=MAX_ATTEMPTS {
            self.guard.settled().await;
            let ticket = self.guard.begin_fetch(identity);
            if let Some(outcome) = self.fetch_first(ticket).await? {
                return Ok(outcome);
            }
            debug!(feed = %identity, attempt, "mutation overlapped the first page fetch");
        }
        Ok(LoadOutcome::Discarded)
    }

    /// Append the next page of `identity`, serialized after in-flight mutations
    /// the same way as [`FeedLoader::load`].
    pub async fn load_more(&self, identity: FeedIdentity) -> Result<LoadOutcome, LoadError> {
        for attempt in 1..=MAX_ATTEMPTS {
            self.guard.settled().await;
            let Some(entry) = self.store.get(&identity) else {
                return self.load(identity).await;
            };
            let Some(cursor) = entry.next_cursor().map(str::to_owned) else {
                return Ok(LoadOutcome::Exhausted);
            };
            if let Some(outcome) = self.append(identity, &cursor).await? {
                return Ok(outcome);
            }
            debug!(feed = %identity, attempt, "mutation overlapped the next page fetch");
        }
        Ok(LoadOutcome::Discarded)
    }

    /// Background refetch of the first page; replaces the cached pages.
    /// Dropped rather than retried when a mutation overlaps it.
    pub async fn refresh(&self, identity: FeedIdentity) -> Result<LoadOutcome, LoadError> {
        let Some(ticket) = self.guard.begin_refresh(identity) else {
            return Ok(LoadOutcome::Suppressed);
        };
        Ok(self
            .fetch_first(ticket)
            .await?
            .unwrap_or(LoadOutcome::Discarded))
    }

    /// Refresh every cached identity concurrently.
    pub async fn refresh_all(&self) -> Vec<(FeedIdentity, Result<LoadOutcome, LoadError>)> {
        let identities = self.store.identities();
        let results = join_all(identities.iter().map(|identity| self.refresh(*identity))).await;
        identities.into_iter().zip(results).collect()
    }

    /// `None` when the ticket went stale during the fetch.
    async fn fetch_first(&self, ticket: FetchTicket) -> Result<Option<LoadOutcome>, LoadError> {
        let identity = ticket.identity();
        let page = self.fetch(identity, None).await?;

        let _locks = self.guard.lock(&[identity]).await;
        if !self.accept(&ticket) {
            return Ok(None);
        }
        self.store.put(identity, page, None, true)?;
        Ok(Some(self.applied(&identity)))
    }

    async fn append(
        &self,
        identity: FeedIdentity,
        cursor: &str,
    ) -> Result<Option<LoadOutcome>, LoadError> {
        let ticket = self.guard.begin_fetch(identity);
        let page = self.fetch(identity, Some(cursor)).await?;

        let _locks = self.guard.lock(&[identity]).await;
        if !self.accept(&ticket) {
            return Ok(None);
        }
        if page.restarted {
            warn!(feed = %identity, "server restarted the feed; replacing cached pages");
            self.store.put(identity, page, None, true)?;
        } else {
            let still_next = self
                .store
                .get(&identity)
                .is_some_and(|entry| entry.next_cursor() == Some(cursor));
            if !still_next {
                debug!(feed = %identity, "another load advanced the feed first");
                counter!(METRIC_FETCH_DISCARDED, "feed" => identity.kind().as_str()).increment(1);
                return Ok(Some(LoadOutcome::Discarded));
            }
            self.store.put(identity, page, Some(cursor), false)?;
        }
        Ok(Some(self.applied(&identity)))
    }

    async fn fetch(
        &self,
        identity: FeedIdentity,
        cursor: Option<&str>,
    ) -> Result<feedline_api_types::PostsPage, FeedError> {
        let started = Instant::now();
        let result = self
            .source
            .fetch_feed(identity, cursor, self.page_size)
            .await;
        histogram!(METRIC_FETCH_MS, "feed" => identity.kind().as_str())
            .record(started.elapsed().as_secs_f64() * 1000.0);
        if let Err(err) = &result {
            debug!(feed = %identity, error = %err, "feed fetch failed");
        }
        result
    }

    fn accept(&self, ticket: &FetchTicket) -> bool {
        if self.guard.is_current(ticket) {
            return true;
        }
        debug!(feed = %ticket.identity(), "discarding cancelled fetch");
        counter!(METRIC_FETCH_DISCARDED, "feed" => ticket.identity().kind().as_str())
            .increment(1);
        false
    }

    fn applied(&self, identity: &FeedIdentity) -> LoadOutcome {
        match self.store.get(identity) {
            Some(entry) => LoadOutcome::Applied(entry),
            None => LoadOutcome::Discarded,
        }
    }
}
