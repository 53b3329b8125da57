//! Client cache configuration.

use std::num::NonZeroUsize;

use serde::Deserialize;

const DEFAULT_MAX_FEEDS: usize = 32;
const DEFAULT_PAGE_SIZE: u32 = 10;

/// Limits for the per-session feed store.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum feed identities kept before least recently used entries are evicted.
    pub max_feeds: usize,
    /// Page size requested by the client loader.
    pub page_size: u32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_feeds: DEFAULT_MAX_FEEDS,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl From<&crate::config::ClientSettings> for CacheConfig {
    fn from(settings: &crate::config::ClientSettings) -> Self {
        Self {
            max_feeds: settings.max_cached_feeds.get(),
            page_size: settings.page_size.get(),
        }
    }
}

impl CacheConfig {
    /// Returns the feed limit as NonZeroUsize, clamping to 1 if zero.
    pub fn max_feeds_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.max_feeds).unwrap_or(NonZeroUsize::MIN)
    }

    /// Returns the page size, clamping to 1 if zero.
    pub fn page_size_non_zero(&self) -> u32 {
        self.page_size.max(1)
    }
}
