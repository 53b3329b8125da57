//! Client cache store.
//!
//! Holds the pages fetched for every feed identity during one session. Page
//! boundaries and cursors only change through `put`; item level edits
//! (`map_all`, `remove_item`, `insert_at_top`) leave them untouched. Every
//! change stamps the entry with a fresh store-wide version.

use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};

use feedline_api_types::{Author, Post, PostsPage};
use lru::LruCache;
use metrics::counter;
use thiserror::Error;
use time::OffsetDateTime;
use tracing::debug;
use uuid::Uuid;

use crate::application::pagination::Keyed;
use crate::domain::types::FeedIdentity;

use super::config::CacheConfig;
use super::lock::{rw_read, rw_write};

const SOURCE: &str = "cache::store";
const METRIC_EVICT: &str = "feedline_cache_evict_total";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("cannot append to `{identity}`: no first page is cached")]
    MissingEntry { identity: FeedIdentity },
    #[error("out-of-order append to `{identity}`: expected cursor {expected:?}, got {actual:?}")]
    OutOfOrderAppend {
        identity: FeedIdentity,
        expected: Option<String>,
        actual: Option<String>,
    },
}

/// Pages fetched for one feed identity, oldest fetch last.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pages: Vec<PostsPage>,
    cursors: Vec<Option<String>>,
    version: u64,
    fetched_at: OffsetDateTime,
}

impl CacheEntry {
    fn first(page: PostsPage, version: u64) -> Self {
        Self {
            pages: vec![page],
            cursors: vec![None],
            version,
            fetched_at: OffsetDateTime::now_utc(),
        }
    }

    pub fn pages(&self) -> &[PostsPage] {
        &self.pages
    }

    /// Cursor used to fetch each page; `None` for the first page.
    pub fn cursors(&self) -> &[Option<String>] {
        &self.cursors
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn fetched_at(&self) -> OffsetDateTime {
        self.fetched_at
    }

    pub fn posts(&self) -> impl Iterator<Item = &Post> {
        self.pages.iter().flat_map(|page| page.posts.iter())
    }

    pub fn len(&self) -> usize {
        self.pages.iter().map(|page| page.posts.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cursor for the next `load more`, `None` once the feed is exhausted.
    pub fn next_cursor(&self) -> Option<&str> {
        self.pages
            .last()
            .and_then(|page| page.next_cursor.as_deref())
    }

    pub fn is_exhausted(&self) -> bool {
        self.next_cursor().is_none()
    }

    pub fn contains(&self, post_id: Uuid) -> bool {
        self.posts().any(|post| post.id == post_id)
    }

    pub fn find(&self, post_id: Uuid) -> Option<&Post> {
        self.posts().find(|post| post.id == post_id)
    }

    fn posts_mut(&mut self) -> impl Iterator<Item = &mut Post> {
        self.pages.iter_mut().flat_map(|page| page.posts.iter_mut())
    }

    /// Insert `post` where it sorts. Posts older than the loaded range are dropped.
    fn insert_sorted(&mut self, post: Post) -> bool {
        let key = post.sort_key();
        for page in self.pages.iter_mut() {
            if let Some(index) = page.posts.iter().position(|item| item.sort_key() < key) {
                page.posts.insert(index, post);
                return true;
            }
        }
        let exhausted = self.is_exhausted();
        match self.pages.last_mut() {
            Some(last) if exhausted => {
                last.posts.push(post);
                true
            }
            _ => false,
        }
    }
}

/// Immutable copy of one entry taken before a speculative edit.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    identity: FeedIdentity,
    entry: CacheEntry,
}

impl Snapshot {
    pub fn identity(&self) -> FeedIdentity {
        self.identity
    }

    pub fn version(&self) -> u64 {
        self.entry.version
    }

    pub fn entry(&self) -> &CacheEntry {
        &self.entry
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreOutcome {
    Restored,
    /// The entry changed after the expected version; nothing was written.
    Stale,
    /// The entry was evicted or invalidated meanwhile.
    Missing,
}

/// Process-local store of fetched feed pages, owned by one client session.
pub struct FeedStore {
    entries: RwLock<LruCache<FeedIdentity, CacheEntry>>,
    clock: AtomicU64,
}

impl FeedStore {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            entries: RwLock::new(LruCache::new(config.max_feeds_non_zero())),
            clock: AtomicU64::new(0),
        }
    }

    fn next_version(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn get(&self, identity: &FeedIdentity) -> Option<CacheEntry> {
        rw_write(&self.entries, SOURCE, "get").get(identity).cloned()
    }

    pub fn contains(&self, identity: &FeedIdentity) -> bool {
        rw_read(&self.entries, SOURCE, "contains").contains(identity)
    }

    pub fn version_of(&self, identity: &FeedIdentity) -> Option<u64> {
        rw_read(&self.entries, SOURCE, "version_of")
            .peek(identity)
            .map(CacheEntry::version)
    }

    /// Cached identities in lock order.
    pub fn identities(&self) -> Vec<FeedIdentity> {
        let mut identities: Vec<FeedIdentity> = rw_read(&self.entries, SOURCE, "identities")
            .iter()
            .map(|(identity, _)| *identity)
            .collect();
        identities.sort();
        identities
    }

    pub fn len(&self) -> usize {
        rw_read(&self.entries, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Store a fetched page.
    ///
    /// A first page replaces the entry. Any other page is appended only when
    /// `cursor_used` is the entry's current `next_cursor`; posts already cached
    /// for the identity are dropped from the appended page.
    pub fn put(
        &self,
        identity: FeedIdentity,
        mut page: PostsPage,
        cursor_used: Option<&str>,
        is_first_page: bool,
    ) -> Result<u64, StoreError> {
        page.restarted = false;
        let version = self.next_version();
        let mut entries = rw_write(&self.entries, SOURCE, "put");

        if is_first_page {
            if let Some((evicted, _)) = entries.push(identity, CacheEntry::first(page, version))
                && evicted != identity
            {
                counter!(METRIC_EVICT).increment(1);
                debug!(feed = %evicted, "evicted least recently used feed");
            }
            return Ok(version);
        }

        let entry = entries
            .get_mut(&identity)
            .ok_or(StoreError::MissingEntry { identity })?;
        let expected = entry.next_cursor();
        if expected.is_none() || expected != cursor_used {
            return Err(StoreError::OutOfOrderAppend {
                identity,
                expected: expected.map(str::to_owned),
                actual: cursor_used.map(str::to_owned),
            });
        }

        page.posts.retain(|post| !entry.contains(post.id));
        entry.pages.push(page);
        entry.cursors.push(cursor_used.map(str::to_owned));
        entry.version = version;
        Ok(version)
    }

    /// Apply `transform` to every post of every matching entry.
    ///
    /// `transform` reports whether it changed the post; only changed entries
    /// get a new version. Returns the changed identities in lock order.
    pub fn map_all<P, F>(&self, mut matches: P, mut transform: F) -> Vec<FeedIdentity>
    where
        P: FnMut(&FeedIdentity) -> bool,
        F: FnMut(&mut Post) -> bool,
    {
        let mut entries = rw_write(&self.entries, SOURCE, "map_all");
        let mut touched = Vec::new();
        for (identity, entry) in entries.iter_mut() {
            if !matches(identity) {
                continue;
            }
            let mut changed = false;
            for post in entry.posts_mut() {
                changed |= transform(post);
            }
            if changed {
                entry.version = self.next_version();
                touched.push(*identity);
            }
        }
        touched.sort();
        touched
    }

    /// Remove `post_id` from every page of every matching entry.
    ///
    /// Pages may shrink below the page size; cursors stay as fetched.
    pub fn remove_item<P>(&self, mut matches: P, post_id: Uuid) -> Vec<FeedIdentity>
    where
        P: FnMut(&FeedIdentity) -> bool,
    {
        let mut entries = rw_write(&self.entries, SOURCE, "remove_item");
        let mut touched = Vec::new();
        for (identity, entry) in entries.iter_mut() {
            if !matches(identity) || !entry.contains(post_id) {
                continue;
            }
            for page in entry.pages.iter_mut() {
                page.posts.retain(|post| post.id != post_id);
            }
            entry.version = self.next_version();
            touched.push(*identity);
        }
        touched.sort();
        touched
    }

    /// Prepend `post` to the first page of `identity` only.
    ///
    /// Returns `false` when the identity is not cached or already holds the post.
    pub fn insert_at_top(&self, identity: &FeedIdentity, post: Post) -> bool {
        let mut entries = rw_write(&self.entries, SOURCE, "insert_at_top");
        let Some(entry) = entries.peek_mut(identity) else {
            return false;
        };
        if entry.contains(post.id) {
            return false;
        }
        let Some(first) = entry.pages.first_mut() else {
            return false;
        };
        first.posts.insert(0, post);
        entry.version = self.next_version();
        true
    }

    /// Put a previously removed post back at its sorted position.
    pub fn reinsert(&self, identity: &FeedIdentity, post: Post) -> bool {
        let mut entries = rw_write(&self.entries, SOURCE, "reinsert");
        let Some(entry) = entries.peek_mut(identity) else {
            return false;
        };
        if entry.contains(post.id) || !entry.insert_sorted(post) {
            return false;
        }
        entry.version = self.next_version();
        true
    }

    pub fn snapshot(&self, identity: &FeedIdentity) -> Option<Snapshot> {
        rw_read(&self.entries, SOURCE, "snapshot")
            .peek(identity)
            .map(|entry| Snapshot {
                identity: *identity,
                entry: entry.clone(),
            })
    }

    /// Write `snapshot` back unless the entry moved past `expected_version`.
    pub fn restore_if_version(&self, snapshot: &Snapshot, expected_version: u64) -> RestoreOutcome {
        let mut entries = rw_write(&self.entries, SOURCE, "restore_if_version");
        let Some(entry) = entries.peek_mut(&snapshot.identity) else {
            return RestoreOutcome::Missing;
        };
        if entry.version != expected_version {
            return RestoreOutcome::Stale;
        }
        *entry = snapshot.entry.clone();
        entry.version = self.next_version();
        RestoreOutcome::Restored
    }

    /// Write `snapshot` back unconditionally.
    pub fn restore(&self, snapshot: &Snapshot) -> u64 {
        let version = self.next_version();
        let mut entry = snapshot.entry.clone();
        entry.version = version;
        rw_write(&self.entries, SOURCE, "restore").put(snapshot.identity, entry);
        version
    }

    /// First cached copy of `post_id`, searching identities in lock order.
    pub fn find_post(&self, post_id: Uuid) -> Option<Post> {
        let entries = rw_read(&self.entries, SOURCE, "find_post");
        entries
            .iter()
            .filter_map(|(identity, entry)| entry.find(post_id).map(|post| (*identity, post)))
            .min_by_key(|(identity, _)| *identity)
            .map(|(_, post)| post.clone())
    }

    /// First cached author summary for `user_id`, searching identities in lock order.
    pub fn find_author(&self, user_id: Uuid) -> Option<Author> {
        let entries = rw_read(&self.entries, SOURCE, "find_author");
        entries
            .iter()
            .filter_map(|(identity, entry)| {
                entry
                    .posts()
                    .find(|post| post.author.id == user_id)
                    .map(|post| (*identity, post))
            })
            .min_by_key(|(identity, _)| *identity)
            .map(|(_, post)| post.author.clone())
    }

    /// Drop an entry, forcing the next load to refetch it.
    pub fn invalidate(&self, identity: &FeedIdentity) -> bool {
        let removed = rw_write(&self.entries, SOURCE, "invalidate")
            .pop(identity)
            .is_some();
        if removed {
            debug!(feed = %identity, "feed entry invalidated");
        }
        removed
    }

    pub fn clear(&self) {
        rw_write(&self.entries, SOURCE, "clear").clear();
    }
}
