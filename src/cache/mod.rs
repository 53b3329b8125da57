//! Client feed cache.
//!
//! - [`FeedStore`]: pages fetched per feed identity, patched in place by mutations.
//! - [`ConsistencyGuard`]: per-identity serialization and fetch cancellation.
//!
//! One store and one guard belong to each client session; nothing here is global.

mod config;
mod guard;
pub(crate) mod lock;
mod store;

pub use config::CacheConfig;
pub use guard::{ConsistencyGuard, FetchTicket, IdentityLocks, MutationScope};
pub use store::{CacheEntry, FeedStore, RestoreOutcome, Snapshot, StoreError};
