//! Consistency guard.
//!
//! Serializes cache read-modify-write sequences per feed identity and keeps
//! fetches from overwriting speculative edits with data read before a
//! backing write landed. Every fetch carries a ticket stamped with the
//! identity's generation and with the store-wide mutation epoch. The epoch
//! moves when any mutation starts and again when it settles, so a ticket is
//! current only if no mutation overlapped its fetch, including fetches for
//! feeds that were not cached when the mutation started. While a mutation is
//! pending on an identity no automatic refresh of it starts.

use std::collections::BTreeSet;
use std::future::Future;
use std::pin::pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use dashmap::DashMap;
use tokio::sync::{Mutex, Notify, OwnedMutexGuard};
use tracing::trace;

use crate::domain::types::FeedIdentity;

#[derive(Default)]
struct Slot {
    lock: Arc<Mutex<()>>,
    generation: AtomicU64,
    pending: AtomicUsize,
}

/// Mutations in flight across the whole store.
#[derive(Default)]
struct Activity {
    epoch: AtomicU64,
    active: AtomicUsize,
    settled: Notify,
}

/// Proof that a fetch was started at a given generation and epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchTicket {
    identity: FeedIdentity,
    generation: u64,
    epoch: u64,
}

impl FetchTicket {
    pub fn identity(&self) -> FeedIdentity {
        self.identity
    }
}

#[derive(Default)]
pub struct ConsistencyGuard {
    slots: DashMap<FeedIdentity, Arc<Slot>>,
    activity: Arc<Activity>,
}

impl ConsistencyGuard {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, identity: &FeedIdentity) -> Arc<Slot> {
        self.slots.entry(*identity).or_default().clone()
    }

    /// Ticket for a fetch the user asked for explicitly.
    pub fn begin_fetch(&self, identity: FeedIdentity) -> FetchTicket {
        let slot = self.slot(&identity);
        FetchTicket {
            identity,
            generation: slot.generation.load(Ordering::Acquire),
            epoch: self.activity.epoch.load(Ordering::Acquire),
        }
    }

    /// Ticket for an automatic refresh, or `None` while a mutation is pending.
    pub fn begin_refresh(&self, identity: FeedIdentity) -> Option<FetchTicket> {
        if self.is_suppressed(&identity) {
            trace!(feed = %identity, "refresh suppressed by pending mutation");
            return None;
        }
        Some(self.begin_fetch(identity))
    }

    /// Whether a fetch result may still be applied: no mutation is in flight,
    /// none started or settled since the ticket was issued, and the identity
    /// was not cancelled.
    pub fn is_current(&self, ticket: &FetchTicket) -> bool {
        self.activity.active.load(Ordering::Acquire) == 0
            && self.activity.epoch.load(Ordering::Acquire) == ticket.epoch
            && self.slot(&ticket.identity).generation.load(Ordering::Acquire) == ticket.generation
    }

    pub fn is_suppressed(&self, identity: &FeedIdentity) -> bool {
        self.slots
            .get(identity)
            .is_some_and(|slot| slot.pending.load(Ordering::Acquire) > 0)
    }

    pub fn has_pending_mutations(&self) -> bool {
        self.activity.active.load(Ordering::Acquire) > 0
    }

    /// Resolves once no mutation is in flight.
    pub async fn settled(&self) {
        loop {
            let mut notified = pin!(self.activity.settled.notified());
            notified.as_mut().enable();
            if !self.has_pending_mutations() {
                return;
            }
            notified.await;
        }
    }

    /// Cancel in-flight fetches for `identity`; their results will be discarded.
    pub fn cancel_fetches(&self, identity: &FeedIdentity) {
        self.slot(identity).generation.fetch_add(1, Ordering::AcqRel);
    }

    /// Cancel every in-flight fetch and suppress refreshes for `identities`
    /// until the scope drops.
    pub fn begin_mutation(&self, identities: &[FeedIdentity]) -> MutationScope {
        self.activity.active.fetch_add(1, Ordering::AcqRel);
        self.activity.epoch.fetch_add(1, Ordering::AcqRel);

        let ordered: BTreeSet<FeedIdentity> = identities.iter().copied().collect();
        let slots = ordered
            .into_iter()
            .map(|identity| {
                let slot = self.slot(&identity);
                slot.generation.fetch_add(1, Ordering::AcqRel);
                slot.pending.fetch_add(1, Ordering::AcqRel);
                (identity, slot)
            })
            .collect();
        MutationScope {
            slots,
            activity: self.activity.clone(),
        }
    }

    /// Acquire the per-identity locks for `identities` in lock order.
    pub async fn lock(&self, identities: &[FeedIdentity]) -> IdentityLocks {
        let ordered: BTreeSet<FeedIdentity> = identities.iter().copied().collect();
        let mut guards = Vec::with_capacity(ordered.len());
        for identity in ordered {
            let lock = self.slot(&identity).lock.clone();
            guards.push(lock.lock_owned().await);
        }
        IdentityLocks { _guards: guards }
    }

    /// Run `f` with fetches cancelled and refreshes suppressed for `identities`.
    pub async fn with_exclusive_mutation<F, Fut, T>(&self, identities: &[FeedIdentity], f: F) -> T
    where
        F: FnOnce(MutationScope) -> Fut,
        Fut: Future<Output = T>,
    {
        let scope = self.begin_mutation(identities);
        f(scope).await
    }
}

/// Pending mutation over a fixed identity set. Dropping it lifts suppression
/// and invalidates fetches that overlapped the mutation.
pub struct MutationScope {
    slots: Vec<(FeedIdentity, Arc<Slot>)>,
    activity: Arc<Activity>,
}

impl MutationScope {
    /// Identities covered by the scope, in lock order.
    pub fn identities(&self) -> Vec<FeedIdentity> {
        self.slots.iter().map(|(identity, _)| *identity).collect()
    }

    pub fn covers(&self, identity: &FeedIdentity) -> bool {
        self.slots.iter().any(|(covered, _)| covered == identity)
    }

    /// Acquire the scope's identity locks in lock order.
    pub async fn lock(&self) -> IdentityLocks {
        let mut guards = Vec::with_capacity(self.slots.len());
        for (_, slot) in &self.slots {
            guards.push(slot.lock.clone().lock_owned().await);
        }
        IdentityLocks { _guards: guards }
    }
}

impl Drop for MutationScope {
    fn drop(&mut self) {
        for (_, slot) in &self.slots {
            slot.pending.fetch_sub(1, Ordering::AcqRel);
        }
        self.activity.epoch.fetch_add(1, Ordering::AcqRel);
        if self.activity.active.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.activity.settled.notify_waiters();
        }
    }
}

/// Held per-identity locks, released on drop.
pub struct IdentityLocks {
    _guards: Vec<OwnedMutexGuard<()>>,
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use uuid::Uuid;

    use super::*;

    #[test]
    fn mutation_discards_earlier_fetches_and_suppresses_refresh() {
        let guard = ConsistencyGuard::new();
        let feed = FeedIdentity::global();
        let ticket = guard.begin_fetch(feed);
        assert!(guard.is_current(&ticket));

        let scope = guard.begin_mutation(&[feed]);
        assert!(!guard.is_current(&ticket));
        assert!(guard.begin_refresh(feed).is_none());
        let during = guard.begin_fetch(feed);
        assert!(!guard.is_current(&during));

        drop(scope);
        // Read while the write was in flight, so still stale.
        assert!(!guard.is_current(&during));
        let after = guard.begin_refresh(feed).expect("refresh allowed");
        assert!(guard.is_current(&after));
    }

    #[test]
    fn mutation_cancels_fetches_for_feeds_outside_its_scope() {
        let guard = ConsistencyGuard::new();
        let uncached = FeedIdentity::global();
        let cached = FeedIdentity::authored_by(Uuid::from_u128(3));
        let ticket = guard.begin_fetch(uncached);

        let scope = guard.begin_mutation(&[cached]);
        assert!(!scope.covers(&uncached));
        assert!(!guard.is_suppressed(&uncached));
        drop(scope);

        assert!(!guard.is_current(&ticket));
        assert!(guard.is_current(&guard.begin_fetch(uncached)));
    }

    #[tokio::test]
    async fn settled_waits_for_the_last_mutation() {
        let guard = ConsistencyGuard::new();
        guard.settled().await;

        let first = guard.begin_mutation(&[FeedIdentity::global()]);
        let second = guard.begin_mutation(&[]);
        assert!(guard.has_pending_mutations());

        tokio::join!(guard.settled(), async {
            drop(first);
            tokio::task::yield_now().await;
            assert!(guard.has_pending_mutations());
            drop(second);
        });
        assert!(!guard.has_pending_mutations());
    }

    #[test]
    fn overlapping_mutations_keep_suppression_until_both_settle() {
        let guard = ConsistencyGuard::new();
        let feed = FeedIdentity::global();
        let first = guard.begin_mutation(&[feed]);
        let second = guard.begin_mutation(&[feed, feed]);
        drop(first);
        assert!(guard.is_suppressed(&feed));
        drop(second);
        assert!(!guard.is_suppressed(&feed));
    }

    #[test]
    fn explicit_cancel_invalidates_tickets() {
        let guard = ConsistencyGuard::new();
        let feed = FeedIdentity::liked_by(Uuid::nil());
        let ticket = guard.begin_fetch(feed);
        guard.cancel_fetches(&feed);
        assert!(!guard.is_current(&ticket));
    }

    #[test]
    fn scope_identities_are_sorted_and_deduplicated() {
        let guard = ConsistencyGuard::new();
        let user = Uuid::from_u128(7);
        let scope = guard.begin_mutation(&[
            FeedIdentity::authored_by(user),
            FeedIdentity::global(),
            FeedIdentity::authored_by(user),
        ]);
        assert_eq!(
            scope.identities(),
            vec![FeedIdentity::global(), FeedIdentity::authored_by(user)]
        );
        assert!(scope.covers(&FeedIdentity::global()));
        assert!(!scope.covers(&FeedIdentity::liked_by(user)));
    }

    #[tokio::test]
    async fn opposite_order_lock_requests_do_not_deadlock() {
        let guard = Arc::new(ConsistencyGuard::new());
        let a = FeedIdentity::global();
        let b = FeedIdentity::liked_by(Uuid::from_u128(1));

        let mut tasks = Vec::new();
        for round in 0..50 {
            let guard = guard.clone();
            let order = if round % 2 == 0 { [a, b] } else { [b, a] };
            tasks.push(tokio::spawn(async move {
                let _locks = guard.lock(&order).await;
                tokio::task::yield_now().await;
            }));
        }

        let all = futures::future::join_all(tasks);
        let results = tokio::time::timeout(Duration::from_secs(5), all)
            .await
            .expect("no deadlock");
        assert!(results.into_iter().all(|result| result.is_ok()));
    }

    #[tokio::test]
    async fn exclusive_mutation_lifts_suppression_after_completion() {
        let guard = ConsistencyGuard::new();
        let feed = FeedIdentity::global();
        let seen = guard
            .with_exclusive_mutation(&[feed], |scope| async move {
                let _locks = scope.lock().await;
                scope.covers(&feed)
            })
            .await;
        assert!(seen);
        assert!(!guard.is_suppressed(&feed));
    }
}
