//! Per-mutation state machine: `Idle -> Pending -> {Committed, RolledBack}`.

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use thiserror::Error;

use crate::application::error::FeedError;
use crate::cache::Snapshot;
use crate::client::edit::FeedEdit;
use crate::domain::types::FeedIdentity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MutationId(pub u64);

impl Display for MutationId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "m{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    CreatePost,
    DeletePost,
    Like,
    Bookmark,
    Follow,
    UpdateProfile,
}

impl MutationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CreatePost => "create_post",
            Self::DeletePost => "delete_post",
            Self::Like => "like",
            Self::Bookmark => "bookmark",
            Self::Follow => "follow",
            Self::UpdateProfile => "update_profile",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationState {
    Idle,
    Pending,
    Committed,
    RolledBack,
}

impl MutationState {
    fn allows(self, next: MutationState) -> bool {
        matches!(
            (self, next),
            (MutationState::Idle, MutationState::Pending)
                | (MutationState::Pending, MutationState::Committed)
                | (MutationState::Pending, MutationState::RolledBack)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("illegal mutation transition {from:?} -> {to:?}")]
pub struct TransitionError {
    pub from: MutationState,
    pub to: MutationState,
}

/// One speculative edit together with everything needed to undo it.
#[derive(Debug)]
pub struct Mutation {
    id: MutationId,
    kind: MutationKind,
    state: MutationState,
    transitions: Vec<(MutationState, MutationState)>,
    snapshots: Vec<Snapshot>,
    applied_versions: BTreeMap<FeedIdentity, u64>,
    undo: Option<FeedEdit>,
    error: Option<FeedError>,
}

impl Mutation {
    pub fn new(id: MutationId, kind: MutationKind) -> Self {
        Self {
            id,
            kind,
            state: MutationState::Idle,
            transitions: Vec::new(),
            snapshots: Vec::new(),
            applied_versions: BTreeMap::new(),
            undo: None,
            error: None,
        }
    }

    pub fn id(&self) -> MutationId {
        self.id
    }

    pub fn kind(&self) -> MutationKind {
        self.kind
    }

    pub fn state(&self) -> MutationState {
        self.state
    }

    fn transition(&mut self, to: MutationState) -> Result<(), TransitionError> {
        if !self.state.allows(to) {
            return Err(TransitionError {
                from: self.state,
                to,
            });
        }
        self.transitions.push((self.state, to));
        self.state = to;
        Ok(())
    }

    /// Enter `Pending`. Called before the speculative edit is applied so a
    /// rejected transition leaves the cache untouched.
    pub fn begin(&mut self) -> Result<(), TransitionError> {
        self.transition(MutationState::Pending)
    }

    /// Record the applied speculative edit.
    ///
    /// `applied_versions` holds the entry versions right after the edit;
    /// rollback restores a snapshot only while its entry still has that version.
    pub fn record_edit(
        &mut self,
        snapshots: Vec<Snapshot>,
        applied_versions: BTreeMap<FeedIdentity, u64>,
        undo: Option<FeedEdit>,
    ) {
        self.snapshots = snapshots;
        self.applied_versions = applied_versions;
        self.undo = undo;
    }

    /// Enter `Committed` and discard the snapshots.
    pub fn commit(&mut self) -> Result<(), TransitionError> {
        self.transition(MutationState::Committed)?;
        self.snapshots.clear();
        self.undo = None;
        Ok(())
    }

    /// Enter `RolledBack`, handing over what the caller needs to undo the edit.
    pub fn roll_back(&mut self, error: FeedError) -> Result<RollbackPlan, TransitionError> {
        self.transition(MutationState::RolledBack)?;
        self.error = Some(error);
        Ok(RollbackPlan {
            snapshots: std::mem::take(&mut self.snapshots),
            applied_versions: std::mem::take(&mut self.applied_versions),
            undo: self.undo.take(),
        })
    }

    /// Record a failure that happened before anything was applied.
    pub fn abandon(&mut self, error: FeedError) {
        self.error = Some(error);
    }

    pub fn touched(&self) -> Vec<FeedIdentity> {
        self.applied_versions.keys().copied().collect()
    }

    pub fn report(&self, touched: Vec<FeedIdentity>) -> MutationReport {
        MutationReport {
            id: self.id,
            kind: self.kind,
            state: self.state,
            transitions: self.transitions.clone(),
            touched,
            error: self.error.clone(),
        }
    }
}

/// Snapshots and compensation handed over on rollback.
#[derive(Debug)]
pub struct RollbackPlan {
    pub snapshots: Vec<Snapshot>,
    pub applied_versions: BTreeMap<FeedIdentity, u64>,
    pub undo: Option<FeedEdit>,
}

/// Final account of a settled mutation.
#[derive(Debug, Clone, PartialEq)]
pub struct MutationReport {
    pub id: MutationId,
    pub kind: MutationKind,
    pub state: MutationState,
    pub transitions: Vec<(MutationState, MutationState)>,
    /// Feed identities the speculative edit changed.
    pub touched: Vec<FeedIdentity>,
    pub error: Option<FeedError>,
}

impl MutationReport {
    pub fn is_committed(&self) -> bool {
        self.state == MutationState::Committed
    }

    pub fn is_rolled_back(&self) -> bool {
        self.state == MutationState::RolledBack
    }
}

/// A settled mutation plus the value the backing write returned, if it succeeded.
#[derive(Debug, Clone)]
pub struct Settled<T> {
    pub report: MutationReport,
    pub value: Option<T>,
}
