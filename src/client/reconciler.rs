//! Mutation reconciler.
//!
//! Every mutation runs the same sequence under the consistency guard:
//!
//! 1. cancel fetches and suppress refreshes for every cached identity;
//! 2. with the identity locks held, snapshot the entries, apply the
//!    speculative edit and enter `Pending`;
//! 3. release the locks and await the backing write;
//! 4. with the locks held again, commit (merging server-computed fields) or
//!    roll back.
//!
//! Rollback writes a snapshot back verbatim only while its entry still carries
//! the version this mutation produced. Otherwise a later mutation has edited
//! the entry meanwhile and the inverse edit is applied instead, so an older
//! failure never erases a newer edit.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use feedline_api_types::{
    Author, CreatePostRequest, CurrentUser, Post, UpdateProfileRequest, UserProfile,
};
use metrics::counter;
use time::OffsetDateTime;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::application::error::FeedError;
use crate::cache::{ConsistencyGuard, FeedStore, RestoreOutcome, Snapshot};
use crate::client::backend::FeedWriter;
use crate::client::edit::FeedEdit;
use crate::client::mutation::{
    Mutation, MutationId, MutationKind, MutationReport, MutationState, Settled,
};
use crate::client::notify::{Notifier, Toast};
use crate::domain::types::FeedIdentity;
use crate::domain::{posts, users};

const METRIC_MUTATION_COMMITTED: &str = "feedline_mutation_committed_total";
const METRIC_MUTATION_ROLLED_BACK: &str = "feedline_mutation_rolled_back_total";

const DELETE_FAILED_MESSAGE: &str = "Failed to delete post. Please try again.";

/// Speculative edit, its compensation and the toast raised on commit.
struct Plan {
    edit: FeedEdit,
    undo: Option<FeedEdit>,
    success: Option<Toast>,
}

#[derive(Debug, Default, Clone, Copy)]
struct FailurePolicy {
    /// A vanished target already has the intended end state.
    not_found_is_success: bool,
    transient_message: Option<&'static str>,
}

pub struct MutationReconciler {
    writer: Arc<dyn FeedWriter>,
    store: Arc<FeedStore>,
    guard: Arc<ConsistencyGuard>,
    notifier: Arc<dyn Notifier>,
    viewer: CurrentUser,
    sequence: AtomicU64,
}

impl MutationReconciler {
    pub fn new(
        writer: Arc<dyn FeedWriter>,
        store: Arc<FeedStore>,
        guard: Arc<ConsistencyGuard>,
        notifier: Arc<dyn Notifier>,
        viewer: CurrentUser,
    ) -> Self {
        Self {
            writer,
            store,
            guard,
            notifier,
            viewer,
            sequence: AtomicU64::new(0),
        }
    }

    pub fn viewer(&self) -> &CurrentUser {
        &self.viewer
    }

    /// Show a provisional post at the top of the global feed and the viewer's
    /// own feed, replaced by the server's post on commit.
    pub async fn create_post(&self, request: CreatePostRequest) -> Settled<Post> {
        let provisional_id = Uuid::new_v4();
        let viewer = self.viewer.clone();
        self.execute(
            MutationKind::CreatePost,
            |store| {
                let content = posts::normalize_content(&request.content)?;
                posts::check_attachment_count(request.media_ids.len())?;
                let author = store
                    .find_author(viewer.id)
                    .unwrap_or_else(|| fallback_author(&viewer));
                let provisional = Post {
                    id: provisional_id,
                    content,
                    created_at: OffsetDateTime::now_utc(),
                    author,
                    attachments: Vec::new(),
                    likes: 0,
                    is_liked_by_user: false,
                    is_bookmarked_by_user: false,
                    comments: 0,
                };
                let plan = Plan {
                    edit: FeedEdit::InsertAtTop {
                        targets: vec![
                            FeedIdentity::global(),
                            FeedIdentity::authored_by(viewer.id),
                        ],
                        post: provisional,
                    },
                    undo: Some(FeedEdit::Remove {
                        post_id: provisional_id,
                    }),
                    success: None,
                };
                Ok((plan, request))
            },
            |request| self.writer.create_post(request),
            |created| {
                Some(FeedEdit::Replace {
                    post_id: provisional_id,
                    post: created.clone(),
                })
            },
            FailurePolicy::default(),
        )
        .await
    }

    /// Remove a post from every cached feed. A post that is already gone counts as deleted.
    pub async fn delete_post(&self, post_id: Uuid) -> Settled<Post> {
        self.execute(
            MutationKind::DeletePost,
            |store| {
                let plan = Plan {
                    edit: FeedEdit::Remove { post_id },
                    undo: store
                        .find_post(post_id)
                        .map(|post| FeedEdit::Reinsert { post }),
                    success: Some(Toast::success("Post deleted")),
                };
                Ok((plan, ()))
            },
            |()| self.writer.delete_post(post_id),
            |_| None,
            FailurePolicy {
                not_found_is_success: true,
                transient_message: Some(DELETE_FAILED_MESSAGE),
            },
        )
        .await
    }

    /// Flip the like state the cache currently shows. The post must be cached.
    pub async fn toggle_like(&self, post_id: Uuid) -> MutationReport {
        self.like(post_id, None).await
    }

    pub async fn set_like(&self, post_id: Uuid, liked: bool) -> MutationReport {
        self.like(post_id, Some(liked)).await
    }

    async fn like(&self, post_id: Uuid, target: Option<bool>) -> MutationReport {
        self.execute(
            MutationKind::Like,
            |store| {
                let liked = match target {
                    Some(liked) => liked,
                    None => {
                        !store
                            .find_post(post_id)
                            .ok_or(FeedError::NotFound)?
                            .is_liked_by_user
                    }
                };
                let plan = Plan {
                    edit: FeedEdit::SetLike { post_id, liked },
                    undo: Some(FeedEdit::SetLike {
                        post_id,
                        liked: !liked,
                    }),
                    success: None,
                };
                Ok((plan, liked))
            },
            |liked| self.writer.set_like(post_id, liked),
            |_| None,
            FailurePolicy::default(),
        )
        .await
        .report
    }

    pub async fn toggle_bookmark(&self, post_id: Uuid) -> MutationReport {
        self.bookmark(post_id, None).await
    }

    pub async fn set_bookmark(&self, post_id: Uuid, bookmarked: bool) -> MutationReport {
        self.bookmark(post_id, Some(bookmarked)).await
    }

    async fn bookmark(&self, post_id: Uuid, target: Option<bool>) -> MutationReport {
        self.execute(
            MutationKind::Bookmark,
            |store| {
                let bookmarked = match target {
                    Some(bookmarked) => bookmarked,
                    None => {
                        !store
                            .find_post(post_id)
                            .ok_or(FeedError::NotFound)?
                            .is_bookmarked_by_user
                    }
                };
                let message = if bookmarked {
                    "Post bookmarked"
                } else {
                    "Post unbookmarked"
                };
                let plan = Plan {
                    edit: FeedEdit::SetBookmark {
                        post_id,
                        bookmarked,
                    },
                    undo: Some(FeedEdit::SetBookmark {
                        post_id,
                        bookmarked: !bookmarked,
                    }),
                    success: Some(Toast::success(message)),
                };
                Ok((plan, bookmarked))
            },
            |bookmarked| self.writer.set_bookmark(post_id, bookmarked),
            |_| None,
            FailurePolicy::default(),
        )
        .await
        .report
    }

    pub async fn toggle_follow(&self, user_id: Uuid) -> MutationReport {
        self.follow(user_id, None).await
    }

    pub async fn set_follow(&self, user_id: Uuid, following: bool) -> MutationReport {
        self.follow(user_id, Some(following)).await
    }

    async fn follow(&self, user_id: Uuid, target: Option<bool>) -> MutationReport {
        let viewer_id = self.viewer.id;
        self.execute(
            MutationKind::Follow,
            |store| {
                if user_id == viewer_id {
                    return Err(FeedError::validation("users cannot follow themselves"));
                }
                let following = match target {
                    Some(following) => following,
                    None => {
                        !store
                            .find_author(user_id)
                            .ok_or(FeedError::NotFound)?
                            .is_followed_by_user
                    }
                };
                let plan = Plan {
                    edit: FeedEdit::SetFollow { user_id, following },
                    undo: Some(FeedEdit::SetFollow {
                        user_id,
                        following: !following,
                    }),
                    success: None,
                };
                Ok((plan, following))
            },
            |following| self.writer.set_follow(user_id, following),
            |_| None,
            FailurePolicy::default(),
        )
        .await
        .report
    }

    /// Patch the viewer's author summary in every cached post. The server
    /// resolves the avatar URL, merged in on commit.
    pub async fn update_profile(&self, request: UpdateProfileRequest) -> Settled<UserProfile> {
        let viewer_id = self.viewer.id;
        self.execute(
            MutationKind::UpdateProfile,
            |store| {
                let display_name = users::normalize_display_name(&request.display_name)?;
                users::normalize_bio(request.bio.as_deref())?;
                let current = store.find_author(viewer_id);
                let plan = Plan {
                    edit: FeedEdit::PatchAuthor {
                        user_id: viewer_id,
                        display_name,
                        avatar_url: current.as_ref().and_then(|author| author.avatar_url.clone()),
                    },
                    undo: current.map(|author| FeedEdit::PatchAuthor {
                        user_id: viewer_id,
                        display_name: author.display_name,
                        avatar_url: author.avatar_url,
                    }),
                    success: Some(Toast::success("Profile updated")),
                };
                Ok((plan, request))
            },
            |request| self.writer.update_profile(request),
            |profile| {
                Some(FeedEdit::PatchAuthor {
                    user_id: viewer_id,
                    display_name: profile.display_name.clone(),
                    avatar_url: profile.avatar_url.clone(),
                })
            },
            FailurePolicy::default(),
        )
        .await
    }

    async fn execute<A, T, P, W, Fut, M>(
        &self,
        kind: MutationKind,
        plan: P,
        write: W,
        merge: M,
        policy: FailurePolicy,
    ) -> Settled<T>
    where
        P: FnOnce(&FeedStore) -> Result<(Plan, A), FeedError>,
        W: FnOnce(A) -> Fut,
        Fut: Future<Output = Result<T, FeedError>>,
        M: FnOnce(&T) -> Option<FeedEdit>,
    {
        let id = MutationId(self.sequence.fetch_add(1, Ordering::Relaxed) + 1);
        let mut mutation = Mutation::new(id, kind);
        let scope = self.guard.begin_mutation(&self.store.identities());
        let identities = scope.identities();

        let (argument, success) = {
            let _locks = scope.lock().await;
            let (plan, argument) = match plan(self.store.as_ref()) {
                Ok(prepared) => prepared,
                Err(err) => {
                    debug!(mutation = %id, kind = kind.as_str(), error = %err, "mutation rejected before apply");
                    self.notifier
                        .notify(Toast::for_failure(&err, policy.transient_message));
                    mutation.abandon(err);
                    return Settled {
                        report: mutation.report(Vec::new()),
                        value: None,
                    };
                }
            };
            if let Err(report) = start(&mut mutation) {
                if let Some(err) = &report.error {
                    self.notifier
                        .notify(Toast::for_failure(err, policy.transient_message));
                }
                return Settled {
                    report,
                    value: None,
                };
            }

            let snapshots: Vec<Snapshot> = identities
                .iter()
                .filter_map(|identity| self.store.snapshot(identity))
                .collect();
            let applied: BTreeMap<FeedIdentity, u64> = plan
                .edit
                .apply(&self.store, &identities)
                .into_iter()
                .filter_map(|identity| {
                    self.store
                        .version_of(&identity)
                        .map(|version| (identity, version))
                })
                .collect();
            let snapshots = snapshots
                .into_iter()
                .filter(|snapshot| applied.contains_key(&snapshot.identity()))
                .collect();

            mutation.record_edit(snapshots, applied, plan.undo);
            (argument, plan.success)
        };
        let touched = mutation.touched();
        debug!(
            mutation = %id,
            kind = kind.as_str(),
            touched = touched.len(),
            "speculative edit applied"
        );

        let result = write(argument).await;

        let _locks = scope.lock().await;
        let value = match result {
            Ok(value) => {
                if let Some(edit) = merge(&value) {
                    edit.apply(&self.store, &identities);
                }
                self.commit(&mut mutation, success);
                Some(value)
            }
            Err(FeedError::NotFound) if policy.not_found_is_success => {
                debug!(mutation = %id, kind = kind.as_str(), "target already gone");
                self.commit(&mut mutation, success);
                None
            }
            Err(err) => {
                self.roll_back(&mut mutation, err, policy);
                None
            }
        };

        Settled {
            report: mutation.report(touched),
            value,
        }
    }

    fn commit(&self, mutation: &mut Mutation, success: Option<Toast>) {
        if let Err(err) = mutation.commit() {
            error!(mutation = %mutation.id(), error = %err, "mutation state machine rejected commit");
            return;
        }
        counter!(METRIC_MUTATION_COMMITTED, "kind" => mutation.kind().as_str()).increment(1);
        info!(mutation = %mutation.id(), kind = mutation.kind().as_str(), "mutation committed");
        if let Some(toast) = success {
            self.notifier.notify(toast);
        }
    }

    fn roll_back(&self, mutation: &mut Mutation, failure: FeedError, policy: FailurePolicy) {
        let plan = match mutation.roll_back(failure.clone()) {
            Ok(plan) => plan,
            Err(err) => {
                error!(mutation = %mutation.id(), error = %err, "mutation state machine rejected rollback");
                return;
            }
        };

        for snapshot in &plan.snapshots {
            let identity = snapshot.identity();
            let Some(expected) = plan.applied_versions.get(&identity) else {
                continue;
            };
            match self.store.restore_if_version(snapshot, *expected) {
                RestoreOutcome::Restored => {
                    debug!(mutation = %mutation.id(), feed = %identity, "snapshot restored");
                }
                RestoreOutcome::Stale => {
                    debug!(
                        mutation = %mutation.id(),
                        feed = %identity,
                        "entry changed since the edit; applying inverse edit"
                    );
                    if let Some(undo) = &plan.undo {
                        undo.apply(&self.store, &[identity]);
                    }
                }
                RestoreOutcome::Missing => {}
            }
        }

        debug_assert_eq!(mutation.state(), MutationState::RolledBack);
        counter!(METRIC_MUTATION_ROLLED_BACK, "kind" => mutation.kind().as_str()).increment(1);
        warn!(
            mutation = %mutation.id(),
            kind = mutation.kind().as_str(),
            error = %failure,
            "mutation rolled back"
        );
        self.notifier
            .notify(Toast::for_failure(&failure, policy.transient_message));
    }
}

/// Enter `Pending`, or abandon `mutation` when the state machine refuses.
fn start(mutation: &mut Mutation) -> Result<(), MutationReport> {
    if let Err(err) = mutation.begin() {
        error!(mutation = %mutation.id(), error = %err, "mutation state machine rejected begin");
        mutation.abandon(FeedError::server(err.to_string()));
        return Err(mutation.report(Vec::new()));
    }
    Ok(())
}

fn fallback_author(viewer: &CurrentUser) -> Author {
    Author {
        id: viewer.id,
        username: viewer.username.clone(),
        display_name: viewer.username.clone(),
        avatar_url: None,
        followers: 0,
        is_followed_by_user: false,
    }
}
