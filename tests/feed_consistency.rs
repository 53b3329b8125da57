//! Client cache consistency against the in-process backend.
//!
//! The gated backend parks backing writes (and optionally reads) until the
//! test releases them, so the speculative cache state can be observed while
//! a mutation is still pending. Reads take their server snapshot before
//! parking, so a released read carries whatever was true when it started.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use feedline::application::error::FeedError;
use feedline::application::feed::FeedService;
use feedline::application::session::SessionUser;
use feedline::application::social::SocialService;
use feedline::cache::CacheConfig;
use feedline::client::{
    FeedClient, FeedSource, FeedWriter, LoadOutcome, LocalBackend, MutationState,
    RecordingNotifier,
};
use feedline::domain::types::FeedIdentity;
use feedline::infra::memory::InMemoryRepositories;
use feedline_api_types::{
    BookmarkInfo, CreatePostRequest, CurrentUser, FollowerInfo, LikeInfo, Post, PostsPage,
    UpdateProfileRequest, UserProfile,
};
use time::{Duration, OffsetDateTime};
use tokio::sync::Semaphore;
use uuid::Uuid;

struct GatedBackend {
    inner: LocalBackend,
    writes_gated: AtomicBool,
    reads_gated: AtomicBool,
    write_gate: Semaphore,
    read_gate: Semaphore,
    writes_started: AtomicUsize,
    reads_started: AtomicUsize,
    failure: Mutex<Option<FeedError>>,
}

impl GatedBackend {
    fn new(inner: LocalBackend) -> Self {
        Self {
            inner,
            writes_gated: AtomicBool::new(false),
            reads_gated: AtomicBool::new(false),
            write_gate: Semaphore::new(0),
            read_gate: Semaphore::new(0),
            writes_started: AtomicUsize::new(0),
            reads_started: AtomicUsize::new(0),
            failure: Mutex::new(None),
        }
    }

    fn gate_writes(&self) {
        self.writes_gated.store(true, Ordering::SeqCst);
    }

    fn gate_reads(&self) {
        self.reads_gated.store(true, Ordering::SeqCst);
    }

    fn release_writes(&self, count: usize) {
        self.write_gate.add_permits(count);
    }

    fn release_reads(&self, count: usize) {
        self.read_gate.add_permits(count);
    }

    fn fail_next_write(&self, error: FeedError) {
        *self.failure.lock().expect("failure slot") = Some(error);
    }

    async fn wait_for_writes(&self, count: usize) {
        while self.writes_started.load(Ordering::SeqCst) < count {
            tokio::task::yield_now().await;
        }
    }

    async fn wait_for_reads(&self, count: usize) {
        while self.reads_started.load(Ordering::SeqCst) < count {
            tokio::task::yield_now().await;
        }
    }

    fn reads(&self) -> usize {
        self.reads_started.load(Ordering::SeqCst)
    }

    async fn pass_write(&self) -> Result<(), FeedError> {
        self.writes_started.fetch_add(1, Ordering::SeqCst);
        if self.writes_gated.load(Ordering::SeqCst) {
            self.write_gate
                .acquire()
                .await
                .map_err(|err| FeedError::network(err.to_string()))?
                .forget();
        }
        match self.failure.lock().expect("failure slot").take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl FeedSource for GatedBackend {
    async fn current_user(&self) -> Result<CurrentUser, FeedError> {
        self.inner.current_user().await
    }

    async fn fetch_feed(
        &self,
        identity: FeedIdentity,
        cursor: Option<&str>,
        page_size: u32,
    ) -> Result<PostsPage, FeedError> {
        // Server state is read before parking, like a response still on the wire.
        let page = self.inner.fetch_feed(identity, cursor, page_size).await;
        self.reads_started.fetch_add(1, Ordering::SeqCst);
        if self.reads_gated.load(Ordering::SeqCst) {
            self.read_gate
                .acquire()
                .await
                .map_err(|err| FeedError::network(err.to_string()))?
                .forget();
        }
        page
    }
}

#[async_trait]
impl FeedWriter for GatedBackend {
    async fn create_post(&self, request: CreatePostRequest) -> Result<Post, FeedError> {
        self.pass_write().await?;
        self.inner.create_post(request).await
    }

    async fn delete_post(&self, post_id: Uuid) -> Result<Post, FeedError> {
        self.pass_write().await?;
        self.inner.delete_post(post_id).await
    }

    async fn set_like(&self, post_id: Uuid, liked: bool) -> Result<LikeInfo, FeedError> {
        self.pass_write().await?;
        self.inner.set_like(post_id, liked).await
    }

    async fn set_bookmark(
        &self,
        post_id: Uuid,
        bookmarked: bool,
    ) -> Result<BookmarkInfo, FeedError> {
        self.pass_write().await?;
        self.inner.set_bookmark(post_id, bookmarked).await
    }

    async fn set_follow(&self, user_id: Uuid, following: bool) -> Result<FollowerInfo, FeedError> {
        self.pass_write().await?;
        self.inner.set_follow(user_id, following).await
    }

    async fn update_profile(
        &self,
        request: UpdateProfileRequest,
    ) -> Result<UserProfile, FeedError> {
        self.pass_write().await?;
        self.inner.update_profile(request).await
    }
}

struct Fixture {
    repos: Arc<InMemoryRepositories>,
    backend: Arc<GatedBackend>,
    notifier: Arc<RecordingNotifier>,
    client: FeedClient,
    viewer: SessionUser,
    author: Uuid,
}

fn services(repos: &Arc<InMemoryRepositories>) -> (FeedService, SocialService) {
    let feed = FeedService::new(repos.clone());
    let social = SocialService::new(
        repos.clone(),
        repos.clone(),
        repos.clone(),
        repos.clone(),
        repos.clone(),
    );
    (feed, social)
}

async fn fixture(page_size: u32) -> Fixture {
    let repos = Arc::new(InMemoryRepositories::new());
    let viewer_id = repos.add_user("viewer", "Viewer");
    let author = repos.add_user("author", "Author");
    let viewer = SessionUser {
        id: viewer_id,
        username: "viewer".to_string(),
    };

    let (feed, social) = services(&repos);
    let backend = Arc::new(GatedBackend::new(LocalBackend::new(
        feed,
        social,
        Some(viewer.clone()),
    )));
    let notifier = Arc::new(RecordingNotifier::new());
    let client = FeedClient::connect(
        backend.clone(),
        CacheConfig {
            max_feeds: 8,
            page_size,
        },
        notifier.clone(),
    )
    .await
    .expect("client connects");

    Fixture {
        repos,
        backend,
        notifier,
        client,
        viewer,
        author,
    }
}

/// `count` posts by `author`, oldest first, one minute apart.
fn seed_posts(repos: &InMemoryRepositories, author: Uuid, count: usize) -> Vec<Uuid> {
    let start = OffsetDateTime::now_utc() - Duration::hours(2);
    (0..count)
        .map(|n| repos.add_post_at(author, &format!("post {n}"), start + Duration::minutes(n as i64)))
        .collect()
}

/// A post with ten likes from other users, none from the viewer.
fn post_with_ten_likes(repos: &InMemoryRepositories, author: Uuid) -> Uuid {
    let post = repos.add_post(author, "popular");
    for n in 0..10 {
        let fan = repos.add_user(&format!("fan{n}"), "Fan");
        repos.add_like(fan, post);
    }
    post
}

fn cached_post(client: &FeedClient, identity: FeedIdentity, post_id: Uuid) -> Option<Post> {
    client
        .store()
        .get(&identity)
        .and_then(|entry| entry.find(post_id).cloned())
}

fn like_state(client: &FeedClient, post_id: Uuid) -> (u64, bool) {
    let post = cached_post(client, FeedIdentity::global(), post_id).expect("post cached");
    (post.likes, post.is_liked_by_user)
}

#[tokio::test]
async fn loading_every_page_yields_each_post_once_in_order() {
    let fx = fixture(10).await;
    let mut expected = seed_posts(&fx.repos, fx.author, 25);
    expected.reverse();
    let loader = fx.client.loader();
    let global = FeedIdentity::global();

    loader.load(global).await.expect("first page");

    // Changes after the first page was fetched must not disturb the rest.
    fx.repos.add_post(fx.author, "brand new");
    assert!(fx.repos.remove_post(expected[3]));

    loop {
        match loader.load_more(global).await.expect("next page") {
            LoadOutcome::Exhausted => break,
            LoadOutcome::Applied(_) => {}
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    let entry = fx.client.store().get(&global).expect("cached");
    let seen: Vec<Uuid> = entry.posts().map(|post| post.id).collect();
    assert_eq!(seen, expected);
    let unique: HashSet<Uuid> = seen.iter().copied().collect();
    assert_eq!(unique.len(), seen.len());
    assert_eq!(entry.pages().len(), 3);
}

#[tokio::test]
async fn cursor_never_pulls_in_newer_posts() {
    let repos = Arc::new(InMemoryRepositories::new());
    let author = repos.add_user("author", "Author");
    let viewer = SessionUser {
        id: author,
        username: "author".to_string(),
    };
    seed_posts(&repos, author, 6);
    let (feed, _) = services(&repos);

    let first = feed
        .resolve(Some(&viewer), FeedIdentity::global(), None, Some(3))
        .await
        .expect("first page");
    let cursor = first.next_cursor.expect("more pages");

    let fresh = repos.add_post(author, "fresh");
    let second = feed
        .resolve(Some(&viewer), FeedIdentity::global(), Some(cursor.as_str()), Some(3))
        .await
        .expect("second page");

    assert_eq!(second.posts.len(), 3);
    assert!(second.posts.iter().all(|post| post.id != fresh));
    assert!(!second.restarted);
}

#[tokio::test]
async fn like_applies_immediately_and_survives_commit() {
    let fx = fixture(10).await;
    let post = post_with_ten_likes(&fx.repos, fx.author);
    fx.client
        .loader()
        .load(FeedIdentity::global())
        .await
        .expect("loaded");
    assert_eq!(like_state(&fx.client, post), (10, false));

    fx.backend.gate_writes();
    let (report, ()) = tokio::join!(fx.client.reconciler().toggle_like(post), async {
        fx.backend.wait_for_writes(1).await;
        assert_eq!(like_state(&fx.client, post), (11, true));
        fx.backend.release_writes(1);
    });

    assert_eq!(report.state, MutationState::Committed);
    assert_eq!(
        report.transitions,
        vec![
            (MutationState::Idle, MutationState::Pending),
            (MutationState::Pending, MutationState::Committed)
        ]
    );
    assert_eq!(like_state(&fx.client, post), (11, true));
    assert!(fx.notifier.errors().is_empty());
}

#[tokio::test]
async fn failed_like_reverts_exactly_and_notifies_once() {
    let fx = fixture(10).await;
    let post = post_with_ten_likes(&fx.repos, fx.author);
    fx.client
        .loader()
        .load(FeedIdentity::global())
        .await
        .expect("loaded");

    fx.backend.gate_writes();
    fx.backend.fail_next_write(FeedError::network("connection reset"));
    let (report, ()) = tokio::join!(fx.client.reconciler().toggle_like(post), async {
        fx.backend.wait_for_writes(1).await;
        assert_eq!(like_state(&fx.client, post), (11, true));
        fx.backend.release_writes(1);
    });

    assert!(report.is_rolled_back());
    assert_eq!(like_state(&fx.client, post), (10, false));
    let errors = fx.notifier.errors();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].retryable);
}

#[tokio::test]
async fn delete_leaves_every_feed_in_one_step_and_keeps_cursors() {
    let fx = fixture(2).await;
    let own = seed_posts(&fx.repos, fx.viewer.id, 5);
    let doomed = own[4];
    for post in &own {
        fx.repos.add_like(fx.viewer.id, *post);
    }

    let global = FeedIdentity::global();
    let liked = FeedIdentity::liked_by(fx.viewer.id);
    let loader = fx.client.loader();
    loader.load(global).await.expect("global");
    loader.load(liked).await.expect("liked");

    let cursor_of = |identity: FeedIdentity| {
        fx.client
            .store()
            .get(&identity)
            .and_then(|entry| entry.next_cursor().map(str::to_owned))
    };
    let global_cursor = cursor_of(global);
    let liked_cursor = cursor_of(liked);
    assert!(global_cursor.is_some() && liked_cursor.is_some());
    assert!(cached_post(&fx.client, global, doomed).is_some());
    assert!(cached_post(&fx.client, liked, doomed).is_some());

    fx.backend.gate_writes();
    let (settled, ()) = tokio::join!(fx.client.reconciler().delete_post(doomed), async {
        fx.backend.wait_for_writes(1).await;
        assert!(cached_post(&fx.client, global, doomed).is_none());
        assert!(cached_post(&fx.client, liked, doomed).is_none());
        fx.backend.release_writes(1);
    });

    assert!(settled.report.is_committed());
    assert!(settled.report.touched.contains(&global));
    assert!(settled.report.touched.contains(&liked));
    assert_eq!(cursor_of(global), global_cursor);
    assert_eq!(cursor_of(liked), liked_cursor);
    assert!(
        fx.notifier
            .toasts()
            .iter()
            .any(|toast| toast.message == "Post deleted")
    );
}

#[tokio::test]
async fn double_toggle_before_settling_is_a_net_no_op() {
    let fx = fixture(10).await;
    let post = post_with_ten_likes(&fx.repos, fx.author);
    fx.client
        .loader()
        .load(FeedIdentity::global())
        .await
        .expect("loaded");

    fx.backend.gate_writes();
    let reconciler = fx.client.reconciler();
    let (first, second, ()) = tokio::join!(
        reconciler.toggle_like(post),
        reconciler.toggle_like(post),
        async {
            fx.backend.wait_for_writes(2).await;
            assert_eq!(like_state(&fx.client, post), (10, false));
            fx.backend.release_writes(2);
        }
    );

    assert!(first.is_committed());
    assert!(second.is_committed());
    assert_eq!(like_state(&fx.client, post), (10, false));
}

#[tokio::test]
async fn stale_rollback_keeps_the_other_mutation() {
    let fx = fixture(10).await;
    let post = post_with_ten_likes(&fx.repos, fx.author);
    fx.client
        .loader()
        .load(FeedIdentity::global())
        .await
        .expect("loaded");

    fx.backend.gate_writes();
    fx.backend.fail_next_write(FeedError::server("boom"));
    let reconciler = fx.client.reconciler();
    let (like, bookmark, ()) = tokio::join!(
        reconciler.toggle_like(post),
        reconciler.set_bookmark(post, true),
        async {
            fx.backend.wait_for_writes(2).await;
            fx.backend.release_writes(2);
        }
    );

    assert!(like.is_rolled_back());
    assert!(bookmark.is_committed());
    let cached = cached_post(&fx.client, FeedIdentity::global(), post).expect("cached");
    assert_eq!((cached.likes, cached.is_liked_by_user), (10, false));
    assert!(cached.is_bookmarked_by_user);
}

#[tokio::test]
async fn refresh_is_suppressed_while_a_mutation_is_pending() {
    let fx = fixture(10).await;
    let post = post_with_ten_likes(&fx.repos, fx.author);
    let global = FeedIdentity::global();
    let loader = fx.client.loader();
    loader.load(global).await.expect("loaded");

    fx.backend.gate_writes();
    let (report, outcome) = tokio::join!(fx.client.reconciler().toggle_like(post), async {
        fx.backend.wait_for_writes(1).await;
        let outcome = loader.refresh(global).await.expect("refresh");
        fx.backend.release_writes(1);
        outcome
    });

    assert!(report.is_committed());
    assert_eq!(outcome, LoadOutcome::Suppressed);
    assert_eq!(like_state(&fx.client, post), (11, true));
}

#[tokio::test]
async fn fetch_overtaken_by_a_mutation_is_discarded() {
    let fx = fixture(10).await;
    let post = post_with_ten_likes(&fx.repos, fx.author);
    let global = FeedIdentity::global();
    let loader = fx.client.loader();
    loader.load(global).await.expect("loaded");

    fx.backend.gate_reads();
    let (outcome, report) = tokio::join!(loader.refresh(global), async {
        fx.backend.wait_for_reads(2).await;
        let report = fx.client.reconciler().set_bookmark(post, true).await;
        fx.backend.release_reads(1);
        report
    });

    assert!(report.is_committed());
    assert_eq!(outcome.expect("refresh"), LoadOutcome::Discarded);
    let cached = cached_post(&fx.client, global, post).expect("cached");
    assert!(cached.is_bookmarked_by_user);
}

#[tokio::test]
async fn first_load_overlapped_by_a_mutation_is_refetched() {
    let fx = fixture(10).await;
    let post = seed_posts(&fx.repos, fx.author, 1)[0];
    let global = FeedIdentity::global();
    let authored = FeedIdentity::authored_by(fx.author);
    let loader = fx.client.loader();
    loader.load(authored).await.expect("authored");

    // The global feed is not cached yet, so the like cannot patch it.
    fx.backend.gate_reads();
    let (outcome, report) = tokio::join!(loader.load(global), async {
        fx.backend.wait_for_reads(2).await;
        let report = fx.client.reconciler().toggle_like(post).await;
        fx.backend.release_reads(2);
        report
    });

    assert!(report.is_committed());
    let outcome = outcome.expect("load");
    assert!(matches!(outcome, LoadOutcome::Applied(_)), "{outcome:?}");
    assert_eq!(fx.backend.reads(), 3);
    assert_eq!(like_state(&fx.client, post), (1, true));
    let authored_copy = cached_post(&fx.client, authored, post).expect("authored copy");
    assert_eq!((authored_copy.likes, authored_copy.is_liked_by_user), (1, true));
}

#[tokio::test]
async fn next_page_waits_for_a_pending_mutation() {
    let fx = fixture(10).await;
    let oldest = seed_posts(&fx.repos, fx.author, 15)[0];
    let global = FeedIdentity::global();
    let loader = fx.client.loader();
    loader.load(global).await.expect("first page");
    assert!(cached_post(&fx.client, global, oldest).is_none());

    fx.backend.gate_writes();
    let (report, outcome, ()) = tokio::join!(
        fx.client.reconciler().set_like(oldest, true),
        async {
            fx.backend.wait_for_writes(1).await;
            loader.load_more(global).await
        },
        async {
            fx.backend.wait_for_writes(1).await;
            for _ in 0..8 {
                tokio::task::yield_now().await;
            }
            assert_eq!(fx.backend.reads(), 1, "next page fetched before the like settled");
            fx.backend.release_writes(1);
        }
    );

    assert!(report.is_committed());
    let outcome = outcome.expect("load more");
    let entry = outcome.entry().expect("applied entry");
    assert_eq!(entry.pages().len(), 2);
    assert_eq!(like_state(&fx.client, oldest), (1, true));
}

#[tokio::test]
async fn next_page_overlapped_by_a_mutation_is_refetched() {
    let fx = fixture(10).await;
    let oldest = seed_posts(&fx.repos, fx.author, 15)[0];
    let global = FeedIdentity::global();
    let loader = fx.client.loader();
    loader.load(global).await.expect("first page");

    fx.backend.gate_reads();
    let (outcome, report) = tokio::join!(loader.load_more(global), async {
        fx.backend.wait_for_reads(2).await;
        let report = fx.client.reconciler().set_like(oldest, true).await;
        fx.backend.release_reads(2);
        report
    });

    assert!(report.is_committed());
    let outcome = outcome.expect("load more");
    assert!(matches!(outcome, LoadOutcome::Applied(_)), "{outcome:?}");
    assert_eq!(fx.backend.reads(), 3);
    let entry = fx.client.store().get(&global).expect("cached");
    assert_eq!(entry.len(), 15);
    assert_eq!(like_state(&fx.client, oldest), (1, true));
}

#[tokio::test]
async fn created_post_is_replaced_by_the_server_copy() {
    let fx = fixture(10).await;
    seed_posts(&fx.repos, fx.author, 2);
    let global = FeedIdentity::global();
    let own = FeedIdentity::authored_by(fx.viewer.id);
    fx.client.loader().load(global).await.expect("global");
    fx.client.loader().load(own).await.expect("own");

    let settled = fx
        .client
        .reconciler()
        .create_post(CreatePostRequest {
            content: "  fresh off the press ".to_string(),
            media_ids: Vec::new(),
        })
        .await;

    let server = settled.value.expect("server post");
    assert!(settled.report.is_committed());
    for identity in [global, own] {
        let entry = fx.client.store().get(&identity).expect("cached");
        let top = entry.posts().next().expect("top post");
        assert_eq!(top.id, server.id);
        assert_eq!(top.content, "fresh off the press");
        assert_eq!(entry.posts().filter(|post| post.id == server.id).count(), 1);
    }
}

#[tokio::test]
async fn logged_out_backend_cannot_connect() {
    let repos = Arc::new(InMemoryRepositories::new());
    let (feed, social) = services(&repos);
    let backend = Arc::new(LocalBackend::new(feed, social, None));
    let result = FeedClient::connect(
        backend,
        CacheConfig::default(),
        Arc::new(RecordingNotifier::new()),
    )
    .await;
    assert!(matches!(result, Err(FeedError::Unauthorized)));
}

#[tokio::test]
async fn refresh_all_replaces_every_cached_feed() {
    let fx = fixture(10).await;
    seed_posts(&fx.repos, fx.author, 3);
    let global = FeedIdentity::global();
    let authored = FeedIdentity::authored_by(fx.author);
    let loader = fx.client.loader();
    loader.load(global).await.expect("global");
    loader.load(authored).await.expect("authored");

    let fresh = fx.repos.add_post(fx.author, "fresh");
    let results = loader.refresh_all().await;

    assert_eq!(results.len(), 2);
    for (identity, outcome) in results {
        let outcome = outcome.expect("refresh");
        assert!(matches!(outcome, LoadOutcome::Applied(_)), "{identity}: {outcome:?}");
        let top = outcome.entry().and_then(|entry| entry.posts().next().cloned());
        assert_eq!(top.map(|post| post.id), Some(fresh));
    }
}

#[tokio::test]
async fn follow_updates_every_cached_post_by_the_author() {
    let fx = fixture(10).await;
    let posts = seed_posts(&fx.repos, fx.author, 2);
    let global = FeedIdentity::global();
    fx.client.loader().load(global).await.expect("loaded");

    let report = fx.client.reconciler().toggle_follow(fx.author).await;

    assert!(report.is_committed());
    for post in posts {
        let cached = cached_post(&fx.client, global, post).expect("cached");
        assert_eq!(cached.author.followers, 1);
        assert!(cached.author.is_followed_by_user);
    }
}
