use std::{future::IntoFuture, process, sync::Arc};

use feedline::{
    application::{
        error::AppError,
        feed::FeedService,
        notifications::NotificationService,
        repos::{
            FeedRepo, MediaRepo, NotificationsRepo, PostsWriteRepo, ReactionsRepo, SessionsRepo,
            UsersRepo,
        },
        session::SessionService,
        social::SocialService,
    },
    cache::CacheConfig,
    client::{FeedClient, HttpBackend, LoadOutcome, TracingNotifier},
    config,
    domain::types::FeedIdentity,
    infra::{
        db::PostgresRepositories,
        error::InfraError,
        http::{self, ApiState, RouterState},
        memory::InMemoryRepositories,
        telemetry,
    },
};
use tokio::sync::Notify;
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Feed(args) => run_feed(settings, args).await,
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let state = match settings.database.url.as_deref() {
        Some(url) => {
            let pool = PostgresRepositories::connect(url, settings.database.max_connections.get())
                .await
                .map_err(InfraError::Connect)?;
            PostgresRepositories::ensure_schema(&pool)
                .await
                .map_err(InfraError::Schema)?;
            let repositories = Arc::new(PostgresRepositories::new(pool));
            RouterState {
                api: build_api_state(repositories.clone(), &settings),
                db: Some(repositories),
            }
        }
        None => {
            warn!("no database url configured; data lives in memory and is lost on exit");
            RouterState {
                api: build_api_state(Arc::new(InMemoryRepositories::new()), &settings),
                db: None,
            }
        }
    };

    serve_http(&settings, state).await
}

fn build_api_state<R>(repositories: Arc<R>, settings: &config::Settings) -> ApiState
where
    R: FeedRepo
        + PostsWriteRepo
        + ReactionsRepo
        + UsersRepo
        + MediaRepo
        + NotificationsRepo
        + SessionsRepo
        + 'static,
{
    let feed_repo: Arc<dyn FeedRepo> = repositories.clone();
    let posts_repo: Arc<dyn PostsWriteRepo> = repositories.clone();
    let reactions_repo: Arc<dyn ReactionsRepo> = repositories.clone();
    let users_repo: Arc<dyn UsersRepo> = repositories.clone();
    let media_repo: Arc<dyn MediaRepo> = repositories.clone();
    let notifications_repo: Arc<dyn NotificationsRepo> = repositories.clone();
    let sessions_repo: Arc<dyn SessionsRepo> = repositories;

    let feed = FeedService::new(feed_repo.clone())
        .with_default_page_size(settings.feed.default_page_size.get());
    let social = SocialService::new(
        feed_repo,
        posts_repo,
        reactions_repo,
        users_repo,
        media_repo,
    );

    ApiState {
        sessions: Arc::new(SessionService::new(sessions_repo)),
        feed: Arc::new(feed),
        social: Arc::new(social),
        notifications: Arc::new(NotificationService::new(notifications_repo)),
    }
}

async fn serve_http(settings: &config::Settings, state: RouterState) -> Result<(), AppError> {
    let router = http::build_router(state);
    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| InfraError::bind(settings.server.addr, err))?;
    info!(addr = %settings.server.addr, "feedline listening");

    let stop = Arc::new(Notify::new());
    let stopped = stop.clone();
    let server = axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(async move { stopped.notified().await })
        .into_future();
    let mut server = std::pin::pin!(server);

    tokio::select! {
        result = &mut server => {
            return result.map_err(|err| AppError::unexpected(format!("server error: {err}")));
        }
        () = shutdown_signal() => {
            info!(grace = ?settings.server.graceful_shutdown, "shutdown requested; draining connections");
            stop.notify_one();
        }
    }

    match tokio::time::timeout(settings.server.graceful_shutdown, server).await {
        Ok(result) => result.map_err(|err| AppError::unexpected(format!("server error: {err}"))),
        Err(_) => {
            warn!("graceful shutdown timed out; dropping open connections");
            Ok(())
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}

async fn run_feed(settings: config::Settings, args: config::FeedArgs) -> Result<(), AppError> {
    let identity: FeedIdentity = args.feed.parse()?;
    let backend = Arc::new(HttpBackend::new(&args.site, args.token.clone())?);
    let client = FeedClient::connect(
        backend,
        CacheConfig::from(&settings.client),
        Arc::new(TracingNotifier),
    )
    .await?;

    let loader = client.loader();
    loader
        .load(identity)
        .await
        .map_err(|err| AppError::unexpected(err.to_string()))?;
    for _ in 1..args.pages.max(1) {
        let outcome = loader
            .load_more(identity)
            .await
            .map_err(|err| AppError::unexpected(err.to_string()))?;
        if matches!(outcome, LoadOutcome::Exhausted) {
            break;
        }
    }

    let posts: Vec<_> = client
        .store()
        .get(&identity)
        .map(|entry| entry.posts().cloned().collect())
        .unwrap_or_default();
    info!(feed = %identity, posts = posts.len(), "feed loaded");

    let rendered = serde_json::to_string_pretty(&posts)
        .map_err(|err| AppError::unexpected(format!("failed to render feed: {err}")))?;
    println!("{rendered}");

    client.logout();
    Ok(())
}
