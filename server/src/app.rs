//! Application bootstrap and serving.

use crate::config::Config;
use anyhow::Context;
use bookshelf_core::environment::{Clock, SystemClock};
use bookshelf_core::{BookStore, Broadcaster, ChapterStore, LibraryStore, NewBook};
use bookshelf_postgres::{
    PostgresBookStore, PostgresChapterStore, PostgresLibraryStore, connect, migrate,
};
use bookshelf_runtime::metrics::install_recorder;
use bookshelf_runtime::{
    ChapterService, EngagementService, LibraryService, RetryPolicy, TopicBroadcaster,
};
use bookshelf_web::{AppState, AssetResolver, JwtVerifier, RouterConfig, build_router};
use std::future::IntoFuture;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;

/// How often channels without subscribers are dropped.
const PRUNE_INTERVAL: Duration = Duration::from_secs(60);

/// Build every component from `config` and serve until a shutdown signal.
///
/// # Errors
///
/// Fails if metrics, the database, the seed file, the token verifier or the
/// listener cannot be set up, or if the server stops with an I/O error.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let metrics = if config.server.metrics_enabled {
        Some(install_recorder()?)
    } else {
        None
    };

    let pool = connect(
        &config.database.url,
        config.database.max_connections,
        config.database.connect_timeout,
    )
    .await?;
    migrate(&pool).await?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let broadcaster = Arc::new(TopicBroadcaster::new());
    let books: Arc<dyn BookStore> = Arc::new(PostgresBookStore::new(pool.clone()));
    let libraries: Arc<dyn LibraryStore> = Arc::new(PostgresLibraryStore::new(pool.clone()));
    let chapters: Arc<dyn ChapterStore> = Arc::new(PostgresChapterStore::new(pool));

    let retry = RetryPolicy::builder()
        .max_retries(config.engagement.rating_max_retries)
        .build();
    let engagement = EngagementService::new(
        books,
        Arc::clone(&broadcaster) as Arc<dyn Broadcaster>,
        Arc::clone(&clock),
    )
    .with_retry_policy(retry.clone());

    if let Some(path) = &config.engagement.seed_file {
        seed(&engagement, path).await?;
    }

    let verifier = JwtVerifier::new(
        config.auth.jwt_secret.as_bytes(),
        config.auth.jwt_issuer.clone(),
    )?;
    let mut state = AppState::new(
        engagement,
        LibraryService::new(libraries).with_retry_policy(retry),
        ChapterService::new(chapters, clock),
        verifier,
        AssetResolver::new(config.server.public_base_url.clone()),
    );
    if let Some(handle) = metrics {
        state = state.with_metrics(handle);
    }

    let router = build_router(
        state,
        &RouterConfig {
            allowed_origins: config.server.cors_allowed_origins.clone(),
            body_limit: config.server.body_limit,
        },
    );

    let pruner = tokio::spawn(prune_channels(broadcaster));

    let listener = TcpListener::bind((config.server.host.as_str(), config.server.port))
        .await
        .with_context(|| {
            format!(
                "Failed to bind {}:{}",
                config.server.host, config.server.port
            )
        })?;
    let address = listener.local_addr()?;
    tracing::info!(%address, "Bookshelf server listening");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let server = axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            let _ = shutdown_tx.send(true);
        })
        .into_future();

    tokio::select! {
        result = server => result.context("Server error")?,
        () = drain_deadline(shutdown_rx, config.server.shutdown_timeout) => {
            tracing::warn!("Shutdown timeout elapsed, dropping open connections");
        }
    }

    pruner.abort();
    tracing::info!("Bookshelf server stopped");
    Ok(())
}

/// Load catalog entries from a JSON file into an empty catalog.
async fn seed(engagement: &EngagementService, path: &Path) -> anyhow::Result<()> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read seed file {}", path.display()))?;
    let entries: Vec<NewBook> = serde_json::from_str(&raw)
        .with_context(|| format!("Invalid seed file {}", path.display()))?;
    let inserted = engagement.seed_catalog(entries).await?;
    tracing::info!(inserted, seed_file = %path.display(), "Catalog seeded");
    Ok(())
}

async fn prune_channels(broadcaster: Arc<TopicBroadcaster>) {
    let mut interval = tokio::time::interval(PRUNE_INTERVAL);
    loop {
        interval.tick().await;
        let removed = broadcaster.prune().await;
        if removed > 0 {
            tracing::debug!(removed, "Pruned idle broadcast channels");
        }
    }
}

/// Resolves once shutdown was requested and `timeout` has passed since.
async fn drain_deadline(mut shutdown: watch::Receiver<bool>, timeout: Duration) {
    if shutdown.wait_for(|requested| *requested).await.is_err() {
        // Sender dropped without a request: the server already stopped
        std::future::pending::<()>().await;
    }
    tokio::time::sleep(timeout).await;
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("Shutdown signal received, draining connections");
}
