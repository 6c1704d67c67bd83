//! Curio Cards supply service: entry point.
//!
//! Loads configuration, initialises structured logging, makes sure a
//! snapshot exists (fetching one if the store is empty), starts the
//! weekly refresh timer and serves the HTTP API until Ctrl+C.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{error, info};

use curio_supply::api::{self, ApiState};
use curio_supply::balance::ScrapedBalanceLookup;
use curio_supply::config;
use curio_supply::engine::builder::SnapshotBuilder;
use curio_supply::engine::scheduler::RefreshScheduler;
use curio_supply::feed::{FeedParser, HttpFeed};
use curio_supply::storage::SnapshotStore;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let cfg = config::AppConfig::load("config.toml")?;
    init_logging();

    info!(
        service = %cfg.server.service_name,
        port = cfg.server.port,
        data_dir = %cfg.storage.data_dir.display(),
        interval_days = cfg.refresh.interval_days,
        "Starting up"
    );

    // -- Pipeline ----------------------------------------------------------

    let store = SnapshotStore::new(&cfg.storage.data_dir);
    store.ensure_dir().context("Failed to create data directory")?;

    let feed = HttpFeed::new(cfg.feed.url.clone(), &cfg.feed.user_agent)?;
    let targets = cfg.balances.targets()?;
    info!(contracts = targets.len(), "Wrapped contract map loaded");
    let balances = ScrapedBalanceLookup::new(
        targets,
        cfg.balances.timeout(),
        cfg.balances.min_delay(),
        cfg.balances.user_agent(),
    )?;

    let builder = SnapshotBuilder::new(
        Arc::new(feed),
        FeedParser::new(cfg.feed.variant_ids()?),
        Arc::new(balances),
    );
    let scheduler = Arc::new(RefreshScheduler::new(
        builder,
        store,
        cfg.refresh.interval(),
    )?);

    // -- Startup refresh ---------------------------------------------------

    // A failure here is not fatal: the read path retries on first request.
    if let Err(e) = scheduler.startup().await {
        error!(error = %e, "Initial refresh failed, serving without data");
    }

    let timer = scheduler.clone().spawn_timer();

    // -- HTTP API ----------------------------------------------------------

    let state = Arc::new(ApiState::new(scheduler, cfg.server.service_name.clone()));
    let router = api::build_router(state, &cfg.server.static_dir);

    api::serve(router, cfg.server.port, async {
        let _ = tokio::signal::ctrl_c().await;
        info!("Shutdown signal received.");
    })
    .await?;

    timer.abort();
    info!("Shut down cleanly.");
    Ok(())
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("curio_supply=info"));

    if std::env::var("CURIO_SUPPLY_LOG_JSON").is_ok() {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
