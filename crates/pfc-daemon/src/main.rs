//! pfc-daemon entry point.
//!
//! Sets up tracing, loads config, connects the Postgres store, then runs
//! the scheduler until Ctrl-C.

use std::sync::Arc;

use anyhow::Context;
use pfc_daemon::{load_config_from_env, Engine};
use pfc_db::PgStore;
use pfc_store::ChallengeRepository;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env.local if present (dev convenience). Silent if missing.
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();

    let boot = load_config_from_env().context("config load failed")?;

    let pool = pfc_db::connect_from_env().await?;
    pfc_db::migrate(&pool).await?;
    let repo: Arc<dyn ChallengeRepository> =
        Arc::new(PgStore::new(pool, boot.config.store.query_timeout()));

    let engine = Engine::new(&boot.config, repo);
    engine.scheduler.start().await;
    info!(config_hash = %boot.config_hash, "pfc-daemon running");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("shutdown requested");

    engine.scheduler.stop().await;
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}
