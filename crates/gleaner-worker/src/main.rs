//! gleaner-worker
//!
//! 起動手順:
//! 1. `.env` と環境変数から設定を読む（ここで失敗したら終了）
//! 2. ワーカー ID を解決（設定値 or 外向き IP）
//! 3. PostgreSQL に接続してマイグレーション
//! 4. ControlLoop を起動し、SIGINT / SIGTERM で止める

mod config;
mod identity;
mod logging;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tokio::sync::watch;
use tracing::info;

use gleaner_chromium::ChromiumRenderer;
use gleaner_core::app::{ControlLoop, LoopPorts};
use gleaner_core::impls::{HttpTaskSource, PartPageExtractor, PartPageRules};
use gleaner_core::ports::SystemClock;
use gleaner_pg::{PgRecordStore, PgStagingCache};

use crate::config::WorkerConfig;

const POOL_SIZE: u32 = 5;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let log_dir = std::env::var_os("LOG_DIR").map(PathBuf::from);
    let _log_guard = logging::init(log_dir.as_deref())?;

    info!("gleaner-worker starting...");

    let config = WorkerConfig::from_env().context("invalid configuration")?;
    let identity = identity::resolve(config.worker_identity.as_deref(), config.source_timeout)
        .await
        .context("failed to resolve worker identity")?;
    info!(%identity, "worker identity resolved");

    info!("Connecting to database...");
    let store_pool = gleaner_pg::connect(&config.database_url, POOL_SIZE)
        .await
        .context("Failed to connect to database")?;
    gleaner_pg::migrate(&store_pool)
        .await
        .context("Failed to run migrations")?;

    let staging_pool = if config.staging_database_url == config.database_url {
        store_pool.clone()
    } else {
        let pool = gleaner_pg::connect(&config.staging_database_url, POOL_SIZE)
            .await
            .context("Failed to connect to staging database")?;
        gleaner_pg::migrate(&pool)
            .await
            .context("Failed to run staging migrations")?;
        pool
    };
    info!("Database connected");

    let source = HttpTaskSource::from_host_port(&config.api_host, config.api_port, config.source_timeout)
        .context("invalid task source address")?;
    info!(endpoint = source.endpoint(), "task source configured");

    let ports = LoopPorts {
        source: Arc::new(source),
        renderer: Arc::new(ChromiumRenderer::new(config.browser.clone())),
        extractor: Arc::new(PartPageExtractor::from_rules(&PartPageRules::default())?),
        staging: Arc::new(PgStagingCache::new(staging_pool, &identity)),
        store: Arc::new(PgRecordStore::new(store_pool)),
        clock: Arc::new(SystemClock),
    };
    let control = Arc::new(ControlLoop::new(ports, identity, config.pipeline.clone()));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker = tokio::spawn(control.run(shutdown_rx));

    shutdown_signal().await?;
    info!("shutdown requested; waiting for the current cycle to finish");
    // ignore send error: the loop may already have stopped
    let _ = shutdown_tx.send(true);
    worker.await.context("control loop task failed")?;

    info!("Worker shutdown complete");
    Ok(())
}

async fn shutdown_signal() -> anyhow::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut terminate = signal(SignalKind::terminate())?;
        tokio::select! {
            res = tokio::signal::ctrl_c() => res?,
            _ = terminate.recv() => {}
        }
    }
    #[cfg(not(unix))]
    tokio::signal::ctrl_c().await?;

    Ok(())
}
