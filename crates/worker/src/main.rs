//! `assetgen-worker` -- resumes interrupted motion downloads.
//!
//! Reads the orchestrator configuration from the environment (see
//! [`OrchestratorConfig::from_env`]), drives every interrupted-download
//! record of the configured environment through the retry loop and logs a
//! summary. Ctrl-C or SIGTERM stops the scan; unfinished records stay in
//! the store for the next run.

use std::sync::Arc;

use anyhow::Context;
use assetgen_client::{ClientPool, HttpGenerationClient};
use assetgen_core::config::OrchestratorConfig;
use assetgen_events::EventBus;
use assetgen_pipeline::{FsAssetStore, Orchestrator};
use assetgen_recovery::InterruptedDownloadStore;
use assetgen_worker::event_log::EventLogger;
use assetgen_worker::logging;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    logging::init_tracing();

    let config = OrchestratorConfig::from_env();
    tracing::info!(
        api_url = %config.api_url,
        environment = %config.environment,
        recovery_path = %config.recovery_path.display(),
        asset_root = %config.asset_root.display(),
        retry_count = config.retry_count,
        "Starting assetgen-worker",
    );

    let pool = Arc::new(ClientPool::new(config.http_pool_size));
    let backend = Arc::new(HttpGenerationClient::new(
        config.api_url.clone(),
        config.api_key.clone(),
        Arc::clone(&pool),
    ));
    let assets = Arc::new(FsAssetStore::new(config.asset_root.clone()));
    let recovery = Arc::new(InterruptedDownloadStore::new(
        config.recovery_path.clone(),
        config.environment.clone(),
    ));

    let bus = Arc::new(EventBus::default());
    let logger = tokio::spawn(EventLogger::run(bus.subscribe()));

    let orchestrator = Orchestrator::new(backend, assets, recovery, Arc::clone(&bus), config);

    let outcome = tokio::select! {
        summary = orchestrator.resume_interrupted_downloads() => Some(summary),
        () = shutdown_signal() => None,
    };

    pool.close();
    drop(orchestrator);
    drop(bus);
    let logged = logger.await.context("event logger task panicked")?;

    match outcome {
        Some(summary) => {
            let summary = summary.context("failed to resume interrupted downloads")?;
            tracing::info!(
                found = summary.found,
                completed = summary.completed,
                failed = summary.failed,
                skipped = summary.skipped,
                downloaded = summary.downloaded.len(),
                events = logged,
                "Worker finished",
            );
        }
        None => tracing::info!(events = logged, "Worker stopped before the scan finished"),
    }
    Ok(())
}

/// Wait for SIGINT, or SIGTERM on Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl-C handler");
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
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("Received SIGINT (Ctrl-C), stopping"),
        () = terminate => tracing::info!("Received SIGTERM, stopping"),
    }
}
