// =============================================================================
// Meridian Trading Engine — Main Entry Point
// =============================================================================
//
// The engine starts in simulated mode unless TRADING_MODE=live is configured
// together with exchange credentials. Shutdown is cooperative: SIGINT or
// SIGTERM sets the stop flag, the loop finishes its current job, runs the
// daily summary once more, and exits.
// =============================================================================

// ── Module declarations ──────────────────────────────────────────────────────
mod allocator;
mod config;
mod engine;
mod error;
mod exchange;
mod execution;
mod indicators;
mod market_data;
mod notify;
mod position;
mod reconcile;
mod risk;
mod scheduler;
mod scoring;
mod store;
mod types;

use std::sync::atomic::Ordering;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::EngineConfig;
use crate::engine::Engine;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & logging ─────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("╔══════════════════════════════════════════════════════════╗");
    info!("║        Meridian Trading Engine — Starting Up             ║");
    info!("╚══════════════════════════════════════════════════════════╝");

    // ── 2. Configuration ─────────────────────────────────────────────────
    let cfg = match EngineConfig::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            error!(error = %e, "configuration invalid");
            anyhow::bail!("initialization failed: {e}");
        }
    };

    // An on-disk override takes precedence over the environment when present.
    // Credentials never live in the file; they always come from the env.
    let cfg = match EngineConfig::load("engine_config.json") {
        Ok(mut file_cfg) => {
            file_cfg.access_key = cfg.access_key.clone();
            file_cfg.secret_key = cfg.secret_key.clone();
            if let Err(e) = file_cfg.validate() {
                error!(error = %e, "engine_config.json invalid");
                anyhow::bail!("initialization failed: {e}");
            }
            file_cfg
        }
        Err(_) => cfg,
    };

    info!(
        mode = %cfg.trading_mode,
        instruments = ?cfg.target_instruments,
        quote = %cfg.quote_currency,
        "configuration loaded"
    );

    let cfg_snapshot = cfg.clone();

    // ── 3. Build the engine ──────────────────────────────────────────────
    let engine = match Engine::new(cfg) {
        Ok(engine) => engine,
        Err(e) => {
            error!(error = %e, "engine construction failed");
            anyhow::bail!("initialization failed: {e}");
        }
    };

    // ── 4. Cooperative shutdown on SIGINT / SIGTERM ──────────────────────
    let stop = engine.stop_handle();
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        {
            let mut sigterm =
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                    .expect("failed to install SIGTERM handler");
            tokio::select! {
                _ = ctrl_c => {}
                _ = sigterm.recv() => {}
            }
        }
        #[cfg(not(unix))]
        {
            let _ = ctrl_c.await;
        }

        warn!("shutdown signal received; finishing the current job");
        stop.store(true, Ordering::Relaxed);
    });

    // ── 5. Run ───────────────────────────────────────────────────────────
    engine.run().await?;

    if let Err(e) = cfg_snapshot.save("engine_config.json") {
        error!(error = %e, "failed to save config on shutdown");
    }

    info!("Meridian shut down complete.");
    Ok(())
}
