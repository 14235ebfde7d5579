// =============================================================================
// Perp Signal Engine — Main Entry Point
// =============================================================================
//
// Starts one isolated pipeline per configured timeframe, each with its own
// model registry, bandit state and paper execution task, then feeds them
// from the configured bar replay file.
// =============================================================================

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use perp_signal_engine::cohort::{CohortSignalProvider, CohortSnapshotStore};
use perp_signal_engine::decision::ChannelSink;
use perp_signal_engine::execution::run_paper_execution;
use perp_signal_engine::features::{CandleFeatureBuilder, FeatureBuilder};
use perp_signal_engine::feed::replay_file;
use perp_signal_engine::pipeline::TimeframePipeline;
use perp_signal_engine::runtime_config::RuntimeConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("╔══════════════════════════════════════════════════════════╗");
    info!("║        Perp Signal Engine — Starting Up                 ║");
    info!("╚══════════════════════════════════════════════════════════╝");

    let config_path = PathBuf::from(
        std::env::var("ENGINE_CONFIG").unwrap_or_else(|_| "engine_config.json".to_string()),
    );
    let mut config = if config_path.exists() {
        RuntimeConfig::load(&config_path)?
    } else {
        warn!(path = %config_path.display(), "config file missing, writing defaults");
        let defaults = RuntimeConfig::default();
        if let Err(e) = defaults.save(&config_path) {
            error!(error = %e, "Failed to write default config");
        }
        defaults
    };
    config.apply_overrides(
        std::env::var("ENGINE_FEED").ok(),
        std::env::var("ENGINE_COHORTS").ok(),
    );
    config.validate().context("invalid runtime config")?;

    // ── 2. Shared read-only collaborators ────────────────────────────────
    let builder: Arc<dyn FeatureBuilder> = Arc::new(CandleFeatureBuilder::new());
    let cohorts = Arc::new(CohortSnapshotStore::new());

    if let Some(path) = config.cohort_snapshot_path.clone() {
        match cohorts.load_snapshot_file(&path) {
            Ok(n) => info!(path = %path.display(), cohorts = n, "cohort snapshot loaded"),
            Err(e) => warn!(path = %path.display(), error = %e, "cohort snapshot load failed"),
        }
        let store = cohorts.clone();
        let every = Duration::from_secs(config.cohort_reload_secs.max(1));
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.tick().await;
            loop {
                interval.tick().await;
                if let Err(e) = store.load_snapshot_file(&path) {
                    warn!(path = %path.display(), error = %e, "cohort snapshot reload failed");
                }
            }
        });
    }

    // ── 3. Timeframe pipelines ───────────────────────────────────────────
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut routes = HashMap::new();
    let mut pipelines = JoinSet::new();
    let capacity = config.channel_capacity;

    for tf in &config.timeframes {
        let (exec_tx, exec_rx) = mpsc::channel(capacity);
        let (outcome_tx, outcome_rx) = mpsc::channel(capacity);

        let provider: Arc<dyn CohortSignalProvider> = cohorts.clone();
        let pipeline = match TimeframePipeline::build(
            tf,
            builder.clone(),
            provider,
            Box::new(ChannelSink::new(exec_tx)),
            config.feed.clock,
        ) {
            Ok(p) => p,
            Err(e) => {
                // Other timeframes keep running.
                error!(timeframe = %tf.name, error = ?e, "pipeline failed to start");
                continue;
            }
        };

        tokio::spawn(run_paper_execution(
            tf.name.clone(),
            config.paper.clone(),
            tf.bandit.arms.clone(),
            exec_rx,
            outcome_tx,
        ));

        let (bar_tx, bar_rx) = mpsc::channel(capacity);
        routes.insert(tf.name.clone(), bar_tx);
        pipelines.spawn(pipeline.run(bar_rx, outcome_rx, shutdown_rx.clone()));
    }

    if pipelines.is_empty() {
        bail!("no timeframe pipeline could start");
    }
    info!(timeframes = ?routes.keys().collect::<Vec<_>>(), "pipelines running");

    // ── 4. Bar feed ──────────────────────────────────────────────────────
    match config.feed.path.clone() {
        Some(path) => {
            let pace = Duration::from_millis(config.feed.pace_ms);
            tokio::spawn(async move {
                if let Err(e) = replay_file(&path, routes, pace).await {
                    error!(error = ?e, "bar replay failed");
                }
            });
        }
        None => {
            // Keep the senders alive so the pipelines wait for ctrl-c.
            info!("No bar feed configured; idling until Ctrl+C");
            tokio::spawn(async move {
                let _routes = routes;
                std::future::pending::<()>().await;
            });
        }
    }

    info!("All subsystems running. Press Ctrl+C to stop.");

    // ── 5. Graceful shutdown ─────────────────────────────────────────────
    let mut stopping = false;
    loop {
        tokio::select! {
            joined = pipelines.join_next() => match joined {
                Some(Ok(summary)) => info!(
                    timeframe = %summary.timeframe,
                    bars = summary.bars,
                    replaced = summary.replaced,
                    decided = summary.decided,
                    eligible = summary.eligible,
                    outcomes = summary.outcomes_applied,
                    "pipeline finished"
                ),
                Some(Err(e)) => error!(error = %e, "pipeline task panicked"),
                None => break,
            },
            signal = tokio::signal::ctrl_c(), if !stopping => {
                signal?;
                warn!("Shutdown signal received — stopping gracefully");
                stopping = true;
                let _ = shutdown_tx.send(true);
            }
        }
    }

    info!("Perp Signal Engine shut down complete.");
    Ok(())
}
