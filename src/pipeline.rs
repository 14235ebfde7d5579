// =============================================================================
// Timeframe Pipeline — one isolated decision loop per timeframe
// =============================================================================
//
// Owns its registry, bandit state, threshold source and decision engine.
// Nothing here is shared with another timeframe; only the feature builder
// (stateless) and the cohort provider (read-only) are passed in.
//
// The run loop is strictly sequential: a bar is fully decided before the
// next message is taken off any channel.
// =============================================================================

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

use crate::arena::{BanditArmSelector, BanditStore, UpdateOutcome};
use crate::cohort::CohortSignalProvider;
use crate::decision::{CycleOutcome, DecisionEngine, DecisionEngineConfig, DecisionSink};
use crate::execution::TradeOutcome;
use crate::features::FeatureBuilder;
use crate::feed::ClockMode;
use crate::market_data::BarEvent;
use crate::model::{EnsembleInferenceEngine, ModelRegistry};
use crate::runtime_config::TimeframeConfig;
use crate::signals::ThresholdSource;

/// Counters reported when a pipeline stops.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineSummary {
    pub timeframe: String,
    pub bars: u64,
    pub replaced: u64,
    pub collecting: u64,
    pub decided: u64,
    pub eligible: u64,
    pub skipped: u64,
    pub outcomes_applied: u64,
    pub model_swaps: u64,
}

pub struct TimeframePipeline {
    name: String,
    registry: Arc<ModelRegistry>,
    engine: DecisionEngine,
    thresholds: ThresholdSource,
    clock: ClockMode,
    reload_every: Duration,
    summary: PipelineSummary,
}

impl TimeframePipeline {
    /// Open the active bundle, restore bandit state and build the engine.
    /// Any failure here is fatal for this timeframe.
    pub fn build(
        config: &TimeframeConfig,
        builder: Arc<dyn FeatureBuilder>,
        provider: Arc<dyn CohortSignalProvider>,
        sink: Box<dyn DecisionSink>,
        clock: ClockMode,
    ) -> Result<Self> {
        let registry = Arc::new(ModelRegistry::new(config.model_dir(), builder.schema()));
        let version = registry
            .open()
            .with_context(|| format!("timeframe {}: no valid model bundle", config.name))?;

        let store = BanditStore::new(config.bandit_state_path());
        let mut bandit = BanditArmSelector::new(config.bandit.clone(), Some(store))
            .with_context(|| format!("timeframe {}: bandit setup failed", config.name))?;
        // Under the bar clock the first bar does this sweep instead.
        if clock == ClockMode::Wall {
            bandit.expire_stale(Utc::now());
        }

        let thresholds = match &config.thresholds_path {
            Some(path) => ThresholdSource::with_file(config.thresholds, path),
            None => ThresholdSource::fixed(config.thresholds),
        };

        let engine_config = DecisionEngineConfig {
            timeframe: config.name.clone(),
            min_lookback_bars: config.min_lookback_bars,
            staleness_secs: config.staleness_secs(),
            history_capacity: config.history_capacity,
            recent_capacity: config.recent_capacity,
            cohorts: config.cohorts.clone(),
            cohort_policy: config.cohort_policy.clone(),
            combiner: config.combiner.clone(),
        };
        let engine = DecisionEngine::new(
            engine_config,
            builder,
            EnsembleInferenceEngine::new(registry.clone()),
            provider,
            bandit,
            sink,
        )
        .with_context(|| format!("timeframe {}: decision engine setup failed", config.name))?;

        info!(timeframe = %config.name, bundle = %version, clock = ?clock, "pipeline ready to collect");

        Ok(Self {
            name: config.name.clone(),
            registry,
            engine,
            thresholds,
            clock,
            reload_every: config.reload_interval(),
            summary: PipelineSummary {
                timeframe: config.name.clone(),
                ..PipelineSummary::default()
            },
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn engine(&self) -> &DecisionEngine {
        &self.engine
    }

    pub fn summary(&self) -> &PipelineSummary {
        &self.summary
    }

    /// One full decision cycle. Thresholds are fixed for the whole cycle.
    pub fn handle_bar(&mut self, event: BarEvent) -> CycleOutcome {
        let thresholds = self.thresholds.for_cycle();
        let now = self.clock.now_for(&event.bar);
        let outcome = self.engine.on_bar(event.bar, event.mood, &thresholds, now);

        self.summary.bars += 1;
        match &outcome {
            CycleOutcome::Collecting { .. } => self.summary.collecting += 1,
            CycleOutcome::Replaced { .. } => self.summary.replaced += 1,
            CycleOutcome::Skipped(_) => self.summary.skipped += 1,
            CycleOutcome::Decided(record) => {
                self.summary.decided += 1;
                if record.eligible {
                    self.summary.eligible += 1;
                }
            }
        }
        outcome
    }

    pub fn handle_outcome(&mut self, outcome: TradeOutcome) -> UpdateOutcome {
        let result = self.engine.apply_outcome(&outcome);
        if matches!(result, UpdateOutcome::Applied { .. }) {
            self.summary.outcomes_applied += 1;
        }
        result
    }

    /// Periodic housekeeping: follow the active pointer, flush bandit state.
    pub fn tick(&mut self) {
        match self.registry.reload_from_pointer() {
            Ok(true) => {
                self.summary.model_swaps += 1;
                info!(timeframe = %self.name, bundle = ?self.registry.active_version(), "model hot-swapped");
            }
            Ok(false) => {}
            Err(e) => {
                warn!(timeframe = %self.name, error = %e, "model reload rejected; keeping current bundle");
            }
        }
        if let Err(e) = self.engine.bandit_mut().flush() {
            warn!(timeframe = %self.name, error = %e, "bandit state flush failed");
        }
    }

    /// Drive the pipeline until the bar channel closes or shutdown is
    /// signalled.
    pub async fn run(
        mut self,
        mut bars: mpsc::Receiver<BarEvent>,
        mut outcomes: mpsc::Receiver<TradeOutcome>,
        mut shutdown: watch::Receiver<bool>,
    ) -> PipelineSummary {
        let mut ticker = tokio::time::interval(self.reload_every);
        ticker.tick().await;
        let mut outcomes_open = true;

        info!(timeframe = %self.name, "pipeline started");

        loop {
            tokio::select! {
                maybe_bar = bars.recv() => {
                    match maybe_bar {
                        Some(event) => {
                            self.handle_bar(event);
                        }
                        None => {
                            info!(timeframe = %self.name, "bar feed closed");
                            break;
                        }
                    }
                }
                maybe_outcome = outcomes.recv(), if outcomes_open => {
                    match maybe_outcome {
                        Some(outcome) => {
                            self.handle_outcome(outcome);
                        }
                        None => outcomes_open = false,
                    }
                }
                _ = ticker.tick() => self.tick(),
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!(timeframe = %self.name, "shutdown requested");
                        break;
                    }
                }
            }
        }

        // Outcomes already produced for this run still count.
        while let Ok(outcome) = outcomes.try_recv() {
            self.handle_outcome(outcome);
        }
        if let Err(e) = self.engine.bandit_mut().flush() {
            warn!(timeframe = %self.name, error = %e, "final bandit flush failed");
        }

        info!(
            timeframe = %self.name,
            bars = self.summary.bars,
            decided = self.summary.decided,
            eligible = self.summary.eligible,
            skipped = self.summary.skipped,
            replaced = self.summary.replaced,
            outcomes = self.summary.outcomes_applied,
            "pipeline stopped"
        );
        self.summary
    }
}
