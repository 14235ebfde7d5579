// =============================================================================
// Decision Engine — per-bar cycle for one timeframe
// =============================================================================
//
//   COLLECTING ──(history >= min lookback)──► READY      (one-way)
//
// Per READY bar, strictly in order:
//   staleness gate -> features -> inference -> cohorts -> combine
//   -> record -> (eligible only) bandit pull + execution order
//
// A bar repeating the newest open time only corrects history and is never
// decided again. Every newly appended bar first ages out abandoned bandit
// pulls.
//
// A feature or inference failure skips the bar and stays READY. Startup
// without a valid active bundle is fatal: `new` refuses to build an engine.
// =============================================================================

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::arena::{BanditArmSelector, UpdateOutcome};
use crate::cohort::{CohortPolicy, CohortSignalProvider, CohortSpec};
use crate::decision::record::SignalRecord;
use crate::decision::sink::DecisionSink;
use crate::error::{EngineError, Result};
use crate::execution::{ExecutionOrder, TradeOutcome};
use crate::features::FeatureBuilder;
use crate::market_data::{Bar, BarHistory, PushOutcome};
use crate::model::EnsembleInferenceEngine;
use crate::signals::combiner::{CombinerConfig, SignalCombiner};
use crate::signals::thresholds::ThresholdConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EngineState {
    Collecting,
    Ready,
}

impl std::fmt::Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Collecting => write!(f, "COLLECTING"),
            Self::Ready => write!(f, "READY"),
        }
    }
}

/// What one bar produced.
#[derive(Debug)]
pub enum CycleOutcome {
    /// Still filling the lookback window.
    Collecting { have: usize, need: usize },
    /// A bar for an already-seen open time. History holds the corrected
    /// values; nothing is re-decided or re-executed.
    Replaced { open_time: i64 },
    /// The bar was dropped without a record.
    Skipped(EngineError),
    Decided(Box<SignalRecord>),
}

#[derive(Debug, Clone)]
pub struct DecisionEngineConfig {
    pub timeframe: String,
    pub min_lookback_bars: usize,
    pub staleness_secs: i64,
    pub history_capacity: usize,
    pub recent_capacity: usize,
    pub cohorts: Vec<CohortSpec>,
    pub cohort_policy: CohortPolicy,
    pub combiner: CombinerConfig,
}

pub struct DecisionEngine {
    timeframe: String,
    state: EngineState,
    min_lookback: usize,
    staleness_secs: i64,
    history: BarHistory,
    builder: Arc<dyn FeatureBuilder>,
    inference: EnsembleInferenceEngine,
    combiner: SignalCombiner,
    cohorts: Vec<CohortSpec>,
    cohort_policy: CohortPolicy,
    provider: Arc<dyn CohortSignalProvider>,
    bandit: BanditArmSelector,
    sink: Box<dyn DecisionSink>,
    recent: VecDeque<SignalRecord>,
    recent_capacity: usize,
}

impl DecisionEngine {
    pub fn new(
        config: DecisionEngineConfig,
        builder: Arc<dyn FeatureBuilder>,
        inference: EnsembleInferenceEngine,
        provider: Arc<dyn CohortSignalProvider>,
        bandit: BanditArmSelector,
        sink: Box<dyn DecisionSink>,
    ) -> Result<Self> {
        let active = inference
            .registry()
            .active()
            .ok_or(EngineError::NoActiveBundle)?;
        builder.schema().ensure_matches(&active.feature_schema)?;

        let min_lookback = config.min_lookback_bars.max(builder.required_history());
        let capacity = config.history_capacity.max(min_lookback);
        info!(
            timeframe = %config.timeframe,
            bundle = %active.version,
            min_lookback,
            staleness_secs = config.staleness_secs,
            "decision engine created"
        );

        Ok(Self {
            timeframe: config.timeframe,
            state: EngineState::Collecting,
            min_lookback,
            staleness_secs: config.staleness_secs,
            history: BarHistory::new(capacity),
            builder,
            inference,
            combiner: SignalCombiner::new(config.combiner),
            cohorts: config.cohorts,
            cohort_policy: config.cohort_policy,
            provider,
            bandit,
            sink,
            recent: VecDeque::with_capacity(config.recent_capacity.max(1)),
            recent_capacity: config.recent_capacity.max(1),
        })
    }

    pub fn timeframe(&self) -> &str {
        &self.timeframe
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn min_lookback(&self) -> usize {
        self.min_lookback
    }

    pub fn bandit(&self) -> &BanditArmSelector {
        &self.bandit
    }

    pub fn bandit_mut(&mut self) -> &mut BanditArmSelector {
        &mut self.bandit
    }

    /// Recent records, oldest first.
    pub fn recent(&self) -> impl Iterator<Item = &SignalRecord> {
        self.recent.iter()
    }

    /// Process one closed bar with the thresholds in force for this cycle.
    pub fn on_bar(
        &mut self,
        bar: Bar,
        mood: Option<f64>,
        thresholds: &ThresholdConfig,
        now: DateTime<Utc>,
    ) -> CycleOutcome {
        if !bar.is_well_formed() {
            return self.skip(EngineError::FeatureBuild(format!(
                "malformed bar at open_time {}",
                bar.open_time
            )));
        }
        match self.history.push(bar.clone()) {
            PushOutcome::Appended => {}
            PushOutcome::Replaced => {
                debug!(timeframe = %self.timeframe, open_time = bar.open_time, "bar corrected in place");
                return CycleOutcome::Replaced {
                    open_time: bar.open_time,
                };
            }
            PushOutcome::Dropped => {
                return self.skip(EngineError::FeatureBuild(format!(
                    "out-of-order bar at open_time {}",
                    bar.open_time
                )));
            }
        }
        self.bandit.expire_stale(now);
        if let Err(e) = self.sink.mark(&bar) {
            warn!(timeframe = %self.timeframe, error = %e, "bar mark not delivered");
        }

        if self.state == EngineState::Collecting {
            if self.history.len() < self.min_lookback {
                return CycleOutcome::Collecting {
                    have: self.history.len(),
                    need: self.min_lookback,
                };
            }
            self.state = EngineState::Ready;
            info!(timeframe = %self.timeframe, bars = self.history.len(), "engine READY");
        }

        let bar_time = bar.close_datetime();
        let age_secs = (now - bar_time).num_seconds();
        if age_secs > self.staleness_secs {
            let record = SignalRecord::stale(&self.timeframe, bar_time, now, *thresholds);
            let e = EngineError::StaleData {
                age_secs,
                bound_secs: self.staleness_secs,
            };
            warn!(timeframe = %self.timeframe, signal_id = %record.id, error = %e, "bar marked ineligible");
            return self.finish(record);
        }

        let features = match self.builder.build(&self.history) {
            Ok(x) => x,
            Err(e) => return self.skip(e),
        };
        let prediction = match self.inference.predict(&features) {
            Ok(p) => p,
            Err(e) => return self.skip(e),
        };

        let cohort_signals =
            self.cohort_policy
                .gather(self.provider.as_ref(), &self.cohorts, bar_time, now);
        let combined = self.combiner.combine(
            &prediction.probabilities,
            &cohort_signals,
            mood,
            thresholds,
        );
        let mut record = SignalRecord::decided(
            &self.timeframe,
            bar_time,
            now,
            &prediction.probabilities,
            combined,
            mood,
            cohort_signals,
            *thresholds,
            prediction.bundle_version,
        );

        if record.eligible {
            self.forward(&mut record, bar.close, now);
        }
        self.finish(record)
    }

    /// Feed a resolved trade back to the bandit.
    pub fn apply_outcome(&mut self, outcome: &TradeOutcome) -> UpdateOutcome {
        self.bandit.apply_outcome(outcome)
    }

    fn forward(&mut self, record: &mut SignalRecord, price: f64, now: DateTime<Utc>) {
        let arm_id = self.bandit.select_arm();
        self.bandit.register_pull(&record.id, &arm_id, now);
        let order = ExecutionOrder {
            signal_id: record.id.clone(),
            timeframe: self.timeframe.clone(),
            direction: record.direction,
            arm_id: arm_id.clone(),
            reference_price: price,
            combined_alpha_bps: record.combined_alpha_bps,
            confidence: record.confidence,
            created_at: now,
        };
        match self.sink.publish(order) {
            Ok(()) => record.arm_id = Some(arm_id),
            Err(e) => {
                self.bandit.cancel_pull(&record.id);
                warn!(timeframe = %self.timeframe, signal_id = %record.id, error = %e, "order not delivered; pull cancelled");
            }
        }
    }

    fn finish(&mut self, record: SignalRecord) -> CycleOutcome {
        if record.eligible {
            info!(
                timeframe = %self.timeframe,
                signal_id = %record.id,
                direction = %record.direction,
                alpha_bps = record.combined_alpha_bps,
                confidence = record.confidence,
                arm = ?record.arm_id,
                "signal eligible"
            );
        } else {
            debug!(
                timeframe = %self.timeframe,
                signal_id = %record.id,
                reason = ?record.ineligibility_reason,
                alpha_bps = record.combined_alpha_bps,
                confidence = record.confidence,
                degraded = ?record.degraded_cohorts,
                "signal ineligible"
            );
        }
        if self.recent.len() == self.recent_capacity {
            self.recent.pop_front();
        }
        self.recent.push_back(record.clone());
        CycleOutcome::Decided(Box::new(record))
    }

    fn skip(&self, e: EngineError) -> CycleOutcome {
        warn!(timeframe = %self.timeframe, state = %self.state, error = %e, "bar skipped");
        CycleOutcome::Skipped(e)
    }
}
