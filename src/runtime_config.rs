// =============================================================================
// Runtime Configuration — per-timeframe engine settings with atomic save
// =============================================================================
//
// One JSON file describes every timeframe pipeline the binary runs. All
// fields carry serde defaults so that adding new fields never breaks loading
// an older config file.
//
// Persistence uses an atomic tmp + rename pattern to prevent corruption on
// crash.
// =============================================================================

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::arena::BanditConfig;
use crate::cohort::{CohortPolicy, CohortSpec};
use crate::execution::PaperConfig;
use crate::feed::ClockMode;
use crate::persist;
use crate::signals::{CombinerConfig, ThresholdConfig};

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_min_lookback_bars() -> usize {
    60
}

fn default_history_capacity() -> usize {
    500
}

fn default_recent_capacity() -> usize {
    256
}

fn default_model_reload_secs() -> u64 {
    30
}

fn default_channel_capacity() -> usize {
    1024
}

fn default_timeframes() -> Vec<TimeframeConfig> {
    vec![
        TimeframeConfig::named("5m", 300),
        TimeframeConfig::named("15m", 900),
        TimeframeConfig::named("1h", 3600),
    ]
}

// =============================================================================
// TimeframeConfig
// =============================================================================

/// Everything one isolated timeframe pipeline needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeframeConfig {
    /// Timeframe label, also the routing key on the bar feed ("5m", "1h", ...).
    pub name: String,

    /// Nominal bar length in seconds.
    pub bar_secs: u64,

    #[serde(default = "default_min_lookback_bars")]
    pub min_lookback_bars: usize,

    /// Maximum age of a bar at decision time. Defaults to two bars.
    #[serde(default)]
    pub staleness_secs: Option<i64>,

    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,

    /// Recent SignalRecords kept in memory for audit.
    #[serde(default = "default_recent_capacity")]
    pub recent_capacity: usize,

    /// Thresholds used until (and unless) `thresholds_path` provides others.
    #[serde(default)]
    pub thresholds: ThresholdConfig,

    /// Optional threshold file, re-read at cycle start when it changes.
    #[serde(default)]
    pub thresholds_path: Option<PathBuf>,

    #[serde(default)]
    pub combiner: CombinerConfig,

    #[serde(default)]
    pub cohorts: Vec<CohortSpec>,

    #[serde(default)]
    pub cohort_policy: CohortPolicy,

    #[serde(default)]
    pub bandit: BanditConfig,

    /// Bundle directory. Defaults to `models/<name>`.
    #[serde(default)]
    pub model_dir: Option<PathBuf>,

    /// Bandit state directory. Defaults to `state/<name>`.
    #[serde(default)]
    pub state_dir: Option<PathBuf>,

    /// How often the active pointer is re-checked and bandit state flushed.
    #[serde(default = "default_model_reload_secs")]
    pub model_reload_secs: u64,
}

impl TimeframeConfig {
    pub fn named(name: &str, bar_secs: u64) -> Self {
        Self {
            name: name.to_string(),
            bar_secs,
            min_lookback_bars: default_min_lookback_bars(),
            staleness_secs: None,
            history_capacity: default_history_capacity(),
            recent_capacity: default_recent_capacity(),
            thresholds: ThresholdConfig::default(),
            thresholds_path: None,
            combiner: CombinerConfig::default(),
            cohorts: Vec::new(),
            cohort_policy: CohortPolicy::default(),
            bandit: BanditConfig::default(),
            model_dir: None,
            state_dir: None,
            model_reload_secs: default_model_reload_secs(),
        }
    }

    pub fn staleness_secs(&self) -> i64 {
        self.staleness_secs
            .unwrap_or_else(|| 2 * self.bar_secs as i64)
    }

    pub fn model_dir(&self) -> PathBuf {
        self.model_dir
            .clone()
            .unwrap_or_else(|| Path::new("models").join(&self.name))
    }

    pub fn state_dir(&self) -> PathBuf {
        self.state_dir
            .clone()
            .unwrap_or_else(|| Path::new("state").join(&self.name))
    }

    pub fn bandit_state_path(&self) -> PathBuf {
        self.state_dir().join("bandit.json")
    }

    pub fn reload_interval(&self) -> Duration {
        Duration::from_secs(self.model_reload_secs.max(1))
    }

    fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            bail!("timeframe name must not be empty");
        }
        if self.bar_secs == 0 {
            bail!("timeframe {}: bar_secs must be positive", self.name);
        }
        if self.staleness_secs() <= 0 {
            bail!("timeframe {}: staleness_secs must be positive", self.name);
        }
        let mut ids = HashSet::new();
        for cohort in &self.cohorts {
            if !ids.insert(cohort.id.as_str()) {
                bail!("timeframe {}: duplicate cohort id {}", self.name, cohort.id);
            }
            if !cohort.weight.is_finite() || cohort.weight < 0.0 {
                bail!("timeframe {}: cohort {} has invalid weight", self.name, cohort.id);
            }
        }
        if !self.bandit.arms.iter().any(|a| a.enabled) {
            bail!("timeframe {}: no enabled bandit arm", self.name);
        }
        if let Some(arm) = self
            .bandit
            .arms
            .iter()
            .find(|a| !a.size_multiplier.is_finite() || a.size_multiplier <= 0.0)
        {
            bail!(
                "timeframe {}: arm {} has invalid size_multiplier {}",
                self.name,
                arm.id,
                arm.size_multiplier
            );
        }
        if self.bandit.pending_horizon_secs <= 0 {
            bail!("timeframe {}: pending_horizon_secs must be positive", self.name);
        }
        Ok(())
    }
}

// =============================================================================
// FeedConfig
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeedConfig {
    /// JSONL bar replay file. Without one the binary idles until ctrl-c.
    #[serde(default)]
    pub path: Option<PathBuf>,

    #[serde(default)]
    pub clock: ClockMode,

    /// Delay between replayed bars.
    #[serde(default)]
    pub pace_ms: u64,
}

// =============================================================================
// RuntimeConfig
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default = "default_timeframes")]
    pub timeframes: Vec<TimeframeConfig>,

    #[serde(default)]
    pub feed: FeedConfig,

    /// Cohort snapshot file (`{cohort_id: reading}`), re-read periodically.
    #[serde(default)]
    pub cohort_snapshot_path: Option<PathBuf>,

    #[serde(default = "default_model_reload_secs")]
    pub cohort_reload_secs: u64,

    #[serde(default)]
    pub paper: PaperConfig,

    /// Capacity of every bar, order and outcome channel.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            timeframes: default_timeframes(),
            feed: FeedConfig::default(),
            cohort_snapshot_path: None,
            cohort_reload_secs: default_model_reload_secs(),
            paper: PaperConfig::default(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from a JSON file at `path`.
    ///
    /// If the file does not exist, returns an error so the caller can fall
    /// back to defaults with a warning.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read runtime config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse runtime config from {}", path.display()))?;

        info!(
            path = %path.display(),
            timeframes = ?config.timeframes.iter().map(|t| t.name.as_str()).collect::<Vec<_>>(),
            "runtime config loaded"
        );

        Ok(config)
    }

    /// Persist the configuration to `path` (write `.tmp`, fsync, rename).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content = serde_json::to_vec_pretty(self)
            .context("failed to serialise runtime config to JSON")?;

        persist::write_atomic(path, &content)
            .with_context(|| format!("failed to save runtime config to {}", path.display()))?;

        info!(path = %path.display(), "runtime config saved (atomic)");
        Ok(())
    }

    /// Apply `ENGINE_FEED` / `ENGINE_COHORTS` style overrides. Empty values
    /// are ignored.
    pub fn apply_overrides(&mut self, feed: Option<String>, cohorts: Option<String>) {
        if let Some(feed) = feed.filter(|s| !s.trim().is_empty()) {
            self.feed.path = Some(PathBuf::from(feed.trim()));
        }
        if let Some(cohorts) = cohorts.filter(|s| !s.trim().is_empty()) {
            self.cohort_snapshot_path = Some(PathBuf::from(cohorts.trim()));
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.timeframes.is_empty() {
            bail!("no timeframes configured");
        }
        let mut names = HashSet::new();
        for tf in &self.timeframes {
            tf.validate()?;
            if !names.insert(tf.name.as_str()) {
                bail!("duplicate timeframe {}", tf.name);
            }
        }
        if self.channel_capacity == 0 {
            bail!("channel_capacity must be positive");
        }
        Ok(())
    }
}
