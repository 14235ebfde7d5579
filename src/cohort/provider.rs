// =============================================================================
// Cohort Signal Provider — per-cohort alpha from tracked participant groups
// =============================================================================
//
// The engine only consumes readings; building them from per-address
// position/funding snapshots happens in an external producer, which pushes
// results into a `CohortSnapshotStore` (or implements the trait directly).
// =============================================================================

use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::Result;
use crate::signals::thresholds::ThresholdConfig;

/// Cohort family. Each family gates consensus with its own threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CohortKind {
    Smart,
    Mid,
    SmartSocial,
}

impl CohortKind {
    /// Minimum |alpha| (bps) a reading of this kind needs to count as
    /// consensus.
    pub fn consensus_threshold(&self, thresholds: &ThresholdConfig) -> f64 {
        match self {
            Self::Smart => thresholds.s_min,
            Self::Mid => thresholds.m_min,
            Self::SmartSocial => thresholds.s_min_social,
        }
    }
}

impl std::fmt::Display for CohortKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Smart => write!(f, "smart"),
            Self::Mid => write!(f, "mid"),
            Self::SmartSocial => write!(f, "smart_social"),
        }
    }
}

/// One configured cohort feeding a timeframe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CohortSpec {
    pub id: String,
    pub kind: CohortKind,
    /// Blend weight, scaled further by each reading's confidence.
    #[serde(default = "default_cohort_weight")]
    pub weight: f64,
}

fn default_cohort_weight() -> f64 {
    0.5
}

/// A raw provider reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CohortReading {
    pub alpha_bps: f64,
    pub confidence: f64,
    pub sample_size: u64,
    /// When the underlying snapshot was taken.
    pub as_of: DateTime<Utc>,
}

/// Source of cohort readings.
///
/// `Ok(None)` means the cohort has no reading at all for this timestamp
/// (architecturally unavailable); that is distinct from a reading whose
/// alpha happens to be zero.
pub trait CohortSignalProvider: Send + Sync {
    fn signal(&self, timestamp: DateTime<Utc>, cohort_id: &str) -> Result<Option<CohortReading>>;
}

// ---------------------------------------------------------------------------
// In-memory store fed by an external producer
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct CohortSnapshotStore {
    readings: RwLock<HashMap<String, CohortReading>>,
}

impl CohortSnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&self, cohort_id: impl Into<String>, reading: CohortReading) {
        self.readings.write().insert(cohort_id.into(), reading);
    }

    pub fn replace_all(&self, readings: HashMap<String, CohortReading>) {
        *self.readings.write() = readings;
    }

    pub fn len(&self) -> usize {
        self.readings.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.read().is_empty()
    }

    /// Replace the store contents from a JSON object `{ cohort_id: reading }`.
    /// A missing file leaves the store untouched.
    pub fn load_snapshot_file(&self, path: &Path) -> Result<usize> {
        let Some(readings) = crate::persist::read_json::<HashMap<String, CohortReading>>(path)?
        else {
            return Ok(0);
        };
        let count = readings.len();
        self.replace_all(readings);
        info!(path = %path.display(), cohorts = count, "cohort snapshot loaded");
        Ok(count)
    }
}

impl CohortSignalProvider for CohortSnapshotStore {
    /// Always the latest reading; freshness is judged by the cohort policy
    /// against the decision time.
    fn signal(&self, _timestamp: DateTime<Utc>, cohort_id: &str) -> Result<Option<CohortReading>> {
        Ok(self.readings.read().get(cohort_id).cloned())
    }
}
