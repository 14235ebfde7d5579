// =============================================================================
// Signal Record — auditable per-bar decision
// =============================================================================
//
// One record per READY bar. A record is the unit of atomicity handed to the
// execution side: only records with `eligible == true` ever produce an order.
// =============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cohort::AssessedCohortSignal;
use crate::model::ClassProbabilities;
use crate::signals::combiner::CombinedSignal;
use crate::signals::thresholds::ThresholdConfig;
use crate::types::Direction;

/// Why a record was not forwarded to execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IneligibilityReason {
    StaleData,
    LowConfidence,
    InsufficientAlpha,
    NoDirection,
    NoConsensus,
    CohortUnavailable,
}

impl std::fmt::Display for IneligibilityReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::StaleData => "StaleData",
            Self::LowConfidence => "LowConfidence",
            Self::InsufficientAlpha => "InsufficientAlpha",
            Self::NoDirection => "NoDirection",
            Self::NoConsensus => "NoConsensus",
            Self::CohortUnavailable => "CohortUnavailable",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalRecord {
    /// UUID v4; also the key of the bandit's pending-pull ledger.
    pub id: String,
    pub timeframe: String,
    /// Close time of the bar this record decides on.
    pub timestamp: DateTime<Utc>,
    pub decided_at: DateTime<Utc>,

    pub p_up: f64,
    pub p_down: f64,
    pub p_neutral: f64,
    /// `max(p_up, p_down)`.
    pub confidence: f64,

    pub model_alpha_bps: f64,
    pub combined_alpha_bps: f64,
    #[serde(default)]
    pub mood: Option<f64>,

    pub cohort_signals: Vec<AssessedCohortSignal>,
    /// Ids of cohorts whose reading was degraded this bar.
    #[serde(default)]
    pub degraded_cohorts: Vec<String>,

    pub eligible: bool,
    pub direction: Direction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ineligibility_reason: Option<IneligibilityReason>,

    /// Thresholds in force for this cycle.
    pub thresholds: ThresholdConfig,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bundle_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arm_id: Option<String>,
}

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

impl SignalRecord {
    /// A fully decided record.
    #[allow(clippy::too_many_arguments)]
    pub fn decided(
        timeframe: &str,
        timestamp: DateTime<Utc>,
        decided_at: DateTime<Utc>,
        probs: &ClassProbabilities,
        combined: CombinedSignal,
        mood: Option<f64>,
        cohort_signals: Vec<AssessedCohortSignal>,
        thresholds: ThresholdConfig,
        bundle_version: String,
    ) -> Self {
        let degraded_cohorts = cohort_signals
            .iter()
            .filter(|c| !c.is_usable())
            .map(|c| c.cohort_id.clone())
            .collect();
        Self {
            id: new_id(),
            timeframe: timeframe.to_string(),
            timestamp,
            decided_at,
            p_up: probs.p_up,
            p_down: probs.p_down,
            p_neutral: probs.p_neutral,
            confidence: combined.confidence,
            model_alpha_bps: combined.model_alpha_bps,
            combined_alpha_bps: combined.combined_alpha_bps,
            mood,
            cohort_signals,
            degraded_cohorts,
            eligible: combined.eligible,
            direction: combined.direction,
            ineligibility_reason: combined.ineligibility_reason,
            thresholds,
            bundle_version: Some(bundle_version),
            arm_id: None,
        }
    }

    /// A bar whose data exceeded the staleness bound. No inference is run,
    /// so the record carries the uninformative distribution.
    pub fn stale(
        timeframe: &str,
        timestamp: DateTime<Utc>,
        decided_at: DateTime<Utc>,
        thresholds: ThresholdConfig,
    ) -> Self {
        Self {
            id: new_id(),
            timeframe: timeframe.to_string(),
            timestamp,
            decided_at,
            p_up: 0.0,
            p_down: 0.0,
            p_neutral: 1.0,
            confidence: 0.0,
            model_alpha_bps: 0.0,
            combined_alpha_bps: 0.0,
            mood: None,
            cohort_signals: Vec::new(),
            degraded_cohorts: Vec::new(),
            eligible: false,
            direction: Direction::Neutral,
            ineligibility_reason: Some(IneligibilityReason::StaleData),
            thresholds,
            bundle_version: None,
            arm_id: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stale_record_is_neutral_and_normalised() {
        let now = Utc::now();
        let r = SignalRecord::stale("5m", now, now, ThresholdConfig::default());
        assert!(!r.eligible);
        assert_eq!(r.direction, Direction::Neutral);
        assert_eq!(r.ineligibility_reason, Some(IneligibilityReason::StaleData));
        assert!((r.p_up + r.p_down + r.p_neutral - 1.0).abs() < 1e-12);
    }

    #[test]
    fn reason_serialises_by_name() {
        let json = serde_json::to_string(&IneligibilityReason::StaleData).unwrap();
        assert_eq!(json, "\"StaleData\"");
        let now = Utc::now();
        let r = SignalRecord::stale("1h", now, now, ThresholdConfig::default());
        let v = serde_json::to_value(&r).unwrap();
        assert_eq!(v["ineligibility_reason"], "StaleData");
        assert_eq!(v["direction"], "NEUTRAL");
        assert!(v.get("arm_id").is_none());
    }
}
