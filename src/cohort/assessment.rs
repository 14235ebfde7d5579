// =============================================================================
// Cohort assessment — usable vs. degraded readings
// =============================================================================
//
// A degraded reading (thin sample, stale or future-dated source, no reading,
// garbage values) is excluded from both the blend and consensus, and is flagged on the
// SignalRecord. A fresh, well-sampled reading of exactly 0 bps is a genuine
// balanced reading and stays Usable.
// =============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::cohort::provider::{CohortKind, CohortReading, CohortSignalProvider, CohortSpec};
use crate::error::{EngineError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegradedReason {
    InsufficientSample,
    Stale,
    Unavailable,
    NonFinite,
    /// Stamped later than the decision time, beyond the allowed skew.
    Future,
}

impl std::fmt::Display for DegradedReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InsufficientSample => write!(f, "insufficient_sample"),
            Self::Stale => write!(f, "stale"),
            Self::Unavailable => write!(f, "unavailable"),
            Self::NonFinite => write!(f, "non_finite"),
            Self::Future => write!(f, "future"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum CohortStatus {
    Usable,
    Degraded(DegradedReason),
}

/// A cohort reading after policy classification, as carried on a
/// SignalRecord.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssessedCohortSignal {
    pub cohort_id: String,
    pub kind: CohortKind,
    pub weight: f64,
    pub alpha_bps: f64,
    pub confidence: f64,
    pub sample_size: u64,
    pub status: CohortStatus,
}

impl AssessedCohortSignal {
    pub fn is_usable(&self) -> bool {
        self.status == CohortStatus::Usable
    }

    /// The error form of a degraded reading, for logging.
    pub fn degradation(&self) -> Option<EngineError> {
        match self.status {
            CohortStatus::Usable => None,
            CohortStatus::Degraded(reason) => Some(EngineError::DegradedCohortSignal {
                cohort_id: self.cohort_id.clone(),
                reason: reason.to_string(),
            }),
        }
    }
}

fn default_min_sample_size() -> u64 {
    20
}

fn default_max_age_secs() -> i64 {
    900
}

fn default_max_clock_skew_secs() -> i64 {
    5
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CohortPolicy {
    #[serde(default = "default_min_sample_size")]
    pub min_sample_size: u64,
    #[serde(default = "default_max_age_secs")]
    pub max_age_secs: i64,
    /// How far past `now` a reading's `as_of` may lie before it is rejected.
    #[serde(default = "default_max_clock_skew_secs")]
    pub max_clock_skew_secs: i64,
}

impl Default for CohortPolicy {
    fn default() -> Self {
        Self {
            min_sample_size: default_min_sample_size(),
            max_age_secs: default_max_age_secs(),
            max_clock_skew_secs: default_max_clock_skew_secs(),
        }
    }
}

impl CohortPolicy {
    /// Classify one provider result taken at `now`. A reading newer than the
    /// bar but not newer than `now` is the latest available data and counts.
    pub fn assess(
        &self,
        spec: &CohortSpec,
        reading: Result<Option<CohortReading>>,
        now: DateTime<Utc>,
    ) -> AssessedCohortSignal {
        let degraded = |reason, sample_size| AssessedCohortSignal {
            cohort_id: spec.id.clone(),
            kind: spec.kind,
            weight: spec.weight,
            alpha_bps: 0.0,
            confidence: 0.0,
            sample_size,
            status: CohortStatus::Degraded(reason),
        };

        let r = match reading {
            Ok(Some(r)) => r,
            Ok(None) | Err(_) => return degraded(DegradedReason::Unavailable, 0),
        };
        if !r.alpha_bps.is_finite() || !r.confidence.is_finite() {
            return degraded(DegradedReason::NonFinite, r.sample_size);
        }
        if (r.as_of - now).num_seconds() > self.max_clock_skew_secs {
            return degraded(DegradedReason::Future, r.sample_size);
        }
        if (now - r.as_of).num_seconds() > self.max_age_secs {
            return degraded(DegradedReason::Stale, r.sample_size);
        }
        if r.sample_size < self.min_sample_size {
            return degraded(DegradedReason::InsufficientSample, r.sample_size);
        }

        AssessedCohortSignal {
            cohort_id: spec.id.clone(),
            kind: spec.kind,
            weight: spec.weight,
            alpha_bps: r.alpha_bps,
            confidence: r.confidence.clamp(0.0, 1.0),
            sample_size: r.sample_size,
            status: CohortStatus::Usable,
        }
    }

    /// Query every configured cohort for `timestamp` and classify the results.
    pub fn gather(
        &self,
        provider: &dyn CohortSignalProvider,
        specs: &[CohortSpec],
        timestamp: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Vec<AssessedCohortSignal> {
        specs
            .iter()
            .map(|spec| {
                let raw = provider.signal(timestamp, &spec.id);
                if let Err(e) = &raw {
                    warn!(cohort = %spec.id, error = %e, "cohort provider error");
                }
                let assessed = self.assess(spec, raw, now);
                if let Some(e) = assessed.degradation() {
                    warn!(cohort = %spec.id, kind = %spec.kind, error = %e, "cohort reading degraded");
                }
                assessed
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cohort::provider::CohortSnapshotStore;
    use chrono::Duration;

    fn spec() -> CohortSpec {
        CohortSpec {
            id: "smart".to_string(),
            kind: CohortKind::Smart,
            weight: 0.5,
        }
    }

    fn reading(alpha: f64, sample: u64, age_secs: i64, now: DateTime<Utc>) -> CohortReading {
        CohortReading {
            alpha_bps: alpha,
            confidence: 0.9,
            sample_size: sample,
            as_of: now - Duration::seconds(age_secs),
        }
    }

    #[test]
    fn exact_zero_is_a_usable_reading() {
        let now = Utc::now();
        let a = CohortPolicy::default().assess(&spec(), Ok(Some(reading(0.0, 50, 10, now))), now);
        assert!(a.is_usable());
        assert_eq!(a.alpha_bps, 0.0);
    }

    #[test]
    fn degraded_classes() {
        let now = Utc::now();
        let policy = CohortPolicy {
            min_sample_size: 20,
            max_age_secs: 60,
            max_clock_skew_secs: 5,
        };
        let cases = [
            (Ok(None), DegradedReason::Unavailable),
            (
                Err(EngineError::FeatureBuild("boom".into())),
                DegradedReason::Unavailable,
            ),
            (Ok(Some(reading(5.0, 5, 10, now))), DegradedReason::InsufficientSample),
            (Ok(Some(reading(5.0, 50, 120, now))), DegradedReason::Stale),
            (Ok(Some(reading(f64::NAN, 50, 10, now))), DegradedReason::NonFinite),
            (Ok(Some(reading(5.0, 50, -30, now))), DegradedReason::Future),
        ];
        for (raw, expected) in cases {
            let a = policy.assess(&spec(), raw, now);
            assert_eq!(a.status, CohortStatus::Degraded(expected));
            assert_eq!(a.alpha_bps, 0.0);
            assert!(a.degradation().is_some());
        }
    }

    #[test]
    fn gather_covers_every_cohort() {
        let now = Utc::now();
        let store = CohortSnapshotStore::new();
        store.update("smart", reading(8.0, 50, 5, now));
        let specs = vec![
            spec(),
            CohortSpec {
                id: "mid".to_string(),
                kind: CohortKind::Mid,
                weight: 0.25,
            },
        ];
        let out = CohortPolicy::default().gather(&store, &specs, now, now);
        assert_eq!(out.len(), 2);
        assert!(out[0].is_usable());
        assert_eq!(out[1].status, CohortStatus::Degraded(DegradedReason::Unavailable));
    }

    #[test]
    fn reading_after_bar_close_but_before_now_is_usable() {
        let bar_close = Utc::now();
        let now = bar_close + Duration::seconds(3);
        let store = CohortSnapshotStore::new();
        store.update(
            "smart",
            CohortReading {
                alpha_bps: 40.0,
                confidence: 1.0,
                sample_size: 100,
                as_of: bar_close + Duration::seconds(2),
            },
        );
        let out = CohortPolicy::default().gather(&store, &[spec()], bar_close, now);
        assert_eq!(out[0].status, CohortStatus::Usable);
        assert_eq!(out[0].alpha_bps, 40.0);
    }

    #[test]
    fn small_clock_skew_is_tolerated() {
        let now = Utc::now();
        let policy = CohortPolicy::default();
        let ahead = policy.assess(&spec(), Ok(Some(reading(5.0, 50, -3, now))), now);
        assert!(ahead.is_usable());
    }

    #[test]
    fn status_serialises_with_reason() {
        let json = serde_json::to_string(&CohortStatus::Degraded(DegradedReason::Stale)).unwrap();
        assert_eq!(json, r#"{"status":"degraded","reason":"stale"}"#);
    }
}
