// =============================================================================
// Pending-pull ledger — durable, keyed by signal id
// =============================================================================
//
// A pull moves pending -> resolved exactly once. Resolved ids are kept so a
// replayed TradeOutcome (after a restart, or a duplicate delivery) is
// recognised and ignored instead of being counted again.
//
// Both maps are bounded in time: pending pulls older than the horizon are
// abandoned, resolved ids older than the retention window are pruned. An
// outcome for either is then Unknown, which is still never counted.
// =============================================================================

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingPull {
    pub arm_id: String,
    pub pulled_at: DateTime<Utc>,
}

/// How a ledger lookup for a resolved outcome went.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// First resolution; the caller applies the reward to this arm.
    Resolved { arm_id: String },
    /// Already applied earlier.
    Duplicate,
    /// Never registered, cancelled or expired.
    Unknown,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PendingLedger {
    #[serde(default)]
    pending: BTreeMap<String, PendingPull>,
    /// Resolved id -> when it was resolved.
    #[serde(default)]
    resolved: BTreeMap<String, DateTime<Utc>>,
}

impl PendingLedger {
    /// Record a pull. Returns `false` when the id is already known, pending
    /// or resolved, so registration is idempotent.
    pub fn register(&mut self, signal_id: &str, arm_id: &str, at: DateTime<Utc>) -> bool {
        if self.resolved.contains_key(signal_id) || self.pending.contains_key(signal_id) {
            return false;
        }
        self.pending.insert(
            signal_id.to_string(),
            PendingPull {
                arm_id: arm_id.to_string(),
                pulled_at: at,
            },
        );
        true
    }

    /// Drop a pull whose order never reached execution.
    pub fn cancel(&mut self, signal_id: &str) -> bool {
        self.pending.remove(signal_id).is_some()
    }

    pub fn resolve(&mut self, signal_id: &str, at: DateTime<Utc>) -> Resolution {
        if self.resolved.contains_key(signal_id) {
            return Resolution::Duplicate;
        }
        match self.pending.remove(signal_id) {
            Some(pull) => {
                self.resolved.insert(signal_id.to_string(), at);
                Resolution::Resolved {
                    arm_id: pull.arm_id,
                }
            }
            None => Resolution::Unknown,
        }
    }

    /// Remove pending pulls made more than `horizon` before `now` and
    /// return them as `(signal_id, pull)`.
    pub fn expire_pending(
        &mut self,
        now: DateTime<Utc>,
        horizon: Duration,
    ) -> Vec<(String, PendingPull)> {
        let cutoff = now - horizon;
        let expired: Vec<String> = self
            .pending
            .iter()
            .filter(|(_, p)| p.pulled_at < cutoff)
            .map(|(id, _)| id.clone())
            .collect();
        expired
            .into_iter()
            .filter_map(|id| self.pending.remove(&id).map(|p| (id, p)))
            .collect()
    }

    /// Forget resolved ids older than `watermark`. Returns how many went.
    pub fn prune_resolved(&mut self, watermark: DateTime<Utc>) -> usize {
        let before = self.resolved.len();
        self.resolved.retain(|_, at| *at >= watermark);
        before - self.resolved.len()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn resolved_len(&self) -> usize {
        self.resolved.len()
    }

    pub fn pending_for(&self, arm_id: &str) -> u64 {
        self.pending.values().filter(|p| p.arm_id == arm_id).count() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_exactly_once() {
        let mut ledger = PendingLedger::default();
        let now = Utc::now();
        assert!(ledger.register("sig-1", "momentum", now));
        assert!(!ledger.register("sig-1", "scalp", now));
        assert_eq!(ledger.pending_for("momentum"), 1);

        assert_eq!(
            ledger.resolve("sig-1", now),
            Resolution::Resolved {
                arm_id: "momentum".to_string()
            }
        );
        assert_eq!(ledger.resolve("sig-1", now), Resolution::Duplicate);
        assert_eq!(ledger.resolve("sig-9", now), Resolution::Unknown);
        // A resolved id can never be re-registered.
        assert!(!ledger.register("sig-1", "momentum", now));
        assert_eq!(ledger.pending_len(), 0);
        assert_eq!(ledger.resolved_len(), 1);
    }

    #[test]
    fn cancelled_pull_is_unknown() {
        let mut ledger = PendingLedger::default();
        let now = Utc::now();
        ledger.register("sig-2", "breakout", now);
        assert!(ledger.cancel("sig-2"));
        assert_eq!(ledger.resolve("sig-2", now), Resolution::Unknown);
    }

    #[test]
    fn pulls_past_the_horizon_expire() {
        let mut ledger = PendingLedger::default();
        let now = Utc::now();
        ledger.register("old", "scalp", now - Duration::hours(30));
        ledger.register("young", "scalp", now - Duration::hours(2));

        let expired = ledger.expire_pending(now, Duration::hours(24));
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].0, "old");
        assert_eq!(expired[0].1.arm_id, "scalp");
        assert_eq!(ledger.pending_for("scalp"), 1);
        // A late outcome for the abandoned pull is not applied.
        assert_eq!(ledger.resolve("old", now), Resolution::Unknown);
        assert!(matches!(
            ledger.resolve("young", now),
            Resolution::Resolved { .. }
        ));
    }

    #[test]
    fn resolved_ids_below_watermark_are_pruned() {
        let mut ledger = PendingLedger::default();
        let now = Utc::now();
        for (id, age_h) in [("a", 200), ("b", 100), ("c", 1)] {
            let at = now - Duration::hours(age_h);
            ledger.register(id, "momentum", at);
            ledger.resolve(id, at);
        }
        assert_eq!(ledger.resolved_len(), 3);
        assert_eq!(ledger.prune_resolved(now - Duration::hours(150)), 1);
        assert_eq!(ledger.resolved_len(), 2);
        assert_eq!(ledger.resolve("b", now), Resolution::Duplicate);
        assert_eq!(ledger.resolve("a", now), Resolution::Unknown);
    }
}
