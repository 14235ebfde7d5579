// =============================================================================
// Bandit Arm Selector — strategy-arm choice with delayed, durable rewards
// =============================================================================
//
// Flow per eligible decision:
//   select_arm()  ->  register_pull(signal_id, arm)  ->  ... later ...
//   apply_outcome(TradeOutcome)  ->  ledger.resolve  ->  arm.record(reward)
//
// State (arms + ledger) is written after every mutation. A failed write is
// logged, the in-memory state keeps going, and the write is retried on the
// next mutation or `flush()`.
// =============================================================================

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::arena::arm::BanditArm;
use crate::arena::ledger::Resolution;
use crate::arena::policy::{choose, ArmView, SelectionPolicy};
use crate::arena::profile::{default_profiles, StrategyProfile};
use crate::arena::store::{BanditState, BanditStore};
use crate::error::{EngineError, Result};
use crate::execution::TradeOutcome;

fn default_optimistic_prior_bps() -> f64 {
    25.0
}

fn default_reward_clip_bps() -> f64 {
    500.0
}

fn default_pending_horizon_secs() -> i64 {
    86_400
}

fn default_resolved_retention_secs() -> i64 {
    7 * 86_400
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BanditConfig {
    #[serde(default = "default_profiles")]
    pub arms: Vec<StrategyProfile>,

    #[serde(default)]
    pub policy: SelectionPolicy,

    /// Mean reward assumed for an arm with no resolved pulls.
    #[serde(default = "default_optimistic_prior_bps")]
    pub optimistic_prior_bps: f64,

    /// Rewards are `realized_pnl_bps` clamped to ± this value.
    #[serde(default = "default_reward_clip_bps")]
    pub reward_clip_bps: f64,

    /// A pull with no outcome after this long is abandoned.
    #[serde(default = "default_pending_horizon_secs")]
    pub pending_horizon_secs: i64,

    /// Resolved ids older than this are forgotten.
    #[serde(default = "default_resolved_retention_secs")]
    pub resolved_retention_secs: i64,
}

impl Default for BanditConfig {
    fn default() -> Self {
        Self {
            arms: default_profiles(),
            policy: SelectionPolicy::default(),
            optimistic_prior_bps: default_optimistic_prior_bps(),
            reward_clip_bps: default_reward_clip_bps(),
            pending_horizon_secs: default_pending_horizon_secs(),
            resolved_retention_secs: default_resolved_retention_secs(),
        }
    }
}

/// Result of feeding one resolved outcome to the selector.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOutcome {
    Applied { arm_id: String, reward: f64 },
    Duplicate,
    Unknown,
}

pub struct BanditArmSelector {
    config: BanditConfig,
    /// Enabled configured arm ids, sorted.
    selectable: Vec<String>,
    state: BanditState,
    store: Option<BanditStore>,
    dirty: bool,
    rng: StdRng,
}

impl BanditArmSelector {
    /// Load persisted state (if a store is given) and reconcile it with the
    /// configured arm set. Configured arms missing on disk start at zero
    /// pulls; persisted arms no longer configured are kept but never chosen.
    pub fn new(config: BanditConfig, store: Option<BanditStore>) -> Result<Self> {
        let mut selectable: Vec<String> = config
            .arms
            .iter()
            .filter(|p| p.enabled)
            .map(|p| p.id.clone())
            .collect();
        selectable.sort();
        selectable.dedup();
        if selectable.is_empty() {
            return Err(EngineError::InvalidConfig(
                "bandit needs at least one enabled arm".to_string(),
            ));
        }

        let mut state = match &store {
            Some(s) => s.load()?,
            None => BanditState::default(),
        };

        let mut created = false;
        for profile in &config.arms {
            if !state.arms.contains_key(&profile.id) {
                state
                    .arms
                    .insert(profile.id.clone(), BanditArm::new(profile.id.clone()));
                created = true;
            }
        }
        for id in state.arms.keys() {
            if !selectable.contains(id) {
                warn!(arm = %id, "persisted arm is not enabled; kept but never selected");
            }
        }

        let seed = match config.policy {
            SelectionPolicy::Thompson { seed, .. } => seed,
            SelectionPolicy::Ucb1 { .. } => 0,
        };

        let mut selector = Self {
            config,
            selectable,
            state,
            store,
            dirty: created,
            rng: StdRng::seed_from_u64(seed),
        };
        info!(
            arms = ?selector.selectable,
            policy = %selector.config.policy,
            pending = selector.state.ledger.pending_len(),
            "bandit state loaded"
        );
        if selector.dirty {
            selector.persist();
        }
        Ok(selector)
    }

    pub fn arms(&self) -> &BTreeMap<String, BanditArm> {
        &self.state.arms
    }

    pub fn arm(&self, id: &str) -> Option<&BanditArm> {
        self.state.arms.get(id)
    }

    pub fn pending_count(&self) -> usize {
        self.state.ledger.pending_len()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Choose the arm for the next eligible decision.
    pub fn select_arm(&mut self) -> String {
        let prior = self.config.optimistic_prior_bps;
        let views: Vec<ArmView<'_>> = self
            .selectable
            .iter()
            .map(|id| {
                let arm = self.state.arms.get(id);
                ArmView {
                    id,
                    mean: arm.map_or(prior, |a| a.mean_or(prior)),
                    resolved: arm.map_or(0, |a| a.pull_count),
                    pending: self.state.ledger.pending_for(id),
                }
            })
            .collect();
        let idx = choose(&self.config.policy, &views, &mut self.rng).unwrap_or(0);
        let chosen = self.selectable[idx].clone();
        debug!(arm = %chosen, "bandit arm selected");
        chosen
    }

    /// Record that `signal_id` was sent to execution under `arm_id`.
    /// Idempotent: a known id is left as is.
    pub fn register_pull(&mut self, signal_id: &str, arm_id: &str, at: DateTime<Utc>) -> bool {
        let added = self.state.ledger.register(signal_id, arm_id, at);
        if added {
            self.dirty = true;
            self.persist();
        }
        added
    }

    /// Forget a pull whose order never reached execution.
    pub fn cancel_pull(&mut self, signal_id: &str) -> bool {
        let removed = self.state.ledger.cancel(signal_id);
        if removed {
            self.dirty = true;
            self.persist();
        }
        removed
    }

    /// Apply a resolved reward for `signal_id`.
    pub fn update(&mut self, signal_id: &str, reward: f64, at: DateTime<Utc>) -> UpdateOutcome {
        if !reward.is_finite() {
            warn!(signal_id, reward, "non-finite reward ignored");
            return UpdateOutcome::Unknown;
        }
        match self.state.ledger.resolve(signal_id, at) {
            Resolution::Resolved { arm_id } => {
                self.state
                    .arms
                    .entry(arm_id.clone())
                    .or_insert_with(|| BanditArm::new(arm_id.clone()))
                    .record(reward, at);
                self.dirty = true;
                self.persist();
                info!(signal_id, arm = %arm_id, reward, "bandit reward applied");
                UpdateOutcome::Applied { arm_id, reward }
            }
            Resolution::Duplicate => {
                debug!(signal_id, "duplicate outcome ignored");
                UpdateOutcome::Duplicate
            }
            Resolution::Unknown => {
                warn!(signal_id, "outcome for unknown signal ignored");
                UpdateOutcome::Unknown
            }
        }
    }

    /// Abandon pulls older than the pending horizon and prune resolved ids
    /// older than the retention window. Returns the number of abandoned
    /// pulls.
    pub fn expire_stale(&mut self, now: DateTime<Utc>) -> usize {
        let horizon = Duration::seconds(self.config.pending_horizon_secs.max(0));
        let expired = self.state.ledger.expire_pending(now, horizon);
        for (signal_id, pull) in &expired {
            warn!(
                signal_id = %signal_id,
                arm = %pull.arm_id,
                pulled_at = %pull.pulled_at,
                "pending pull abandoned without an outcome"
            );
        }
        let retention = Duration::seconds(self.config.resolved_retention_secs.max(0));
        let pruned = self.state.ledger.prune_resolved(now - retention);
        if pruned > 0 {
            debug!(pruned, "resolved ids pruned");
        }
        if !expired.is_empty() || pruned > 0 {
            self.dirty = true;
            self.persist();
        }
        expired.len()
    }

    /// Clip the realised PnL into a reward and apply it.
    pub fn apply_outcome(&mut self, outcome: &TradeOutcome) -> UpdateOutcome {
        let clip = self.config.reward_clip_bps.abs();
        let reward = outcome.realized_pnl_bps.clamp(-clip, clip);
        self.update(&outcome.signal_id, reward, outcome.resolved_at)
    }

    /// Retry a previously failed write.
    pub fn flush(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        match &self.store {
            Some(store) => {
                store.save(&self.state)?;
                self.dirty = false;
                Ok(())
            }
            None => {
                self.dirty = false;
                Ok(())
            }
        }
    }

    fn persist(&mut self) {
        if let Err(e) = self.flush() {
            warn!(error = %e, "bandit state write failed; will retry");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn config(ids: &[&str]) -> BanditConfig {
        BanditConfig {
            arms: ids.iter().map(|id| StrategyProfile::new(*id, "")).collect(),
            policy: SelectionPolicy::Ucb1 { exploration: 10.0 },
            optimistic_prior_bps: 25.0,
            reward_clip_bps: 500.0,
            pending_horizon_secs: 3_600,
            resolved_retention_secs: 7_200,
        }
    }

    #[test]
    fn explores_every_arm_in_id_order_first() {
        let mut bandit = BanditArmSelector::new(BanditConfig::default(), None).unwrap();
        let now = Utc::now();
        let mut picked = Vec::new();
        for i in 0..4 {
            let arm = bandit.select_arm();
            bandit.register_pull(&format!("s{i}"), &arm, now);
            picked.push(arm);
        }
        assert_eq!(picked, vec!["breakout", "mean_revert", "momentum", "scalp"]);
    }

    #[test]
    fn update_moves_pull_from_pending_to_resolved() {
        let mut bandit = BanditArmSelector::new(config(&["a", "b"]), None).unwrap();
        let now = Utc::now();
        bandit.register_pull("sig", "b", now);
        assert_eq!(bandit.pending_count(), 1);
        assert_eq!(bandit.arm("b").unwrap().pull_count, 0);

        assert_eq!(
            bandit.update("sig", 12.0, now),
            UpdateOutcome::Applied {
                arm_id: "b".to_string(),
                reward: 12.0
            }
        );
        assert_eq!(bandit.pending_count(), 0);
        assert_eq!(bandit.arm("b").unwrap().pull_count, 1);
        assert_eq!(bandit.update("sig", 12.0, now), UpdateOutcome::Duplicate);
        assert_eq!(bandit.update("nope", 1.0, now), UpdateOutcome::Unknown);
        assert_eq!(bandit.arm("b").unwrap().pull_count, 1);
    }

    #[test]
    fn outcome_reward_is_clipped() {
        let mut bandit = BanditArmSelector::new(config(&["a"]), None).unwrap();
        let now = Utc::now();
        bandit.register_pull("sig", "a", now);
        let outcome = TradeOutcome {
            signal_id: "sig".to_string(),
            realized_pnl_bps: -9_000.0,
            resolved_at: now,
        };
        bandit.apply_outcome(&outcome);
        assert_eq!(bandit.arm("a").unwrap().cumulative_reward, -500.0);
    }

    #[test]
    fn restart_replay_never_double_counts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bandit.json");
        let now = Utc::now();
        {
            let mut bandit =
                BanditArmSelector::new(config(&["a", "b"]), Some(BanditStore::new(&path))).unwrap();
            bandit.register_pull("s1", "a", now);
            bandit.register_pull("s2", "b", now);
            bandit.update("s1", 40.0, now);
        }
        let mut restarted =
            BanditArmSelector::new(config(&["a", "b"]), Some(BanditStore::new(&path))).unwrap();
        assert_eq!(restarted.pending_count(), 1);
        // Replay of both outcomes after the restart.
        assert_eq!(restarted.update("s1", 40.0, now), UpdateOutcome::Duplicate);
        assert!(matches!(
            restarted.update("s2", -5.0, now),
            UpdateOutcome::Applied { .. }
        ));
        assert!(!restarted.register_pull("s1", "a", now));

        let again =
            BanditArmSelector::new(config(&["a", "b"]), Some(BanditStore::new(&path))).unwrap();
        assert_eq!(again.arm("a").unwrap().pull_count, 1);
        assert_eq!(again.arm("a").unwrap().cumulative_reward, 40.0);
        assert_eq!(again.arm("b").unwrap().pull_count, 1);
        assert_eq!(again.pending_count(), 0);
    }

    #[test]
    fn unconfigured_persisted_arm_is_kept_but_never_selected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bandit.json");
        {
            BanditArmSelector::new(config(&["a", "retired"]), Some(BanditStore::new(&path))).unwrap();
        }
        let mut bandit =
            BanditArmSelector::new(config(&["a"]), Some(BanditStore::new(&path))).unwrap();
        assert!(bandit.arm("retired").is_some());
        for i in 0..10 {
            let arm = bandit.select_arm();
            assert_eq!(arm, "a");
            bandit.register_pull(&format!("s{i}"), &arm, Utc::now());
        }
    }

    #[test]
    fn failed_write_marks_dirty_and_flush_retries() {
        let dir = tempfile::tempdir().unwrap();
        // Parent path is a file, so the write fails.
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "x").unwrap();
        let store = BanditStore::new(blocker.join("bandit.json"));
        let mut bandit = BanditArmSelector::new(config(&["a"]), Some(store)).unwrap();
        assert!(bandit.is_dirty());
        bandit.register_pull("s", "a", Utc::now());
        assert_eq!(bandit.pending_count(), 1);
        assert!(bandit.is_dirty());
        assert!(bandit.flush().is_err());

        std::fs::remove_file(&blocker).unwrap();
        bandit.flush().unwrap();
        assert!(!bandit.is_dirty());
    }

    #[test]
    fn abandoned_pulls_stop_counting_against_their_arm() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bandit.json");
        let t0 = Utc::now();
        let mut bandit =
            BanditArmSelector::new(config(&["a", "b"]), Some(BanditStore::new(&path))).unwrap();
        bandit.register_pull("lost-1", "a", t0);
        bandit.register_pull("lost-2", "a", t0);
        bandit.register_pull("kept", "b", t0 + Duration::minutes(50));

        assert_eq!(bandit.expire_stale(t0 + Duration::minutes(30)), 0);
        assert_eq!(bandit.expire_stale(t0 + Duration::minutes(61)), 2);
        assert_eq!(bandit.pending_count(), 1);
        assert_eq!(
            bandit.update("lost-1", 30.0, t0 + Duration::minutes(62)),
            UpdateOutcome::Unknown
        );
        assert_eq!(bandit.arm("a").unwrap().pull_count, 0);

        let reloaded =
            BanditArmSelector::new(config(&["a", "b"]), Some(BanditStore::new(&path))).unwrap();
        assert_eq!(reloaded.pending_count(), 1);
    }

    #[test]
    fn resolved_ids_are_pruned_after_retention() {
        let mut bandit = BanditArmSelector::new(config(&["a"]), None).unwrap();
        let t0 = Utc::now();
        bandit.register_pull("s1", "a", t0);
        bandit.update("s1", 5.0, t0);
        assert_eq!(bandit.update("s1", 5.0, t0), UpdateOutcome::Duplicate);

        bandit.expire_stale(t0 + Duration::hours(3));
        // Forgotten, but still never counted twice.
        assert_eq!(
            bandit.update("s1", 5.0, t0 + Duration::hours(3)),
            UpdateOutcome::Unknown
        );
        assert_eq!(bandit.arm("a").unwrap().pull_count, 1);
    }

    #[test]
    fn no_enabled_arm_is_config_error() {
        let mut cfg = config(&["a"]);
        cfg.arms[0].enabled = false;
        assert!(BanditArmSelector::new(cfg, None).is_err());
    }

    proptest! {
        #[test]
        fn updates_on_different_arms_commute(r1 in -500.0f64..500.0, r2 in -500.0f64..500.0) {
            let now = Utc::now();
            let run = |first: (&str, f64), second: (&str, f64)| {
                let mut bandit = BanditArmSelector::new(config(&["a", "b"]), None).unwrap();
                bandit.register_pull("sa", "a", now);
                bandit.register_pull("sb", "b", now);
                bandit.update(first.0, first.1, now);
                bandit.update(second.0, second.1, now);
                bandit
                    .arms()
                    .values()
                    .map(|a| (a.id.clone(), a.pull_count, a.cumulative_reward))
                    .collect::<Vec<_>>()
            };
            prop_assert_eq!(run(("sa", r1), ("sb", r2)), run(("sb", r2), ("sa", r1)));
        }
    }
}
