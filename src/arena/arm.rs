use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Reward statistics for one arm. Only resolved pulls are counted here;
/// in-flight pulls live in the pending ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BanditArm {
    pub id: String,
    #[serde(default)]
    pub pull_count: u64,
    #[serde(default)]
    pub cumulative_reward: f64,
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
}

impl BanditArm {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            pull_count: 0,
            cumulative_reward: 0.0,
            last_updated: None,
        }
    }

    /// Mean resolved reward, or `prior` before the first resolution.
    pub fn mean_or(&self, prior: f64) -> f64 {
        if self.pull_count == 0 {
            prior
        } else {
            self.cumulative_reward / self.pull_count as f64
        }
    }

    pub fn record(&mut self, reward: f64, at: DateTime<Utc>) {
        self.pull_count += 1;
        self.cumulative_reward += reward;
        self.last_updated = Some(at);
    }
}
