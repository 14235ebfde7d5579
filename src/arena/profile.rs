// =============================================================================
// Strategy Profiles — the default arm set
// =============================================================================
//
// Each profile is one selectable strategy variant. The bandit only knows the
// id; execution reads the sizing and exit parameters when it opens a
// position for an order carrying that arm id.
// =============================================================================

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyProfile {
    /// Arm id (e.g. "momentum", "mean_revert").
    pub id: String,

    #[serde(default)]
    pub description: String,

    /// Disabled profiles keep their history but are never selected.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Position size relative to the base notional. Scales PnL and fees.
    #[serde(default = "default_size_multiplier")]
    pub size_multiplier: f64,

    /// Bars to hold before closing at market. `None` uses the executor's
    /// default.
    #[serde(default)]
    pub hold_bars: Option<u32>,

    /// Close early once the move in favour reaches this many bps.
    #[serde(default)]
    pub take_profit_bps: Option<f64>,

    /// Close early once the move against reaches this many bps.
    #[serde(default)]
    pub stop_loss_bps: Option<f64>,
}

fn default_enabled() -> bool {
    true
}

fn default_size_multiplier() -> f64 {
    1.0
}

impl StrategyProfile {
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            enabled: true,
            size_multiplier: default_size_multiplier(),
            hold_bars: None,
            take_profit_bps: None,
            stop_loss_bps: None,
        }
    }

    pub fn with_size(mut self, size_multiplier: f64) -> Self {
        self.size_multiplier = size_multiplier;
        self
    }

    pub fn with_hold_bars(mut self, bars: u32) -> Self {
        self.hold_bars = Some(bars);
        self
    }

    pub fn with_exits(mut self, take_profit_bps: Option<f64>, stop_loss_bps: Option<f64>) -> Self {
        self.take_profit_bps = take_profit_bps;
        self.stop_loss_bps = stop_loss_bps;
        self
    }
}

/// The four default arms.
pub fn default_profiles() -> Vec<StrategyProfile> {
    vec![
        StrategyProfile::new(
            "breakout",
            "Acts on decisions that follow a volatility contraction; wide targets.",
        )
        .with_hold_bars(6)
        .with_exits(Some(80.0), Some(40.0)),
        StrategyProfile::new(
            "mean_revert",
            "Fades stretched moves back toward the band middle; quick exits.",
        )
        .with_size(0.75)
        .with_hold_bars(3)
        .with_exits(Some(30.0), Some(25.0)),
        StrategyProfile::new(
            "momentum",
            "Follows the decision direction while trend strength holds.",
        )
        .with_hold_bars(5)
        .with_exits(None, Some(50.0)),
        StrategyProfile::new(
            "scalp",
            "Short holding period with tight stop and target.",
        )
        .with_size(0.5)
        .with_hold_bars(1)
        .with_exits(Some(15.0), Some(10.0)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_profiles_are_unique_and_enabled() {
        let profiles = default_profiles();
        assert_eq!(profiles.len(), 4);
        assert!(profiles.iter().all(|p| p.enabled));
        let mut ids: Vec<&str> = profiles.iter().map(|p| p.id.as_str()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 4);
    }

    #[test]
    fn default_profiles_trade_differently() {
        let profiles = default_profiles();
        let holds: Vec<Option<u32>> = profiles.iter().map(|p| p.hold_bars).collect();
        assert_eq!(holds, vec![Some(6), Some(3), Some(5), Some(1)]);
        assert!(profiles.iter().all(|p| p.size_multiplier > 0.0));
    }

    #[test]
    fn bare_id_deserialises_enabled() {
        let p: StrategyProfile = serde_json::from_str(r#"{"id":"scalp"}"#).unwrap();
        assert!(p.enabled);
        assert!(p.description.is_empty());
        assert_eq!(p.size_multiplier, 1.0);
        assert_eq!(p.hold_bars, None);
        assert_eq!(p.stop_loss_bps, None);
    }
}
