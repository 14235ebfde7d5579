// =============================================================================
// Feature Builder — bar history -> fixed-schema feature vector
// =============================================================================
//
// The reference builder emits 17 features per bar. Its schema is fixed at
// construction; bundles trained on any other ordered set are refused at
// activation time and rejected per bar at inference time.
// =============================================================================

use std::sync::Arc;

use crate::error::{EngineError, Result};
use crate::features::indicators;
use crate::features::schema::{FeatureSchema, FeatureVector};
use crate::market_data::BarHistory;

/// Produces one feature vector per closed bar.
pub trait FeatureBuilder: Send + Sync {
    /// The exact ordered schema every built vector carries.
    fn schema(&self) -> Arc<FeatureSchema>;

    /// Minimum number of closed bars before `build` can succeed.
    fn required_history(&self) -> usize;

    fn build(&self, history: &BarHistory) -> Result<FeatureVector>;
}

pub const CANDLE_FEATURES: [&str; 17] = [
    "log_ret_1",
    "log_ret_3",
    "log_ret_6",
    "log_ret_12",
    "rsi_14",
    "ema_9_21_spread",
    "ema_21_55_spread",
    "atr_14_pct",
    "adx_14",
    "bb_width_pct",
    "bb_percent_b",
    "roc_14",
    "volume_z_20",
    "taker_buy_ratio",
    "range_pct",
    "close_location",
    "realized_vol_20",
];

const LOOKBACK: usize = 56;

/// Reference builder over OHLCV bars.
#[derive(Debug, Clone)]
pub struct CandleFeatureBuilder {
    schema: Arc<FeatureSchema>,
}

impl CandleFeatureBuilder {
    pub fn new() -> Self {
        let names = CANDLE_FEATURES.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        Self {
            schema: Arc::new(FeatureSchema::from_trusted(names)),
        }
    }
}

impl Default for CandleFeatureBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn need(value: Option<f64>, name: &str) -> Result<f64> {
    value.ok_or_else(|| EngineError::FeatureBuild(format!("{name}: insufficient or degenerate history")))
}

impl FeatureBuilder for CandleFeatureBuilder {
    fn schema(&self) -> Arc<FeatureSchema> {
        self.schema.clone()
    }

    fn required_history(&self) -> usize {
        LOOKBACK
    }

    fn build(&self, history: &BarHistory) -> Result<FeatureVector> {
        if history.len() < LOOKBACK {
            return Err(EngineError::FeatureBuild(format!(
                "need {LOOKBACK} bars, have {}",
                history.len()
            )));
        }
        let bars = history.window(LOOKBACK + 4);
        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        let volumes: Vec<f64> = bars.iter().map(|b| b.volume).collect();
        let last = bars
            .last()
            .ok_or_else(|| EngineError::FeatureBuild("empty history".to_string()))?;
        if !last.is_well_formed() {
            return Err(EngineError::FeatureBuild(format!(
                "malformed bar at {}",
                last.open_time
            )));
        }

        let ema9 = need(indicators::ema(&closes, 9), "ema_9")?;
        let ema21 = need(indicators::ema(&closes, 21), "ema_21")?;
        let ema55 = need(indicators::ema(&closes, 55), "ema_55")?;
        let bands = indicators::bollinger(&closes, 20, 2.0)
            .ok_or_else(|| EngineError::FeatureBuild("bollinger: degenerate history".to_string()))?;
        let range = last.high - last.low;

        let values = vec![
            need(indicators::log_return(&closes, 1), "log_ret_1")?,
            need(indicators::log_return(&closes, 3), "log_ret_3")?,
            need(indicators::log_return(&closes, 6), "log_ret_6")?,
            need(indicators::log_return(&closes, 12), "log_ret_12")?,
            need(indicators::rsi(&closes, 14), "rsi_14")? / 100.0,
            (ema9 - ema21) / ema21,
            (ema21 - ema55) / ema55,
            need(indicators::atr(&bars, 14), "atr_14")? / last.close * 100.0,
            need(indicators::adx(&bars, 14), "adx_14")? / 100.0,
            bands.width_pct(),
            bands.percent_b(last.close),
            need(indicators::roc(&closes, 14), "roc_14")?,
            need(indicators::zscore_last(&volumes, 20), "volume_z_20")?,
            if last.volume > 0.0 {
                (last.taker_buy_volume / last.volume).clamp(0.0, 1.0)
            } else {
                0.5
            },
            range / last.close * 100.0,
            if range > 0.0 {
                (last.close - last.low) / range
            } else {
                0.5
            },
            need(indicators::realized_vol(&closes, 20), "realized_vol_20")?,
        ];

        FeatureVector::new(self.schema.clone(), values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::synthetic_history;

    #[test]
    fn emits_seventeen_named_features() {
        let builder = CandleFeatureBuilder::new();
        let history = synthetic_history(80, 7);
        let v = builder.build(&history).unwrap();
        assert_eq!(v.len(), 17);
        assert_eq!(v.schema().names()[4], "rsi_14");
        assert!(v.values().iter().all(|x| x.is_finite()));
        let rsi = v.get("rsi_14").unwrap();
        assert!((0.0..=1.0).contains(&rsi));
    }

    #[test]
    fn short_history_is_a_build_error() {
        let builder = CandleFeatureBuilder::new();
        let history = synthetic_history(20, 7);
        let err = builder.build(&history).unwrap_err();
        assert!(matches!(err, EngineError::FeatureBuild(_)));
    }

    #[test]
    fn schema_hash_is_stable() {
        let a = CandleFeatureBuilder::new().schema().hash();
        let b = CandleFeatureBuilder::new().schema().hash();
        assert_eq!(a, b);
    }
}
