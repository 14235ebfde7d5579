// Shared fixtures for unit tests.

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::decision::sink::DecisionSink;
use crate::error::Result;
use crate::execution::ExecutionOrder;
use crate::features::FeatureSchema;
use crate::market_data::{Bar, BarHistory};
use crate::model::bundle::{ModelBundle, NamedModel, BUNDLE_FORMAT_VERSION};
use crate::model::calibrator::Calibrator;
use crate::model::classifier::Classifier;
use crate::types::ClassLabel;

/// First bar opens at 2026-01-01T00:00:00Z.
pub const T0_MS: i64 = 1_767_225_600_000;
pub const BAR_MS: i64 = 60_000;

/// Schema `f0 .. f{n-1}`.
pub fn toy_schema(n: usize) -> FeatureSchema {
    FeatureSchema::new((0..n).map(|i| format!("f{i}"))).unwrap()
}

fn toy_softmax(rows: usize, cols: usize, salt: usize) -> Classifier {
    let weights = (0..rows)
        .map(|k| {
            (0..cols)
                .map(|j| {
                    let bucket = (k * 7 + j * 3 + salt * 5) % 11;
                    0.05 * (salt + 1) as f64 * (bucket as f64 - 5.0) / 5.0
                })
                .collect()
        })
        .collect();
    let bias = (0..rows).map(|k| 0.1 * (k as f64 - 1.0) * (salt + 1) as f64).collect();
    Classifier::Softmax { weights, bias }
}

/// A complete, valid bundle: `n_base` distinct softmax base models, a softmax
/// meta-model with asymmetric weights, an identity calibrator and a small
/// holdout row.
pub fn toy_bundle(version: &str, schema: &FeatureSchema, n_base: usize) -> ModelBundle {
    let base_models = (0..n_base)
        .map(|m| NamedModel {
            name: format!("base_{m}"),
            model: toy_softmax(ClassLabel::COUNT, schema.len(), m),
        })
        .collect();
    let meta_width = n_base * ClassLabel::COUNT;
    let meta_weights = (0..ClassLabel::COUNT)
        .map(|k| {
            (0..meta_width)
                .map(|c| 0.3 * ((k * 5 + c * 3) % 7) as f64 - 0.9)
                .collect()
        })
        .collect();
    ModelBundle {
        format_version: BUNDLE_FORMAT_VERSION,
        version: version.to_string(),
        classes: ClassLabel::ORDER.to_vec(),
        feature_schema: schema.clone(),
        schema_hash: schema.hash(),
        preprocessor: None,
        base_models,
        meta_model: Some(Classifier::Softmax {
            weights: meta_weights,
            bias: vec![0.0; ClassLabel::COUNT],
        }),
        calibrator: Some(Calibrator::Identity),
        trained_at: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
        holdout_sample: (0..schema.len()).map(|j| 0.1 * (j % 5) as f64 - 0.2).collect(),
    }
}

/// A valid bundle whose output is `[p_down, p_neutral, p_up]` for every input:
/// zero-weight base models feed a meta-model whose bias is `ln p`.
pub fn constant_bundle(version: &str, schema: &FeatureSchema, probs: [f64; 3]) -> ModelBundle {
    let mut bundle = toy_bundle(version, schema, 1);
    bundle.base_models[0].model = Classifier::Softmax {
        weights: vec![vec![0.0; schema.len()]; ClassLabel::COUNT],
        bias: vec![0.0; ClassLabel::COUNT],
    };
    bundle.meta_model = Some(Classifier::Softmax {
        weights: vec![vec![0.0; ClassLabel::COUNT]; ClassLabel::COUNT],
        bias: probs.iter().map(|p| p.ln()).collect(),
    });
    bundle
}

/// Bar `i` of a synthetic series starting at [`T0_MS`].
pub fn bar_at(i: usize, close: f64) -> Bar {
    let open_time = T0_MS + i as i64 * BAR_MS;
    Bar {
        open_time,
        close_time: open_time + BAR_MS - 1,
        open: close,
        high: close * 1.001,
        low: close * 0.999,
        close,
        volume: 100.0,
        taker_buy_volume: 50.0,
    }
}

/// Seeded random walk of `n` well-formed one-minute bars.
pub fn synthetic_bars(n: usize, seed: u64) -> Vec<Bar> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut price = 100.0_f64;
    (0..n)
        .map(|i| {
            let open = price;
            let close = (open * (1.0 + rng.gen_range(-0.004..0.004))).max(1.0);
            let high = open.max(close) * (1.0 + rng.gen_range(0.0..0.002));
            let low = open.min(close) * (1.0 - rng.gen_range(0.0..0.002));
            let volume = rng.gen_range(50.0..150.0);
            price = close;
            let open_time = T0_MS + i as i64 * BAR_MS;
            Bar {
                open_time,
                close_time: open_time + BAR_MS - 1,
                open,
                high,
                low,
                close,
                volume,
                taker_buy_volume: volume * rng.gen_range(0.3..0.7),
            }
        })
        .collect()
}

pub fn synthetic_history(n: usize, seed: u64) -> BarHistory {
    let mut history = BarHistory::new(n.max(1));
    for bar in synthetic_bars(n, seed) {
        history.push(bar);
    }
    history
}

/// Sink that keeps everything it is handed.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    pub orders: Arc<Mutex<Vec<ExecutionOrder>>>,
    pub marks: Arc<Mutex<Vec<Bar>>>,
}

impl DecisionSink for RecordingSink {
    fn publish(&mut self, order: ExecutionOrder) -> Result<()> {
        self.orders.lock().push(order);
        Ok(())
    }

    fn mark(&mut self, bar: &Bar) -> Result<()> {
        self.marks.lock().push(bar.clone());
        Ok(())
    }
}
