// =============================================================================
// Calibrators — post-hoc mapping of meta-classifier output
// =============================================================================

use serde::{Deserialize, Serialize};

/// Piecewise-linear monotone curve for one class. Inputs outside the knot
/// range clamp to the end values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IsotonicCurve {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
}

impl IsotonicCurve {
    fn validate(&self) -> Result<(), String> {
        if self.x.len() < 2 || self.x.len() != self.y.len() {
            return Err(format!(
                "curve needs >= 2 matching knots, got x={} y={}",
                self.x.len(),
                self.y.len()
            ));
        }
        if self.x.iter().chain(&self.y).any(|v| !v.is_finite()) {
            return Err("non-finite knot".to_string());
        }
        if self.x.windows(2).any(|w| w[1] <= w[0]) {
            return Err("knot x values must be strictly increasing".to_string());
        }
        if self.y.windows(2).any(|w| w[1] < w[0]) {
            return Err("knot y values must be non-decreasing".to_string());
        }
        if self.y.iter().any(|v| !(0.0..=1.0).contains(v)) {
            return Err("knot y values must lie in [0, 1]".to_string());
        }
        Ok(())
    }

    fn eval(&self, p: f64) -> f64 {
        let n = self.x.len();
        if p <= self.x[0] {
            return self.y[0];
        }
        if p >= self.x[n - 1] {
            return self.y[n - 1];
        }
        // First knot strictly greater than p; p > x[0] so idx >= 1.
        let idx = self.x.partition_point(|&k| k <= p);
        let (x0, x1) = (self.x[idx - 1], self.x[idx]);
        let (y0, y1) = (self.y[idx - 1], self.y[idx]);
        y0 + (y1 - y0) * (p - x0) / (x1 - x0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Calibrator {
    Identity,
    /// `p_i ∝ p_i^(1/T)`; T > 1 softens, T < 1 sharpens.
    Temperature { temperature: f64 },
    /// One monotone curve per class, then renormalised.
    Isotonic { curves: Vec<IsotonicCurve> },
}

impl Calibrator {
    pub fn validate(&self, n_classes: usize) -> Result<(), String> {
        match self {
            Self::Identity => Ok(()),
            Self::Temperature { temperature } => {
                if temperature.is_finite() && *temperature > 0.0 {
                    Ok(())
                } else {
                    Err(format!("temperature must be finite and > 0, got {temperature}"))
                }
            }
            Self::Isotonic { curves } => {
                if curves.len() != n_classes {
                    return Err(format!(
                        "{} curves for {} classes",
                        curves.len(),
                        n_classes
                    ));
                }
                for (i, c) in curves.iter().enumerate() {
                    c.validate().map_err(|e| format!("class {i}: {e}"))?;
                }
                Ok(())
            }
        }
    }

    /// Apply the mapping and renormalise to a probability vector.
    pub fn apply(&self, probs: &[f64]) -> Result<Vec<f64>, String> {
        let mapped: Vec<f64> = match self {
            Self::Identity => probs.to_vec(),
            Self::Temperature { temperature } => {
                probs.iter().map(|p| p.max(0.0).powf(1.0 / temperature)).collect()
            }
            Self::Isotonic { curves } => {
                if curves.len() != probs.len() {
                    return Err(format!(
                        "{} curves for {} probabilities",
                        curves.len(),
                        probs.len()
                    ));
                }
                probs.iter().zip(curves).map(|(p, c)| c.eval(*p)).collect()
            }
        };
        let total: f64 = mapped.iter().sum();
        if !total.is_finite() || total <= 0.0 {
            return Err(format!("calibrated mass is degenerate ({total})"));
        }
        Ok(mapped.into_iter().map(|p| p / total).collect())
    }
}
