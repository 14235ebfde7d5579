use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::types::ClassLabel;

/// Maximum allowed deviation of the probability mass from 1.
pub const PROBABILITY_TOLERANCE: f64 = 1e-6;

/// Calibrated class probabilities. Each field lies in [0, 1] and the three
/// sum to 1 within [`PROBABILITY_TOLERANCE`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassProbabilities {
    pub p_down: f64,
    pub p_neutral: f64,
    pub p_up: f64,
}

impl ClassProbabilities {
    pub fn new(p_down: f64, p_neutral: f64, p_up: f64) -> Result<Self> {
        let probs = Self {
            p_down,
            p_neutral,
            p_up,
        };
        for (label, p) in [
            (ClassLabel::Down, p_down),
            (ClassLabel::Neutral, p_neutral),
            (ClassLabel::Up, p_up),
        ] {
            if !p.is_finite() || !(0.0..=1.0).contains(&p) {
                return Err(EngineError::InvalidProbabilities(format!(
                    "p_{label} = {p} outside [0, 1]"
                )));
            }
        }
        let total = p_down + p_neutral + p_up;
        if (total - 1.0).abs() > PROBABILITY_TOLERANCE {
            return Err(EngineError::InvalidProbabilities(format!(
                "mass {total} deviates from 1"
            )));
        }
        Ok(probs)
    }

    /// Build from a vector in canonical `[down, neutral, up]` order.
    pub fn from_slice(p: &[f64]) -> Result<Self> {
        if p.len() != ClassLabel::COUNT {
            return Err(EngineError::InvalidProbabilities(format!(
                "expected {} classes, got {}",
                ClassLabel::COUNT,
                p.len()
            )));
        }
        Self::new(
            p[ClassLabel::Down.index()],
            p[ClassLabel::Neutral.index()],
            p[ClassLabel::Up.index()],
        )
    }

    /// `max(p_up, p_down)`.
    pub fn confidence(&self) -> f64 {
        self.p_up.max(self.p_down)
    }

    /// `p_up - p_down`, in [-1, 1].
    pub fn spread(&self) -> f64 {
        self.p_up - self.p_down
    }

    pub fn sum(&self) -> f64 {
        self.p_down + self.p_neutral + self.p_up
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_bad_mass() {
        assert!(ClassProbabilities::new(0.5, 0.5, 0.5).is_err());
        assert!(ClassProbabilities::new(-0.1, 0.6, 0.5).is_err());
        assert!(ClassProbabilities::new(0.2, 0.3, 0.5).is_ok());
    }

    #[test]
    fn confidence_and_spread() {
        let p = ClassProbabilities::new(0.65, 0.30, 0.05).unwrap();
        assert!((p.confidence() - 0.65).abs() < 1e-12);
        assert!((p.spread() + 0.60).abs() < 1e-12);
    }

    #[test]
    fn from_slice_uses_canonical_order() {
        let p = ClassProbabilities::from_slice(&[0.1, 0.2, 0.7]).unwrap();
        assert_eq!(p.p_down, 0.1);
        assert_eq!(p.p_up, 0.7);
        assert!(ClassProbabilities::from_slice(&[0.5, 0.5]).is_err());
    }
}
