// =============================================================================
// Shared types used across the decision engine
// =============================================================================

use serde::{Deserialize, Serialize};

/// Trade direction emitted on a SignalRecord.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Buy,
    Sell,
    Neutral,
}

impl Direction {
    /// Map a signed alpha onto a direction. Exact zero is NEUTRAL.
    pub fn from_alpha(alpha_bps: f64) -> Self {
        if alpha_bps > 0.0 {
            Self::Buy
        } else if alpha_bps < 0.0 {
            Self::Sell
        } else {
            Self::Neutral
        }
    }

    /// +1 for BUY, -1 for SELL, 0 for NEUTRAL.
    pub fn sign(&self) -> f64 {
        match self {
            Self::Buy => 1.0,
            Self::Sell => -1.0,
            Self::Neutral => 0.0,
        }
    }
}

impl Default for Direction {
    fn default() -> Self {
        Self::Neutral
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
            Self::Neutral => write!(f, "NEUTRAL"),
        }
    }
}

/// Price-direction classes predicted by a model bundle.
///
/// The discriminant is the positional index inside every probability vector
/// the engine handles: `[down, neutral, up]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassLabel {
    Down = 0,
    Neutral = 1,
    Up = 2,
}

impl ClassLabel {
    pub const COUNT: usize = 3;

    pub const ORDER: [ClassLabel; 3] = [ClassLabel::Down, ClassLabel::Neutral, ClassLabel::Up];

    pub fn index(&self) -> usize {
        *self as usize
    }
}

impl std::fmt::Display for ClassLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Down => write!(f, "down"),
            Self::Neutral => write!(f, "neutral"),
            Self::Up => write!(f, "up"),
        }
    }
}
