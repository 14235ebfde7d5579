// =============================================================================
// Signals Module
// =============================================================================
//
// Signal combination for the decision engine:
// - Model / cohort / mood blend with eligibility gating
// - Per-cycle immutable threshold configuration

pub mod combiner;
pub mod thresholds;

pub use combiner::{CombinedSignal, CombinerConfig, SignalCombiner};
pub use thresholds::{ThresholdConfig, ThresholdSource};
