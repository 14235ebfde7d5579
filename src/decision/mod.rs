// =============================================================================
// Decision — per-bar state machine, signal records, execution hand-off
// =============================================================================

pub mod engine;
pub mod record;
pub mod sink;

pub use engine::{CycleOutcome, DecisionEngine, DecisionEngineConfig, EngineState};
pub use record::{IneligibilityReason, SignalRecord};
pub use sink::{ChannelSink, DecisionSink};
