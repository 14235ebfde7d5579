// =============================================================================
// Feed — bar producers for the timeframe pipelines
// =============================================================================

pub mod replay;

pub use replay::{replay_file, ClockMode, ReplayStats};
