// =============================================================================
// Market Data — closed-bar history per timeframe
// =============================================================================
//
// Raw exchange streams live outside this crate. Producers push closed bars
// into a channel; each timeframe pipeline keeps its own bounded history.

pub mod bar_history;

pub use bar_history::{Bar, BarHistory, PushOutcome};

use serde::{Deserialize, Serialize};

/// One closed bar as delivered to a timeframe pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BarEvent {
    pub timeframe: String,
    pub bar: Bar,
    /// Optional market-mood overlay in [-1, 1] for this bar.
    #[serde(default)]
    pub mood: Option<f64>,
}
