// =============================================================================
// Perp Signal Engine — per-timeframe inference, signal blending and
// bandit-driven strategy selection for perpetual-futures markets
// =============================================================================

pub mod arena;
pub mod cohort;
pub mod decision;
pub mod error;
pub mod execution;
pub mod features;
pub mod feed;
pub mod market_data;
pub mod model;
pub mod persist;
pub mod pipeline;
pub mod runtime_config;
pub mod signals;
pub mod types;

#[cfg(test)]
mod test_support;
