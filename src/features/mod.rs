// =============================================================================
// Features Module
// =============================================================================
//
// The fixed-schema contract between bar data and model bundles:
// - FeatureSchema / FeatureVector (ordered names, digest, strict matching)
// - FeatureBuilder trait plus the reference 17-feature candle builder
// - Pure indicator functions used by the builder

pub mod builder;
pub mod indicators;
pub mod schema;

pub use builder::{CandleFeatureBuilder, FeatureBuilder};
pub use schema::{FeatureSchema, FeatureVector};
