// =============================================================================
// Engine error taxonomy
// =============================================================================
//
// Per-bar errors (SchemaMismatch, FeatureBuild, StaleData, DegradedCohortSignal)
// never stop the decision loop. Activation errors (IncompleteBundle,
// UncalibratedBundle, SanityCheckFailed) block a swap and leave the serving
// bundle untouched. BanditPersistenceFailure is logged and retried.
// =============================================================================

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum EngineError {
    #[error("schema mismatch: {detail}")]
    SchemaMismatch { detail: String },

    #[error("incomplete bundle {version}: missing {missing}")]
    IncompleteBundle { version: String, missing: String },

    #[error("uncalibrated bundle {version}: {reason}")]
    UncalibratedBundle { version: String, reason: String },

    #[error("invalid model component {component}: {reason}")]
    InvalidModel { component: String, reason: String },

    #[error("invalid probabilities: {0}")]
    InvalidProbabilities(String),

    #[error("sanity inference failed for bundle {version}: {reason}")]
    SanityCheckFailed { version: String, reason: String },

    #[error("no active model bundle")]
    NoActiveBundle,

    #[error("stale data: age {age_secs}s exceeds bound {bound_secs}s")]
    StaleData { age_secs: i64, bound_secs: i64 },

    #[error("degraded cohort signal {cohort_id}: {reason}")]
    DegradedCohortSignal { cohort_id: String, reason: String },

    #[error("feature build failed: {0}")]
    FeatureBuild(String),

    #[error("invalid thresholds: {0}")]
    InvalidThresholds(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("execution sink unavailable: {0}")]
    SinkUnavailable(String),

    #[error("bandit persistence failure: {0}")]
    BanditPersistenceFailure(String),

    #[error("io error at {path}: {message}")]
    Io { path: String, message: String },

    #[error("serialisation error: {0}")]
    Serde(String),
}

impl EngineError {
    pub fn io(path: &std::path::Path, err: std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serde(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
