// =============================================================================
// Ensemble Inference Engine — stacked prediction over the active bundle
// =============================================================================
//
// Each call pins one `Arc<ModelBundle>` snapshot for its whole duration, so a
// concurrent hot-swap is never observed half-way: base models, meta-model and
// calibrator always come from the same bundle.
// =============================================================================

use std::sync::Arc;

use crate::error::{EngineError, Result};
use crate::features::FeatureVector;
use crate::model::bundle::ModelBundle;
use crate::model::probabilities::ClassProbabilities;
use crate::model::registry::ModelRegistry;

/// Probabilities plus the bundle version that produced them.
#[derive(Debug, Clone)]
pub struct Prediction {
    pub probabilities: ClassProbabilities,
    pub bundle_version: String,
}

pub struct EnsembleInferenceEngine {
    registry: Arc<ModelRegistry>,
}

impl EnsembleInferenceEngine {
    pub fn new(registry: Arc<ModelRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }

    /// Predict against whichever bundle is active at call time.
    pub fn predict(&self, x: &FeatureVector) -> Result<Prediction> {
        let bundle = self.registry.active().ok_or(EngineError::NoActiveBundle)?;
        let probabilities = predict_with(&bundle, x)?;
        Ok(Prediction {
            probabilities,
            bundle_version: bundle.version.clone(),
        })
    }
}

/// Pure stacked inference for one bundle and one feature vector.
///
/// Fails with `SchemaMismatch` when `x` was not built against the bundle's
/// exact ordered schema, and with `UncalibratedBundle` when the calibrator is
/// absent or invalid.
pub fn predict_with(bundle: &ModelBundle, x: &FeatureVector) -> Result<ClassProbabilities> {
    let calibrator = bundle
        .calibrator
        .as_ref()
        .ok_or_else(|| EngineError::UncalibratedBundle {
            version: bundle.version.clone(),
            reason: "calibrator absent".to_string(),
        })?;
    calibrator
        .validate(crate::types::ClassLabel::COUNT)
        .map_err(|reason| EngineError::UncalibratedBundle {
            version: bundle.version.clone(),
            reason,
        })?;

    bundle.feature_schema.ensure_matches(x.schema())?;

    let meta = bundle
        .meta_model
        .as_ref()
        .ok_or_else(|| EngineError::IncompleteBundle {
            version: bundle.version.clone(),
            missing: "meta_model".to_string(),
        })?;
    if bundle.base_models.is_empty() {
        return Err(EngineError::IncompleteBundle {
            version: bundle.version.clone(),
            missing: "base_models".to_string(),
        });
    }

    let scaled;
    let input: &[f64] = match &bundle.preprocessor {
        Some(scaler) => {
            scaled = scaler.transform(x.values());
            &scaled
        }
        None => x.values(),
    };

    let mut stacked = Vec::with_capacity(bundle.meta_width());
    for base in &bundle.base_models {
        stacked.extend(base.model.predict_proba(input)?);
    }

    let raw = meta.predict_proba(&stacked)?;
    let calibrated = calibrator
        .apply(&raw)
        .map_err(|reason| EngineError::UncalibratedBundle {
            version: bundle.version.clone(),
            reason,
        })?;
    ClassProbabilities::from_slice(&calibrated)
}
