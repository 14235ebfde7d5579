// =============================================================================
// Model Bundle — the atomic unit of stacked inference
// =============================================================================
//
// predict(X) = calibrator(meta(concat(base_i.predict_proba(X) for i in order)))
//
// The base-model order is persisted state: the meta-classifier's inputs are
// positional, so the list is stored and iterated exactly as written and is
// never re-sorted on load. A bundle is only ever written or read whole.
// =============================================================================

use std::collections::HashSet;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::features::FeatureSchema;
use crate::model::calibrator::Calibrator;
use crate::model::classifier::{Classifier, StandardScaler};
use crate::persist;
use crate::types::ClassLabel;

pub const BUNDLE_FORMAT_VERSION: u32 = 1;

fn default_format_version() -> u32 {
    BUNDLE_FORMAT_VERSION
}

fn default_classes() -> Vec<ClassLabel> {
    ClassLabel::ORDER.to_vec()
}

/// One entry of the ordered base-model list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedModel {
    pub name: String,
    pub model: Classifier,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelBundle {
    #[serde(default = "default_format_version")]
    pub format_version: u32,

    /// Version identifier; also the artifact file stem.
    pub version: String,

    #[serde(default = "default_classes")]
    pub classes: Vec<ClassLabel>,

    #[serde(default)]
    pub feature_schema: FeatureSchema,

    /// Digest of `feature_schema`, recorded at training time.
    #[serde(default)]
    pub schema_hash: String,

    #[serde(default)]
    pub preprocessor: Option<StandardScaler>,

    /// Base models in persisted order.
    #[serde(default)]
    pub base_models: Vec<NamedModel>,

    #[serde(default)]
    pub meta_model: Option<Classifier>,

    #[serde(default)]
    pub calibrator: Option<Calibrator>,

    pub trained_at: DateTime<Utc>,

    /// Held-out feature row used for the activation sanity inference.
    /// Activation refuses a bundle without one.
    #[serde(default)]
    pub holdout_sample: Vec<f64>,
}

impl ModelBundle {
    /// Full structural validation.
    ///
    /// Missing components are reported together as `IncompleteBundle`; an
    /// invalid calibrator is `UncalibratedBundle`; a digest that disagrees
    /// with the embedded schema is `SchemaMismatch`.
    pub fn validate(&self) -> Result<()> {
        let mut missing = Vec::new();
        if self.base_models.is_empty() {
            missing.push("base_models");
        }
        if self.meta_model.is_none() {
            missing.push("meta_model");
        }
        if self.calibrator.is_none() {
            missing.push("calibrator");
        }
        if self.feature_schema.is_empty() {
            missing.push("feature_schema");
        }
        if !missing.is_empty() {
            return Err(EngineError::IncompleteBundle {
                version: self.version.clone(),
                missing: missing.join(", "),
            });
        }

        if self.format_version != BUNDLE_FORMAT_VERSION {
            return Err(self.invalid(
                "format_version",
                format!(
                    "unsupported format {} (expected {})",
                    self.format_version, BUNDLE_FORMAT_VERSION
                ),
            ));
        }
        if self.classes != ClassLabel::ORDER {
            return Err(self.invalid("classes", format!("expected [down, neutral, up], got {:?}", self.classes)));
        }

        self.feature_schema.validate()?;
        let digest = self.feature_schema.hash();
        if self.schema_hash != digest {
            return Err(EngineError::SchemaMismatch {
                detail: format!(
                    "bundle {} records schema digest {} but its schema hashes to {}",
                    self.version, self.schema_hash, digest
                ),
            });
        }

        let n_features = self.feature_schema.len();
        if let Some(scaler) = &self.preprocessor {
            scaler.validate(n_features)?;
        }

        let mut names = HashSet::with_capacity(self.base_models.len());
        for base in &self.base_models {
            if !names.insert(base.name.as_str()) {
                return Err(self.invalid("base_models", format!("duplicate base model '{}'", base.name)));
            }
            let component = format!("base_models.{}", base.name);
            base.model.validate(&component)?;
            if base.model.n_features() != n_features {
                return Err(EngineError::SchemaMismatch {
                    detail: format!(
                        "{component} expects {} inputs but the schema has {n_features}",
                        base.model.n_features()
                    ),
                });
            }
            if base.model.n_classes() != ClassLabel::COUNT {
                return Err(self.invalid(&component, format!("emits {} classes", base.model.n_classes())));
            }
        }

        if let Some(meta) = &self.meta_model {
            meta.validate("meta_model")?;
            let expected = self.base_models.len() * ClassLabel::COUNT;
            if meta.n_features() != expected {
                return Err(self.invalid(
                    "meta_model",
                    format!(
                        "expects {} stacked inputs, base models produce {expected}",
                        meta.n_features()
                    ),
                ));
            }
            if meta.n_classes() != ClassLabel::COUNT {
                return Err(self.invalid("meta_model", format!("emits {} classes", meta.n_classes())));
            }
        }

        if let Some(calibrator) = &self.calibrator {
            calibrator
                .validate(ClassLabel::COUNT)
                .map_err(|reason| EngineError::UncalibratedBundle {
                    version: self.version.clone(),
                    reason,
                })?;
        }

        if !self.holdout_sample.is_empty() && self.holdout_sample.len() != n_features {
            return Err(self.invalid(
                "holdout_sample",
                format!("{} values for {n_features} features", self.holdout_sample.len()),
            ));
        }
        Ok(())
    }

    /// Width of the stacked meta-feature vector.
    pub fn meta_width(&self) -> usize {
        self.base_models.len() * ClassLabel::COUNT
    }

    /// Read a bundle artifact. No validation happens here.
    pub fn read_artifact(path: &Path) -> Result<Self> {
        persist::read_json(path)?.ok_or_else(|| EngineError::Io {
            path: path.display().to_string(),
            message: "bundle artifact not found".to_string(),
        })
    }

    /// Validate, then write the whole bundle as one artifact.
    pub fn write_artifact(&self, path: &Path) -> Result<()> {
        self.validate()?;
        persist::write_json_atomic(path, self)
    }

    fn invalid(&self, component: &str, reason: impl Into<String>) -> EngineError {
        EngineError::InvalidModel {
            component: format!("{}/{}", self.version, component),
            reason: reason.into(),
        }
    }
}
