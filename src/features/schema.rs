// =============================================================================
// Feature Schema — ordered names, digest, strict matching
// =============================================================================
//
// A model bundle is trained against one exact ordered feature set. Vectors
// are never truncated, padded or reordered to fit: any disagreement in
// length, name or position is a SchemaMismatch.
// =============================================================================

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{EngineError, Result};

/// Ordered list of feature names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSchema {
    #[serde(default)]
    names: Vec<String>,
}

impl FeatureSchema {
    /// Build a validated schema.
    pub fn new<S: Into<String>>(names: impl IntoIterator<Item = S>) -> Result<Self> {
        let schema = Self {
            names: names.into_iter().map(Into::into).collect(),
        };
        schema.validate()?;
        Ok(schema)
    }

    /// Wrap a compile-time name list that is known to be valid.
    pub(crate) fn from_trusted(names: Vec<String>) -> Self {
        let schema = Self { names };
        debug_assert!(schema.validate().is_ok());
        schema
    }

    /// Reject empty schemas, blank names and duplicates.
    pub fn validate(&self) -> Result<()> {
        if self.names.is_empty() {
            return Err(EngineError::SchemaMismatch {
                detail: "schema has no feature names".to_string(),
            });
        }
        let mut seen = HashSet::with_capacity(self.names.len());
        for (i, name) in self.names.iter().enumerate() {
            if name.trim().is_empty() {
                return Err(EngineError::SchemaMismatch {
                    detail: format!("feature name at position {i} is blank"),
                });
            }
            if !seen.insert(name.as_str()) {
                return Err(EngineError::SchemaMismatch {
                    detail: format!("duplicate feature name '{name}' at position {i}"),
                });
            }
        }
        Ok(())
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    /// Hex SHA-256 digest over the ordered names.
    pub fn hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update((self.names.len() as u64).to_le_bytes());
        for name in &self.names {
            hasher.update(name.as_bytes());
            hasher.update([0x1f]);
        }
        hex::encode(hasher.finalize())
    }

    /// Require `other` to be exactly this schema (same length, same names in
    /// the same positions).
    pub fn ensure_matches(&self, other: &FeatureSchema) -> Result<()> {
        if self.names.len() != other.names.len() {
            return Err(EngineError::SchemaMismatch {
                detail: format!(
                    "expected {} features, got {}",
                    self.names.len(),
                    other.names.len()
                ),
            });
        }
        if let Some((i, (want, got))) = self
            .names
            .iter()
            .zip(other.names.iter())
            .enumerate()
            .find(|(_, (a, b))| a != b)
        {
            return Err(EngineError::SchemaMismatch {
                detail: format!("position {i}: expected '{want}', got '{got}'"),
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FeatureVector
// ---------------------------------------------------------------------------

/// One bar's feature values tagged with the schema that produced them.
#[derive(Debug, Clone)]
pub struct FeatureVector {
    schema: Arc<FeatureSchema>,
    values: Vec<f64>,
}

impl FeatureVector {
    pub fn new(schema: Arc<FeatureSchema>, values: Vec<f64>) -> Result<Self> {
        if values.len() != schema.len() {
            return Err(EngineError::SchemaMismatch {
                detail: format!(
                    "vector has {} values for a {}-name schema",
                    values.len(),
                    schema.len()
                ),
            });
        }
        if let Some(i) = values.iter().position(|v| !v.is_finite()) {
            return Err(EngineError::FeatureBuild(format!(
                "feature '{}' is not finite",
                schema.names()[i]
            )));
        }
        Ok(Self { schema, values })
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.schema.position(name).map(|i| self.values[i])
    }
}
