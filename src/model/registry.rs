// =============================================================================
// Model Registry — load, validate and atomically activate bundles
// =============================================================================
//
// Activation protocol:
//   1. Build the candidate fully off to the side.
//   2. validate()                      -> IncompleteBundle / UncalibratedBundle
//   3. schema vs. the feature producer -> SchemaMismatch
//   4. one sanity inference on a held-out row (finite, normalised output)
//   5. publish via a single pointer swap under a write lock
//
// Any failure before step 5 leaves the serving bundle untouched.
//
// On disk:
//   <dir>/<version>.bundle.json   complete bundle artifact
//   <dir>/ACTIVE.json             { version, schema_hash, activated_at }
// =============================================================================

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{EngineError, Result};
use crate::features::{FeatureSchema, FeatureVector};
use crate::model::bundle::ModelBundle;
use crate::model::inference::predict_with;
use crate::persist;

const POINTER_FILE: &str = "ACTIVE.json";
const BUNDLE_SUFFIX: &str = ".bundle.json";

/// Record naming the bundle that should be serving.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivePointer {
    pub version: String,
    pub schema_hash: String,
    pub activated_at: DateTime<Utc>,
}

/// How a caller names a bundle to load.
#[derive(Debug, Clone)]
pub enum BundleRef {
    Version(String),
    Path(PathBuf),
}

pub struct ModelRegistry {
    dir: PathBuf,
    producer_schema: Arc<FeatureSchema>,
    active: RwLock<Option<Arc<ModelBundle>>>,
    /// Last pointer record acted on by `reload_from_pointer`.
    last_pointer: Mutex<Option<ActivePointer>>,
}

impl ModelRegistry {
    /// `producer_schema` is the schema the feature builder currently emits.
    pub fn new(dir: impl Into<PathBuf>, producer_schema: Arc<FeatureSchema>) -> Self {
        Self {
            dir: dir.into(),
            producer_schema,
            active: RwLock::new(None),
            last_pointer: Mutex::new(None),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn bundle_path(&self, version: &str) -> PathBuf {
        self.dir.join(format!("{version}{BUNDLE_SUFFIX}"))
    }

    pub fn pointer_path(&self) -> PathBuf {
        self.dir.join(POINTER_FILE)
    }

    /// Snapshot of the serving bundle.
    pub fn active(&self) -> Option<Arc<ModelBundle>> {
        self.active.read().clone()
    }

    pub fn active_version(&self) -> Option<String> {
        self.active.read().as_ref().map(|b| b.version.clone())
    }

    pub fn load(&self, bundle_ref: &BundleRef) -> Result<ModelBundle> {
        let path = match bundle_ref {
            BundleRef::Version(v) => self.bundle_path(v),
            BundleRef::Path(p) => p.clone(),
        };
        ModelBundle::read_artifact(&path)
    }

    pub fn validate(bundle: &ModelBundle) -> Result<()> {
        bundle.validate()
    }

    /// Run the activation protocol. Returns the version that was serving
    /// before the swap, if any.
    pub fn activate(&self, candidate: ModelBundle) -> Result<Option<String>> {
        Self::validate(&candidate)?;

        self.producer_schema.ensure_matches(&candidate.feature_schema)?;
        let producer_hash = self.producer_schema.hash();
        if candidate.schema_hash != producer_hash {
            return Err(EngineError::SchemaMismatch {
                detail: format!(
                    "bundle {} digest {} != producer digest {}",
                    candidate.version, candidate.schema_hash, producer_hash
                ),
            });
        }

        if candidate.holdout_sample.is_empty() {
            return Err(EngineError::SanityCheckFailed {
                version: candidate.version.clone(),
                reason: "bundle carries no holdout sample".to_string(),
            });
        }
        let sanity = FeatureVector::new(
            self.producer_schema.clone(),
            candidate.holdout_sample.clone(),
        )
            .and_then(|x| predict_with(&candidate, &x))
            .map_err(|e| EngineError::SanityCheckFailed {
                version: candidate.version.clone(),
                reason: e.to_string(),
            })?;

        let version = candidate.version.clone();
        let next = Arc::new(candidate);
        let previous = {
            let mut slot = self.active.write();
            slot.replace(next).map(|b| b.version.clone())
        };

        info!(
            version = %version,
            previous = ?previous,
            sanity_p_up = sanity.p_up,
            sanity_p_down = sanity.p_down,
            "model bundle activated"
        );
        Ok(previous)
    }

    /// Load and activate by reference.
    pub fn activate_ref(&self, bundle_ref: &BundleRef) -> Result<Option<String>> {
        let candidate = self.load(bundle_ref)?;
        self.activate(candidate)
    }

    pub fn read_pointer(&self) -> Result<Option<ActivePointer>> {
        persist::read_json(&self.pointer_path())
    }

    /// Startup: activate whatever the pointer names. Any failure is fatal to
    /// the caller since no bundle is serving yet.
    pub fn open(&self) -> Result<String> {
        let pointer = self.read_pointer()?.ok_or_else(|| EngineError::Io {
            path: self.pointer_path().display().to_string(),
            message: "active pointer missing".to_string(),
        })?;
        self.apply_pointer(&pointer)?;
        Ok(pointer.version)
    }

    /// Activate `version`, then atomically rewrite the pointer to name it.
    pub fn promote(&self, version: &str) -> Result<()> {
        self.activate_ref(&BundleRef::Version(version.to_string()))?;
        let pointer = ActivePointer {
            version: version.to_string(),
            schema_hash: self.producer_schema.hash(),
            activated_at: Utc::now(),
        };
        persist::write_json_atomic(&self.pointer_path(), &pointer)?;
        *self.last_pointer.lock() = Some(pointer);
        Ok(())
    }

    /// Hot-swap when the pointer names a different bundle than the one
    /// last applied. Returns `true` when a swap happened.
    pub fn reload_from_pointer(&self) -> Result<bool> {
        let Some(pointer) = self.read_pointer()? else {
            return Ok(false);
        };
        if self.last_pointer.lock().as_ref() == Some(&pointer) {
            return Ok(false);
        }
        if self.active_version().as_deref() == Some(pointer.version.as_str()) {
            *self.last_pointer.lock() = Some(pointer);
            return Ok(false);
        }
        match self.apply_pointer(&pointer) {
            Ok(()) => Ok(true),
            Err(e) => {
                // Remember the rejected pointer so it is not retried every tick.
                *self.last_pointer.lock() = Some(pointer);
                warn!(error = %e, "pointer reload rejected; previous bundle stays live");
                Err(e)
            }
        }
    }

    fn apply_pointer(&self, pointer: &ActivePointer) -> Result<()> {
        let producer_hash = self.producer_schema.hash();
        if pointer.schema_hash != producer_hash {
            return Err(EngineError::SchemaMismatch {
                detail: format!(
                    "active pointer digest {} != producer digest {}",
                    pointer.schema_hash, producer_hash
                ),
            });
        }
        self.activate_ref(&BundleRef::Version(pointer.version.clone()))?;
        *self.last_pointer.lock() = Some(pointer.clone());
        Ok(())
    }
}

impl std::fmt::Debug for ModelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelRegistry")
            .field("dir", &self.dir)
            .field("active", &self.active_version())
            .finish()
    }
}
