// =============================================================================
// Bandit state persistence
// =============================================================================
//
// Arms and the pending ledger live in ONE file and are replaced together, so
// a crash can never leave a pull_count bumped without its reward, nor an arm
// updated while its ledger entry is still pending.
// =============================================================================

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::arena::arm::BanditArm;
use crate::arena::ledger::PendingLedger;
use crate::error::{EngineError, Result};
use crate::persist;

pub const STATE_FORMAT_VERSION: u32 = 2;

fn default_state_version() -> u32 {
    STATE_FORMAT_VERSION
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BanditState {
    #[serde(default = "default_state_version")]
    pub format_version: u32,
    #[serde(default)]
    pub arms: BTreeMap<String, BanditArm>,
    #[serde(default)]
    pub ledger: PendingLedger,
}

impl Default for BanditState {
    fn default() -> Self {
        Self {
            format_version: STATE_FORMAT_VERSION,
            arms: BTreeMap::new(),
            ledger: PendingLedger::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BanditStore {
    path: PathBuf,
}

impl BanditStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Missing file means first start: empty state.
    pub fn load(&self) -> Result<BanditState> {
        let state: Option<BanditState> = persist::read_json(&self.path).map_err(|e| {
            EngineError::BanditPersistenceFailure(format!(
                "load {}: {e}",
                self.path.display()
            ))
        })?;
        let state = state.unwrap_or_default();
        if state.format_version != STATE_FORMAT_VERSION {
            return Err(EngineError::BanditPersistenceFailure(format!(
                "unsupported state format {} in {}",
                state.format_version,
                self.path.display()
            )));
        }
        Ok(state)
    }

    pub fn save(&self, state: &BanditState) -> Result<()> {
        persist::write_json_atomic(&self.path, state).map_err(|e| {
            EngineError::BanditPersistenceFailure(format!(
                "save {}: {e}",
                self.path.display()
            ))
        })
    }
}
