// =============================================================================
// Threshold configuration — immutable per decision cycle
// =============================================================================
//
// Thresholds are external configuration. A `ThresholdSource` hands out one
// owned copy per cycle; nothing inside the engine ever mutates thresholds.
// =============================================================================

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{EngineError, Result};

/// Wire form, using the external parameter names.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ThresholdFile {
    #[serde(rename = "CONF_MIN")]
    conf_min: f64,
    #[serde(rename = "ALPHA_MIN")]
    alpha_min: f64,
    #[serde(rename = "S_MIN", default)]
    s_min: f64,
    #[serde(rename = "M_MIN", default)]
    m_min: f64,
    #[serde(rename = "S_MIN_SOCIAL", default)]
    s_min_social: f64,
    #[serde(default)]
    require_consensus: bool,
}

/// Validated gating thresholds. `conf_min` lies in [0, 1]; every other
/// numeric field is finite and non-negative.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ThresholdFile", into = "ThresholdFile")]
pub struct ThresholdConfig {
    pub conf_min: f64,
    pub alpha_min: f64,
    pub s_min: f64,
    pub m_min: f64,
    pub s_min_social: f64,
    pub require_consensus: bool,
}

impl ThresholdConfig {
    pub fn new(
        conf_min: f64,
        alpha_min: f64,
        s_min: f64,
        m_min: f64,
        s_min_social: f64,
        require_consensus: bool,
    ) -> Result<Self> {
        if !conf_min.is_finite() || !(0.0..=1.0).contains(&conf_min) {
            return Err(EngineError::InvalidThresholds(format!(
                "CONF_MIN must lie in [0, 1], got {conf_min}"
            )));
        }
        for (name, v) in [
            ("ALPHA_MIN", alpha_min),
            ("S_MIN", s_min),
            ("M_MIN", m_min),
            ("S_MIN_SOCIAL", s_min_social),
        ] {
            if !v.is_finite() || v < 0.0 {
                return Err(EngineError::InvalidThresholds(format!(
                    "{name} must be finite and >= 0, got {v}"
                )));
            }
        }
        Ok(Self {
            conf_min,
            alpha_min,
            s_min,
            m_min,
            s_min_social,
            require_consensus,
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        crate::persist::read_json(path)?.ok_or_else(|| EngineError::Io {
            path: path.display().to_string(),
            message: "threshold file not found".to_string(),
        })
    }
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            conf_min: 0.55,
            alpha_min: 15.0,
            s_min: 5.0,
            m_min: 8.0,
            s_min_social: 10.0,
            require_consensus: false,
        }
    }
}

impl TryFrom<ThresholdFile> for ThresholdConfig {
    type Error = EngineError;

    fn try_from(f: ThresholdFile) -> Result<Self> {
        Self::new(
            f.conf_min,
            f.alpha_min,
            f.s_min,
            f.m_min,
            f.s_min_social,
            f.require_consensus,
        )
    }
}

impl From<ThresholdConfig> for ThresholdFile {
    fn from(t: ThresholdConfig) -> Self {
        Self {
            conf_min: t.conf_min,
            alpha_min: t.alpha_min,
            s_min: t.s_min,
            m_min: t.m_min,
            s_min_social: t.s_min_social,
            require_consensus: t.require_consensus,
        }
    }
}

// ---------------------------------------------------------------------------
// ThresholdSource — per-cycle snapshot with optional file override
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct ThresholdSource {
    current: ThresholdConfig,
    path: Option<PathBuf>,
    /// (mtime, len) of the file version last looked at.
    seen: Option<(SystemTime, u64)>,
}

impl ThresholdSource {
    /// Fixed thresholds with no backing file.
    pub fn fixed(thresholds: ThresholdConfig) -> Self {
        Self {
            current: thresholds,
            path: None,
            seen: None,
        }
    }

    /// `initial` serves until the file at `path` yields a valid value.
    pub fn with_file(initial: ThresholdConfig, path: impl Into<PathBuf>) -> Self {
        Self {
            current: initial,
            path: Some(path.into()),
            seen: None,
        }
    }

    /// Thresholds for the next cycle. Re-reads the backing file only when it
    /// changed; an unreadable or invalid file keeps the last good value.
    pub fn for_cycle(&mut self) -> ThresholdConfig {
        if let Some(path) = self.path.clone() {
            self.refresh(&path);
        }
        self.current
    }

    fn refresh(&mut self, path: &Path) {
        let stamp = match std::fs::metadata(path) {
            Ok(meta) => (meta.modified().unwrap_or(SystemTime::UNIX_EPOCH), meta.len()),
            Err(_) => return,
        };
        if self.seen == Some(stamp) {
            return;
        }
        self.seen = Some(stamp);
        match ThresholdConfig::load(path) {
            Ok(next) => {
                if next != self.current {
                    info!(path = %path.display(), thresholds = ?next, "thresholds reloaded");
                }
                self.current = next;
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "threshold file rejected; keeping last good value");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn external_names_roundtrip() {
        let t = ThresholdConfig::new(0.6, 30.0, 5.0, 7.0, 9.0, true).unwrap();
        let json = serde_json::to_value(t).unwrap();
        assert_eq!(json["CONF_MIN"], 0.6);
        assert_eq!(json["S_MIN_SOCIAL"], 9.0);
        assert_eq!(json["require_consensus"], true);
        let back: ThresholdConfig = serde_json::from_value(json).unwrap();
        assert_eq!(back, t);
    }

    #[test]
    fn out_of_range_values_rejected() {
        assert!(ThresholdConfig::new(1.2, 0.0, 0.0, 0.0, 0.0, false).is_err());
        assert!(ThresholdConfig::new(0.5, -1.0, 0.0, 0.0, 0.0, false).is_err());
        assert!(ThresholdConfig::new(0.5, 1.0, f64::INFINITY, 0.0, 0.0, false).is_err());
        let bad = r#"{"CONF_MIN": 0.5, "ALPHA_MIN": -3}"#;
        assert!(serde_json::from_str::<ThresholdConfig>(bad).is_err());
    }

    #[test]
    fn source_reloads_and_keeps_last_good() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("thresholds.json");
        let mut source = ThresholdSource::with_file(ThresholdConfig::default(), &path);
        assert_eq!(source.for_cycle(), ThresholdConfig::default());

        std::fs::write(&path, r#"{"CONF_MIN": 0.7, "ALPHA_MIN": 20}"#).unwrap();
        let t = source.for_cycle();
        assert_eq!(t.conf_min, 0.7);
        assert_eq!(t.alpha_min, 20.0);

        std::fs::write(&path, r#"{"CONF_MIN": 7.0, "ALPHA_MIN": 20, "S_MIN": 1}"#).unwrap();
        assert_eq!(source.for_cycle().conf_min, 0.7);

        std::fs::write(&path, "not json at all, definitely").unwrap();
        assert_eq!(source.for_cycle().conf_min, 0.7);
    }

    #[test]
    fn cycle_copy_is_detached() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("thresholds.json");
        std::fs::write(&path, r#"{"CONF_MIN": 0.7, "ALPHA_MIN": 20}"#).unwrap();
        let mut source = ThresholdSource::with_file(ThresholdConfig::default(), &path);
        let in_flight = source.for_cycle();

        // Different length, so the change is seen within the same mtime tick.
        std::fs::write(&path, r#"{"CONF_MIN": 0.9, "ALPHA_MIN": 40, "S_MIN": 2}"#).unwrap();
        let next = source.for_cycle();
        assert_eq!(next.conf_min, 0.9);
        // The cycle already running keeps the values it started with.
        assert_eq!(in_flight.conf_min, 0.7);
        assert_eq!(in_flight.alpha_min, 20.0);
    }
}
