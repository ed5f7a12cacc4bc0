//! `EngineConfig` (spec §9's configuration section): the processing-window
//! parameters an operator supplies once per run, loadable from a JSON file
//! via `--config` or built from CLI flags directly.

use std::path::Path;

use serde::Deserialize;

use crate::errors::{EngineError, Result};

/// Process-window parameters, all lengths in micrometres (spec §3).
/// Mirrors the constructor arguments of [`crate::context::EngineContext`]
/// rather than its dbu-scaled fields, since this is the form an operator
/// writes by hand.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    pub dbu: f64,
    #[serde(default = "default_height")]
    pub height: f64,
    #[serde(default = "default_depth")]
    pub depth: f64,
    #[serde(default = "default_below")]
    pub below: f64,
    #[serde(default = "default_extend")]
    pub extend: f64,
    #[serde(default = "default_delta")]
    pub delta: f64,
    pub thickness_scale: Option<f64>,
}

fn default_height() -> f64 {
    2.0
}

fn default_depth() -> f64 {
    2.0
}

fn default_below() -> f64 {
    2.0
}

fn default_extend() -> f64 {
    0.5
}

fn default_delta() -> f64 {
    0.001
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            dbu: 0.001,
            height: default_height(),
            depth: default_depth(),
            below: default_below(),
            extend: default_extend(),
            delta: default_delta(),
            thickness_scale: None,
        }
    }
}

impl EngineConfig {
    /// Load from a JSON config file (spec §9). Any field the file omits
    /// falls back to its engineering default rather than failing, matching
    /// the generous-default posture of the rest of the engine's parsing.
    pub fn load(path: &Path) -> Result<EngineConfig> {
        let text = std::fs::read_to_string(path).map_err(|e| EngineError::config(format!("reading {path:?}: {e}")))?;
        serde_json::from_str(&text).map_err(|e| EngineError::config(format!("parsing {path:?}: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let c = EngineConfig::default();
        assert!(c.height > 0.0);
        assert!(c.dbu > 0.0);
    }

    #[test]
    fn loads_partial_config_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg.json");
        std::fs::write(&path, r#"{"dbu": 0.002, "height": 3.0}"#).unwrap();
        let c = EngineConfig::load(&path).unwrap();
        assert_eq!(c.dbu, 0.002);
        assert_eq!(c.height, 3.0);
        assert_eq!(c.depth, default_depth());
    }

    #[test]
    fn rejects_unknown_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg.json");
        std::fs::write(&path, r#"{"dbu": 0.001, "bogus": 1}"#).unwrap();
        assert!(EngineConfig::load(&path).is_err());
    }
}
