//! Session configuration, loaded from JSON.

use std::{
    fs,
    path::{Path, PathBuf},
};

use rig_calib_core::PatternConfig;
use rig_calib_optim::{CalibrationOptions, CircleFitOptions, PnpOptions};
use serde::{Deserialize, Serialize};

use crate::profile::ProfileIoError;

/// Everything a [`crate::CalibrationSession`] reads at construction.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub pattern: PatternConfig,
    pub calibration: CalibrationOptions,
    pub pnp: PnpOptions,
    pub circle_fit: CircleFitOptions,
    /// Where the calibration profile lives, if it is persisted at all.
    pub profile_path: Option<PathBuf>,
}

impl SessionConfig {
    /// Load a JSON config from disk.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, ProfileIoError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Write this config to disk as pretty JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), ProfileIoError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_fills_defaults() {
        let cfg: SessionConfig =
            serde_json::from_str(r#"{ "pattern": { "rows": 7, "columns": 10, "square_size": 15.0 } }"#)
                .expect("json");
        assert_eq!(cfg.pattern.rows, 7);
        assert_eq!(cfg.circle_fit.initial_center, [0.0, 310.0]);
        assert_eq!(cfg.calibration, CalibrationOptions::default());
        assert!(cfg.profile_path.is_none());
    }
}
