//! Persisted calibration artifacts.
//!
//! The four values the scanner keeps between sessions, as one typed JSON
//! record. Nothing is written implicitly: callers save with
//! [`CalibrationProfile::write_json`].

use std::{fs, path::Path};

use nalgebra::{Matrix3, Vector3};
use rig_calib_core::{CameraParams, Distortion, Intrinsics};
use serde::{Deserialize, Serialize};

use crate::CalibError;

#[derive(thiserror::Error, Debug)]
pub enum ProfileIoError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// One persisted entry of a [`CalibrationProfile`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileKey {
    CalibrationMatrix,
    DistortionVector,
    RotationMatrix,
    TranslationVector,
}

impl ProfileKey {
    pub const ALL: [ProfileKey; 4] = [
        ProfileKey::CalibrationMatrix,
        ProfileKey::DistortionVector,
        ProfileKey::RotationMatrix,
        ProfileKey::TranslationVector,
    ];

    /// Key name as stored in the JSON file.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProfileKey::CalibrationMatrix => "calibration_matrix",
            ProfileKey::DistortionVector => "distortion_vector",
            ProfileKey::RotationMatrix => "rotation_matrix",
            ProfileKey::TranslationVector => "translation_vector",
        }
    }
}

fn default_calibration_matrix() -> [[f64; 3]; 3] {
    [[1430.0, 0.0, 480.0], [0.0, 1430.0, 640.0], [0.0, 0.0, 1.0]]
}

fn default_distortion_vector() -> Vec<f64> {
    vec![0.0; 5]
}

/// Camera -> turntable rotation of the stock rig.
fn default_rotation_matrix() -> [[f64; 3]; 3] {
    [[0.0, 1.0, 0.0], [0.0, 0.0, -1.0], [-1.0, 0.0, 0.0]]
}

fn default_translation_vector() -> [f64; 3] {
    [5.0, 80.0, 320.0]
}

/// Calibration values kept between sessions. Matrices are row-major.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalibrationProfile {
    #[serde(default = "default_calibration_matrix")]
    pub calibration_matrix: [[f64; 3]; 3],
    /// `(k1, k2, p1, p2[, k3])`.
    #[serde(default = "default_distortion_vector")]
    pub distortion_vector: Vec<f64>,
    #[serde(default = "default_rotation_matrix")]
    pub rotation_matrix: [[f64; 3]; 3],
    #[serde(default = "default_translation_vector")]
    pub translation_vector: [f64; 3],
}

impl Default for CalibrationProfile {
    fn default() -> Self {
        Self {
            calibration_matrix: default_calibration_matrix(),
            distortion_vector: default_distortion_vector(),
            rotation_matrix: default_rotation_matrix(),
            translation_vector: default_translation_vector(),
        }
    }
}

fn to_rows(m: &Matrix3<f64>) -> [[f64; 3]; 3] {
    [
        [m[(0, 0)], m[(0, 1)], m[(0, 2)]],
        [m[(1, 0)], m[(1, 1)], m[(1, 2)]],
        [m[(2, 0)], m[(2, 1)], m[(2, 2)]],
    ]
}

fn from_rows(rows: &[[f64; 3]; 3]) -> Matrix3<f64> {
    Matrix3::from_fn(|r, c| rows[r][c])
}

impl CalibrationProfile {
    /// Load a profile from disk. Missing keys take their defaults.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, ProfileIoError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Write this profile to disk as pretty JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), ProfileIoError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path.as_ref(), json)?;
        log::info!("profile written to {}", path.as_ref().display());
        Ok(())
    }

    /// Restore one entry to its default.
    pub fn reset(&mut self, key: ProfileKey) {
        match key {
            ProfileKey::CalibrationMatrix => self.calibration_matrix = default_calibration_matrix(),
            ProfileKey::DistortionVector => self.distortion_vector = default_distortion_vector(),
            ProfileKey::RotationMatrix => self.rotation_matrix = default_rotation_matrix(),
            ProfileKey::TranslationVector => self.translation_vector = default_translation_vector(),
        }
    }

    pub fn camera_matrix(&self) -> Matrix3<f64> {
        from_rows(&self.calibration_matrix)
    }

    pub fn set_camera_matrix(&mut self, k: &Matrix3<f64>) {
        self.calibration_matrix = to_rows(k);
    }

    pub fn rotation(&self) -> Matrix3<f64> {
        from_rows(&self.rotation_matrix)
    }

    pub fn set_rotation(&mut self, r: &Matrix3<f64>) {
        self.rotation_matrix = to_rows(r);
    }

    pub fn translation(&self) -> Vector3<f64> {
        Vector3::from(self.translation_vector)
    }

    pub fn set_translation(&mut self, t: &Vector3<f64>) {
        self.translation_vector = [t.x, t.y, t.z];
    }

    /// Camera model described by the matrix and distortion entries.
    pub fn camera(&self) -> Result<CameraParams, CalibError> {
        let distortion = Distortion::from_coefficients(&self.distortion_vector)?;
        Ok(CameraParams::new(
            Intrinsics::from_matrix(&self.camera_matrix()),
            distortion,
        ))
    }

    pub fn set_camera(&mut self, camera: &CameraParams) {
        self.set_camera_matrix(&camera.intrinsics.matrix());
        self.distortion_vector = camera.distortion.coefficients().to_vec();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_restores_one_key_only() {
        let mut p = CalibrationProfile::default();
        p.translation_vector = [1.0, 2.0, 3.0];
        p.distortion_vector = vec![0.1, 0.2, 0.0, 0.0];
        p.reset(ProfileKey::TranslationVector);
        assert_eq!(p.translation_vector, default_translation_vector());
        assert_eq!(p.distortion_vector, vec![0.1, 0.2, 0.0, 0.0]);
    }

    #[test]
    fn missing_keys_take_defaults() {
        let p: CalibrationProfile =
            serde_json::from_str(r#"{ "translation_vector": [0.0, 1.0, 2.0] }"#).expect("json");
        assert_eq!(p.translation_vector, [0.0, 1.0, 2.0]);
        assert_eq!(p.calibration_matrix, default_calibration_matrix());
        assert_eq!(p.distortion_vector.len(), 5);
    }

    #[test]
    fn key_names_match_serialized_fields() {
        let value = serde_json::to_value(CalibrationProfile::default()).expect("json");
        for key in ProfileKey::ALL {
            assert!(value.get(key.as_str()).is_some(), "{}", key.as_str());
        }
    }

    #[test]
    fn bad_distortion_length_is_rejected() {
        let p = CalibrationProfile {
            distortion_vector: vec![0.1, 0.2],
            ..CalibrationProfile::default()
        };
        assert!(matches!(p.camera(), Err(CalibError::InvalidDistortion(_))));
    }

    #[test]
    fn camera_round_trips_through_profile() {
        let mut p = CalibrationProfile::default();
        let camera = CameraParams::new(
            Intrinsics {
                fx: 1000.0,
                fy: 1002.0,
                cx: 470.0,
                cy: 650.0,
            },
            Distortion {
                k1: -0.1,
                k2: 0.02,
                p1: 0.001,
                p2: 0.0,
                k3: 0.0,
            },
        );
        p.set_camera(&camera);
        assert_eq!(p.camera().expect("camera"), camera);
        assert_eq!(p.calibration_matrix[0], [1000.0, 0.0, 470.0]);
    }

    #[test]
    fn disk_round_trip_is_bit_exact() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("profile.json");
        let mut p = CalibrationProfile::default();
        p.calibration_matrix[0] = [1100.0000000000039, 0.0, 478.00000000000006];
        p.distortion_vector = vec![-0.049999999999999975, 0.01000000000000001, 0.0, 0.0, 0.0];
        p.translation_vector = [0.1 + 0.2, 81.0, 318.0];

        p.write_json(&path).expect("write");
        let back = CalibrationProfile::load_json(&path).expect("load");
        assert_eq!(back, p);
    }
}
