//! Runs the camera calibration solver over an accumulated stack.

use nalgebra::{Matrix3, Vector3};
use rig_calib_core::{CameraParams, ImageSize, Pose};
use rig_calib_optim::CameraCalibrator;
use serde::Serialize;

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::reprojection::mean_error;
use crate::{CalibError, CorrespondenceStack};

/// Camera model and per-view poses from one solve.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CalibrationResult {
    pub camera: CameraParams,
    /// One pose per view of the solved stack, in stack order.
    pub poses: Vec<Pose>,
    pub image_size: ImageSize,
    /// RMS pixel distance over all points, as reported by the solver.
    pub rms: f64,
    /// Mean of the per-view reprojection errors.
    pub mean_error: f64,
    /// Residual evaluations spent by the optimizer.
    pub evaluations: usize,
}

impl CalibrationResult {
    pub fn camera_matrix(&self) -> Matrix3<f64> {
        self.camera.intrinsics.matrix()
    }

    /// Flat `(k1, k2, p1, p2, k3)`.
    pub fn distortion_vector(&self) -> Vec<f64> {
        self.camera.distortion.coefficients().to_vec()
    }

    pub fn rotation_vectors(&self) -> Vec<Vector3<f64>> {
        self.poses.iter().map(|p| p.rvec).collect()
    }

    pub fn translation_vectors(&self) -> Vec<Vector3<f64>> {
        self.poses.iter().map(|p| p.tvec).collect()
    }

    pub fn view_count(&self) -> usize {
        self.poses.len()
    }
}

/// Calibrate the camera from every view in `stack`.
///
/// Fails with [`CalibError::InsufficientData`] on an empty stack and with
/// [`CalibError::Solver`] when the solver does not converge. The mean
/// reprojection error is evaluated right after a successful solve.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "info", skip_all, fields(views = stack.len()))
)]
pub fn solve<C: CameraCalibrator + ?Sized>(
    stack: &CorrespondenceStack,
    calibrator: &C,
) -> Result<CalibrationResult, CalibError> {
    let image_size = match stack.image_size() {
        Some(size) if !stack.is_empty() => size,
        _ => return Err(CalibError::InsufficientData),
    };
    log::info!(
        "calibrating from {} views ({} points) at {}x{}",
        stack.len(),
        stack.total_points(),
        image_size.width,
        image_size.height
    );

    let views = stack.views();
    let calib = calibrator.calibrate(&views, image_size)?;
    let mean_error = mean_error(&calib.camera, &calib.poses, stack)?;

    log::info!(
        "calibration done: rms={:.4}px mean error={:.4}px ({} evaluations)",
        calib.rms,
        mean_error,
        calib.report.evaluations
    );
    Ok(CalibrationResult {
        camera: calib.camera,
        poses: calib.poses,
        image_size,
        rms: calib.rms,
        mean_error,
        evaluations: calib.report.evaluations,
    })
}
