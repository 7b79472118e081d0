//! Reprojection error of a calibration over its correspondence stack.

use rig_calib_core::{project_points, CameraParams, Pose};

use crate::{CalibError, CalibrationResult, CorrespondenceStack};

/// Per-view error: L2 norm of the stacked pixel differences between the
/// detected corners and the projected pattern, divided by the point count.
///
/// `poses` must hold one pose per view of `stack`.
pub fn view_errors(
    camera: &CameraParams,
    poses: &[Pose],
    stack: &CorrespondenceStack,
) -> Result<Vec<f64>, CalibError> {
    if poses.len() != stack.len() {
        return Err(CalibError::ViewCountMismatch {
            result: poses.len(),
            stack: stack.len(),
        });
    }

    let errors = poses
        .iter()
        .zip(stack.object_points().iter().zip(stack.image_points()))
        .map(|(pose, (object, detected))| {
            let projected = project_points(object.points(), pose, camera);
            let sq: f64 = projected
                .iter()
                .zip(detected)
                .map(|(p, d)| (p - d).norm_squared())
                .sum();
            if detected.is_empty() {
                0.0
            } else {
                sq.sqrt() / detected.len() as f64
            }
        })
        .collect();
    Ok(errors)
}

/// Arithmetic mean of [`view_errors`] over all views.
pub fn mean_error(
    camera: &CameraParams,
    poses: &[Pose],
    stack: &CorrespondenceStack,
) -> Result<f64, CalibError> {
    let errors = view_errors(camera, poses, stack)?;
    if errors.is_empty() {
        return Err(CalibError::InsufficientData);
    }
    Ok(errors.iter().sum::<f64>() / errors.len() as f64)
}

/// Mean reprojection error of `result` against `stack`.
///
/// Only meaningful for the stack the result was solved from; a view-count
/// difference is reported as [`CalibError::ViewCountMismatch`].
pub fn mean_reprojection_error(
    result: &CalibrationResult,
    stack: &CorrespondenceStack,
) -> Result<f64, CalibError> {
    mean_error(&result.camera, &result.poses, stack)
}
