//! Per-frame pattern pose with a calibrated camera.

use nalgebra::Vector3;
use rig_calib_core::{CameraParams, GrayImageView, ObjectPointSet, Pose};
use rig_calib_optim::{PlanarPnp, PoseSolver};

use crate::detect::PatternDetector;
use crate::CalibError;

/// Estimates the pattern pose in single frames and keeps the translation of
/// every successful estimate.
#[derive(Clone, Debug, Default)]
pub struct PoseEstimator<S = PlanarPnp> {
    solver: S,
    history: Vec<Vector3<f64>>,
}

impl<S: PoseSolver> PoseEstimator<S> {
    pub fn new(solver: S) -> Self {
        Self {
            solver,
            history: Vec::new(),
        }
    }

    /// Pose of the pattern in `image`, or `Ok(None)` when it is not found.
    ///
    /// `camera` must come from a successful calibration;
    /// [`CalibError::NotCalibrated`] is returned otherwise, before detection
    /// runs. Only successful estimates are appended to the history.
    pub fn estimate_pose<D: PatternDetector + ?Sized>(
        &mut self,
        detector: &D,
        image: &GrayImageView<'_>,
        object: &ObjectPointSet,
        camera: Option<&CameraParams>,
    ) -> Result<Option<Pose>, CalibError> {
        let camera = camera.ok_or(CalibError::NotCalibrated)?;
        let Some(corners) = detector.find_corners(image, object.config().pattern_size()) else {
            log::debug!("pattern not found; no pose");
            return Ok(None);
        };
        if corners.len() != object.len() {
            return Err(CalibError::CornerCountMismatch {
                expected: object.len(),
                got: corners.len(),
            });
        }

        let pose = self.solver.solve_pose(object.points(), &corners, camera)?;
        self.history.push(pose.tvec);
        log::debug!(
            "pose #{}: t=({:.2}, {:.2}, {:.2})",
            self.history.len(),
            pose.tvec.x,
            pose.tvec.y,
            pose.tvec.z
        );
        Ok(Some(pose))
    }

    /// Translations of every successful estimate, oldest first.
    pub fn translation_history(&self) -> &[Vector3<f64>] {
        &self.history
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Point2;
    use rig_calib_core::{project_points, Distortion, Intrinsics, PatternConfig, PatternSize};

    struct Fixed(Option<Vec<Point2<f64>>>);

    impl PatternDetector for Fixed {
        fn detect(&self, _: &GrayImageView<'_>, _: PatternSize) -> Option<Vec<Point2<f64>>> {
            self.0.clone()
        }
    }

    fn camera() -> CameraParams {
        CameraParams::new(
            Intrinsics {
                fx: 1000.0,
                fy: 1000.0,
                cx: 480.0,
                cy: 640.0,
            },
            Distortion {
                k1: -0.05,
                ..Distortion::default()
            },
        )
    }

    fn frame() -> Vec<u8> {
        vec![0; 16]
    }

    #[test]
    fn requires_calibration() {
        let object = ObjectPointSet::generate(&PatternConfig::default()).expect("pattern");
        let data = frame();
        let view = GrayImageView {
            width: 4,
            height: 4,
            data: &data,
        };
        let mut est = PoseEstimator::<PlanarPnp>::default();
        assert!(matches!(
            est.estimate_pose(&Fixed(None), &view, &object, None),
            Err(CalibError::NotCalibrated)
        ));
    }

    #[test]
    fn history_grows_only_on_success() {
        let object = ObjectPointSet::generate(&PatternConfig::default()).expect("pattern");
        let truth = Pose::new(Vector3::new(0.1, -0.2, 0.05), Vector3::new(-45.0, -30.0, 320.0));
        let corners = project_points(object.points(), &truth, &camera());
        let data = frame();
        let view = GrayImageView {
            width: 4,
            height: 4,
            data: &data,
        };

        let mut est = PoseEstimator::<PlanarPnp>::default();
        let miss = est
            .estimate_pose(&Fixed(None), &view, &object, Some(&camera()))
            .expect("miss is not an error");
        assert!(miss.is_none());
        assert!(est.translation_history().is_empty());

        let pose = est
            .estimate_pose(&Fixed(Some(corners)), &view, &object, Some(&camera()))
            .expect("pose")
            .expect("found");
        assert!((pose.tvec - truth.tvec).norm() < 1e-4);
        assert_eq!(est.translation_history().len(), 1);

        est.clear_history();
        assert!(est.translation_history().is_empty());
    }
}
