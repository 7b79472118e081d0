//! One calibration session: configuration, accumulated views, the current
//! camera model and everything derived from it.

use std::path::Path;

use nalgebra::{Point2, Vector3};
use rig_calib_core::{
    CameraParams, GrayImage, GrayImageView, ImageSize, ObjectPointSet, PatternConfig, Pose,
};
use rig_calib_optim::{
    fit_circle, CameraCalibrator, CircleFit, PlanarCalibrator, PlanarPnp, PoseSolver,
};

use crate::calibration::{solve, CalibrationResult};
use crate::detect::PatternDetector;
use crate::profile::{CalibrationProfile, ProfileKey};
use crate::undistort::UndistortionMap;
use crate::{CalibError, CorrespondenceStack, PoseEstimator, SessionConfig, ViewOutcome};

/// Owns every piece of mutable calibration state.
///
/// Single writer: capture, solve and reset must not run concurrently.
/// Wrap the session in a lock if several threads drive it.
#[derive(Debug)]
pub struct CalibrationSession<C = PlanarCalibrator, S = PlanarPnp> {
    config: SessionConfig,
    object: ObjectPointSet,
    stack: CorrespondenceStack,
    calibrator: C,
    pose: PoseEstimator<S>,
    camera: Option<CameraParams>,
    result: Option<CalibrationResult>,
    profile: CalibrationProfile,
    map: Option<UndistortionMap>,
}

impl CalibrationSession {
    /// Session with the built-in solvers configured from `config`.
    pub fn new(config: SessionConfig) -> Result<Self, CalibError> {
        let calibrator = PlanarCalibrator::new(config.calibration);
        let pnp = PlanarPnp::new(config.pnp);
        Self::with_solvers(config, calibrator, pnp)
    }

    /// Like [`Self::new`], then applies the profile at
    /// `config.profile_path` when that file exists.
    pub fn open(config: SessionConfig) -> Result<Self, CalibError> {
        let path = config.profile_path.clone();
        let mut session = Self::new(config)?;
        if let Some(path) = path.filter(|p| p.exists()) {
            session.load_profile(path)?;
        }
        Ok(session)
    }
}

impl<C: CameraCalibrator, S: PoseSolver> CalibrationSession<C, S> {
    pub fn with_solvers(
        config: SessionConfig,
        calibrator: C,
        pose_solver: S,
    ) -> Result<Self, CalibError> {
        let object = ObjectPointSet::generate(&config.pattern)?;
        Ok(Self {
            config,
            object,
            stack: CorrespondenceStack::new(),
            calibrator,
            pose: PoseEstimator::new(pose_solver),
            camera: None,
            result: None,
            profile: CalibrationProfile::default(),
            map: None,
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn object_points(&self) -> &ObjectPointSet {
        &self.object
    }

    pub fn stack(&self) -> &CorrespondenceStack {
        &self.stack
    }

    /// Current camera model, from the last solve or an applied profile.
    pub fn camera(&self) -> Option<&CameraParams> {
        self.camera.as_ref()
    }

    /// Result of the last successful solve over the current stack.
    pub fn result(&self) -> Option<&CalibrationResult> {
        self.result.as_ref()
    }

    /// Mean reprojection error of the last solve.
    pub fn mean_error(&self) -> Option<f64> {
        self.result.as_ref().map(|r| r.mean_error)
    }

    pub fn profile(&self) -> &CalibrationProfile {
        &self.profile
    }

    /// Change the pattern geometry. Accumulated views are discarded.
    pub fn set_pattern(&mut self, pattern: PatternConfig) -> Result<(), CalibError> {
        let object = ObjectPointSet::generate(&pattern)?;
        self.config.pattern = pattern;
        self.object = object;
        self.reset();
        Ok(())
    }

    /// Offer one frame; see [`CorrespondenceStack::try_add_view`].
    pub fn try_add_view<D: PatternDetector + ?Sized>(
        &mut self,
        detector: &D,
        image: &GrayImageView<'_>,
    ) -> Result<ViewOutcome, CalibError> {
        self.stack.try_add_view(detector, image, &self.object)
    }

    /// Drop all views and the per-view poses of the last solve. The camera
    /// model stays.
    pub fn reset(&mut self) {
        self.stack.reset();
        self.result = None;
    }

    /// Calibrate from the accumulated views.
    ///
    /// The previous result is discarded first, so a failed solve leaves no
    /// result behind; the camera model is only replaced on success.
    pub fn solve(&mut self) -> Result<&CalibrationResult, CalibError> {
        self.result = None;
        let result = solve(&self.stack, &self.calibrator)?;
        self.set_camera(result.camera);
        Ok(&*self.result.insert(result))
    }

    /// Pattern pose in one frame, `Ok(None)` when the pattern is not found.
    pub fn estimate_pose<D: PatternDetector + ?Sized>(
        &mut self,
        detector: &D,
        image: &GrayImageView<'_>,
    ) -> Result<Option<Pose>, CalibError> {
        self.pose
            .estimate_pose(detector, image, &self.object, self.camera.as_ref())
    }

    pub fn translation_history(&self) -> &[Vector3<f64>] {
        self.pose.translation_history()
    }

    pub fn clear_pose_history(&mut self) {
        self.pose.clear_history();
    }

    /// Turntable rotation center from marker positions in the `(x, z)` plane.
    pub fn fit_center(&self, points: &[Point2<f64>]) -> Result<CircleFit, CalibError> {
        Ok(fit_circle(points, &self.config.circle_fit)?)
    }

    /// Undistort a frame with the current camera model.
    ///
    /// The remap tables are rebuilt whenever the camera or the frame size
    /// differs from the ones they were built for.
    pub fn undistort(&mut self, image: &GrayImageView<'_>) -> Result<GrayImage, CalibError> {
        self.undistortion_map(image.size())?.apply(image)
    }

    pub fn undistortion_map(&mut self, size: ImageSize) -> Result<&UndistortionMap, CalibError> {
        let camera = self.camera.ok_or(CalibError::NotCalibrated)?;
        match self.map.take() {
            Some(map) if map.matches(&camera, size) => Ok(&*self.map.insert(map)),
            _ => {
                let map = UndistortionMap::build(&camera, size)?;
                Ok(&*self.map.insert(map))
            }
        }
    }

    /// Record the turntable translation. Persisted only by an explicit save.
    pub fn set_extrinsic(&mut self, xc: f64, y: f64, zc: f64) {
        self.profile.set_translation(&Vector3::new(xc, y, zc));
    }

    /// Adopt the camera model and extrinsics of `profile`.
    pub fn apply_profile(&mut self, profile: CalibrationProfile) -> Result<(), CalibError> {
        let camera = profile.camera()?;
        self.profile = profile;
        self.set_camera(camera);
        Ok(())
    }

    /// Copy the current camera model into the profile.
    pub fn capture_profile(&mut self) -> Result<&CalibrationProfile, CalibError> {
        let camera = self.camera.ok_or(CalibError::NotCalibrated)?;
        self.profile.set_camera(&camera);
        Ok(&self.profile)
    }

    /// Restore one profile entry to its default. Restoring the matrix or the
    /// distortion also replaces the current camera model.
    pub fn restore(&mut self, key: ProfileKey) -> Result<(), CalibError> {
        self.profile.reset(key);
        if matches!(key, ProfileKey::CalibrationMatrix | ProfileKey::DistortionVector) {
            let camera = self.profile.camera()?;
            self.set_camera(camera);
        }
        Ok(())
    }

    pub fn load_profile(&mut self, path: impl AsRef<Path>) -> Result<(), CalibError> {
        let profile = CalibrationProfile::load_json(path)?;
        self.apply_profile(profile)
    }

    /// Write the profile as it stands; call [`Self::capture_profile`] first
    /// to include the latest solve.
    pub fn save_profile(&self, path: impl AsRef<Path>) -> Result<(), CalibError> {
        Ok(self.profile.write_json(path)?)
    }

    fn set_camera(&mut self, camera: CameraParams) {
        self.camera = Some(camera);
        if self.map.as_ref().is_some_and(|m| !m.matches(&camera, m.size())) {
            self.map = None;
        }
    }
}
