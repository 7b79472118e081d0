use rig_calib_core::{DistortionError, ImageSize, PatternError};
use rig_calib_optim::SolveError;

use crate::profile::ProfileIoError;

/// Failures surfaced by the calibration workflow.
///
/// A frame in which the pattern is not found is not an error; see
/// [`crate::ViewOutcome`] and [`crate::PoseEstimator::estimate_pose`].
#[derive(thiserror::Error, Debug)]
pub enum CalibError {
    #[error("no views accumulated; capture at least one pattern view before solving")]
    InsufficientData,

    #[error("calibration solver failed: {0}")]
    Solver(#[from] SolveError),

    #[error("camera is not calibrated")]
    NotCalibrated,

    #[error("profile persistence failed: {0}")]
    Persistence(#[from] ProfileIoError),

    #[error("frame is {got:?} but the accumulated views are {expected:?}")]
    ResolutionMismatch { expected: ImageSize, got: ImageSize },

    #[error("detector returned {got} corners, pattern has {expected}")]
    CornerCountMismatch { expected: usize, got: usize },

    #[error("pattern geometry changed; reset the accumulated views first")]
    PatternChanged,

    #[error("result covers {result} views, correspondence stack holds {stack}")]
    ViewCountMismatch { result: usize, stack: usize },

    #[error(transparent)]
    InvalidPattern(#[from] PatternError),

    #[error(transparent)]
    InvalidDistortion(#[from] DistortionError),
}
