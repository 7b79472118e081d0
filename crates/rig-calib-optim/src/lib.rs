//! Numerical back ends for scanner rig calibration.
//!
//! Every solver sits behind a narrow interface: point sets and an initial
//! guess go in, converged parameters or a [`SolveError`] come out.
//!
//! - [`CameraCalibrator`] / [`PlanarCalibrator`]: multi-view intrinsics,
//!   distortion and per-view poses (Zhang initialisation followed by a joint
//!   Levenberg-Marquardt refinement).
//! - [`PoseSolver`] / [`PlanarPnp`]: single-view pose with known intrinsics.
//! - [`fit_circle`]: turntable rotation-center estimate from marker positions.

mod calibrate;
mod circle_fit;
mod error;
mod lm;
mod planar_pose;
mod pnp;
mod zhang;

pub use calibrate::{
    CalibrationOptions, CameraCalibration, CameraCalibrator, PlanarCalibrator, ViewObservations,
};
pub use circle_fit::{fit_circle, CircleFit, CircleFitOptions};
pub use error::SolveError;
pub use lm::SolveReport;
pub use planar_pose::pose_from_homography;
pub use pnp::{PlanarPnp, PnpOptions, PoseSolver};
pub use zhang::intrinsics_from_homographies;
