//! Camera calibration workflow for turntable 3D scanner rigs.
//!
//! This crate provides:
//! - a detector seam ([`PatternDetector`]) and, with the `chess-corners`
//!   feature, a chessboard detector built on `calib-targets`,
//! - multi-view correspondence accumulation ([`CorrespondenceStack`]),
//! - the calibration solve and its reprojection error ([`solve`],
//!   [`mean_reprojection_error`]),
//! - per-frame pattern pose with a translation history ([`PoseEstimator`]),
//! - undistortion remap tables ([`UndistortionMap`]),
//! - operator guide quadrilaterals ([`scale_guides`], [`draw_guide`]),
//! - a typed, JSON-persisted [`CalibrationProfile`],
//! - [`CalibrationSession`], which owns all of the above for one rig.
//!
//! ## Quickstart
//!
//! ```no_run
//! use rig_calib::{CalibrationSession, SessionConfig};
//! # use rig_calib::synthetic::{tagged_frame, TableDetector};
//! # use rig_calib::core::ImageSize;
//!
//! # fn main() -> Result<(), rig_calib::CalibError> {
//! # let detector = TableDetector::default();
//! # let frames = vec![tagged_frame(ImageSize::new(960, 1280), 0)];
//! let mut session = CalibrationSession::new(SessionConfig::default())?;
//! for frame in &frames {
//!     let outcome = session.try_add_view(&detector, &frame.view())?;
//!     println!("accepted: {}", outcome.accepted);
//! }
//! let result = session.solve()?;
//! println!("mean reprojection error: {:.3}px", result.mean_error);
//! # Ok(())
//! # }
//! ```
//!
//! ## API map
//! - `rig_calib::core`: images, camera model, homographies, pattern grids.
//! - `rig_calib::optim`: calibration, PnP and circle-fit solvers.
//! - `rig_calib::synthetic`: known-camera fixtures for tests and demos.

pub use rig_calib_core as core;
pub use rig_calib_optim as optim;

mod accumulator;
mod calibration;
mod config;
mod detect;
mod error;
mod guides;
mod overlay;
mod pose;
mod profile;
mod reprojection;
mod session;
pub mod synthetic;
mod undistort;

pub use accumulator::{CorrespondenceStack, ViewOutcome};
pub use calibration::{solve, CalibrationResult};
pub use config::SessionConfig;
#[cfg(feature = "chess-corners")]
pub use detect::ChessCornersDetector;
pub use detect::PatternDetector;
pub use error::CalibError;
pub use guides::{scale_guides, GuideSet, GUIDE_COUNT, REFERENCE_SIZE};
pub use overlay::{draw_corners, draw_guide, draw_line, OVERLAY_VALUE};
pub use pose::PoseEstimator;
pub use profile::{CalibrationProfile, ProfileIoError, ProfileKey};
pub use reprojection::{mean_error, mean_reprojection_error, view_errors};
pub use session::CalibrationSession;
pub use undistort::{optimal_new_camera_matrix, Roi, UndistortionMap};

pub use rig_calib_core::{init_from_env, init_with_level};
#[cfg(feature = "tracing")]
pub use rig_calib_core::init_tracing;
