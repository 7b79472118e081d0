//! Core types and utilities for scanner rig calibration.
//!
//! This crate is intentionally small and purely geometric. It does *not*
//! run any solver and does not depend on a concrete corner detector or
//! image library: the optimisation back ends live in `rig-calib-optim` and
//! the calibration workflow in `rig-calib`.

mod camera;
mod homography;
mod image;
mod logger;
mod pattern;

pub use camera::{
    project_points, CameraParams, Distortion, DistortionError, ImageSize, Intrinsics, Pose,
};
pub use homography::{estimate_homography, Homography, HomographyError};
pub use image::{sample_bilinear, sample_bilinear_u8, GrayImage, GrayImageView, ImageError};
pub use pattern::{planar_points, ObjectPointSet, PatternConfig, PatternError, PatternSize};

#[cfg(feature = "tracing")]
pub use logger::init_tracing;

pub use logger::{init_from_env, init_with_level};
