//! Undistortion remap tables.
//!
//! The output camera keeps every source pixel (alpha = 1): black borders
//! are allowed, nothing is cropped.

use nalgebra::{Point2, Vector2};
use rig_calib_core::{
    sample_bilinear_u8, CameraParams, GrayImage, GrayImageView, ImageSize, Intrinsics,
};
use rig_calib_optim::SolveError;
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::CalibError;

/// Sample grid per axis used to trace the undistorted frame outline.
const OUTLINE_SAMPLES: usize = 9;

/// Integer pixel rectangle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Roi {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

#[derive(Clone, Copy, Debug)]
struct Rect {
    x: f64,
    y: f64,
    width: f64,
    height: f64,
}

impl Rect {
    fn from_bounds(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        Self {
            x: x0,
            y: y0,
            width: x1 - x0,
            height: y1 - y0,
        }
    }

    /// Round to pixels and clip to `size`.
    fn clip(&self, size: ImageSize) -> Roi {
        let x0 = (self.x.round() as i32).max(0);
        let y0 = (self.y.round() as i32).max(0);
        let x1 = ((self.x.round() + self.width.round()) as i32).min(size.width as i32);
        let y1 = ((self.y.round() + self.height.round()) as i32).min(size.height as i32);
        if x1 <= x0 || y1 <= y0 {
            return Roi::default();
        }
        Roi {
            x: x0,
            y: y0,
            width: x1 - x0,
            height: y1 - y0,
        }
    }
}

/// Largest rectangle inside, and smallest around, the undistorted outline of
/// the frame, mapped through `project` (normalised -> output coordinates).
fn outline_rects(
    camera: &CameraParams,
    size: ImageSize,
    project: impl Fn(Vector2<f64>) -> Point2<f64>,
) -> (Rect, Rect) {
    let n = OUTLINE_SAMPLES;
    let w = size.width.saturating_sub(1) as f64;
    let h = size.height.saturating_sub(1) as f64;

    let (mut ox0, mut oy0, mut ox1, mut oy1) = (f64::MAX, f64::MAX, f64::MIN, f64::MIN);
    let (mut ix0, mut iy0, mut ix1, mut iy1) = (f64::MIN, f64::MIN, f64::MAX, f64::MAX);
    for y in 0..n {
        for x in 0..n {
            let px = Point2::new(x as f64 * w / (n - 1) as f64, y as f64 * h / (n - 1) as f64);
            let p = project(camera.undistort_pixel(px));
            ox0 = ox0.min(p.x);
            ox1 = ox1.max(p.x);
            oy0 = oy0.min(p.y);
            oy1 = oy1.max(p.y);
            if x == 0 {
                ix0 = ix0.max(p.x);
            }
            if x == n - 1 {
                ix1 = ix1.min(p.x);
            }
            if y == 0 {
                iy0 = iy0.max(p.y);
            }
            if y == n - 1 {
                iy1 = iy1.min(p.y);
            }
        }
    }
    (
        Rect::from_bounds(ix0, iy0, ix1, iy1),
        Rect::from_bounds(ox0, oy0, ox1, oy1),
    )
}

fn check_camera(camera: &CameraParams) -> Result<(), CalibError> {
    let i = &camera.intrinsics;
    let d = camera.distortion.coefficients();
    if !i.is_finite() || i.fx == 0.0 || i.fy == 0.0 || d.iter().any(|c| !c.is_finite()) {
        return Err(CalibError::NotCalibrated);
    }
    Ok(())
}

/// New intrinsics for undistorted output of `size`, and the valid-pixel ROI.
///
/// `alpha = 0` keeps only valid pixels (the inscribed rectangle fills the
/// frame); `alpha = 1` keeps every source pixel (the circumscribed one
/// does). Values in between interpolate.
pub fn optimal_new_camera_matrix(
    camera: &CameraParams,
    size: ImageSize,
    alpha: f64,
) -> Result<(Intrinsics, Roi), CalibError> {
    check_camera(camera)?;
    let alpha = alpha.clamp(0.0, 1.0);
    let (inner, outer) = outline_rects(camera, size, |n| Point2::new(n.x, n.y));

    let w = size.width.saturating_sub(1) as f64;
    let h = size.height.saturating_sub(1) as f64;
    let fit = |r: &Rect| {
        let fx = w / r.width;
        let fy = h / r.height;
        (fx, fy, -fx * r.x, -fy * r.y)
    };
    let (fx0, fy0, cx0, cy0) = fit(&inner);
    let (fx1, fy1, cx1, cy1) = fit(&outer);
    let lerp = |a: f64, b: f64| a * (1.0 - alpha) + b * alpha;
    let new = Intrinsics {
        fx: lerp(fx0, fx1),
        fy: lerp(fy0, fy1),
        cx: lerp(cx0, cx1),
        cy: lerp(cy0, cy1),
    };
    if !new.is_finite() {
        return Err(SolveError::NonFinite.into());
    }

    let (valid, _) = outline_rects(camera, size, |n| new.to_pixel(n));
    Ok((new, valid.clip(size)))
}

/// Per-pixel source coordinates for undistorting frames of one size.
#[derive(Clone, Debug, PartialEq)]
pub struct UndistortionMap {
    size: ImageSize,
    camera: CameraParams,
    new_intrinsics: Intrinsics,
    roi: Roi,
    map_x: Vec<f32>,
    map_y: Vec<f32>,
}

impl UndistortionMap {
    /// Build the tables for `camera` at `size`, keeping every source pixel.
    pub fn build(camera: &CameraParams, size: ImageSize) -> Result<Self, CalibError> {
        Self::build_with_alpha(camera, size, 1.0)
    }

    #[cfg_attr(
        feature = "tracing",
        instrument(level = "info", skip(camera), fields(width = size.width, height = size.height))
    )]
    pub fn build_with_alpha(
        camera: &CameraParams,
        size: ImageSize,
        alpha: f64,
    ) -> Result<Self, CalibError> {
        let (new_intrinsics, roi) = optimal_new_camera_matrix(camera, size, alpha)?;

        let (w, h) = (size.width as usize, size.height as usize);
        let mut map_x = Vec::with_capacity(w * h);
        let mut map_y = Vec::with_capacity(w * h);
        for v in 0..h {
            for u in 0..w {
                let n = new_intrinsics.to_normalized(Point2::new(u as f64, v as f64));
                let src = camera.intrinsics.to_pixel(camera.distortion.distort(n));
                map_x.push(src.x as f32);
                map_y.push(src.y as f32);
            }
        }
        log::debug!(
            "undistortion map rebuilt for {}x{} (valid roi {:?})",
            size.width,
            size.height,
            roi
        );

        Ok(Self {
            size,
            camera: *camera,
            new_intrinsics,
            roi,
            map_x,
            map_y,
        })
    }

    /// `true` when these tables were built from exactly `camera` and `size`.
    pub fn matches(&self, camera: &CameraParams, size: ImageSize) -> bool {
        self.size == size && self.camera == *camera
    }

    /// Resample `image` through the tables with bilinear interpolation.
    /// Samples falling outside the source read as black.
    pub fn apply(&self, image: &GrayImageView<'_>) -> Result<GrayImage, CalibError> {
        if image.size() != self.size {
            return Err(CalibError::ResolutionMismatch {
                expected: self.size,
                got: image.size(),
            });
        }
        let data = self
            .map_x
            .iter()
            .zip(&self.map_y)
            .map(|(&x, &y)| sample_bilinear_u8(image, x, y))
            .collect();
        Ok(GrayImage {
            width: image.width,
            height: image.height,
            data,
        })
    }

    pub fn size(&self) -> ImageSize {
        self.size
    }

    /// Intrinsics of the undistorted output.
    pub fn new_intrinsics(&self) -> Intrinsics {
        self.new_intrinsics
    }

    /// Region of the output covered by valid source pixels.
    pub fn roi(&self) -> Roi {
        self.roi
    }

    pub fn map_x(&self) -> &[f32] {
        &self.map_x
    }

    pub fn map_y(&self) -> &[f32] {
        &self.map_y
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rig_calib_core::Distortion;

    fn camera(k1: f64) -> CameraParams {
        CameraParams::new(
            Intrinsics {
                fx: 60.0,
                fy: 60.0,
                cx: 31.5,
                cy: 23.5,
            },
            Distortion {
                k1,
                ..Distortion::default()
            },
        )
    }

    #[test]
    fn zero_distortion_keeps_the_camera() {
        let size = ImageSize::new(64, 48);
        let (k, roi) = optimal_new_camera_matrix(&camera(0.0), size, 1.0).expect("matrix");
        assert_relative_eq!(k.fx, 60.0, epsilon = 1e-9);
        assert_relative_eq!(k.fy, 60.0, epsilon = 1e-9);
        assert_relative_eq!(k.cx, 31.5, epsilon = 1e-9);
        assert_relative_eq!(k.cy, 23.5, epsilon = 1e-9);
        assert_eq!(
            roi,
            Roi {
                x: 0,
                y: 0,
                width: 63,
                height: 47
            }
        );
    }

    #[test]
    fn zero_distortion_map_is_identity() {
        let size = ImageSize::new(64, 48);
        let map = UndistortionMap::build(&camera(0.0), size).expect("map");
        assert_eq!(map.map_x().len(), size.pixel_count());
        assert_relative_eq!(map.map_x()[5 * 64 + 7], 7.0, epsilon = 1e-4);
        assert_relative_eq!(map.map_y()[5 * 64 + 7], 5.0, epsilon = 1e-4);

        let data: Vec<u8> = (0..size.pixel_count()).map(|i| (i % 251) as u8).collect();
        let src = GrayImage::from_raw(64, 48, data).expect("image");
        let out = map.apply(&src.view()).expect("apply");
        assert_eq!(out, src);
    }

    #[test]
    fn barrel_distortion_keeps_all_pixels_with_alpha_one() {
        let size = ImageSize::new(64, 48);
        let cam = camera(-0.3);
        let (full, _) = optimal_new_camera_matrix(&cam, size, 1.0).expect("alpha 1");
        let (cropped, _) = optimal_new_camera_matrix(&cam, size, 0.0).expect("alpha 0");
        // keeping the stretched corners needs a shorter focal length
        assert!(full.fx < cropped.fx);

        let map = UndistortionMap::build(&cam, size).expect("map");
        // output corners sample the source frame corners
        assert!(map.map_x()[0].abs() < 0.5);
        assert!(map.map_y()[0].abs() < 0.5);
        assert!(map.matches(&cam, size));
        assert!(!map.matches(&camera(0.0), size));
    }

    #[test]
    fn apply_rejects_other_resolution() {
        let map = UndistortionMap::build(&camera(0.0), ImageSize::new(8, 8)).expect("map");
        let img = GrayImage::new(4, 4);
        assert!(matches!(
            map.apply(&img.view()),
            Err(CalibError::ResolutionMismatch { .. })
        ));
    }

    #[test]
    fn uncalibrated_camera_is_rejected() {
        let mut cam = camera(0.0);
        cam.intrinsics.fx = 0.0;
        assert!(matches!(
            UndistortionMap::build(&cam, ImageSize::new(8, 8)),
            Err(CalibError::NotCalibrated)
        ));
    }
}
