//! Pinhole camera with Brown-Conrady lens distortion.
//!
//! Conventions follow the usual calibration toolchains: the intrinsic matrix
//! is `[[fx, 0, cx], [0, fy, cy], [0, 0, 1]]`, distortion coefficients are
//! ordered `(k1, k2, p1, p2, k3)` and a view pose is a Rodrigues rotation
//! vector plus a translation mapping pattern coordinates into the camera
//! frame.

use nalgebra::{Isometry3, Matrix3, Point2, Point3, Rotation3, Vector2, Vector3};
use serde::{Deserialize, Serialize};

/// Fixed-point iterations used to invert the distortion model.
const UNDISTORT_ITERS: usize = 20;

/// Frame resolution in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

impl ImageSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    #[inline]
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

/// Focal lengths and principal point, in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Intrinsics {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
}

impl Intrinsics {
    pub fn matrix(&self) -> Matrix3<f64> {
        Matrix3::new(
            self.fx, 0.0, self.cx, //
            0.0, self.fy, self.cy, //
            0.0, 0.0, 1.0,
        )
    }

    /// Read `fx, fy, cx, cy` from an intrinsic matrix. Skew is ignored.
    pub fn from_matrix(k: &Matrix3<f64>) -> Self {
        Self {
            fx: k[(0, 0)],
            fy: k[(1, 1)],
            cx: k[(0, 2)],
            cy: k[(1, 2)],
        }
    }

    #[inline]
    pub fn to_normalized(&self, p: Point2<f64>) -> Vector2<f64> {
        Vector2::new((p.x - self.cx) / self.fx, (p.y - self.cy) / self.fy)
    }

    #[inline]
    pub fn to_pixel(&self, n: Vector2<f64>) -> Point2<f64> {
        Point2::new(self.fx * n.x + self.cx, self.fy * n.y + self.cy)
    }

    pub fn is_finite(&self) -> bool {
        [self.fx, self.fy, self.cx, self.cy]
            .iter()
            .all(|v| v.is_finite())
    }
}

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistortionError {
    #[error("distortion vector needs 4 or 5 coefficients, got {0}")]
    BadLength(usize),
    #[error("distortion coefficient {0} is not finite")]
    NonFinite(usize),
}

/// Brown-Conrady radial/tangential coefficients.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Distortion {
    pub k1: f64,
    pub k2: f64,
    pub p1: f64,
    pub p2: f64,
    pub k3: f64,
}

impl Distortion {
    /// Build from a flat `(k1, k2, p1, p2[, k3])` coefficient list.
    pub fn from_coefficients(coeffs: &[f64]) -> Result<Self, DistortionError> {
        if coeffs.len() != 4 && coeffs.len() != 5 {
            return Err(DistortionError::BadLength(coeffs.len()));
        }
        if let Some(idx) = coeffs.iter().position(|c| !c.is_finite()) {
            return Err(DistortionError::NonFinite(idx));
        }
        Ok(Self {
            k1: coeffs[0],
            k2: coeffs[1],
            p1: coeffs[2],
            p2: coeffs[3],
            k3: coeffs.get(4).copied().unwrap_or(0.0),
        })
    }

    /// Flat `(k1, k2, p1, p2, k3)` coefficient list.
    pub fn coefficients(&self) -> [f64; 5] {
        [self.k1, self.k2, self.p1, self.p2, self.k3]
    }

    /// Apply the lens model to an ideal normalised point.
    #[inline]
    pub fn distort(&self, n: Vector2<f64>) -> Vector2<f64> {
        let (x, y) = (n.x, n.y);
        let r2 = x * x + y * y;
        let radial = 1.0 + r2 * (self.k1 + r2 * (self.k2 + r2 * self.k3));
        let x_tan = 2.0 * self.p1 * x * y + self.p2 * (r2 + 2.0 * x * x);
        let y_tan = self.p1 * (r2 + 2.0 * y * y) + 2.0 * self.p2 * x * y;
        Vector2::new(x * radial + x_tan, y * radial + y_tan)
    }

    /// Invert [`Distortion::distort`] by fixed-point iteration.
    pub fn undistort(&self, d: Vector2<f64>) -> Vector2<f64> {
        let (mut x, mut y) = (d.x, d.y);
        for _ in 0..UNDISTORT_ITERS {
            let r2 = x * x + y * y;
            let icdist = 1.0 / (1.0 + r2 * (self.k1 + r2 * (self.k2 + r2 * self.k3)));
            let dx = 2.0 * self.p1 * x * y + self.p2 * (r2 + 2.0 * x * x);
            let dy = self.p1 * (r2 + 2.0 * y * y) + 2.0 * self.p2 * x * y;
            x = (d.x - dx) * icdist;
            y = (d.y - dy) * icdist;
        }
        Vector2::new(x, y)
    }
}

/// Calibrated camera: intrinsics plus lens distortion.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CameraParams {
    pub intrinsics: Intrinsics,
    pub distortion: Distortion,
}

impl CameraParams {
    pub fn new(intrinsics: Intrinsics, distortion: Distortion) -> Self {
        Self {
            intrinsics,
            distortion,
        }
    }

    /// Project a camera-frame point to pixels. `None` behind the camera.
    #[inline]
    pub fn project(&self, pc: &Point3<f64>) -> Option<Point2<f64>> {
        if pc.z <= f64::EPSILON {
            return None;
        }
        let n = Vector2::new(pc.x / pc.z, pc.y / pc.z);
        Some(self.intrinsics.to_pixel(self.distortion.distort(n)))
    }

    /// Pixel -> undistorted normalised image coordinates.
    #[inline]
    pub fn undistort_pixel(&self, p: Point2<f64>) -> Vector2<f64> {
        self.distortion.undistort(self.intrinsics.to_normalized(p))
    }
}

/// Pose of the pattern in the camera frame: Rodrigues rotation vector and translation.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub rvec: Vector3<f64>,
    pub tvec: Vector3<f64>,
}

impl Pose {
    pub fn new(rvec: Vector3<f64>, tvec: Vector3<f64>) -> Self {
        Self { rvec, tvec }
    }

    pub fn from_isometry(iso: &Isometry3<f64>) -> Self {
        Self {
            rvec: iso.rotation.scaled_axis(),
            tvec: iso.translation.vector,
        }
    }

    #[inline]
    pub fn rotation(&self) -> Rotation3<f64> {
        Rotation3::from_scaled_axis(self.rvec)
    }
}

/// Project pattern points through a view pose and the camera model.
///
/// Points that land behind the camera are returned as `NaN` so the output
/// stays index-aligned with the input.
pub fn project_points(
    points: &[Point3<f64>],
    pose: &Pose,
    camera: &CameraParams,
) -> Vec<Point2<f64>> {
    let rot = pose.rotation();
    points
        .iter()
        .map(|p| {
            let pc = rot * p + pose.tvec;
            camera
                .project(&pc)
                .unwrap_or_else(|| Point2::new(f64::NAN, f64::NAN))
        })
        .collect()
}
