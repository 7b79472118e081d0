//! Single-view pose of a planar pattern with a calibrated camera.

use nalgebra::{DMatrix, DVector, Matrix3, Point2, Point3, Vector3};
use rig_calib_core::{estimate_homography, planar_points, CameraParams, Pose};
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::lm::{diff_step, minimize, LmOptions, NllsProblem};
use crate::{pose_from_homography, SolveError};

/// Pose solver seam: known model points, their pixels and a camera.
pub trait PoseSolver {
    fn solve_pose(
        &self,
        object: &[Point3<f64>],
        image: &[Point2<f64>],
        camera: &CameraParams,
    ) -> Result<Pose, SolveError>;
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PnpOptions {
    /// Run LM on pixel residuals after the homography initialisation.
    pub refine: bool,
    pub max_iters: usize,
    pub tol: f64,
}

impl Default for PnpOptions {
    fn default() -> Self {
        Self {
            refine: true,
            max_iters: 50,
            tol: 1e-12,
        }
    }
}

/// Homography decomposition in undistorted normalised coordinates, then an
/// optional reprojection refinement.
#[derive(Clone, Debug, Default)]
pub struct PlanarPnp {
    pub options: PnpOptions,
}

impl PlanarPnp {
    pub fn new(options: PnpOptions) -> Self {
        Self { options }
    }
}

impl PoseSolver for PlanarPnp {
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip_all, fields(points = object.len()))
    )]
    fn solve_pose(
        &self,
        object: &[Point3<f64>],
        image: &[Point2<f64>],
        camera: &CameraParams,
    ) -> Result<Pose, SolveError> {
        if object.len() != image.len() {
            return Err(SolveError::MismatchedLengths {
                object: object.len(),
                image: image.len(),
            });
        }
        if object.len() < 4 {
            return Err(SolveError::NotEnoughPoints {
                needed: 4,
                got: object.len(),
            });
        }
        if object.iter().any(|p| p.z.abs() > 1e-9) {
            return Err(SolveError::Degenerate("pattern points must lie on z = 0"));
        }

        let plane = planar_points(object);
        let normalized: Vec<Point2<f64>> = image
            .iter()
            .map(|&px| Point2::from(camera.undistort_pixel(px)))
            .collect();
        let h = estimate_homography(&plane, &normalized)?;
        let init = pose_from_homography(&Matrix3::identity(), &h.h)?;
        if !self.options.refine {
            return Ok(init);
        }

        let problem = PnpProblem {
            object,
            image,
            camera,
        };
        let x0 = DVector::from_iterator(6, init.rvec.iter().chain(init.tvec.iter()).copied());
        let opts = LmOptions {
            max_iters: self.options.max_iters,
            ftol: self.options.tol,
            xtol: self.options.tol,
            gtol: self.options.tol,
        };
        let (x, report) = minimize(&problem, x0, &opts);
        report.ensure_converged()?;
        log::trace!(
            "pnp refined in {} evaluations, cost {:.3e}",
            report.evaluations,
            report.final_cost
        );
        Ok(PnpProblem::pose(&x))
    }
}

struct PnpProblem<'a> {
    object: &'a [Point3<f64>],
    image: &'a [Point2<f64>],
    camera: &'a CameraParams,
}

impl PnpProblem<'_> {
    fn pose(x: &DVector<f64>) -> Pose {
        Pose::new(
            Vector3::new(x[0], x[1], x[2]),
            Vector3::new(x[3], x[4], x[5]),
        )
    }
}

impl NllsProblem for PnpProblem<'_> {
    fn residuals(&self, x: &DVector<f64>) -> DVector<f64> {
        let pose = Self::pose(x);
        let rot = pose.rotation();
        let mut r = DVector::zeros(2 * self.object.len());
        for (k, (pw, px)) in self.object.iter().zip(self.image).enumerate() {
            let (dx, dy) = match self.camera.project(&(rot * pw + pose.tvec)) {
                Some(uv) => (uv.x - px.x, uv.y - px.y),
                None => (1e4, 1e4),
            };
            r[2 * k] = dx;
            r[2 * k + 1] = dy;
        }
        r
    }

    fn jacobian(&self, x: &DVector<f64>) -> DMatrix<f64> {
        let mut j = DMatrix::zeros(2 * self.object.len(), 6);
        let mut xp = x.clone();
        for p in 0..6 {
            let h = diff_step(x[p]);
            xp[p] = x[p] + h;
            let rp = self.residuals(&xp);
            xp[p] = x[p] - h;
            let rm = self.residuals(&xp);
            xp[p] = x[p];
            j.column_mut(p).copy_from(&((rp - rm) / (2.0 * h)));
        }
        j
    }
}
