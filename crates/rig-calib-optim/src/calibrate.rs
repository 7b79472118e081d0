//! Multi-view camera calibration from planar pattern observations.
//!
//! Pipeline:
//! 1. per-view DLT homography, pattern plane -> pixels,
//! 2. zero-skew Zhang intrinsics from those homographies,
//! 3. per-view pose from `K^-1 H`,
//! 4. joint Levenberg-Marquardt refinement of intrinsics, distortion and all
//!    poses on the pixel reprojection residuals.

use nalgebra::{DMatrix, DVector, Point2, Point3, Vector3};
use rig_calib_core::{
    estimate_homography, planar_points, CameraParams, Distortion, ImageSize, Intrinsics, Pose,
};
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::lm::{diff_step, minimize, LmOptions, NllsProblem};
use crate::{intrinsics_from_homographies, pose_from_homography, SolveError, SolveReport};

/// Residual used for a point that falls behind the camera.
const BEHIND_CAMERA_RESIDUAL: f64 = 1e4;
/// Largest `|z|` accepted for a planar pattern point.
const PLANAR_EPS: f64 = 1e-9;

/// One view's correspondences: known pattern points and detected pixels.
#[derive(Clone, Copy, Debug)]
pub struct ViewObservations<'a> {
    pub object: &'a [Point3<f64>],
    pub image: &'a [Point2<f64>],
}

impl<'a> ViewObservations<'a> {
    pub fn new(object: &'a [Point3<f64>], image: &'a [Point2<f64>]) -> Self {
        Self { object, image }
    }

    fn validate(&self) -> Result<(), SolveError> {
        if self.object.len() != self.image.len() {
            return Err(SolveError::MismatchedLengths {
                object: self.object.len(),
                image: self.image.len(),
            });
        }
        if self.object.len() < 4 {
            return Err(SolveError::NotEnoughPoints {
                needed: 4,
                got: self.object.len(),
            });
        }
        if self.object.iter().any(|p| p.z.abs() > PLANAR_EPS) {
            return Err(SolveError::Degenerate("pattern points must lie on z = 0"));
        }
        Ok(())
    }
}

/// Refinement settings for [`PlanarCalibrator`].
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationOptions {
    /// Keep `k3` at zero. The r^6 term overfits easily with few views.
    pub fix_k3: bool,
    /// Keep `p1`, `p2` at zero.
    pub fix_tangential: bool,
    pub max_iters: usize,
    pub ftol: f64,
    pub gtol: f64,
}

impl Default for CalibrationOptions {
    fn default() -> Self {
        Self {
            fix_k3: true,
            fix_tangential: false,
            max_iters: 100,
            ftol: 1e-12,
            gtol: 1e-12,
        }
    }
}

/// Output of a calibration run.
#[derive(Clone, Debug, PartialEq)]
pub struct CameraCalibration {
    pub camera: CameraParams,
    /// One pose per input view, in input order.
    pub poses: Vec<Pose>,
    /// RMS pixel distance over every point of every view.
    pub rms: f64,
    pub report: SolveReport,
}

/// Camera Calibration Solver seam: correspondences in, camera model out.
pub trait CameraCalibrator {
    fn calibrate(
        &self,
        views: &[ViewObservations<'_>],
        image_size: ImageSize,
    ) -> Result<CameraCalibration, SolveError>;
}

/// Zhang initialisation plus joint LM refinement, for planar patterns.
#[derive(Clone, Debug, Default)]
pub struct PlanarCalibrator {
    pub options: CalibrationOptions,
}

impl PlanarCalibrator {
    pub fn new(options: CalibrationOptions) -> Self {
        Self { options }
    }
}

impl CameraCalibrator for PlanarCalibrator {
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "info", skip(self, views), fields(views = views.len()))
    )]
    fn calibrate(
        &self,
        views: &[ViewObservations<'_>],
        image_size: ImageSize,
    ) -> Result<CameraCalibration, SolveError> {
        if views.len() < 2 {
            return Err(SolveError::NotEnoughViews {
                needed: 2,
                got: views.len(),
            });
        }

        let mut homographies = Vec::with_capacity(views.len());
        for view in views {
            view.validate()?;
            homographies.push(estimate_homography(&planar_points(view.object), view.image)?.h);
        }

        let intrinsics = intrinsics_from_homographies(&homographies, image_size)?;
        let k = intrinsics.matrix();
        let poses = homographies
            .iter()
            .map(|h| pose_from_homography(&k, h))
            .collect::<Result<Vec<_>, _>>()?;
        log::debug!(
            "linear init: fx={:.2} fy={:.2} cx={:.2} cy={:.2}",
            intrinsics.fx,
            intrinsics.fy,
            intrinsics.cx,
            intrinsics.cy
        );

        let layout = ParamLayout::new(&self.options, views.len());
        let problem = CalibrationProblem { views, layout };
        let camera0 = CameraParams::new(intrinsics, Distortion::default());
        let x0 = layout.pack(&camera0, &poses);

        let opts = LmOptions {
            max_iters: self.options.max_iters,
            ftol: self.options.ftol,
            xtol: self.options.ftol,
            gtol: self.options.gtol,
        };
        let (x, report) = minimize(&problem, x0, &opts);
        report.ensure_converged()?;

        let camera = layout.camera(&x);
        let poses: Vec<Pose> = (0..views.len()).map(|v| layout.pose(&x, v)).collect();
        let rms = problem.rms(&x);
        if !rms.is_finite() || !camera.intrinsics.is_finite() {
            return Err(SolveError::NonFinite);
        }
        log::debug!(
            "refined in {} evaluations ({}), rms={:.4}px",
            report.evaluations,
            report.termination,
            rms
        );

        Ok(CameraCalibration {
            camera,
            poses,
            rms,
            report,
        })
    }
}

/// Flat parameter vector layout:
/// `[fx, fy, cx, cy, k1, k2, (p1, p2), (k3), rvec_0, tvec_0, rvec_1, ...]`.
#[derive(Clone, Copy, Debug)]
struct ParamLayout {
    fix_k3: bool,
    fix_tangential: bool,
    views: usize,
}

impl ParamLayout {
    fn new(options: &CalibrationOptions, views: usize) -> Self {
        Self {
            fix_k3: options.fix_k3,
            fix_tangential: options.fix_tangential,
            views,
        }
    }

    fn camera_len(&self) -> usize {
        4 + 2 + if self.fix_tangential { 0 } else { 2 } + if self.fix_k3 { 0 } else { 1 }
    }

    fn len(&self) -> usize {
        self.camera_len() + 6 * self.views
    }

    fn pack(&self, camera: &CameraParams, poses: &[Pose]) -> DVector<f64> {
        let i = &camera.intrinsics;
        let d = &camera.distortion;
        let mut x = vec![i.fx, i.fy, i.cx, i.cy, d.k1, d.k2];
        if !self.fix_tangential {
            x.extend([d.p1, d.p2]);
        }
        if !self.fix_k3 {
            x.push(d.k3);
        }
        for pose in poses {
            x.extend(pose.rvec.iter().chain(pose.tvec.iter()));
        }
        debug_assert_eq!(x.len(), self.len());
        DVector::from_vec(x)
    }

    fn camera(&self, x: &DVector<f64>) -> CameraParams {
        let intrinsics = Intrinsics {
            fx: x[0],
            fy: x[1],
            cx: x[2],
            cy: x[3],
        };
        let mut distortion = Distortion {
            k1: x[4],
            k2: x[5],
            ..Distortion::default()
        };
        let mut next = 6;
        if !self.fix_tangential {
            distortion.p1 = x[next];
            distortion.p2 = x[next + 1];
            next += 2;
        }
        if !self.fix_k3 {
            distortion.k3 = x[next];
        }
        CameraParams::new(intrinsics, distortion)
    }

    fn pose(&self, x: &DVector<f64>, view: usize) -> Pose {
        let o = self.camera_len() + 6 * view;
        Pose::new(
            Vector3::new(x[o], x[o + 1], x[o + 2]),
            Vector3::new(x[o + 3], x[o + 4], x[o + 5]),
        )
    }
}

struct CalibrationProblem<'v, 'a> {
    views: &'v [ViewObservations<'a>],
    layout: ParamLayout,
}

impl CalibrationProblem<'_, '_> {
    fn residual_len(&self) -> usize {
        2 * self.views.iter().map(|v| v.object.len()).sum::<usize>()
    }

    fn view_residuals(&self, camera: &CameraParams, pose: &Pose, view: usize, out: &mut [f64]) {
        let obs = &self.views[view];
        let rot = pose.rotation();
        for (k, (pw, px)) in obs.object.iter().zip(obs.image).enumerate() {
            let pc = rot * pw + pose.tvec;
            match camera.project(&pc) {
                Some(uv) => {
                    out[2 * k] = uv.x - px.x;
                    out[2 * k + 1] = uv.y - px.y;
                }
                None => {
                    out[2 * k] = BEHIND_CAMERA_RESIDUAL;
                    out[2 * k + 1] = BEHIND_CAMERA_RESIDUAL;
                }
            }
        }
    }

    fn rms(&self, x: &DVector<f64>) -> f64 {
        let r = self.residuals(x);
        let points = r.len() / 2;
        if points == 0 {
            return 0.0;
        }
        (r.norm_squared() / points as f64).sqrt()
    }
}

impl NllsProblem for CalibrationProblem<'_, '_> {
    fn residuals(&self, x: &DVector<f64>) -> DVector<f64> {
        let camera = self.layout.camera(x);
        let mut r = DVector::zeros(self.residual_len());
        let mut offset = 0;
        for v in 0..self.views.len() {
            let rows = 2 * self.views[v].object.len();
            let pose = self.layout.pose(x, v);
            self.view_residuals(&camera, &pose, v, &mut r.as_mut_slice()[offset..offset + rows]);
            offset += rows;
        }
        r
    }

    /// Central differences. Pose columns only touch their own view's rows.
    fn jacobian(&self, x: &DVector<f64>) -> DMatrix<f64> {
        let m = self.residual_len();
        let n = self.layout.len();
        let mut j = DMatrix::zeros(m, n);
        let mut xp = x.clone();

        for p in 0..self.layout.camera_len() {
            let h = diff_step(x[p]);
            xp[p] = x[p] + h;
            let rp = self.residuals(&xp);
            xp[p] = x[p] - h;
            let rm = self.residuals(&xp);
            xp[p] = x[p];
            j.column_mut(p).copy_from(&((rp - rm) / (2.0 * h)));
        }

        let camera = self.layout.camera(x);
        let mut offset = 0;
        for v in 0..self.views.len() {
            let rows = 2 * self.views[v].object.len();
            let mut rp = vec![0.0; rows];
            let mut rm = vec![0.0; rows];
            for k in 0..6 {
                let p = self.layout.camera_len() + 6 * v + k;
                let h = diff_step(x[p]);
                xp[p] = x[p] + h;
                self.view_residuals(&camera, &self.layout.pose(&xp, v), v, &mut rp);
                xp[p] = x[p] - h;
                self.view_residuals(&camera, &self.layout.pose(&xp, v), v, &mut rm);
                xp[p] = x[p];
                for row in 0..rows {
                    j[(offset + row, p)] = (rp[row] - rm[row]) / (2.0 * h);
                }
            }
            offset += rows;
        }
        j
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{Isometry3, Translation3, UnitQuaternion};
    use rig_calib_core::project_points;

    fn grid() -> Vec<Point3<f64>> {
        (0..6)
            .flat_map(|j| (0..9).map(move |i| Point3::new(i as f64 * 12.0, j as f64 * 12.0, 0.0)))
            .collect()
    }

    fn true_camera() -> CameraParams {
        CameraParams::new(
            Intrinsics {
                fx: 1000.0,
                fy: 1010.0,
                cx: 480.0,
                cy: 640.0,
            },
            Distortion {
                k1: -0.08,
                k2: 0.02,
                ..Distortion::default()
            },
        )
    }

    fn pose(roll: f64, pitch: f64, yaw: f64, t: [f64; 3]) -> Pose {
        Pose::from_isometry(&Isometry3::from_parts(
            Translation3::new(t[0], t[1], t[2]),
            UnitQuaternion::from_euler_angles(roll, pitch, yaw),
        ))
    }

    #[test]
    fn recovers_camera_with_distortion_from_synthetic_views() {
        let object = grid();
        let camera = true_camera();
        let poses = [
            pose(0.3, 0.1, 0.05, [-40.0, -30.0, 300.0]),
            pose(-0.25, 0.3, -0.1, [-50.0, -20.0, 320.0]),
            pose(0.1, -0.35, 0.2, [-45.0, -35.0, 280.0]),
            pose(-0.2, -0.2, -0.3, [-30.0, -25.0, 310.0]),
        ];
        let images: Vec<Vec<Point2<f64>>> = poses
            .iter()
            .map(|p| project_points(&object, p, &camera))
            .collect();
        let views: Vec<ViewObservations<'_>> = images
            .iter()
            .map(|img| ViewObservations::new(&object, img))
            .collect();

        let calib = PlanarCalibrator::new(CalibrationOptions {
            fix_tangential: true,
            ..CalibrationOptions::default()
        })
        .calibrate(&views, ImageSize::new(960, 1280))
        .expect("calibrate");

        let i = calib.camera.intrinsics;
        assert!((i.fx - 1000.0).abs() < 0.5, "fx {}", i.fx);
        assert!((i.fy - 1010.0).abs() < 0.5, "fy {}", i.fy);
        assert!((i.cx - 480.0).abs() < 0.5, "cx {}", i.cx);
        assert!((i.cy - 640.0).abs() < 0.5, "cy {}", i.cy);
        assert!((calib.camera.distortion.k1 + 0.08).abs() < 1e-3);
        assert!(calib.rms < 1e-3, "rms {}", calib.rms);
        assert_eq!(calib.poses.len(), 4);
    }

    #[test]
    fn rejects_single_view_and_mismatched_lengths() {
        let object = grid();
        let image = vec![Point2::new(0.0, 0.0); object.len()];
        let one = [ViewObservations::new(&object, &image)];
        assert_eq!(
            PlanarCalibrator::default()
                .calibrate(&one, ImageSize::new(640, 480))
                .unwrap_err(),
            SolveError::NotEnoughViews { needed: 2, got: 1 }
        );

        let short = [
            ViewObservations::new(&object, &image),
            ViewObservations::new(&object, &image[..10]),
        ];
        assert!(matches!(
            PlanarCalibrator::default().calibrate(&short, ImageSize::new(640, 480)),
            Err(SolveError::MismatchedLengths { .. })
        ));
    }

    #[test]
    fn layout_round_trips_camera_and_poses() {
        let opts = CalibrationOptions {
            fix_k3: false,
            ..CalibrationOptions::default()
        };
        let layout = ParamLayout::new(&opts, 2);
        let mut camera = true_camera();
        camera.distortion.p1 = 0.001;
        camera.distortion.k3 = 0.004;
        let poses = [
            pose(0.1, 0.2, 0.3, [1.0, 2.0, 3.0]),
            pose(-0.1, 0.0, 0.1, [4.0, 5.0, 6.0]),
        ];
        let x = layout.pack(&camera, &poses);
        assert_eq!(x.len(), 9 + 12);
        assert_eq!(layout.camera(&x), camera);
        assert_eq!(layout.pose(&x, 1), poses[1]);
    }
}
