//! Rotation-center estimate from marker positions sampled around a turntable.
//!
//! The center minimises the spread of the per-point radii,
//! `sum_i (R_i - mean(R))^2`, which needs no radius parameter.

use nalgebra::{DMatrix, DVector, Point2};
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::lm::{minimize, LmOptions, NllsProblem};
use crate::{SolveError, SolveReport};

/// Radius below which a point is treated as sitting on the center.
const MIN_RADIUS: f64 = 1e-12;
/// Scatter eigenvalue ratio (minor / major) below which points are collinear.
const MIN_SPREAD_RATIO: f64 = 1e-9;
/// Largest plausible radius, in bounding-box diagonals of the input.
const MAX_RADIUS_FACTOR: f64 = 1e3;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircleFitOptions {
    /// Starting guess `(x, z)` for the center.
    pub initial_center: [f64; 2],
    pub max_iters: usize,
    pub ftol: f64,
    pub xtol: f64,
    pub gtol: f64,
}

impl Default for CircleFitOptions {
    fn default() -> Self {
        Self {
            initial_center: [0.0, 310.0],
            max_iters: 200,
            ftol: 1e-12,
            xtol: 1e-12,
            gtol: 1e-12,
        }
    }
}

/// Fitted center together with the radius of every input point.
#[derive(Clone, Debug, PartialEq)]
pub struct CircleFit {
    pub center: Point2<f64>,
    /// Distance from `center` to each input point, index-aligned.
    pub radii: Vec<f64>,
    pub mean_radius: f64,
    pub report: SolveReport,
}

struct RadiusSpread<'a> {
    points: &'a [Point2<f64>],
}

impl RadiusSpread<'_> {
    fn radii(&self, c: &DVector<f64>) -> Vec<f64> {
        self.points
            .iter()
            .map(|p| (p.x - c[0]).hypot(p.y - c[1]))
            .collect()
    }
}

impl NllsProblem for RadiusSpread<'_> {
    fn residuals(&self, c: &DVector<f64>) -> DVector<f64> {
        let r = self.radii(c);
        let mean = r.iter().sum::<f64>() / r.len() as f64;
        DVector::from_iterator(r.len(), r.into_iter().map(|ri| ri - mean))
    }

    fn jacobian(&self, c: &DVector<f64>) -> DMatrix<f64> {
        let n = self.points.len();
        let mut j = DMatrix::zeros(n, 2);
        for (i, p) in self.points.iter().enumerate() {
            let ri = (p.x - c[0]).hypot(p.y - c[1]).max(MIN_RADIUS);
            j[(i, 0)] = -(p.x - c[0]) / ri;
            j[(i, 1)] = -(p.y - c[1]) / ri;
        }
        // d(mean)/dc is the column mean of dR/dc
        for col in 0..2 {
            let mean = j.column(col).sum() / n as f64;
            j.column_mut(col).add_scalar_mut(-mean);
        }
        j
    }
}

/// Bounding-box diagonal of `points`, after rejecting sets that cannot pin
/// down a center: coincident points and points on one line.
fn check_spread(points: &[Point2<f64>]) -> Result<f64, SolveError> {
    let (mut x0, mut y0, mut x1, mut y1) = (f64::MAX, f64::MAX, f64::MIN, f64::MIN);
    for p in points {
        x0 = x0.min(p.x);
        x1 = x1.max(p.x);
        y0 = y0.min(p.y);
        y1 = y1.max(p.y);
    }
    let diagonal = (x1 - x0).hypot(y1 - y0);
    let magnitude = x0.abs().max(x1.abs()).max(y0.abs()).max(y1.abs());
    if diagonal <= MIN_RADIUS * (1.0 + magnitude) {
        return Err(SolveError::Degenerate("points coincide"));
    }

    let n = points.len() as f64;
    let mx = points.iter().map(|p| p.x).sum::<f64>() / n;
    let my = points.iter().map(|p| p.y).sum::<f64>() / n;
    let (mut sxx, mut syy, mut sxy) = (0.0, 0.0, 0.0);
    for p in points {
        let (dx, dy) = (p.x - mx, p.y - my);
        sxx += dx * dx;
        syy += dy * dy;
        sxy += dx * dy;
    }
    // eigenvalues of the 2x2 scatter matrix
    let half_trace = 0.5 * (sxx + syy);
    let root = (0.5 * (sxx - syy)).hypot(sxy);
    let (major, minor) = (half_trace + root, half_trace - root);
    if minor <= MIN_SPREAD_RATIO * major {
        return Err(SolveError::Degenerate("points are collinear"));
    }
    Ok(diagonal)
}

/// Fit a circle center to 2D points in the `(x, z)` plane.
///
/// Needs at least three points that are neither coincident nor collinear.
/// Convergence failure, non-finite results and a fitted radius far outside
/// the extent of the points are reported as errors instead of a center.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "info", skip_all, fields(points = points.len()))
)]
pub fn fit_circle(points: &[Point2<f64>], opts: &CircleFitOptions) -> Result<CircleFit, SolveError> {
    if points.len() < 3 {
        return Err(SolveError::NotEnoughPoints {
            needed: 3,
            got: points.len(),
        });
    }
    if points.iter().any(|p| !p.x.is_finite() || !p.y.is_finite()) {
        return Err(SolveError::NonFinite);
    }
    let diagonal = check_spread(points)?;

    let problem = RadiusSpread { points };
    let x0 = DVector::from_column_slice(&opts.initial_center);
    let lm_opts = LmOptions {
        max_iters: opts.max_iters,
        ftol: opts.ftol,
        xtol: opts.xtol,
        gtol: opts.gtol,
    };
    let (c, report) = minimize(&problem, x0, &lm_opts);
    report.ensure_converged()?;

    let radii = problem.radii(&c);
    let mean_radius = radii.iter().sum::<f64>() / radii.len() as f64;
    if !mean_radius.is_finite() {
        return Err(SolveError::NonFinite);
    }
    if mean_radius <= MIN_RADIUS * diagonal || mean_radius > MAX_RADIUS_FACTOR * diagonal {
        log::debug!("circle fit: radius {mean_radius} against extent {diagonal}");
        return Err(SolveError::Degenerate("fitted radius out of range"));
    }
    let center = Point2::new(c[0], c[1]);
    log::debug!(
        "circle fit: center=({:.3}, {:.3}) radius={:.3} after {} evaluations",
        center.x,
        center.y,
        mean_radius,
        report.evaluations
    );

    Ok(CircleFit {
        center,
        radii,
        mean_radius,
        report,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn circle(center: (f64, f64), radius: f64, n: usize, start: f64, sweep: f64) -> Vec<Point2<f64>> {
        (0..n)
            .map(|i| {
                let a = start + sweep * i as f64 / n as f64;
                Point2::new(center.0 + radius * a.cos(), center.1 + radius * a.sin())
            })
            .collect()
    }

    #[test]
    fn recovers_center_of_exact_circle() {
        let pts = circle((5.0, 300.0), 80.0, 24, 0.0, std::f64::consts::TAU);
        let fit = fit_circle(&pts, &CircleFitOptions::default()).expect("fit");
        assert_relative_eq!(fit.center, Point2::new(5.0, 300.0), epsilon = 1e-6);
        assert_relative_eq!(fit.mean_radius, 80.0, epsilon = 1e-6);
        assert_eq!(fit.radii.len(), 24);
        assert!(fit.radii.iter().all(|r| (r - 80.0).abs() < 1e-6));
    }

    #[test]
    fn tolerates_small_noise_on_partial_arc() {
        let mut pts = circle((-12.0, 295.0), 60.0, 40, 0.3, 4.0);
        // deterministic jitter, +/- 0.2
        for (i, p) in pts.iter_mut().enumerate() {
            let e = ((i * 7919) % 41) as f64 / 100.0 - 0.2;
            p.x += e;
            p.y -= 0.5 * e;
        }
        let fit = fit_circle(&pts, &CircleFitOptions::default()).expect("fit");
        assert!((fit.center - Point2::new(-12.0, 295.0)).norm() < 0.5, "{:?}", fit.center);

        let var = fit
            .radii
            .iter()
            .map(|r| (r - fit.mean_radius).powi(2))
            .sum::<f64>()
            / fit.radii.len() as f64;
        assert!(var < 0.05, "radius variance {var}");
    }

    #[test]
    fn custom_initial_guess_is_used() {
        let pts = circle((200.0, -50.0), 30.0, 12, 0.0, std::f64::consts::TAU);
        let opts = CircleFitOptions {
            initial_center: [190.0, -40.0],
            ..CircleFitOptions::default()
        };
        let fit = fit_circle(&pts, &opts).expect("fit");
        assert_relative_eq!(fit.center, Point2::new(200.0, -50.0), epsilon = 1e-6);
    }

    #[test]
    fn needs_three_points() {
        let pts = [Point2::new(0.0, 0.0), Point2::new(1.0, 1.0)];
        assert_eq!(
            fit_circle(&pts, &CircleFitOptions::default()).unwrap_err(),
            SolveError::NotEnoughPoints { needed: 3, got: 2 }
        );
    }

    #[test]
    fn collinear_points_are_rejected() {
        let pts: Vec<Point2<f64>> = (0..10)
            .map(|i| Point2::new(i as f64, 2.0 * i as f64))
            .collect();
        assert_eq!(
            fit_circle(&pts, &CircleFitOptions::default()).unwrap_err(),
            SolveError::Degenerate("points are collinear")
        );
    }

    #[test]
    fn coincident_points_are_rejected() {
        let pts = vec![Point2::new(1.0, 1.0); 5];
        assert_eq!(
            fit_circle(&pts, &CircleFitOptions::default()).unwrap_err(),
            SolveError::Degenerate("points coincide")
        );
    }

    #[test]
    fn iteration_cap_is_reported_as_not_converged() {
        let pts = circle((150.0, -80.0), 40.0, 20, 0.2, 1.5);
        let opts = CircleFitOptions {
            max_iters: 1,
            ..CircleFitOptions::default()
        };
        let err = fit_circle(&pts, &opts).unwrap_err();
        assert!(
            matches!(err, SolveError::NotConverged { evaluations, .. } if evaluations > 0),
            "{err:?}"
        );
    }
}
