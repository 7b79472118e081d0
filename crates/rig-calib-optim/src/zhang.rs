//! Closed-form intrinsics from plane homographies (Zhang's method).
//!
//! Skew is constrained to zero, which adds one equation to the two each
//! view contributes and makes two views sufficient.

use nalgebra::{DMatrix, Matrix3, SVector};
use rig_calib_core::{ImageSize, Intrinsics};

use crate::SolveError;

/// Build the 6-vector `v_ij(H)` for columns `i`, `j` of `H`.
fn v_ij(h: &Matrix3<f64>, i: usize, j: usize) -> SVector<f64, 6> {
    let hi = h.column(i);
    let hj = h.column(j);

    SVector::<f64, 6>::from_row_slice(&[
        hi[0] * hj[0],
        hi[0] * hj[1] + hi[1] * hj[0],
        hi[1] * hj[1],
        hi[2] * hj[0] + hi[0] * hj[2],
        hi[2] * hj[1] + hi[1] * hj[2],
        hi[2] * hj[2],
    ])
}

/// Pixel -> roughly unit-scale coordinates, centred on the frame.
fn conditioning(size: ImageSize) -> Matrix3<f64> {
    let s = 0.5 * (size.width as f64 + size.height as f64).max(1.0);
    let cx = 0.5 * size.width as f64;
    let cy = 0.5 * size.height as f64;
    Matrix3::new(1.0 / s, 0.0, -cx / s, 0.0, 1.0 / s, -cy / s, 0.0, 0.0, 1.0)
}

/// Estimate zero-skew intrinsics from pattern-to-image homographies.
///
/// `image_size` only conditions the linear system; it does not bias the
/// principal point.
pub fn intrinsics_from_homographies(
    homographies: &[Matrix3<f64>],
    image_size: ImageSize,
) -> Result<Intrinsics, SolveError> {
    if homographies.len() < 2 {
        return Err(SolveError::NotEnoughViews {
            needed: 2,
            got: homographies.len(),
        });
    }

    let n = conditioning(image_size);
    let n_inv = n.try_inverse().ok_or(SolveError::Degenerate("image size"))?;

    // two rows per view plus the zero-skew row; padded so the SVD keeps the
    // full right-singular basis
    let rows = (2 * homographies.len() + 1).max(6);
    let mut vmtx = DMatrix::<f64>::zeros(rows, 6);

    for (k, h) in homographies.iter().enumerate() {
        let h = n * h;
        let v12 = v_ij(&h, 0, 1);
        let vd = v_ij(&h, 0, 0) - v_ij(&h, 1, 1);
        let (n12, nd) = (v12.norm(), vd.norm());
        if n12 < 1e-15 || nd < 1e-15 {
            return Err(SolveError::Degenerate("homography has vanishing columns"));
        }
        vmtx.row_mut(2 * k).copy_from(&(v12 / n12).transpose());
        vmtx.row_mut(2 * k + 1).copy_from(&(vd / nd).transpose());
    }
    vmtx[(2 * homographies.len(), 1)] = 1.0;

    let svd = vmtx.svd(false, true);
    let v_t = svd
        .v_t
        .ok_or(SolveError::Degenerate("svd of the intrinsics system"))?;
    let mut order: Vec<usize> = (0..svd.singular_values.len()).collect();
    order.sort_by(|&a, &b| svd.singular_values[a].total_cmp(&svd.singular_values[b]));
    let sv_max = svd.singular_values.max();
    // a second (near-)null direction means the views leave B underdetermined
    if order.len() < 2 || svd.singular_values[order[1]] <= 1e-9 * sv_max {
        return Err(SolveError::Degenerate("views do not constrain the intrinsics"));
    }
    let b = v_t.row(order[0]);
    let (b11, b12, b22, b13, b23, b33) = (b[0], b[1], b[2], b[3], b[4], b[5]);

    let denom = b11 * b22 - b12 * b12;
    let denom_norm = b11 * b11 + b22 * b22;
    if denom_norm <= 0.0 || denom.abs() / denom_norm < 1e-9 {
        return Err(SolveError::Degenerate("views do not constrain the focal lengths"));
    }

    let v0 = (b12 * b13 - b11 * b23) / denom;
    let lambda = b33 - (b13 * b13 + v0 * (b12 * b13 - b11 * b23)) / b11;
    let alpha2 = lambda / b11;
    let beta2 = lambda * b11 / denom;
    if !(alpha2 > 0.0 && beta2 > 0.0) {
        return Err(SolveError::Degenerate("inconsistent homographies"));
    }
    let alpha = alpha2.sqrt();
    let beta = beta2.sqrt();
    let u0 = -b13 * alpha2 / lambda;

    // undo the conditioning: K = N^-1 * K'
    let k_cond = Matrix3::new(alpha, 0.0, u0, 0.0, beta, v0, 0.0, 0.0, 1.0);
    let intrinsics = Intrinsics::from_matrix(&(n_inv * k_cond));
    if !intrinsics.is_finite() {
        return Err(SolveError::NonFinite);
    }
    Ok(intrinsics)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{Rotation3, Vector3};

    fn kmtx() -> Matrix3<f64> {
        Matrix3::new(900.0, 0.0, 640.0, 0.0, 880.0, 360.0, 0.0, 0.0, 1.0)
    }

    fn synthetic_homography(k: &Matrix3<f64>, rot: Rotation3<f64>, t: Vector3<f64>) -> Matrix3<f64> {
        // For the Z=0 plane, H = K [r1 r2 t]
        let r = rot.matrix();
        let mut h = Matrix3::zeros();
        h.set_column(0, &(k * r.column(0)));
        h.set_column(1, &(k * r.column(1)));
        h.set_column(2, &(k * t));
        h
    }

    #[test]
    fn recovers_intrinsics_from_two_views() {
        let k = kmtx();
        let hs = vec![
            synthetic_homography(
                &k,
                Rotation3::from_euler_angles(0.3, 0.1, 0.05),
                Vector3::new(-0.1, -0.05, 1.0),
            ),
            synthetic_homography(
                &k,
                Rotation3::from_euler_angles(-0.1, 0.35, -0.1),
                Vector3::new(-0.05, 0.1, 1.2),
            ),
        ];

        let est = intrinsics_from_homographies(&hs, ImageSize::new(1280, 720)).expect("solve");
        assert!((est.fx - 900.0).abs() < 1e-3, "fx {}", est.fx);
        assert!((est.fy - 880.0).abs() < 1e-3, "fy {}", est.fy);
        assert!((est.cx - 640.0).abs() < 1e-3, "cx {}", est.cx);
        assert!((est.cy - 360.0).abs() < 1e-3, "cy {}", est.cy);
    }

    #[test]
    fn single_view_is_rejected() {
        let err = intrinsics_from_homographies(&[kmtx()], ImageSize::new(640, 480)).unwrap_err();
        assert_eq!(err, SolveError::NotEnoughViews { needed: 2, got: 1 });
    }

    #[test]
    fn fronto_parallel_views_are_degenerate() {
        let k = kmtx();
        let hs = vec![
            synthetic_homography(&k, Rotation3::identity(), Vector3::new(0.0, 0.0, 1.0)),
            synthetic_homography(&k, Rotation3::identity(), Vector3::new(0.1, 0.0, 2.0)),
        ];
        assert!(intrinsics_from_homographies(&hs, ImageSize::new(1280, 720)).is_err());
    }
}
