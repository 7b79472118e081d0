use nalgebra::{Matrix3, Rotation3, Vector3};
use rig_calib_core::Pose;

use crate::SolveError;

/// Decompose a plane-induced homography into the pose of the `Z = 0` plane.
///
/// `h` maps pattern `(x, y)` to pixels and `k` is the intrinsic matrix; pass
/// the identity for homographies into normalised image coordinates. The
/// returned pose always places the plane in front of the camera.
pub fn pose_from_homography(k: &Matrix3<f64>, h: &Matrix3<f64>) -> Result<Pose, SolveError> {
    let k_inv = k
        .try_inverse()
        .ok_or(SolveError::Degenerate("intrinsic matrix is singular"))?;

    let m1 = k_inv * h.column(0);
    let m2 = k_inv * h.column(1);
    let m3 = k_inv * h.column(2);

    let norm = 0.5 * (m1.norm() + m2.norm());
    if norm < 1e-15 {
        return Err(SolveError::Degenerate("homography has vanishing columns"));
    }
    let mut lambda = 1.0 / norm;
    if (lambda * m3).z < 0.0 {
        lambda = -lambda;
    }

    let r1: Vector3<f64> = lambda * m1;
    let r2: Vector3<f64> = lambda * m2;
    let r3 = r1.cross(&r2);
    let t: Vector3<f64> = lambda * m3;

    let mut r = Matrix3::<f64>::zeros();
    r.set_column(0, &r1);
    r.set_column(1, &r2);
    r.set_column(2, &r3);

    // nearest rotation (polar decomposition)
    let svd = r.svd(true, true);
    let (Some(u), Some(v_t)) = (svd.u, svd.v_t) else {
        return Err(SolveError::Degenerate("svd of the rotation estimate"));
    };
    let mut r_orth = u * v_t;
    if r_orth.determinant() < 0.0 {
        let mut u_flipped = u;
        u_flipped.column_mut(2).neg_mut();
        r_orth = u_flipped * v_t;
    }

    let rot = Rotation3::from_matrix_unchecked(r_orth);
    let pose = Pose::new(rot.scaled_axis(), t);
    if pose.rvec.iter().chain(pose.tvec.iter()).any(|v| !v.is_finite()) {
        return Err(SolveError::NonFinite);
    }
    Ok(pose)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recovers_pose_of_plane() {
        let k = Matrix3::new(800.0, 0.0, 640.0, 0.0, 780.0, 360.0, 0.0, 0.0, 1.0);
        let rot = Rotation3::from_euler_angles(0.1, -0.05, 0.2);
        let t = Vector3::new(0.1, -0.05, 1.0);

        let r = rot.matrix();
        let mut h = Matrix3::zeros();
        h.set_column(0, &(k * r.column(0)));
        h.set_column(1, &(k * r.column(1)));
        h.set_column(2, &(k * t));

        // homographies are only defined up to scale, including sign
        let pose = pose_from_homography(&k, &(-3.0 * h)).expect("pose");

        assert!((pose.tvec - t).norm() < 1e-9);
        let r_diff = pose.rotation().matrix().transpose() * r;
        let angle = ((r_diff.trace() - 1.0) * 0.5).clamp(-1.0, 1.0).acos();
        assert!(angle < 1e-6, "rotation error too large: {angle}");
    }
}
