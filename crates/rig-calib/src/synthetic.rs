//! Synthetic rigs: known camera, known board poses, exact projections.
//!
//! Used by the integration tests and the `synthetic_calibration` example.

use std::f64::consts::PI;

use nalgebra::{Point2, Point3, Rotation3, Vector3};
use rig_calib_core::{
    project_points, CameraParams, GrayImage, GrayImageView, ImageSize, ObjectPointSet,
    PatternSize, Pose,
};

use crate::detect::PatternDetector;

/// First-pixel value of frames that contain no pattern.
pub const MISS_TAG: u8 = u8::MAX;

/// `count` board poses looking at the pattern center from `distance`,
/// tilted by `tilt` radians about axes spread over half a turn.
///
/// Consecutive tilt axes differ, so any two poses constrain the intrinsics.
pub fn board_poses(object: &ObjectPointSet, count: usize, distance: f64, tilt: f64) -> Vec<Pose> {
    let (cx, cy) = object
        .points()
        .iter()
        .fold((0.0, 0.0), |(sx, sy), p| (sx + p.x, sy + p.y));
    let n = object.len().max(1) as f64;
    let center = Point3::new(cx / n, cy / n, 0.0);

    (0..count)
        .map(|k| {
            let phase = PI * k as f64 / count as f64 + PI / 8.0;
            let axis = Vector3::new(phase.cos(), phase.sin(), 0.0);
            let rot = Rotation3::from_scaled_axis(axis * tilt)
                * Rotation3::from_euler_angles(0.0, 0.0, 0.05 * k as f64);
            let t = Vector3::new(0.0, 0.0, distance) - rot * center.coords;
            Pose::new(rot.scaled_axis(), t)
        })
        .collect()
}

/// Exact pixel positions of the pattern corners for every pose.
pub fn project_views(
    object: &ObjectPointSet,
    poses: &[Pose],
    camera: &CameraParams,
) -> Vec<Vec<Point2<f64>>> {
    poses
        .iter()
        .map(|pose| project_points(object.points(), pose, camera))
        .collect()
}

/// Blank frame whose first pixel tags which view it shows.
pub fn tagged_frame(size: ImageSize, tag: u8) -> GrayImage {
    let mut img = GrayImage::new(size.width as usize, size.height as usize);
    if let Some(first) = img.data.first_mut() {
        *first = tag;
    }
    img
}

/// Detector that looks corners up by the frame's first-pixel tag.
///
/// Tag `k` returns `views[k]`; [`MISS_TAG`] and unknown tags report no
/// pattern.
#[derive(Clone, Debug, Default)]
pub struct TableDetector {
    pub views: Vec<Vec<Point2<f64>>>,
}

impl TableDetector {
    pub fn new(views: Vec<Vec<Point2<f64>>>) -> Self {
        Self { views }
    }
}

impl PatternDetector for TableDetector {
    fn detect(&self, image: &GrayImageView<'_>, size: PatternSize) -> Option<Vec<Point2<f64>>> {
        let tag = *image.data.first()?;
        if tag == MISS_TAG {
            return None;
        }
        let corners = self.views.get(tag as usize)?;
        (corners.len() == size.corner_count()).then(|| corners.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rig_calib_core::{Distortion, Intrinsics, PatternConfig};

    #[test]
    fn poses_face_the_camera() {
        let object = ObjectPointSet::generate(&PatternConfig::default()).expect("pattern");
        let camera = CameraParams::new(
            Intrinsics {
                fx: 1000.0,
                fy: 1000.0,
                cx: 480.0,
                cy: 640.0,
            },
            Distortion::default(),
        );
        let poses = board_poses(&object, 4, 300.0, 0.4);
        let views = project_views(&object, &poses, &camera);
        for view in &views {
            assert!(view
                .iter()
                .all(|p| p.x > 0.0 && p.x < 960.0 && p.y > 0.0 && p.y < 1280.0));
        }
    }

    #[test]
    fn table_detector_follows_tags() {
        let det = TableDetector::new(vec![vec![Point2::new(1.0, 2.0); 4]]);
        let size = PatternSize { columns: 2, rows: 2 };
        let img_size = ImageSize::new(4, 4);
        assert!(det.detect(&tagged_frame(img_size, 0).view(), size).is_some());
        assert!(det.detect(&tagged_frame(img_size, 1).view(), size).is_none());
        assert!(det.detect(&tagged_frame(img_size, MISS_TAG).view(), size).is_none());
    }
}
