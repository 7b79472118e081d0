//! Operator feedback drawn straight into grayscale frames.

use nalgebra::Point2;
use rig_calib_core::GrayImage;

use crate::guides::GuideSet;

/// Intensity used for every overlay stroke.
pub const OVERLAY_VALUE: u8 = 255;

const MARKER_RADIUS: i32 = 3;

/// Bresenham line; pixels outside the frame are skipped.
pub fn draw_line(img: &mut GrayImage, p1: (i32, i32), p2: (i32, i32), value: u8) {
    let (mut x0, mut y0) = p1;
    let (x1, y1) = p2;

    let dx = (x1 - x0).abs();
    let dy = -(y1 - y0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;

    loop {
        img.put(x0 as i64, y0 as i64, value);
        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
    }
}

fn to_pixel(p: &Point2<f64>) -> Option<(i32, i32)> {
    (p.x.is_finite() && p.y.is_finite()).then(|| (p.x.round() as i32, p.y.round() as i32))
}

/// Mark accepted corners with crosses, joined in detection order so the
/// row-major walk is visible.
pub fn draw_corners(img: &mut GrayImage, corners: &[Point2<f64>]) {
    for pair in corners.windows(2) {
        if let (Some(a), Some(b)) = (to_pixel(&pair[0]), to_pixel(&pair[1])) {
            draw_line(img, a, b, OVERLAY_VALUE / 2);
        }
    }
    for (x, y) in corners.iter().filter_map(to_pixel) {
        draw_line(img, (x - MARKER_RADIUS, y), (x + MARKER_RADIUS, y), OVERLAY_VALUE);
        draw_line(img, (x, y - MARKER_RADIUS), (x, y + MARKER_RADIUS), OVERLAY_VALUE);
    }
}

/// Draw the closed guide quadrilateral for configuration `index`.
///
/// Returns `false` and leaves the frame untouched for an unknown index.
pub fn draw_guide(img: &mut GrayImage, guides: &GuideSet, index: usize) -> bool {
    let Some(quad) = guides.quad(index) else {
        return false;
    };
    for k in 0..4 {
        draw_line(img, quad[k], quad[(k + 1) % 4], OVERLAY_VALUE);
    }
    true
}
