//! Operator guide quadrilaterals for placing the pattern during capture.
//!
//! One quadrilateral per supported capture configuration, authored for a
//! portrait 960x1280 frame and scaled to the live resolution.

use serde::Serialize;

/// Resolution the guide tables were authored for, `(width, height)`.
pub const REFERENCE_SIZE: (u32, u32) = (960, 1280);

/// Number of guide configurations in every table.
pub const GUIDE_COUNT: usize = 18;

type Table = [(i32, i32); GUIDE_COUNT];

const FIRST: Table = [
    (288, 326),
    (4, 48),
    (20, 20),
    (412, 198),
    (550, 148),
    (20, 20),
    (20, 20),
    (210, 350),
    (260, 680),
    (140, 20),
    (20, 20),
    (20, 340),
    (288, 326),
    (288, 326),
    (288, 326),
    (288, 326),
    (288, 326),
    (288, 326),
];

const SECOND: Table = [
    (716, 326),
    (596, 168),
    (460, 180),
    (940, 46),
    (940, 20),
    (940, 20),
    (940, 20),
    (750, 350),
    (700, 680),
    (940, 20),
    (740, 20),
    (500, 500),
    (716, 326),
    (716, 326),
    (716, 326),
    (716, 326),
    (716, 326),
    (716, 326),
];

const THIRD: Table = [
    (718, 1026),
    (596, 1140),
    (460, 1000),
    (940, 1254),
    (940, 1260),
    (730, 870),
    (720, 550),
    (940, 1260),
    (940, 1260),
    (940, 880),
    (450, 600),
    (780, 1260),
    (718, 1026),
    (718, 1026),
    (718, 1026),
    (718, 1026),
    (718, 1026),
    (718, 1026),
];

const FOURTH: Table = [
    (286, 1024),
    (4, 1268),
    (20, 1260),
    (412, 1140),
    (550, 1076),
    (192, 870),
    (240, 550),
    (20, 1260),
    (20, 1260),
    (480, 740),
    (20, 720),
    (20, 1260),
    (286, 1024),
    (286, 1024),
    (286, 1024),
    (286, 1024),
    (286, 1024),
    (286, 1024),
];

/// The four guide corners of every configuration, in frame pixels.
///
/// `first[k]`, `second[k]`, `third[k]`, `fourth[k]` walk the k-th
/// quadrilateral in drawing order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct GuideSet {
    pub first: Vec<(i32, i32)>,
    pub second: Vec<(i32, i32)>,
    pub third: Vec<(i32, i32)>,
    pub fourth: Vec<(i32, i32)>,
}

impl GuideSet {
    /// Corners of configuration `index`, or `None` past the last one.
    pub fn quad(&self, index: usize) -> Option<[(i32, i32); 4]> {
        Some([
            *self.first.get(index)?,
            *self.second.get(index)?,
            *self.third.get(index)?,
            *self.fourth.get(index)?,
        ])
    }

    pub fn len(&self) -> usize {
        self.first.len()
    }

    pub fn is_empty(&self) -> bool {
        self.first.is_empty()
    }
}

/// Scale the reference tables to a `width x height` frame.
///
/// Each axis is scaled independently and truncated toward zero.
pub fn scale_guides(width: u32, height: u32) -> GuideSet {
    let sx = width as f64 / REFERENCE_SIZE.0 as f64;
    let sy = height as f64 / REFERENCE_SIZE.1 as f64;
    let scale = |table: &Table| -> Vec<(i32, i32)> {
        table
            .iter()
            .map(|&(x, y)| ((x as f64 * sx) as i32, (y as f64 * sy) as i32))
            .collect()
    };
    GuideSet {
        first: scale(&FIRST),
        second: scale(&SECOND),
        third: scale(&THIRD),
        fourth: scale(&FOURTH),
    }
}
