//! Planar chessboard geometry.

use std::sync::Arc;

use nalgebra::{Point2, Point3};
use serde::{Deserialize, Serialize};

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq)]
pub enum PatternError {
    #[error("pattern needs at least 2x2 inner corners (rows={rows}, columns={columns})")]
    InvalidSize { rows: u32, columns: u32 },
    #[error("square size must be finite and > 0, got {0}")]
    InvalidSquareSize(f64),
}

/// Inner-corner grid size in the order detectors expect it: columns first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PatternSize {
    pub columns: u32,
    pub rows: u32,
}

impl PatternSize {
    #[inline]
    pub fn corner_count(&self) -> usize {
        self.columns as usize * self.rows as usize
    }
}

/// Chessboard geometry.
///
/// `rows`/`columns` count *inner* corners; `square_size` is the physical
/// side of one square (millimetres on the stock scanner target).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PatternConfig {
    pub rows: u32,
    pub columns: u32,
    pub square_size: f64,
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self {
            rows: 6,
            columns: 9,
            square_size: 12.0,
        }
    }
}

impl PatternConfig {
    pub fn validate(&self) -> Result<(), PatternError> {
        if self.rows < 2 || self.columns < 2 {
            return Err(PatternError::InvalidSize {
                rows: self.rows,
                columns: self.columns,
            });
        }
        if !self.square_size.is_finite() || self.square_size <= 0.0 {
            return Err(PatternError::InvalidSquareSize(self.square_size));
        }
        Ok(())
    }

    #[inline]
    pub fn pattern_size(&self) -> PatternSize {
        PatternSize {
            columns: self.columns,
            rows: self.rows,
        }
    }

    #[inline]
    pub fn corner_count(&self) -> usize {
        self.pattern_size().corner_count()
    }
}

/// In-plane `(x, y)` coordinates of pattern points, for homography-based
/// solvers. The `z` component is dropped, not checked.
pub fn planar_points(points: &[Point3<f64>]) -> Vec<Point2<f64>> {
    points.iter().map(|p| Point2::new(p.x, p.y)).collect()
}

/// Known 3D coordinates of every inner corner, `z = 0`.
///
/// Points are laid out row-major with the column index varying fastest,
/// matching the corner order returned by chessboard detectors. The set is
/// immutable and cheap to clone: every accumulated view shares one buffer.
#[derive(Clone, Debug, PartialEq)]
pub struct ObjectPointSet {
    config: PatternConfig,
    points: Arc<[Point3<f64>]>,
}

impl ObjectPointSet {
    /// Build the grid for `config`, scaled by `square_size`.
    pub fn generate(config: &PatternConfig) -> Result<Self, PatternError> {
        config.validate()?;
        let s = config.square_size;
        let points: Vec<Point3<f64>> = (0..config.rows)
            .flat_map(|j| {
                (0..config.columns).map(move |i| Point3::new(i as f64 * s, j as f64 * s, 0.0))
            })
            .collect();
        Ok(Self {
            config: *config,
            points: points.into(),
        })
    }

    #[inline]
    pub fn config(&self) -> &PatternConfig {
        &self.config
    }

    #[inline]
    pub fn points(&self) -> &[Point3<f64>] {
        &self.points
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// `true` when both sets share the same buffer (no copy was made).
    #[inline]
    pub fn shares_buffer(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.points, &other.points)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_board_has_54_points_with_expected_corners() {
        let set = ObjectPointSet::generate(&PatternConfig::default()).expect("valid config");
        assert_eq!(set.len(), 54);
        assert!(set.points().iter().all(|p| p.z == 0.0));
        assert!(set.points().contains(&Point3::new(0.0, 0.0, 0.0)));
        assert!(set.points().contains(&Point3::new(96.0, 60.0, 0.0)));
        // column index varies fastest
        assert_eq!(set.points()[1], Point3::new(12.0, 0.0, 0.0));
        assert_eq!(set.points()[9], Point3::new(0.0, 12.0, 0.0));

        let plane = planar_points(set.points());
        assert_eq!(plane.len(), 54);
        assert_eq!(plane[10], Point2::new(12.0, 12.0));
    }

    #[test]
    fn spacing_is_uniform_for_any_configuration() {
        for (rows, columns, square) in [(3, 4, 1.0), (7, 11, 25.4), (2, 2, 0.5)] {
            let cfg = PatternConfig {
                rows,
                columns,
                square_size: square,
            };
            let set = ObjectPointSet::generate(&cfg).expect("valid config");
            assert_eq!(set.len(), (rows * columns) as usize);
            for pair in set.points().chunks(columns as usize) {
                for w in pair.windows(2) {
                    assert!((w[1].x - w[0].x - square).abs() < 1e-12);
                    assert_eq!(w[1].y, w[0].y);
                }
            }
        }
    }

    #[test]
    fn rejects_degenerate_configuration() {
        let bad = PatternConfig {
            rows: 1,
            columns: 9,
            square_size: 12.0,
        };
        assert!(matches!(
            ObjectPointSet::generate(&bad),
            Err(PatternError::InvalidSize { .. })
        ));
        let bad = PatternConfig {
            square_size: 0.0,
            ..PatternConfig::default()
        };
        assert_eq!(
            ObjectPointSet::generate(&bad),
            Err(PatternError::InvalidSquareSize(0.0))
        );
    }

    #[test]
    fn clones_share_the_point_buffer() {
        let set = ObjectPointSet::generate(&PatternConfig::default()).expect("valid config");
        let copy = set.clone();
        assert!(copy.shares_buffer(&set));
    }
}
