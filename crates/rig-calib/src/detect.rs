//! Chessboard detector seam.
//!
//! The workflow only needs "found / not found" plus an ordered corner list;
//! any detector that can produce that plugs in through [`PatternDetector`].

use nalgebra::Point2;
use rig_calib_core::{GrayImageView, PatternSize};

/// Finds the inner corners of a chessboard in a grayscale frame.
pub trait PatternDetector {
    /// Ordered corners (row-major, column index fastest) or `None` when the
    /// pattern is not visible in full.
    fn detect(&self, image: &GrayImageView<'_>, size: PatternSize) -> Option<Vec<Point2<f64>>>;

    /// Sub-pixel refinement of detected corners. Detectors that already
    /// return refined positions keep the default.
    fn refine(&self, _image: &GrayImageView<'_>, corners: Vec<Point2<f64>>) -> Vec<Point2<f64>> {
        corners
    }

    /// `detect` followed by `refine`.
    fn find_corners(&self, image: &GrayImageView<'_>, size: PatternSize) -> Option<Vec<Point2<f64>>> {
        self.detect(image, size).map(|c| self.refine(image, c))
    }
}

impl<T: PatternDetector + ?Sized> PatternDetector for &T {
    fn detect(&self, image: &GrayImageView<'_>, size: PatternSize) -> Option<Vec<Point2<f64>>> {
        (**self).detect(image, size)
    }

    fn refine(&self, image: &GrayImageView<'_>, corners: Vec<Point2<f64>>) -> Vec<Point2<f64>> {
        (**self).refine(image, corners)
    }
}

#[cfg(feature = "chess-corners")]
pub use chess::ChessCornersDetector;

#[cfg(feature = "chess-corners")]
mod chess {
    use calib_targets::detect::{default_chess_config, detect_chessboard};
    use calib_targets::ChessboardParams;
    use chess_corners::ChessConfig;
    use nalgebra::Point2;
    use rig_calib_core::{GrayImageView, PatternSize};

    use super::PatternDetector;

    /// ChESS corners + chessboard grid assembly from `calib-targets`.
    ///
    /// Corners come out sub-pixel already, so `refine` is left as identity.
    #[derive(Clone, Debug)]
    pub struct ChessCornersDetector {
        pub chess: ChessConfig,
        pub params: ChessboardParams,
    }

    impl Default for ChessCornersDetector {
        fn default() -> Self {
            Self {
                chess: default_chess_config(),
                params: ChessboardParams::default(),
            }
        }
    }

    impl PatternDetector for ChessCornersDetector {
        fn detect(&self, image: &GrayImageView<'_>, size: PatternSize) -> Option<Vec<Point2<f64>>> {
            let img = ::image::GrayImage::from_raw(
                u32::try_from(image.width).ok()?,
                u32::try_from(image.height).ok()?,
                image.data.to_vec(),
            )?;
            let params = ChessboardParams {
                expected_rows: Some(size.rows),
                expected_cols: Some(size.columns),
                ..self.params.clone()
            };
            let result = detect_chessboard(&img, &self.chess, params)?;

            let mut labeled: Vec<((i32, i32), Point2<f64>)> = result
                .detection
                .corners
                .iter()
                .filter_map(|c| {
                    let g = c.grid.as_ref()?;
                    Some((
                        (g.j, g.i),
                        Point2::new(c.position.x as f64, c.position.y as f64),
                    ))
                })
                .collect();
            if labeled.len() != size.corner_count() {
                log::debug!(
                    "chessboard partially detected: {} of {} corners",
                    labeled.len(),
                    size.corner_count()
                );
                return None;
            }
            let span_i = labeled.iter().map(|((_, i), _)| *i).max()? + 1
                - labeled.iter().map(|((_, i), _)| *i).min()?;
            if span_i != size.columns as i32 {
                log::debug!("chessboard detected transposed ({span_i} columns)");
                return None;
            }
            labeled.sort_by_key(|(key, _)| *key);
            Some(labeled.into_iter().map(|(_, p)| p).collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(Vec<Point2<f64>>);

    impl PatternDetector for Fixed {
        fn detect(&self, _: &GrayImageView<'_>, size: PatternSize) -> Option<Vec<Point2<f64>>> {
            (self.0.len() == size.corner_count()).then(|| self.0.clone())
        }
    }

    struct Shifted;

    impl PatternDetector for Shifted {
        fn detect(&self, _: &GrayImageView<'_>, size: PatternSize) -> Option<Vec<Point2<f64>>> {
            Some(vec![Point2::origin(); size.corner_count()])
        }

        fn refine(&self, _: &GrayImageView<'_>, corners: Vec<Point2<f64>>) -> Vec<Point2<f64>> {
            corners.into_iter().map(|p| p + nalgebra::Vector2::new(0.5, 0.25)).collect()
        }
    }

    #[test]
    fn find_corners_applies_refinement() {
        let data = [0u8; 4];
        let view = GrayImageView {
            width: 2,
            height: 2,
            data: &data,
        };
        let size = PatternSize { columns: 2, rows: 2 };

        let fixed = Fixed(vec![Point2::new(1.0, 1.0); 4]);
        assert_eq!(fixed.find_corners(&view, size), Some(vec![Point2::new(1.0, 1.0); 4]));
        assert!(Fixed(vec![]).find_corners(&view, size).is_none());

        let refined = (&Shifted).find_corners(&view, size).expect("corners");
        assert_eq!(refined[3], Point2::new(0.5, 0.25));
    }
}
