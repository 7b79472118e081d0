//! Multi-view correspondence accumulation.

use nalgebra::Point2;
use rig_calib_core::{GrayImage, GrayImageView, ImageSize, ObjectPointSet};
use rig_calib_optim::ViewObservations;

use crate::detect::PatternDetector;
use crate::overlay::draw_corners;
use crate::CalibError;

/// Result of offering one frame to the accumulator.
#[derive(Clone, Debug)]
pub struct ViewOutcome {
    /// `true` when the pattern was found and the view was appended.
    pub accepted: bool,
    /// The input frame, with accepted corners drawn on it.
    pub annotated: GrayImage,
}

/// Detected image points and their known object points, one entry per
/// accepted view.
///
/// Both sequences always have the same length. Every object entry shares
/// the buffer of the [`ObjectPointSet`] it was appended with.
#[derive(Clone, Debug, Default)]
pub struct CorrespondenceStack {
    image_points: Vec<Vec<Point2<f64>>>,
    object_points: Vec<ObjectPointSet>,
    image_size: Option<ImageSize>,
}

impl CorrespondenceStack {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.image_points.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.image_points.is_empty()
    }

    pub fn image_points(&self) -> &[Vec<Point2<f64>>] {
        &self.image_points
    }

    pub fn object_points(&self) -> &[ObjectPointSet] {
        &self.object_points
    }

    /// Resolution of the accumulated frames; `None` until the first frame.
    pub fn image_size(&self) -> Option<ImageSize> {
        self.image_size
    }

    pub fn total_points(&self) -> usize {
        self.image_points.iter().map(Vec::len).sum()
    }

    /// Borrowed per-view correspondences in the solver's input shape.
    pub fn views(&self) -> Vec<ViewObservations<'_>> {
        self.object_points
            .iter()
            .zip(&self.image_points)
            .map(|(obj, img)| ViewObservations::new(obj.points(), img))
            .collect()
    }

    fn check_size(&self, size: ImageSize) -> Result<(), CalibError> {
        match self.image_size {
            Some(expected) if expected != size => Err(CalibError::ResolutionMismatch {
                expected,
                got: size,
            }),
            _ => Ok(()),
        }
    }

    /// Append an already detected view.
    ///
    /// Fails without touching the stack when the frame size differs from
    /// earlier views, the corner count does not match the pattern, or the
    /// pattern geometry changed since the first view.
    pub fn push_view(
        &mut self,
        size: ImageSize,
        corners: Vec<Point2<f64>>,
        object: &ObjectPointSet,
    ) -> Result<(), CalibError> {
        self.check_size(size)?;
        if corners.len() != object.len() {
            return Err(CalibError::CornerCountMismatch {
                expected: object.len(),
                got: corners.len(),
            });
        }
        if let Some(first) = self.object_points.first() {
            if first.config() != object.config() {
                return Err(CalibError::PatternChanged);
            }
        }

        self.image_points.push(corners);
        self.object_points.push(object.clone());
        self.image_size = Some(size);
        debug_assert_eq!(self.image_points.len(), self.object_points.len());
        Ok(())
    }

    /// Detect the pattern in `image` and, when found, append the view.
    ///
    /// A frame without the pattern leaves the stack unchanged and returns an
    /// unannotated copy with `accepted == false`.
    pub fn try_add_view<D: PatternDetector + ?Sized>(
        &mut self,
        detector: &D,
        image: &GrayImageView<'_>,
        object: &ObjectPointSet,
    ) -> Result<ViewOutcome, CalibError> {
        let size = image.size();
        self.check_size(size)?;

        let mut annotated = image.to_owned_image();
        let Some(corners) = detector.find_corners(image, object.config().pattern_size()) else {
            log::debug!("pattern not found; view {} skipped", self.len());
            return Ok(ViewOutcome {
                accepted: false,
                annotated,
            });
        };

        draw_corners(&mut annotated, &corners);
        self.push_view(size, corners, object)?;
        log::info!("view {} accepted ({} corners)", self.len() - 1, object.len());
        Ok(ViewOutcome {
            accepted: true,
            annotated,
        })
    }

    /// Drop every view and forget the frame size.
    pub fn reset(&mut self) {
        self.image_points.clear();
        self.object_points.clear();
        self.image_size = None;
    }
}
