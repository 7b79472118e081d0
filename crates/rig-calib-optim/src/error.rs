use rig_calib_core::HomographyError;

/// Failures reported by the calibration, PnP and circle-fit solvers.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum SolveError {
    #[error("need at least {needed} views, got {got}")]
    NotEnoughViews { needed: usize, got: usize },
    #[error("need at least {needed} points, got {got}")]
    NotEnoughPoints { needed: usize, got: usize },
    #[error("object/image point counts differ ({object} vs {image})")]
    MismatchedLengths { object: usize, image: usize },
    #[error("degenerate configuration: {0}")]
    Degenerate(&'static str),
    #[error(transparent)]
    Homography(#[from] HomographyError),
    #[error("optimizer did not converge ({termination}) after {evaluations} evaluations")]
    NotConverged {
        termination: String,
        evaluations: usize,
    },
    #[error("solver produced non-finite parameters")]
    NonFinite,
}
