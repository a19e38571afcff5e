use thiserror::Error;

/// Errors raised by the soil data core.
///
/// Missing measurement values are not errors: they travel through the
/// pipeline as `None` and callers check for them explicitly.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SoilError {
    #[error("invalid depth range: top {top} must be above bottom {bottom}")]
    InvalidRange { top: f64, bottom: f64 },

    #[error("insufficient data: {rows} complete rows, at least {required} needed")]
    InsufficientData { rows: usize, required: usize },

    #[error("invalid coordinate: {0}")]
    InvalidCoordinate(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("failed to parse response: {0}")]
    Parse(String),

    #[error("regression failed: {0}")]
    Regression(String),

    #[error("no data, fetch points first")]
    NoData,
}
