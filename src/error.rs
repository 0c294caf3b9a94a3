use thiserror::Error;

pub type Result<T> = std::result::Result<T, ChromalignError>;

/// Errors raised when constructing records or parameters from invalid input.
///
/// Missing observations are never errors. A compound absent from one run's
/// hit list, or a run contributing no peak to an aligned group, is carried as
/// `None` and skipped by every statistic.
#[derive(Debug, Error)]
pub enum ChromalignError {
    #[error("invalid value for '{field}': {message}")]
    InvalidParameter { field: &'static str, message: String },

    #[error("mass and intensity lists must have the same length ({masses} masses, {intensities} intensities)")]
    MismatchedSpectrum { masses: usize, intensities: usize },

    #[error("reference data must be a mapping with exactly the keys {expected}, or null; got {found}")]
    MalformedReferenceData {
        expected: &'static str,
        found: String,
    },

    #[error("missing key '{0}' in dictionary representation")]
    MissingKey(&'static str),

    #[error("expected {expected} for '{field}', found {found}")]
    UnexpectedType {
        field: &'static str,
        expected: &'static str,
        found: String,
    },
}

impl ChromalignError {
    pub fn invalid_parameter(field: &'static str, message: impl Into<String>) -> Self {
        ChromalignError::InvalidParameter {
            field,
            message: message.into(),
        }
    }
}
