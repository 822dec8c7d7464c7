use thiserror::Error;

/// Errors produced by the alignment pipeline.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AlignError {
    /// Fewer correspondences survived the ratio test than the configured minimum.
    #[error("not enough good matches: found {found}, need at least {required}")]
    InsufficientMatches { found: usize, required: usize },

    /// The robust estimator could not produce a usable transform.
    #[error("transform estimation failed: {reason}")]
    EstimationFailure { reason: String },

    #[error("invalid configuration: {}", .0.join("; "))]
    InvalidConfig(Vec<String>),

    #[error("invalid image dimensions {width}x{height}")]
    InvalidImage { width: u32, height: u32 },
}

impl AlignError {
    pub(crate) fn estimation(reason: impl Into<String>) -> Self {
        Self::EstimationFailure {
            reason: reason.into(),
        }
    }
}

pub type AlignResult<T> = std::result::Result<T, AlignError>;
