use thiserror::Error;

/// Errors produced while parsing versions, ranges and histories.
#[derive(Debug, Error)]
pub enum AcquisitionError {
    #[error("invalid version: {0}")]
    InvalidVersion(String),

    #[error("invalid version range {range:?}: {reason}")]
    InvalidRange { range: String, reason: String },

    #[error("malformed package history: {0}")]
    MalformedHistory(#[from] serde_json::Error),
}

pub type AcquisitionResult<T> = Result<T, AcquisitionError>;
