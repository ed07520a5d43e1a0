use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid package label: {0}")]
    InvalidLabel(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}
