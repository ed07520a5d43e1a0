//! Backend fault classification.
//!
//! Backends report failures either as a native service error code or as an
//! already translated [`StorageError`]. Native codes are mapped onto an
//! [`ErrorKind`] here and nowhere else.

use crate::error::{ErrorKind, StorageError};

/// A failure reported by a table or blob backend.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum BackendFault {
    /// Service error code plus the service's message.
    #[error("{code}: {message}")]
    Native { code: String, message: String },
    /// A failure already expressed in the store taxonomy.
    #[error(transparent)]
    Translated(#[from] StorageError),
}

impl BackendFault {
    pub fn native(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Native {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Native { code, .. } => classify(code),
            Self::Translated(err) => err.kind(),
        }
    }
}

/// Result alias for backend calls.
pub type BackendResult<T> = Result<T, BackendFault>;

/// Map a native service error code onto the store taxonomy.
pub fn classify(code: &str) -> ErrorKind {
    match code {
        "BlobNotFound" | "ResourceNotFound" | "TableNotFound" | "ContainerNotFound"
        | "EntityNotFound" => ErrorKind::NotFound,
        "EntityAlreadyExists" | "TableAlreadyExists" | "ContainerAlreadyExists"
        | "BlobAlreadyExists" => ErrorKind::AlreadyExists,
        "EntityTooLarge" | "PropertyValueTooLarge" | "RequestBodyTooLarge" => ErrorKind::TooLarge,
        "ETIMEDOUT" | "ESOCKETTIMEDOUT" | "ECONNRESET" | "ECONNREFUSED" | "ServerBusy"
        | "OperationTimedOut" => ErrorKind::ConnectionFailed,
        "InvalidInput" | "OutOfRangeInput" => ErrorKind::Invalid,
        _ => ErrorKind::Other,
    }
}

impl From<BackendFault> for StorageError {
    fn from(fault: BackendFault) -> Self {
        match fault {
            BackendFault::Native { code, message } => {
                let kind = classify(&code);
                let message = if message.is_empty() { code } else { message };
                StorageError::new(kind, message)
            }
            BackendFault::Translated(err) => err,
        }
    }
}
