use std::fmt;

/// Failure categories exposed to every caller of the store.
///
/// Backend-specific fault codes never leak past the adapter; they are mapped
/// onto one of these kinds exactly once (see [`crate::fault`]).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Entity, parent, or blob is absent.
    NotFound,
    /// Unique-key collision, duplicate collaborator, owner removal, or
    /// no-op ownership transfer.
    AlreadyExists,
    /// Entity or property exceeds backend limits.
    TooLarge,
    /// Malformed or injection-risk key component, or an invalid operation.
    Invalid,
    /// Access key past its expiry.
    Expired,
    /// Backend unreachable, timed out, or failed its health check.
    ConnectionFailed,
    /// Unclassified backend fault.
    Other,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NotFound => "not found",
            Self::AlreadyExists => "already exists",
            Self::TooLarge => "too large",
            Self::Invalid => "invalid",
            Self::Expired => "expired",
            Self::ConnectionFailed => "connection failed",
            Self::Other => "storage error",
        };
        f.write_str(name)
    }
}

/// A typed storage failure: a kind plus a human-readable message.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct StorageError {
    kind: ErrorKind,
    message: String,
}

impl StorageError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn already_exists(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::AlreadyExists, message)
    }

    pub fn too_large(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TooLarge, message)
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Invalid, message)
    }

    pub fn expired(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Expired, message)
    }

    pub fn connection_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ConnectionFailed, message)
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Other, message)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is(&self, kind: ErrorKind) -> bool {
        self.kind == kind
    }

    /// Transient faults the adapter retries.
    pub fn is_retryable(&self) -> bool {
        self.kind == ErrorKind::ConnectionFailed
    }

    /// Replace the message when the error has the given kind.
    ///
    /// Used where a generic backend message ("resource not found") has a
    /// more useful meaning in the calling operation.
    pub fn with_message_if(self, kind: ErrorKind, message: impl Into<String>) -> Self {
        if self.kind == kind {
            Self::new(kind, message)
        } else {
            self
        }
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_kind_and_message() {
        let err = StorageError::not_found("app 'x' missing");
        assert_eq!(err.to_string(), "not found: app 'x' missing");
    }

    #[test]
    fn only_connection_failures_are_retryable() {
        assert!(StorageError::connection_failed("reset").is_retryable());
        assert!(!StorageError::not_found("x").is_retryable());
        assert!(!StorageError::other("x").is_retryable());
    }

    #[test]
    fn message_override_applies_to_matching_kind_only() {
        let err = StorageError::not_found("ResourceNotFound")
            .with_message_if(ErrorKind::NotFound, "no such user");
        assert_eq!(err.message(), "no such user");

        let err = StorageError::other("boom").with_message_if(ErrorKind::NotFound, "no such user");
        assert_eq!(err.message(), "boom");
    }
}
