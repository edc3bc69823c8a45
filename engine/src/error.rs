//! Error types for the Sprout engine.
//!
//! Remote failures are classified once, at the collaborator boundary, into an
//! [`ErrorKind`]. The synchronizers switch on that discriminant to decide
//! whether an operation is queued, dropped or surfaced.

use crate::{RecordId, ResourceKind};
use std::fmt;
use thiserror::Error;

/// Classification of a failed operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Timeout, unreachable host, 5xx. Safe to retry later.
    RetryableNetwork,
    /// The request itself was rejected (4xx other than auth). Retrying cannot help.
    TerminalRequest,
    /// Credentials are missing or expired.
    AuthExpired,
    /// The operation requires connectivity and the client is offline.
    Offline,
}

impl ErrorKind {
    /// Whether an operation failing with this kind belongs in the pending queue.
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::RetryableNetwork)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ErrorKind::RetryableNetwork => "network unavailable",
            ErrorKind::TerminalRequest => "request rejected",
            ErrorKind::AuthExpired => "authentication expired",
            ErrorKind::Offline => "offline",
        };
        f.write_str(label)
    }
}

/// A failed call to the remote resource API.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct RemoteError {
    pub kind: ErrorKind,
    /// HTTP status, when the failure came from a response.
    pub status: Option<u16>,
    pub message: String,
}

impl RemoteError {
    pub fn retryable(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::RetryableNetwork,
            status: None,
            message: message.into(),
        }
    }

    pub fn terminal(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::TerminalRequest,
            status: None,
            message: message.into(),
        }
    }

    pub fn auth_expired(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::AuthExpired,
            status: None,
            message: message.into(),
        }
    }

    pub fn offline(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Offline,
            status: None,
            message: message.into(),
        }
    }

    /// Classify a non-success HTTP status.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let kind = match status {
            401 | 403 => ErrorKind::AuthExpired,
            408 | 425 | 429 | 500..=599 => ErrorKind::RetryableNetwork,
            _ => ErrorKind::TerminalRequest,
        };
        Self {
            kind,
            status: Some(status),
            message: message.into(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }

    /// The target resource no longer exists on the server.
    pub fn is_not_found(&self) -> bool {
        self.status == Some(404)
    }
}

/// Error description handed to the rendering layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct SyncError {
    pub kind: ErrorKind,
    pub message: String,
    /// Cached or optimistic data is still being shown.
    pub showing_stale: bool,
}

impl SyncError {
    pub fn offline(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Offline,
            message: message.into(),
            showing_stale: true,
        }
    }

    pub fn from_remote(err: &RemoteError, showing_stale: bool) -> Self {
        Self {
            kind: err.kind,
            message: err.message.clone(),
            showing_stale,
        }
    }
}

/// All errors returned by engine operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("record not found: {0}")]
    RecordNotFound(RecordId),

    #[error("invalid patch: {0}")]
    InvalidPatch(String),

    #[error("{0} records have no read state to clear by")]
    UnsupportedScope(ResourceKind),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("http client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Sync(#[from] SyncError),
}

impl Error {
    /// The sync classification, if this error came from a remote or connectivity failure.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Error::Sync(err) => Some(err.kind),
            _ => None,
        }
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = Error::RecordNotFound(42);
        assert_eq!(err.to_string(), "record not found: 42");

        let err = RemoteError::from_status(503, "maintenance");
        assert_eq!(err.to_string(), "network unavailable: maintenance");

        let err = Error::from(SyncError::offline("creating requires connectivity"));
        assert_eq!(err.to_string(), "offline: creating requires connectivity");
        assert_eq!(err.kind(), Some(ErrorKind::Offline));
    }

    #[test]
    fn status_classification() {
        assert_eq!(RemoteError::from_status(401, "").kind, ErrorKind::AuthExpired);
        assert_eq!(RemoteError::from_status(403, "").kind, ErrorKind::AuthExpired);
        assert_eq!(
            RemoteError::from_status(429, "").kind,
            ErrorKind::RetryableNetwork
        );
        assert_eq!(
            RemoteError::from_status(502, "").kind,
            ErrorKind::RetryableNetwork
        );
        assert_eq!(
            RemoteError::from_status(404, "").kind,
            ErrorKind::TerminalRequest
        );
        assert_eq!(
            RemoteError::from_status(422, "").kind,
            ErrorKind::TerminalRequest
        );
        assert!(RemoteError::from_status(404, "gone").is_not_found());
    }

    #[test]
    fn only_network_failures_are_retryable() {
        assert!(ErrorKind::RetryableNetwork.is_retryable());
        assert!(!ErrorKind::TerminalRequest.is_retryable());
        assert!(!ErrorKind::AuthExpired.is_retryable());
        assert!(!ErrorKind::Offline.is_retryable());
    }
}
