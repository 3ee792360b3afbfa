//! Snapshot error types.

use std::fmt;
use thiserror::Error;

/// Result type for snapshot operations.
pub type SnapshotResult<T> = Result<T, SnapshotError>;

/// Why a source could not be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnavailableReason {
    NotFound,
    PermissionDenied,
    Io,
}

impl UnavailableReason {
    fn from_io(err: &std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound,
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied,
            _ => Self::Io,
        }
    }
}

impl fmt::Display for UnavailableReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "not found"),
            Self::PermissionDenied => write!(f, "permission denied"),
            Self::Io => write!(f, "I/O error"),
        }
    }
}

/// Errors that can occur while fetching a snapshot.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// The source could not be read.
    #[error("Source {source_id} unavailable ({reason}): {error}")]
    SourceUnavailable {
        source_id: String,
        reason: UnavailableReason,
        #[source]
        error: std::io::Error,
    },
}

impl SnapshotError {
    /// Classify an I/O error raised while reading `source_id`.
    pub fn unavailable(source_id: impl Into<String>, error: std::io::Error) -> Self {
        Self::SourceUnavailable {
            source_id: source_id.into(),
            reason: UnavailableReason::from_io(&error),
            error,
        }
    }

    pub fn reason(&self) -> UnavailableReason {
        match self {
            Self::SourceUnavailable { reason, .. } => *reason,
        }
    }
}
