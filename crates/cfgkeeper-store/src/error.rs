//! Store error types.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The repository could not be opened or created.
    #[error("Failed to initialize repository at {path}: {message}")]
    RepositoryInit { path: PathBuf, message: String },

    /// A version could not be recorded.
    #[error("Commit failed: {0}")]
    Commit(String),

    /// Replication to the remote failed.
    #[error("Push to {remote} failed: {message}")]
    Push { remote: String, message: String },

    /// Replication gave up after the configured push timeout.
    #[error("Push to {remote} timed out after {} ms", .timeout.as_millis())]
    PushTimeout { remote: String, timeout: Duration },

    /// Path is absolute or escapes the working tree.
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Git error outside commit and push.
    #[error("Git error: {0}")]
    Git(#[from] git2::Error),

    /// IO error (working tree write, permission denied, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Lock was poisoned (another thread panicked while holding the lock)
    #[error("Lock poisoned: {0}")]
    LockPoisoned(String),
}

impl StoreError {
    pub fn repository_init(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        Self::RepositoryInit {
            path: path.into(),
            message: message.to_string(),
        }
    }

    pub fn commit(message: impl ToString) -> Self {
        Self::Commit(message.to_string())
    }

    pub fn push(remote: impl Into<String>, message: impl ToString) -> Self {
        Self::Push {
            remote: remote.into(),
            message: message.to_string(),
        }
    }

    pub fn push_timeout(remote: impl Into<String>, timeout: Duration) -> Self {
        Self::PushTimeout {
            remote: remote.into(),
            timeout,
        }
    }
}
