//! Error types for the core crate.

use crate::orchestrator::RunState;
use cfgkeeper_snapshot::SnapshotError;
use cfgkeeper_store::StoreError;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Core error types.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Configuration error.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Invalid JSON/JSONC syntax.
    #[error("invalid config at {path}: {message}")]
    InvalidJson { path: String, message: String },

    /// Config validation failed.
    #[error("config validation failed: {message}")]
    Validation { message: String },

    /// An explicitly requested config file does not exist.
    #[error("config file not found: {path}")]
    NotFound { path: String },
}

impl ConfigError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }
}

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Classification of everything that can go wrong in a backup run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The configuration source could not be read. Fatal.
    SourceUnavailable,
    /// The repository could not be opened or created. Fatal.
    RepositoryInitFailure,
    /// The working tree file could not be written. Fatal.
    PersistFailure,
    /// A version could not be recorded. Reported, not fatal.
    CommitFailure,
    /// Replication failed or timed out. Reported, not fatal.
    PushFailure,
    /// Anything else. Fatal.
    Unexpected,
}

impl ErrorKind {
    /// Whether this kind ends the run with a failure exit.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::CommitFailure | Self::PushFailure)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::SourceUnavailable => "SourceUnavailable",
            Self::RepositoryInitFailure => "RepositoryInitFailure",
            Self::PersistFailure => "PersistFailure",
            Self::CommitFailure => "CommitFailure",
            Self::PushFailure => "PushFailure",
            Self::Unexpected => "UnexpectedError",
        };
        f.write_str(name)
    }
}

/// Fatal errors of a backup run.
#[derive(Debug, Error)]
pub enum BackupError {
    /// Fetching the configuration failed.
    #[error("failed to fetch configuration: {0}")]
    Source(#[from] SnapshotError),

    /// Opening or creating the repository failed.
    #[error("failed to initialize Git repo: {0}")]
    RepositoryInit(#[source] StoreError),

    /// Writing the backup file into the working tree failed.
    #[error("failed to write {}: {source}", path.display())]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The store failed outside of commit and push.
    #[error("repository error during {state}: {source}")]
    Store {
        state: RunState,
        #[source]
        source: StoreError,
    },
}

impl BackupError {
    pub fn store(state: RunState, source: StoreError) -> Self {
        Self::Store { state, source }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Source(_) => ErrorKind::SourceUnavailable,
            Self::RepositoryInit(_) => ErrorKind::RepositoryInitFailure,
            Self::Persist { .. } => ErrorKind::PersistFailure,
            Self::Store { .. } => ErrorKind::Unexpected,
        }
    }
}
