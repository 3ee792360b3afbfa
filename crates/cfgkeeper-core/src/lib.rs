//! Core backup logic for cfgkeeper.
//!
//! This crate ties a [`SnapshotSource`](cfgkeeper_snapshot::SnapshotSource) to a
//! [`VersionStore`](cfgkeeper_store::VersionStore):
//! - Configuration management (JSONC file, environment and flag overrides)
//! - The backup run state machine ([`BackupOrchestrator`])
//! - Error classification for exit codes ([`ErrorKind`])

pub mod config;
pub mod error;
pub mod orchestrator;

pub use config::{CommitFailurePolicy, Config, ConfigOverrides};
pub use error::{BackupError, ConfigError, CoreError, CoreResult, ErrorKind};
pub use orchestrator::{
    commit_message, open_git_store, BackupOrchestrator, PushStatus, RunOutcome, RunState,
};
