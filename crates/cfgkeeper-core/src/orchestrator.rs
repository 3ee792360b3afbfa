//! The backup run: fetch, persist, stage, evaluate, commit, replicate.

use crate::config::{CommitFailurePolicy, Config};
use crate::error::{BackupError, ErrorKind};
use cfgkeeper_snapshot::SnapshotSource;
use cfgkeeper_store::{GitStore, PushOutcome, RemoteTarget, StoreError, Version, VersionStore};
use chrono::{DateTime, Local};
use std::fmt;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, error, info, warn, Instrument, Span};

/// States of a backup run, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Fetch,
    Persist,
    Stage,
    Evaluate,
    Commit,
    Replicate,
    Completed,
    Skipped,
    Failed,
}

impl RunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fetch => "fetch",
            Self::Persist => "persist",
            Self::Stage => "stage",
            Self::Evaluate => "evaluate",
            Self::Commit => "commit",
            Self::Replicate => "replicate",
            Self::Completed => "completed",
            Self::Skipped => "skipped",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Skipped | Self::Failed)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How replication ended. None of these fail the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushStatus {
    Pushed,
    RemoteNotConfigured,
    Failed(String),
    TimedOut(Duration),
}

/// Result of a run that did not hit a fatal error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// A new version was recorded.
    Completed { version: Version, push: PushStatus },
    /// The source matched HEAD; nothing was recorded.
    Skipped { head: Option<Version> },
    /// Recording the version failed.
    CommitFailed { reason: String },
}

impl RunOutcome {
    /// Terminal state this outcome corresponds to.
    pub fn state(&self) -> RunState {
        match self {
            Self::Completed { .. } => RunState::Completed,
            Self::Skipped { .. } => RunState::Skipped,
            Self::CommitFailed { .. } => RunState::Failed,
        }
    }

    /// Process exit code under `policy`.
    pub fn exit_code(&self, policy: CommitFailurePolicy) -> u8 {
        match (self, policy) {
            (Self::CommitFailed { .. }, CommitFailurePolicy::Fail) => 1,
            _ => 0,
        }
    }
}

/// Commit message for a version recorded at `at`.
pub fn commit_message(at: DateTime<Local>) -> String {
    format!("Auto-backup: {}", at.format("%Y-%m-%d %H:%M:%S"))
}

/// Open the git repository named by `config`.
///
/// Nothing is written until the run stages its first file, so a run whose
/// fetch fails leaves the repository path untouched.
pub fn open_git_store(config: &Config) -> Result<GitStore, BackupError> {
    GitStore::open_with(&config.repository.path, config.store_options()).map_err(repository_init)
}

fn repository_init(e: StoreError) -> BackupError {
    error!(kind = %ErrorKind::RepositoryInitFailure, "Failed to initialize Git repo: {}", e);
    BackupError::RepositoryInit(e)
}

/// Drives one backup pass from a [`SnapshotSource`] into a [`VersionStore`].
pub struct BackupOrchestrator<S, V> {
    config: Config,
    source: S,
    store: V,
    span: Span,
}

impl<S: SnapshotSource, V: VersionStore> BackupOrchestrator<S, V> {
    pub fn new(config: Config, source: S, store: V) -> Self {
        let span = tracing::info_span!("backup", source = %source.id());
        Self {
            config,
            source,
            store,
            span,
        }
    }

    /// Log every run under `span` instead of the default one.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn store(&self) -> &V {
        &self.store
    }

    /// Run one backup pass.
    ///
    /// Commit and push failures are reported in the outcome. Everything
    /// else that goes wrong is returned as a fatal [`BackupError`].
    pub async fn run(&mut self) -> Result<RunOutcome, BackupError> {
        let span = self.span.clone();
        self.run_pass().instrument(span).await
    }

    async fn run_pass(&mut self) -> Result<RunOutcome, BackupError> {
        info!("Starting backup process...");

        enter(RunState::Fetch);
        let snapshot = self.source.fetch().await.map_err(|e| fail(e.into()))?;
        debug!(
            bytes = snapshot.len(),
            digest = %snapshot.digest(),
            captured_at = %snapshot.timestamp().format("%Y-%m-%d %H:%M:%S"),
            "Fetched snapshot from {}",
            snapshot.source_id()
        );

        enter(RunState::Persist);
        let target = self.config.backup_path();
        persist(&target, snapshot.content())
            .await
            .map_err(|source| {
                fail(BackupError::Persist {
                    path: target.clone(),
                    source,
                })
            })?;
        info!("Configuration saved to {}", target.display());

        enter(RunState::Stage);
        let relative = self.config.backup_relative_path();
        self.store
            .stage(&relative, snapshot.content())
            .await
            .map_err(|e| match e {
                StoreError::RepositoryInit { .. } => fail(repository_init(e)),
                e => fail(BackupError::store(RunState::Stage, e)),
            })?;

        enter(RunState::Evaluate);
        let pending = self
            .store
            .has_pending_changes()
            .await
            .map_err(|e| fail(BackupError::store(RunState::Evaluate, e)))?;
        if !pending {
            info!("No configuration changes detected. Skipping commit.");
            enter(RunState::Skipped);
            let head = self.store.head().await.unwrap_or_else(|e| {
                warn!("Could not read HEAD: {}", e);
                None
            });
            return Ok(RunOutcome::Skipped { head });
        }

        enter(RunState::Commit);
        let message = commit_message(Local::now());
        let version = match self.store.commit(&message).await {
            Ok(version) => version,
            Err(e) => {
                error!(kind = %ErrorKind::CommitFailure, "Git operation failed: {}", e);
                enter(RunState::Failed);
                return Ok(RunOutcome::CommitFailed {
                    reason: e.to_string(),
                });
            }
        };
        info!(version = %version.id.short(), "Committed changes: {}", message);

        enter(RunState::Replicate);
        let push = self.replicate().await;

        enter(RunState::Completed);
        info!("Backup process completed successfully.");
        Ok(RunOutcome::Completed { version, push })
    }

    async fn replicate(&self) -> PushStatus {
        let remote = self.config.remote_target();
        let limit = self.config.push_timeout();
        info!("Pushing to remote {}...", remote);

        match tokio::time::timeout(limit, self.store.push(&remote)).await {
            Ok(Ok(PushOutcome::Pushed)) => {
                info!("Push successful.");
                PushStatus::Pushed
            }
            Ok(Ok(PushOutcome::RemoteNotConfigured)) => {
                warn!("Remote '{}' not found. Skipping push.", remote.name);
                PushStatus::RemoteNotConfigured
            }
            Ok(Err(StoreError::PushTimeout { timeout, .. })) => timed_out(&remote, timeout),
            Ok(Err(e)) => {
                error!(kind = %ErrorKind::PushFailure, "Git push failed: {}", e);
                PushStatus::Failed(e.to_string())
            }
            Err(_) => timed_out(&remote, limit),
        }
    }
}

fn timed_out(remote: &RemoteTarget, limit: Duration) -> PushStatus {
    error!(
        kind = %ErrorKind::PushFailure,
        "Push to {} timed out after {} ms",
        remote,
        limit.as_millis()
    );
    PushStatus::TimedOut(limit)
}

fn enter(state: RunState) {
    info!(state = %state, "Entering state {}", state);
}

fn fail(err: BackupError) -> BackupError {
    error!(kind = %err.kind(), "Backup process failed: {}", err);
    enter(RunState::Failed);
    err
}

/// Write the snapshot into the working tree, creating the backup directory.
async fn persist(path: &Path, content: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, content).await
}
