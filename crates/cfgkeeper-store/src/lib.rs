//! Versioned storage for cfgkeeper.
//!
//! This crate provides the [`VersionStore`] capability with two backends:
//! - [`GitStore`]: a git repository on disk (default)
//! - [`MemoryStore`]: in-memory history (for testing)
//!
//! A store owns the repository state. Callers stage a file, ask whether the
//! staged content differs from HEAD, and only then commit and push.

pub mod error;
pub mod git;
pub mod memory;
mod version;

pub use error::{StoreError, StoreResult};
pub use git::{Author, GitStore, GitStoreOptions};
pub use memory::MemoryStore;
pub use version::{PushOutcome, RemoteTarget, Version, VersionId};

use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};

/// A versioned repository holding configuration snapshots.
///
/// History is append-only: no operation mutates or removes a recorded
/// [`Version`].
#[async_trait]
pub trait VersionStore: Send + Sync {
    /// Write `content` to `relative_path` in the working tree and stage it.
    ///
    /// Staging identical content twice is a no-op.
    async fn stage(&mut self, relative_path: &Path, content: &[u8]) -> StoreResult<()>;

    /// Whether the staged content differs byte-for-byte from HEAD.
    ///
    /// True when something is staged and no version exists yet.
    async fn has_pending_changes(&self) -> StoreResult<bool>;

    /// Record the staged content as a new version and advance HEAD.
    ///
    /// Fails with [`StoreError::Commit`] when nothing is staged. When the
    /// staged content equals HEAD, returns HEAD without recording anything.
    async fn commit(&mut self, message: &str) -> StoreResult<Version>;

    /// Replicate the branch to `remote`.
    ///
    /// A remote that is not registered is not an error: the call returns
    /// [`PushOutcome::RemoteNotConfigured`] without touching the network.
    async fn push(&self, remote: &RemoteTarget) -> StoreResult<PushOutcome>;

    /// The latest version, if any.
    async fn head(&self) -> StoreResult<Option<Version>>;

    /// Up to `limit` versions, newest first.
    async fn history(&self, limit: usize) -> StoreResult<Vec<Version>>;

    /// Content recorded for `relative_path` in `version`.
    async fn file_at(
        &self,
        version: &VersionId,
        relative_path: &Path,
    ) -> StoreResult<Option<Vec<u8>>>;
}

/// Clean a working-tree path, rejecting anything that would escape the tree.
pub(crate) fn normalize_relative_path(path: &Path) -> StoreResult<PathBuf> {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => normalized.push(part),
            Component::CurDir => {}
            _ => {
                return Err(StoreError::InvalidPath(format!(
                    "Path '{}' is outside repository",
                    path.display()
                )))
            }
        }
    }
    if normalized.as_os_str().is_empty() {
        return Err(StoreError::InvalidPath("path is empty".to_string()));
    }
    Ok(normalized)
}
