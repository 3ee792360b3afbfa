//! In-memory version store for testing.

use crate::{
    normalize_relative_path, PushOutcome, RemoteTarget, StoreError, StoreResult, Version,
    VersionId, VersionStore,
};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

type Files = BTreeMap<PathBuf, Vec<u8>>;

#[derive(Debug, Clone)]
struct Recorded {
    version: Version,
    files: Files,
}

#[derive(Debug, Default)]
struct RepositoryState {
    /// Append-only, oldest first. HEAD is the last entry.
    history: Vec<Recorded>,
    working_tree: Files,
    index: Files,
    staged: BTreeSet<PathBuf>,
    /// Remote name -> version id of the pushed branch tip, per branch.
    remotes: HashMap<String, BTreeMap<String, VersionId>>,
    network_calls: usize,
    fail_commits: Option<String>,
    fail_pushes: Option<String>,
    push_delay: Option<Duration>,
}

impl RepositoryState {
    fn head(&self) -> Option<&Recorded> {
        self.history.last()
    }

    fn pending(&self) -> bool {
        if self.staged.is_empty() {
            return false;
        }
        let Some(head) = self.head() else {
            return true;
        };
        self.staged
            .iter()
            .any(|path| self.index.get(path) != head.files.get(path))
    }
}

/// In-memory version store for testing.
///
/// Clones share the same repository state, so one handle can be moved into
/// the code under test while another inspects the result.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<RwLock<RepositoryState>>,
}

impl MemoryStore {
    /// Create an empty store with no remotes.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a remote so pushes to it are replicated.
    pub fn with_remote(self, name: impl Into<String>) -> Self {
        if let Ok(mut state) = self.state.write() {
            state.remotes.entry(name.into()).or_default();
        }
        self
    }

    /// Make every commit fail with `reason`.
    pub fn fail_commits(&self, reason: impl Into<String>) {
        if let Ok(mut state) = self.state.write() {
            state.fail_commits = Some(reason.into());
        }
    }

    /// Make every push to a registered remote fail with `reason`.
    pub fn fail_pushes(&self, reason: impl Into<String>) {
        if let Ok(mut state) = self.state.write() {
            state.fail_pushes = Some(reason.into());
        }
    }

    /// Delay every push to a registered remote.
    pub fn delay_pushes(&self, delay: Duration) {
        if let Ok(mut state) = self.state.write() {
            state.push_delay = Some(delay);
        }
    }

    /// Number of pushes that reached a remote.
    pub fn network_calls(&self) -> usize {
        self.read().map(|state| state.network_calls).unwrap_or(0)
    }

    /// Number of recorded versions.
    pub fn version_count(&self) -> usize {
        self.read().map(|state| state.history.len()).unwrap_or(0)
    }

    /// Tip the remote holds for `branch`, if anything was pushed.
    pub fn remote_tip(&self, remote: &str, branch: &str) -> Option<VersionId> {
        let state = self.read().ok()?;
        state.remotes.get(remote)?.get(branch).cloned()
    }

    /// Current working tree content of `relative_path`.
    pub fn working_file(&self, relative_path: &Path) -> Option<Vec<u8>> {
        let state = self.read().ok()?;
        state.working_tree.get(relative_path).cloned()
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, RepositoryState>> {
        self.state
            .read()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, RepositoryState>> {
        self.state
            .write()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))
    }
}

#[async_trait]
impl VersionStore for MemoryStore {
    async fn stage(&mut self, relative_path: &Path, content: &[u8]) -> StoreResult<()> {
        let path = normalize_relative_path(relative_path)?;
        let mut state = self.write()?;
        state.working_tree.insert(path.clone(), content.to_vec());
        state.index.insert(path.clone(), content.to_vec());
        state.staged.insert(path);
        Ok(())
    }

    async fn has_pending_changes(&self) -> StoreResult<bool> {
        Ok(self.read()?.pending())
    }

    async fn commit(&mut self, message: &str) -> StoreResult<Version> {
        let mut state = self.write()?;
        if let Some(reason) = &state.fail_commits {
            return Err(StoreError::commit(reason));
        }
        if state.staged.is_empty() {
            return Err(StoreError::commit("nothing staged"));
        }
        if !state.pending() {
            if let Some(head) = state.head() {
                return Ok(head.version.clone());
            }
        }

        let version = Version {
            id: VersionId::new(format!("mem{:04}", state.history.len() + 1)),
            message: message.to_string(),
            timestamp: Utc::now(),
            parent: state.head().map(|head| head.version.id.clone()),
        };
        let files = state.index.clone();
        state.history.push(Recorded {
            version: version.clone(),
            files,
        });
        state.staged.clear();
        Ok(version)
    }

    async fn push(&self, remote: &RemoteTarget) -> StoreResult<PushOutcome> {
        let delay = {
            let mut state = self.write()?;
            if !state.remotes.contains_key(&remote.name) {
                return Ok(PushOutcome::RemoteNotConfigured);
            }
            state.network_calls += 1;
            state.push_delay
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.write()?;
        if let Some(reason) = &state.fail_pushes {
            return Err(StoreError::push(remote.name.clone(), reason));
        }
        let Some(tip) = state.head().map(|head| head.version.id.clone()) else {
            return Err(StoreError::push(
                remote.name.clone(),
                format!("src refspec {} does not match any", remote.branch),
            ));
        };
        state
            .remotes
            .entry(remote.name.clone())
            .or_default()
            .insert(remote.branch.clone(), tip);
        Ok(PushOutcome::Pushed)
    }

    async fn head(&self) -> StoreResult<Option<Version>> {
        Ok(self.read()?.head().map(|head| head.version.clone()))
    }

    async fn history(&self, limit: usize) -> StoreResult<Vec<Version>> {
        Ok(self
            .read()?
            .history
            .iter()
            .rev()
            .take(limit)
            .map(|recorded| recorded.version.clone())
            .collect())
    }

    async fn file_at(
        &self,
        version: &VersionId,
        relative_path: &Path,
    ) -> StoreResult<Option<Vec<u8>>> {
        let path = normalize_relative_path(relative_path)?;
        let state = self.read()?;
        Ok(state
            .history
            .iter()
            .find(|recorded| &recorded.version.id == version)
            .and_then(|recorded| recorded.files.get(&path).cloned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BACKUP: &str = "backups/router.cfg";

    async fn stage_and_commit(store: &mut MemoryStore, content: &[u8]) -> Version {
        store.stage(Path::new(BACKUP), content).await.unwrap();
        store.commit("Auto-backup").await.unwrap()
    }

    #[tokio::test]
    async fn first_version_has_no_parent() {
        let mut store = MemoryStore::new();
        store.stage(Path::new(BACKUP), b"").await.unwrap();
        assert!(store.has_pending_changes().await.unwrap());

        let version = store.commit("first").await.unwrap();
        assert!(version.parent.is_none());
        assert_eq!(store.version_count(), 1);
    }

    #[tokio::test]
    async fn nothing_staged_is_not_pending() {
        let store = MemoryStore::new();
        assert!(!store.has_pending_changes().await.unwrap());
    }

    #[tokio::test]
    async fn byte_exact_comparison() {
        let mut store = MemoryStore::new();
        stage_and_commit(&mut store, b"hostname r1").await;

        store.stage(Path::new(BACKUP), b"hostname r1").await.unwrap();
        assert!(!store.has_pending_changes().await.unwrap());

        store.stage(Path::new(BACKUP), b"hostname r1\n").await.unwrap();
        assert!(store.has_pending_changes().await.unwrap());
    }

    #[tokio::test]
    async fn unchanged_commit_returns_head() {
        let mut store = MemoryStore::new();
        let first = stage_and_commit(&mut store, b"A").await;
        let again = stage_and_commit(&mut store, b"A").await;

        assert_eq!(again, first);
        assert_eq!(store.version_count(), 1);
    }

    #[tokio::test]
    async fn history_links_predecessors() {
        let mut store = MemoryStore::new();
        let first = stage_and_commit(&mut store, b"A").await;
        let second = stage_and_commit(&mut store, b"B").await;

        assert_eq!(second.parent, Some(first.id.clone()));
        let history = store.history(10).await.unwrap();
        assert_eq!(history, vec![second.clone(), first]);
        assert_eq!(
            store.file_at(&second.id, Path::new(BACKUP)).await.unwrap(),
            Some(b"B".to_vec())
        );
    }

    #[tokio::test]
    async fn clones_share_state() {
        let observer = MemoryStore::new();
        let mut writer = observer.clone();
        stage_and_commit(&mut writer, b"A").await;

        assert_eq!(observer.version_count(), 1);
        assert_eq!(
            observer.working_file(Path::new(BACKUP)),
            Some(b"A".to_vec())
        );
    }

    #[tokio::test]
    async fn push_without_remote_makes_no_network_call() {
        let mut store = MemoryStore::new();
        stage_and_commit(&mut store, b"A").await;

        let outcome = store.push(&RemoteTarget::default()).await.unwrap();
        assert_eq!(outcome, PushOutcome::RemoteNotConfigured);
        assert_eq!(store.network_calls(), 0);
    }

    #[tokio::test]
    async fn push_records_remote_tip() {
        let mut store = MemoryStore::new().with_remote("origin");
        let version = stage_and_commit(&mut store, b"A").await;

        let outcome = store.push(&RemoteTarget::default()).await.unwrap();
        assert_eq!(outcome, PushOutcome::Pushed);
        assert_eq!(store.network_calls(), 1);
        assert_eq!(store.remote_tip("origin", "main"), Some(version.id));
    }

    #[tokio::test]
    async fn injected_failures_surface_as_errors() {
        let mut store = MemoryStore::new().with_remote("origin");
        stage_and_commit(&mut store, b"A").await;

        store.fail_pushes("connection refused");
        let err = store.push(&RemoteTarget::default()).await.unwrap_err();
        assert!(matches!(err, StoreError::Push { .. }));

        store.fail_commits("disk full");
        store.stage(Path::new(BACKUP), b"B").await.unwrap();
        let err = store.commit("second").await.unwrap_err();
        assert!(matches!(err, StoreError::Commit(_)));
        assert_eq!(store.version_count(), 1);
    }
}
