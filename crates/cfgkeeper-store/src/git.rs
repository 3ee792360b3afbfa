//! Git-backed version store.
//!
//! Staging goes through the git index, versions are commits on the configured
//! branch and replication is a plain `git push` of that branch. The repository
//! is re-opened for every operation so on-disk state is the only truth, and a
//! missing repository is only created by the first [`VersionStore::stage`].

use crate::{
    normalize_relative_path, PushOutcome, RemoteTarget, StoreError, StoreResult, Version,
    VersionId, VersionStore,
};
use async_trait::async_trait;
use cfgkeeper_util::TimingGuard;
use chrono::{DateTime, Utc};
use git2::{ErrorCode, Repository, RepositoryInitOptions, Signature};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Credential attempts before giving up; libgit2 keeps asking otherwise.
const MAX_CREDENTIAL_ATTEMPTS: usize = 3;

/// Identity used for commits when git config has none.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Author {
    pub name: String,
    pub email: String,
}

impl Default for Author {
    fn default() -> Self {
        Self {
            name: "cfgkeeper".to_string(),
            email: "cfgkeeper@localhost".to_string(),
        }
    }
}

/// Options for opening a [`GitStore`].
#[derive(Debug, Clone)]
pub struct GitStoreOptions {
    /// Branch a freshly initialized repository starts on.
    pub initial_branch: String,
    /// Fallback commit identity.
    pub author: Author,
    /// Upper bound for one push, connect included. `None` waits for libgit2.
    pub push_timeout: Option<Duration>,
}

impl Default for GitStoreOptions {
    fn default() -> Self {
        Self {
            initial_branch: "main".to_string(),
            author: Author::default(),
            push_timeout: None,
        }
    }
}

/// A [`VersionStore`] backed by a git repository on disk.
pub struct GitStore {
    workdir: PathBuf,
    options: GitStoreOptions,
    /// Paths staged by this handle, compared against HEAD.
    staged: BTreeSet<PathBuf>,
}

impl GitStore {
    /// Open the repository at `path`. A missing one is created on first stage.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        Self::open_with(path, GitStoreOptions::default())
    }

    /// Open the repository at `path` with explicit options.
    ///
    /// Nothing is written here: an absent repository is initialized on the
    /// configured branch by the first [`VersionStore::stage`].
    pub fn open_with(path: impl AsRef<Path>, options: GitStoreOptions) -> StoreResult<Self> {
        let path = path.as_ref();
        if path.exists() && !path.is_dir() {
            return Err(StoreError::repository_init(path, "not a directory"));
        }

        let store = Self {
            workdir: path.to_path_buf(),
            options,
            staged: BTreeSet::new(),
        };
        if store.is_initialized() {
            let repo = Repository::open(path).map_err(|e| StoreError::repository_init(path, e))?;
            if repo.workdir().is_none() {
                return Err(StoreError::repository_init(
                    path,
                    "repository has no working tree",
                ));
            }
            store.check_branch(&repo);
        }
        Ok(store)
    }

    /// Whether the repository exists on disk yet.
    pub fn is_initialized(&self) -> bool {
        self.workdir.join(".git").exists()
    }

    fn open_repo(&self) -> StoreResult<Repository> {
        Ok(Repository::open(&self.workdir)?)
    }

    /// Open the repository, creating it on the configured branch if absent.
    fn ensure_repo(&self) -> StoreResult<Repository> {
        let path = &self.workdir;
        if self.is_initialized() {
            return Repository::open(path).map_err(|e| StoreError::repository_init(path, e));
        }

        info!("Initializing new Git repository at {}", path.display());
        std::fs::create_dir_all(path).map_err(|e| StoreError::repository_init(path, e))?;
        let mut init_opts = RepositoryInitOptions::new();
        init_opts.initial_head(&self.options.initial_branch);
        Repository::init_opts(path, &init_opts).map_err(|e| StoreError::repository_init(path, e))
    }

    fn check_branch(&self, repo: &Repository) {
        if let Some(branch) = current_branch(repo) {
            if branch != self.options.initial_branch {
                warn!(
                    "Repository is on branch '{}' but backups are configured for '{}'",
                    branch, self.options.initial_branch
                );
            }
        }
    }

    fn signature(&self, repo: &Repository) -> Result<Signature<'static>, git2::Error> {
        repo.signature().or_else(|_| {
            debug!("No git identity configured, using fallback author");
            Signature::now(&self.options.author.name, &self.options.author.email)
        })
    }

    fn pending_changes_in(&self, repo: &Repository) -> StoreResult<bool> {
        if self.staged.is_empty() {
            return Ok(false);
        }
        let Some(head) = head_commit(repo)? else {
            return Ok(true);
        };
        let head_tree = head.tree()?;
        let index = repo.index()?;

        for path in &self.staged {
            let Some(entry) = index.get_path(path, 0) else {
                return Ok(true);
            };
            let recorded_id = match head_tree.get_path(path) {
                Ok(recorded) => recorded.id(),
                Err(e) if e.code() == ErrorCode::NotFound => {
                    debug!(path = %path.display(), "Path not present at HEAD");
                    return Ok(true);
                }
                Err(e) => return Err(e.into()),
            };

            let staged = repo.find_blob(entry.id)?;
            let recorded = repo.find_blob(recorded_id)?;
            if staged.content() != recorded.content() {
                debug!(path = %path.display(), "Staged content differs from HEAD");
                return Ok(true);
            }
        }

        Ok(false)
    }

    fn commit_in(&self, repo: &Repository, message: &str) -> StoreResult<Version> {
        let parent = head_commit(repo)?;
        if let Some(parent) = &parent {
            if !self.pending_changes_in(repo)? {
                debug!("Staged content matches HEAD, not recording a new version");
                return Ok(version_from_commit(parent));
            }
        }

        let mut index = repo.index()?;
        let tree_id = index.write_tree()?;
        let tree = repo.find_tree(tree_id)?;
        let sig = self.signature(repo)?;
        let parents: Vec<&git2::Commit> = parent.iter().collect();

        let commit_id = repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)?;
        let commit = repo.find_commit(commit_id)?;
        Ok(version_from_commit(&commit))
    }
}

#[async_trait]
impl VersionStore for GitStore {
    async fn stage(&mut self, relative_path: &Path, content: &[u8]) -> StoreResult<()> {
        let relative_path = normalize_relative_path(relative_path)?;
        let repo = self.ensure_repo()?;
        let full_path = self.workdir.join(&relative_path);

        if let Some(parent) = full_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let unchanged = matches!(tokio::fs::read(&full_path).await, Ok(existing) if existing == content);
        if !unchanged {
            tokio::fs::write(&full_path, content).await?;
        }

        let mut index = repo.index()?;
        index.add_path(&relative_path)?;
        index.write()?;

        debug!(path = %relative_path.display(), bytes = content.len(), "Staged file");
        self.staged.insert(relative_path);
        Ok(())
    }

    async fn has_pending_changes(&self) -> StoreResult<bool> {
        if !self.is_initialized() {
            return Ok(false);
        }
        let repo = self.open_repo()?;
        self.pending_changes_in(&repo)
    }

    async fn commit(&mut self, message: &str) -> StoreResult<Version> {
        if self.staged.is_empty() {
            return Err(StoreError::commit("nothing staged"));
        }
        let repo = self.open_repo().map_err(StoreError::commit)?;
        let version = self.commit_in(&repo, message).map_err(StoreError::commit)?;
        self.staged.clear();
        Ok(version)
    }

    async fn push(&self, remote: &RemoteTarget) -> StoreResult<PushOutcome> {
        if !self.is_initialized() {
            return Ok(PushOutcome::RemoteNotConfigured);
        }
        {
            let repo = self.open_repo()?;
            let remotes = repo.remotes()?;
            if !remotes.iter().flatten().any(|name| name == remote.name) {
                return Ok(PushOutcome::RemoteNotConfigured);
            }
        }

        let workdir = self.workdir.clone();
        let target = remote.clone();
        let limit = self.options.push_timeout;
        let _timing = TimingGuard::push(remote.name.clone());

        tokio::task::spawn_blocking(move || push_blocking(&workdir, &target, limit))
            .await
            .map_err(|e| StoreError::push(remote.name.clone(), e))?
    }

    async fn head(&self) -> StoreResult<Option<Version>> {
        if !self.is_initialized() {
            return Ok(None);
        }
        let repo = self.open_repo()?;
        let head = head_commit(&repo)?;
        Ok(head.as_ref().map(version_from_commit))
    }

    async fn history(&self, limit: usize) -> StoreResult<Vec<Version>> {
        if !self.is_initialized() {
            return Ok(Vec::new());
        }
        let repo = self.open_repo()?;
        if head_commit(&repo)?.is_none() {
            return Ok(Vec::new());
        }

        let mut revwalk = repo.revwalk()?;
        revwalk.push_head()?;
        revwalk.set_sorting(git2::Sort::TOPOLOGICAL)?;

        let mut versions = Vec::new();
        for oid in revwalk.take(limit) {
            let commit = repo.find_commit(oid?)?;
            versions.push(version_from_commit(&commit));
        }
        Ok(versions)
    }

    async fn file_at(
        &self,
        version: &VersionId,
        relative_path: &Path,
    ) -> StoreResult<Option<Vec<u8>>> {
        let relative_path = normalize_relative_path(relative_path)?;
        if !self.is_initialized() {
            return Ok(None);
        }
        let repo = self.open_repo()?;
        let commit = repo.find_commit(git2::Oid::from_str(version.as_str())?)?;
        let tree = commit.tree()?;

        match tree.get_path(&relative_path) {
            Ok(entry) => {
                let blob = repo.find_blob(entry.id())?;
                Ok(Some(blob.content().to_vec()))
            }
            Err(e) if e.code() == ErrorCode::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

fn push_blocking(
    workdir: &Path,
    remote: &RemoteTarget,
    limit: Option<Duration>,
) -> StoreResult<PushOutcome> {
    let deadline = limit.map(|limit| Instant::now() + limit);
    let expired = move || deadline.is_some_and(|deadline| Instant::now() >= deadline);
    let fail = |e: git2::Error| match limit {
        Some(limit) if expired() => StoreError::push_timeout(remote.name.clone(), limit),
        _ => StoreError::push(remote.name.clone(), e.message()),
    };

    if let Some(limit) = limit {
        set_network_timeout(limit);
    }

    let repo = Repository::open(workdir).map_err(fail)?;
    let mut git_remote = repo.find_remote(&remote.name).map_err(fail)?;
    let refspec = format!("refs/heads/{0}:refs/heads/{0}", remote.branch);

    let mut callbacks = git2::RemoteCallbacks::new();
    let mut attempts = 0;
    callbacks.credentials(move |_url, username_from_url, allowed_types| {
        attempts += 1;
        if attempts > MAX_CREDENTIAL_ATTEMPTS {
            return Err(git2::Error::from_str("authentication failed"));
        }
        if expired() {
            return Err(git2::Error::from_str("push deadline passed"));
        }
        // Try SSH agent first
        if allowed_types.contains(git2::CredentialType::SSH_KEY) {
            return git2::Cred::ssh_key_from_agent(username_from_url.unwrap_or("git"));
        }
        git2::Cred::default()
    });
    callbacks.push_negotiation(move |_updates| {
        if expired() {
            return Err(git2::Error::from_str("push deadline passed"));
        }
        Ok(())
    });
    // Returning false cancels the transfer.
    callbacks.sideband_progress(move |_data| !expired());
    callbacks.transfer_progress(move |_progress| !expired());
    callbacks.push_update_reference(|refname, status| match status {
        Some(reason) => Err(git2::Error::from_str(&format!(
            "remote rejected {refname}: {reason}"
        ))),
        None => Ok(()),
    });

    let mut push_opts = git2::PushOptions::new();
    push_opts.remote_callbacks(callbacks);

    git_remote
        .push(&[refspec.as_str()], Some(&mut push_opts))
        .map_err(fail)?;
    Ok(PushOutcome::Pushed)
}

/// Bound socket connect and read calls so a silent server cannot stall a push.
///
/// The setting is process-wide in libgit2; the last push to start wins.
#[allow(unsafe_code)]
fn set_network_timeout(limit: Duration) {
    let millis = i32::try_from(limit.as_millis()).unwrap_or(i32::MAX).max(1);
    // SAFETY: both calls only store an integer that libgit2 reads when it
    // opens a new socket.
    let result = unsafe {
        git2::opts::set_server_connect_timeout_in_milliseconds(millis)
            .and_then(|()| git2::opts::set_server_timeout_in_milliseconds(millis))
    };
    if let Err(e) = result {
        warn!("Could not set git network timeout: {}", e.message());
    }
}

fn head_commit(repo: &Repository) -> Result<Option<git2::Commit<'_>>, git2::Error> {
    match repo.head() {
        Ok(head) => head.peel_to_commit().map(Some),
        Err(e) if e.code() == ErrorCode::UnbornBranch || e.code() == ErrorCode::NotFound => {
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

/// Branch HEAD points at, including an unborn one.
fn current_branch(repo: &Repository) -> Option<String> {
    let head = repo.find_reference("HEAD").ok()?;
    head.symbolic_target()
        .and_then(|target| target.strip_prefix("refs/heads/"))
        .map(|branch| branch.to_string())
}

fn version_from_commit(commit: &git2::Commit) -> Version {
    Version {
        id: VersionId::new(commit.id().to_string()),
        message: commit.message().unwrap_or("").to_string(),
        timestamp: DateTime::<Utc>::from_timestamp(commit.time().seconds(), 0).unwrap_or_default(),
        parent: commit
            .parent_id(0)
            .ok()
            .map(|id| VersionId::new(id.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const BACKUP: &str = "backups/router.cfg";

    fn setup_test_store() -> (TempDir, GitStore) {
        let temp_dir = TempDir::new().unwrap();
        let store = GitStore::open(temp_dir.path()).unwrap();
        (temp_dir, store)
    }

    async fn stage_and_commit(store: &mut GitStore, content: &[u8], message: &str) -> Version {
        store.stage(Path::new(BACKUP), content).await.unwrap();
        store.commit(message).await.unwrap()
    }

    #[test]
    fn open_writes_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let repo_dir = temp_dir.path().join("nested/backups-repo");

        let store = GitStore::open(&repo_dir).unwrap();
        assert!(!store.is_initialized());
        assert!(!repo_dir.exists());
    }

    #[tokio::test]
    async fn first_stage_initializes_repository_on_configured_branch() {
        let temp_dir = TempDir::new().unwrap();
        let repo_dir = temp_dir.path().join("nested/backups-repo");
        let options = GitStoreOptions {
            initial_branch: "backups".to_string(),
            ..Default::default()
        };
        let mut store = GitStore::open_with(&repo_dir, options).unwrap();
        assert!(store.head().await.unwrap().is_none());
        assert!(store.history(5).await.unwrap().is_empty());
        assert!(!store.has_pending_changes().await.unwrap());
        assert!(!repo_dir.exists());

        store.stage(Path::new(BACKUP), b"hostname r1\n").await.unwrap();

        let repo = Repository::open(&repo_dir).unwrap();
        assert_eq!(current_branch(&repo).as_deref(), Some("backups"));
    }

    #[test]
    fn open_fails_when_path_is_a_file() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("not-a-dir");
        fs::write(&file, "x").unwrap();

        let result = GitStore::open(&file);
        assert!(matches!(result, Err(StoreError::RepositoryInit { .. })));
    }

    #[tokio::test]
    async fn reopening_keeps_history() {
        let (temp_dir, mut store) = setup_test_store();
        let first = stage_and_commit(&mut store, b"hostname r1\n", "first").await;

        let reopened = GitStore::open(temp_dir.path()).unwrap();
        let head = reopened.head().await.unwrap().unwrap();
        assert_eq!(head.id, first.id);
    }

    #[tokio::test]
    async fn first_stage_is_pending_even_when_empty() {
        let (_temp_dir, mut store) = setup_test_store();
        assert!(!store.has_pending_changes().await.unwrap());

        store.stage(Path::new(BACKUP), b"").await.unwrap();
        assert!(store.has_pending_changes().await.unwrap());

        let version = store.commit("empty config").await.unwrap();
        assert!(version.parent.is_none());
        assert_eq!(
            store.file_at(&version.id, Path::new(BACKUP)).await.unwrap(),
            Some(Vec::new())
        );
    }

    #[tokio::test]
    async fn identical_content_has_no_pending_changes() {
        let (temp_dir, mut store) = setup_test_store();
        stage_and_commit(&mut store, b"hostname r1\n", "first").await;

        store.stage(Path::new(BACKUP), b"hostname r1\n").await.unwrap();
        assert!(!store.has_pending_changes().await.unwrap());
        assert_eq!(
            fs::read(temp_dir.path().join(BACKUP)).unwrap(),
            b"hostname r1\n"
        );
    }

    #[tokio::test]
    async fn trailing_newline_is_a_change() {
        let (_temp_dir, mut store) = setup_test_store();
        stage_and_commit(&mut store, b"hostname r1", "first").await;

        store.stage(Path::new(BACKUP), b"hostname r1\n").await.unwrap();
        assert!(store.has_pending_changes().await.unwrap());
    }

    #[tokio::test]
    async fn single_byte_change_is_a_change() {
        let (_temp_dir, mut store) = setup_test_store();
        stage_and_commit(&mut store, b"vlan 10", "first").await;

        store.stage(Path::new(BACKUP), b"vlan 11").await.unwrap();
        assert!(store.has_pending_changes().await.unwrap());
    }

    #[tokio::test]
    async fn commit_links_to_previous_head() {
        let (_temp_dir, mut store) = setup_test_store();
        let first = stage_and_commit(&mut store, b"A", "Auto-backup: first").await;
        let second = stage_and_commit(&mut store, b"B", "Auto-backup: second").await;

        assert_eq!(second.parent, Some(first.id.clone()));
        assert_eq!(second.message, "Auto-backup: second");
        assert_eq!(
            store.file_at(&second.id, Path::new(BACKUP)).await.unwrap(),
            Some(b"B".to_vec())
        );
        assert_eq!(
            store.file_at(&first.id, Path::new(BACKUP)).await.unwrap(),
            Some(b"A".to_vec())
        );
    }

    #[tokio::test]
    async fn commit_without_staging_fails() {
        let (_temp_dir, mut store) = setup_test_store();

        let result = store.commit("nothing").await;
        assert!(matches!(result, Err(StoreError::Commit(_))));
    }

    #[tokio::test]
    async fn commit_with_unchanged_content_returns_head() {
        let (_temp_dir, mut store) = setup_test_store();
        let first = stage_and_commit(&mut store, b"A", "first").await;

        let again = stage_and_commit(&mut store, b"A", "second").await;
        assert_eq!(again.id, first.id);
        assert_eq!(store.history(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn history_is_newest_first_and_limited() {
        let (_temp_dir, mut store) = setup_test_store();
        for i in 1..=4 {
            stage_and_commit(&mut store, format!("rev {i}").as_bytes(), &format!("rev {i}")).await;
        }

        let history = store.history(10).await.unwrap();
        let messages: Vec<&str> = history.iter().map(|v| v.message.as_str()).collect();
        assert_eq!(messages, vec!["rev 4", "rev 3", "rev 2", "rev 1"]);

        assert_eq!(store.history(2).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn history_of_empty_repository_is_empty() {
        let (_temp_dir, store) = setup_test_store();
        assert!(store.history(10).await.unwrap().is_empty());
        assert!(store.head().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn stage_rejects_paths_outside_repository() {
        let (_temp_dir, mut store) = setup_test_store();

        let result = store.stage(Path::new("../escape.cfg"), b"x").await;
        assert!(matches!(result, Err(StoreError::InvalidPath(_))));
    }

    #[tokio::test]
    async fn push_without_remote_is_skipped() {
        let (_temp_dir, mut store) = setup_test_store();
        stage_and_commit(&mut store, b"A", "first").await;

        let outcome = store.push(&RemoteTarget::default()).await.unwrap();
        assert_eq!(outcome, PushOutcome::RemoteNotConfigured);
    }

    #[tokio::test]
    async fn push_replicates_branch_to_bare_remote() {
        let (temp_dir, mut store) = setup_test_store();
        let remote_dir = TempDir::new().unwrap();
        let bare = Repository::init_bare(remote_dir.path()).unwrap();
        let version = stage_and_commit(&mut store, b"A", "first").await;
        Repository::open(temp_dir.path())
            .unwrap()
            .remote("origin", remote_dir.path().to_str().unwrap())
            .unwrap();

        let outcome = store.push(&RemoteTarget::default()).await.unwrap();
        assert_eq!(outcome, PushOutcome::Pushed);

        let remote_head = bare.find_reference("refs/heads/main").unwrap();
        assert_eq!(
            remote_head.target().unwrap().to_string(),
            version.id.as_str()
        );
    }

    #[tokio::test]
    async fn push_to_silent_server_gives_up_after_timeout() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        std::thread::spawn(move || {
            let mut held = Vec::new();
            for stream in listener.incoming().flatten() {
                held.push(stream);
            }
        });

        let temp_dir = TempDir::new().unwrap();
        let options = GitStoreOptions {
            push_timeout: Some(Duration::from_millis(300)),
            ..Default::default()
        };
        let mut store = GitStore::open_with(temp_dir.path(), options).unwrap();
        stage_and_commit(&mut store, b"A", "first").await;
        Repository::open(temp_dir.path())
            .unwrap()
            .remote("origin", &format!("git://127.0.0.1:{port}/x.git"))
            .unwrap();

        let started = Instant::now();
        let result = store.push(&RemoteTarget::default()).await;
        assert!(
            matches!(result, Err(StoreError::PushTimeout { ref remote, .. }) if remote == "origin"),
            "{result:?}"
        );
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn push_to_unreachable_remote_fails() {
        let (temp_dir, mut store) = setup_test_store();
        let missing = temp_dir.path().join("no-such-remote.git");
        stage_and_commit(&mut store, b"A", "first").await;
        Repository::open(temp_dir.path())
            .unwrap()
            .remote("origin", missing.to_str().unwrap())
            .unwrap();

        let result = store.push(&RemoteTarget::default()).await;
        assert!(matches!(result, Err(StoreError::Push { .. })));
    }
}
