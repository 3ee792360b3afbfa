//! Test fixtures for creating reproducible backup environments.
//!
//! A [`BackupFixture`] is a temporary directory laid out like a backup host:
//!
//! ```text
//! <root>/device/running.cfg   the configuration export
//! <root>/repo/                the backup repository
//! <root>/remote.git/          a bare repository standing in for the remote
//! ```

use git2::{Repository, RepositoryInitOptions};
use std::fs;
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A temporary backup host, removed when dropped.
///
/// # Example
///
/// ```rust
/// use cfgkeeper_test_utils::fixtures::BackupFixture;
///
/// let fixture = BackupFixture::new().with_source("hostname r1\n");
/// assert!(fixture.source_path().exists());
/// assert!(!fixture.repo_path().join(".git").exists());
/// ```
pub struct BackupFixture {
    temp_dir: TempDir,
}

impl BackupFixture {
    /// Create an empty fixture: no export, no repository.
    pub fn new() -> Self {
        Self {
            temp_dir: TempDir::new().expect("Failed to create temp directory"),
        }
    }

    /// Write the device export.
    pub fn with_source(self, content: impl AsRef<[u8]>) -> Self {
        self.write_source(content);
        self
    }

    /// Initialize the backup repository on `branch` and register a bare
    /// repository as remote `name`.
    pub fn with_bare_remote(self, name: &str, branch: &str) -> Self {
        let bare = self.remote_path();
        Repository::init_bare(&bare)
            .unwrap_or_else(|e| panic!("Failed to init bare repo {}: {}", bare.display(), e));
        let url = bare.to_string_lossy().into_owned();
        self.with_remote_url(name, branch, &url)
    }

    /// Initialize the backup repository on `branch` and register `url` as
    /// remote `name`.
    pub fn with_remote_url(self, name: &str, branch: &str, url: &str) -> Self {
        let repo = init_repo(&self.repo_path(), branch);
        repo.remote(name, url)
            .unwrap_or_else(|e| panic!("Failed to add remote {name}: {e}"));
        self
    }

    /// Initialize the backup repository on `branch` without any remote.
    pub fn with_repo(self, branch: &str) -> Self {
        init_repo(&self.repo_path(), branch);
        self
    }

    /// Root of the fixture.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn source_path(&self) -> PathBuf {
        self.path().join("device").join("running.cfg")
    }

    pub fn repo_path(&self) -> PathBuf {
        self.path().join("repo")
    }

    fn remote_path(&self) -> PathBuf {
        self.path().join("remote.git")
    }

    /// Replace the device export.
    pub fn write_source(&self, content: impl AsRef<[u8]>) {
        let path = self.source_path();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap_or_else(|e| {
                panic!("Failed to create directory {}: {}", parent.display(), e)
            });
        }
        fs::write(&path, content)
            .unwrap_or_else(|e| panic!("Failed to write file {}: {}", path.display(), e));
    }

    /// Read a file from the repository working tree.
    pub fn read_repo_file(&self, relative: impl AsRef<Path>) -> Option<Vec<u8>> {
        fs::read(self.repo_path().join(relative)).ok()
    }

    /// Number of commits reachable from HEAD of the backup repository.
    pub fn commit_count(&self) -> usize {
        let Ok(repo) = Repository::open(self.repo_path()) else {
            return 0;
        };
        count_commits(&repo, "HEAD")
    }

    /// Commit id the bare remote holds for `branch`.
    pub fn remote_tip(&self, branch: &str) -> Option<String> {
        let repo = Repository::open_bare(self.remote_path()).ok()?;
        let reference = repo.find_reference(&format!("refs/heads/{branch}")).ok()?;
        reference.target().map(|oid| oid.to_string())
    }

    /// Commit id HEAD of the backup repository points to.
    pub fn head_id(&self) -> Option<String> {
        let repo = Repository::open(self.repo_path()).ok()?;
        let head = repo.head().ok()?;
        head.target().map(|oid| oid.to_string())
    }
}

impl Default for BackupFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// A `git://` URL served by a listener that accepts connections and never
/// answers. The listener lives until the test process exits.
pub fn unresponsive_remote_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind listener");
    let port = listener
        .local_addr()
        .expect("Listener has no address")
        .port();
    std::thread::spawn(move || {
        let mut held = Vec::new();
        for stream in listener.incoming().flatten() {
            held.push(stream);
        }
    });
    format!("git://127.0.0.1:{port}/backups.git")
}

fn init_repo(path: &Path, branch: &str) -> Repository {
    let mut opts = RepositoryInitOptions::new();
    opts.initial_head(branch).mkpath(true);
    Repository::init_opts(path, &opts)
        .unwrap_or_else(|e| panic!("Failed to init repo {}: {}", path.display(), e))
}

fn count_commits(repo: &Repository, reference: &str) -> usize {
    let Ok(mut walk) = repo.revwalk() else {
        return 0;
    };
    if walk.push_ref(reference).is_err() {
        return 0;
    }
    walk.count()
}
