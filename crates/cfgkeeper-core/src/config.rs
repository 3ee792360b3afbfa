//! Configuration management for cfgkeeper.
//!
//! Configuration is resolved from these sources, later wins:
//! 1. Built-in defaults
//! 2. Config file: `--config <path>`, else `cfgkeeper.jsonc` or `cfgkeeper.json`
//!    in the working directory
//! 3. Environment variables and command line flags, applied as [`ConfigOverrides`]
//!
//! Config files are JSONC (JSON with `//` and `/* */` comments).

use crate::error::{ConfigError, CoreResult};
use cfgkeeper_store::{Author, GitStoreOptions, RemoteTarget};
use cfgkeeper_util::{LogConfig, LogLevel};
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

/// File names looked up in the working directory, in order.
pub const CONFIG_FILE_NAMES: &[&str] = &["cfgkeeper.jsonc", "cfgkeeper.json"];

/// Main configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Where the device configuration is read from.
    pub source: SourceConfig,
    /// Local repository holding the backups.
    pub repository: RepositoryConfig,
    /// Replication target.
    pub remote: RemoteConfig,
    /// What a failed commit does to the exit code.
    pub commit_failure: CommitFailurePolicy,
    /// Log output.
    pub log: LogSettings,
}

/// Configuration source settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub path: PathBuf,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("cisco_running_config.cfg"),
        }
    }
}

/// Repository settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepositoryConfig {
    /// Repository working directory. Created and initialized when absent.
    pub path: PathBuf,
    /// Directory inside the repository that holds the backup file.
    pub backup_dir: PathBuf,
    pub backup_filename: String,
    /// Commit identity used when git config has none.
    pub author_name: String,
    pub author_email: String,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        let author = Author::default();
        Self {
            path: PathBuf::from("."),
            backup_dir: PathBuf::from("backups"),
            backup_filename: "cisco_backup.cfg".to_string(),
            author_name: author.name,
            author_email: author.email,
        }
    }
}

/// Remote settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub name: String,
    pub branch: String,
    /// Upper bound for a single push, in milliseconds.
    pub push_timeout_ms: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        let target = RemoteTarget::default();
        Self {
            name: target.name,
            branch: target.branch,
            push_timeout_ms: 60_000,
        }
    }
}

/// Exit behavior when a commit fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommitFailurePolicy {
    /// Log the failure and exit 0.
    #[default]
    Report,
    /// Log the failure and exit non-zero.
    Fail,
}

impl CommitFailurePolicy {
    /// Parse a policy name.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "report" => Some(Self::Report),
            "fail" => Some(Self::Fail),
            _ => None,
        }
    }
}

/// Log settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    pub dir: PathBuf,
    pub level: LogLevel,
    /// Write the monthly log file in addition to stdout.
    pub file: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("logs"),
            level: LogLevel::Info,
            file: true,
        }
    }
}

/// Values from the environment or command line that replace file settings.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub source_path: Option<PathBuf>,
    pub repository_path: Option<PathBuf>,
    pub backup_dir: Option<PathBuf>,
    pub backup_filename: Option<String>,
    pub remote_name: Option<String>,
    pub branch: Option<String>,
    pub push_timeout_ms: Option<u64>,
    pub commit_failure: Option<CommitFailurePolicy>,
    pub log_dir: Option<PathBuf>,
    pub log_level: Option<LogLevel>,
    pub log_file: Option<bool>,
}

impl Config {
    /// Load configuration.
    ///
    /// An explicit path must exist. Without one, the first of
    /// [`CONFIG_FILE_NAMES`] found in `dir` is used, and built-in defaults
    /// apply when none is. Returns the file that was read, if any.
    pub async fn load(explicit: Option<&Path>, dir: &Path) -> CoreResult<(Self, Option<PathBuf>)> {
        if let Some(path) = explicit {
            if !path.exists() {
                return Err(ConfigError::NotFound {
                    path: path.display().to_string(),
                }
                .into());
            }
            let config = Self::load_file(path).await?;
            return Ok((config, Some(path.to_path_buf())));
        }

        for name in CONFIG_FILE_NAMES {
            let path = dir.join(name);
            if path.exists() {
                let config = Self::load_file(&path).await?;
                tracing::debug!("Loaded config from {}", path.display());
                return Ok((config, Some(path)));
            }
        }

        Ok((Self::default(), None))
    }

    /// Load configuration from a specific file.
    pub async fn load_file(path: &Path) -> CoreResult<Self> {
        let content = tokio::fs::read_to_string(path).await?;
        Self::parse_jsonc(&content, &path.display().to_string())
    }

    /// Parse JSONC (JSON with comments).
    pub fn parse_jsonc(content: &str, source: &str) -> CoreResult<Self> {
        let stripped = strip_comments(content);
        serde_json::from_str(&stripped).map_err(|e| {
            ConfigError::InvalidJson {
                path: source.to_string(),
                message: e.to_string(),
            }
            .into()
        })
    }

    /// Replace every setting the overrides carry.
    pub fn apply(mut self, overrides: ConfigOverrides) -> Self {
        if let Some(path) = overrides.source_path {
            self.source.path = path;
        }
        if let Some(path) = overrides.repository_path {
            self.repository.path = path;
        }
        if let Some(dir) = overrides.backup_dir {
            self.repository.backup_dir = dir;
        }
        if let Some(name) = overrides.backup_filename {
            self.repository.backup_filename = name;
        }
        if let Some(name) = overrides.remote_name {
            self.remote.name = name;
        }
        if let Some(branch) = overrides.branch {
            self.remote.branch = branch;
        }
        if let Some(ms) = overrides.push_timeout_ms {
            self.remote.push_timeout_ms = ms;
        }
        if let Some(policy) = overrides.commit_failure {
            self.commit_failure = policy;
        }
        if let Some(dir) = overrides.log_dir {
            self.log.dir = dir;
        }
        if let Some(level) = overrides.log_level {
            self.log.level = level;
        }
        if let Some(file) = overrides.log_file {
            self.log.file = file;
        }
        self
    }

    /// Check the settings a run depends on.
    pub fn validate(&self) -> CoreResult<()> {
        let filename = &self.repository.backup_filename;
        if filename.trim().is_empty() {
            return Err(ConfigError::validation("backup filename is empty").into());
        }
        if filename.contains(['/', '\\']) || filename == "." || filename == ".." {
            return Err(ConfigError::validation(format!(
                "backup filename '{filename}' must be a plain file name"
            ))
            .into());
        }

        let dir = &self.repository.backup_dir;
        let escapes = dir
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes {
            return Err(ConfigError::validation(format!(
                "backup directory '{}' must be relative to the repository",
                dir.display()
            ))
            .into());
        }

        if self.remote.name.trim().is_empty() {
            return Err(ConfigError::validation("remote name is empty").into());
        }
        if self.remote.branch.trim().is_empty() {
            return Err(ConfigError::validation("remote branch is empty").into());
        }
        if self.remote.push_timeout_ms == 0 {
            return Err(ConfigError::validation("push timeout must be positive").into());
        }
        Ok(())
    }

    /// Backup file path relative to the repository root.
    pub fn backup_relative_path(&self) -> PathBuf {
        self.repository
            .backup_dir
            .join(&self.repository.backup_filename)
    }

    /// Absolute (or cwd-relative) path of the backup file.
    pub fn backup_path(&self) -> PathBuf {
        self.repository.path.join(self.backup_relative_path())
    }

    pub fn remote_target(&self) -> RemoteTarget {
        RemoteTarget::new(&self.remote.name, &self.remote.branch)
    }

    pub fn push_timeout(&self) -> Duration {
        Duration::from_millis(self.remote.push_timeout_ms)
    }

    /// Options for opening the git repository.
    pub fn store_options(&self) -> GitStoreOptions {
        GitStoreOptions {
            initial_branch: self.remote.branch.clone(),
            author: Author {
                name: self.repository.author_name.clone(),
                email: self.repository.author_email.clone(),
            },
            push_timeout: Some(self.push_timeout()),
        }
    }

    /// Logging setup; `verbose` forces debug.
    pub fn log_config(&self, verbose: bool) -> LogConfig {
        LogConfig {
            level: if verbose {
                LogLevel::Debug
            } else {
                self.log.level
            },
            console: true,
            dir: self.log.file.then(|| self.log.dir.clone()),
        }
    }
}

/// Remove `//` and `/* */` comments outside of string literals.
///
/// Newlines inside comments are kept so serde_json error positions still
/// match the input.
fn strip_comments(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    let mut in_string = false;

    while let Some(c) = chars.next() {
        if in_string {
            out.push(c);
            match c {
                '\\' => {
                    if let Some(escaped) = chars.next() {
                        out.push(escaped);
                    }
                }
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match (c, chars.peek()) {
            ('"', _) => {
                in_string = true;
                out.push(c);
            }
            ('/', Some('/')) => {
                for skipped in chars.by_ref() {
                    if skipped == '\n' {
                        out.push('\n');
                        break;
                    }
                }
            }
            ('/', Some('*')) => {
                chars.next();
                let mut prev = '\0';
                for skipped in chars.by_ref() {
                    if prev == '*' && skipped == '/' {
                        break;
                    }
                    if skipped == '\n' {
                        out.push('\n');
                    }
                    prev = skipped;
                }
            }
            _ => out.push(c),
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults_match_the_backup_script_layout() {
        let config = Config::default();
        assert_eq!(config.source.path, PathBuf::from("cisco_running_config.cfg"));
        assert_eq!(
            config.backup_relative_path(),
            PathBuf::from("backups/cisco_backup.cfg")
        );
        assert_eq!(config.remote_target(), RemoteTarget::new("origin", "main"));
        assert_eq!(config.push_timeout(), Duration::from_secs(60));
        assert_eq!(config.commit_failure, CommitFailurePolicy::Report);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn parse_jsonc_with_comments() {
        let content = r#"{
            // device export
            "source": { "path": "/srv/export/r1.cfg" },
            /* where backups live */
            "repository": { "path": "/srv/backups", "backup_filename": "r1.cfg" },
            "remote": { "branch": "trunk" },
            "commit_failure": "fail"
        }"#;
        let config = Config::parse_jsonc(content, "test").unwrap();

        assert_eq!(config.source.path, PathBuf::from("/srv/export/r1.cfg"));
        assert_eq!(config.backup_path(), PathBuf::from("/srv/backups/backups/r1.cfg"));
        assert_eq!(config.remote.name, "origin");
        assert_eq!(config.remote.branch, "trunk");
        assert_eq!(config.commit_failure, CommitFailurePolicy::Fail);
    }

    #[test]
    fn comment_markers_inside_strings_are_kept() {
        let content = r#"{ "source": { "path": "//host/share/r1.cfg" }, "log": { "dir": "/* logs */" } }"#;
        let config = Config::parse_jsonc(content, "test").unwrap();
        assert_eq!(config.source.path, PathBuf::from("//host/share/r1.cfg"));
        assert_eq!(config.log.dir, PathBuf::from("/* logs */"));
    }

    #[test]
    fn escaped_quotes_do_not_end_strings() {
        let content = r#"{ "repository": { "author_name": "ops \"// team\"" } }"#;
        let config = Config::parse_jsonc(content, "test").unwrap();
        assert_eq!(config.repository.author_name, "ops \"// team\"");
    }

    #[test]
    fn invalid_json_names_the_source() {
        let err = Config::parse_jsonc("{ not json", "cfgkeeper.jsonc").unwrap_err();
        assert!(err.to_string().contains("cfgkeeper.jsonc"));
    }

    #[test]
    fn overrides_replace_file_values() {
        let config = Config::default().apply(ConfigOverrides {
            source_path: Some(PathBuf::from("r2.cfg")),
            repository_path: Some(PathBuf::from("/tmp/repo")),
            remote_name: Some("backup".to_string()),
            push_timeout_ms: Some(500),
            commit_failure: Some(CommitFailurePolicy::Fail),
            log_file: Some(false),
            ..Default::default()
        });

        assert_eq!(config.source.path, PathBuf::from("r2.cfg"));
        assert_eq!(config.repository.path, PathBuf::from("/tmp/repo"));
        assert_eq!(config.remote.name, "backup");
        assert_eq!(config.remote.branch, "main");
        assert_eq!(config.push_timeout(), Duration::from_millis(500));
        assert_eq!(config.commit_failure, CommitFailurePolicy::Fail);
        assert!(config.log_config(false).dir.is_none());
    }

    #[test]
    fn verbose_forces_debug() {
        let config = Config::default();
        assert_eq!(config.log_config(true).level, LogLevel::Debug);
        assert_eq!(config.log_config(false).level, LogLevel::Info);
        assert_eq!(config.log_config(false).dir, Some(PathBuf::from("logs")));
    }

    #[test]
    fn validation_rejects_unusable_settings() {
        let mut config = Config::default();
        config.repository.backup_filename = "nested/r1.cfg".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.repository.backup_filename = "  ".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.repository.backup_dir = PathBuf::from("../outside");
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.repository.backup_dir = PathBuf::from("/abs");
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.remote.branch = String::new();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.remote.push_timeout_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn store_options_follow_branch_and_author() {
        let mut config = Config::default();
        config.remote.branch = "trunk".to_string();
        config.repository.author_name = "netops".to_string();

        let options = config.store_options();
        assert_eq!(options.initial_branch, "trunk");
        assert_eq!(options.author.name, "netops");
        assert_eq!(options.push_timeout, Some(Duration::from_millis(60_000)));
    }

    #[test]
    fn policy_parse() {
        assert_eq!(CommitFailurePolicy::parse("FAIL"), Some(CommitFailurePolicy::Fail));
        assert_eq!(CommitFailurePolicy::parse("report"), Some(CommitFailurePolicy::Report));
        assert_eq!(CommitFailurePolicy::parse("ignore"), None);
    }

    #[tokio::test]
    async fn load_prefers_jsonc_in_directory() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("cfgkeeper.jsonc"),
            r#"{ "remote": { "name": "jsonc" } }"#,
        )
        .unwrap();
        std::fs::write(
            dir.path().join("cfgkeeper.json"),
            r#"{ "remote": { "name": "json" } }"#,
        )
        .unwrap();

        let (config, source) = Config::load(None, dir.path()).await.unwrap();
        assert_eq!(config.remote.name, "jsonc");
        assert_eq!(source, Some(dir.path().join("cfgkeeper.jsonc")));
    }

    #[tokio::test]
    async fn load_without_files_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let (config, source) = Config::load(None, dir.path()).await.unwrap();
        assert_eq!(config, Config::default());
        assert!(source.is_none());
    }

    #[tokio::test]
    async fn explicit_missing_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope.jsonc");
        let err = Config::load(Some(&missing), dir.path()).await.unwrap_err();
        assert!(err.to_string().contains("config file not found"));
    }
}
