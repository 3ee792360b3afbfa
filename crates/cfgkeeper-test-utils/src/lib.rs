//! Testing utilities, fixtures, and mocks for cfgkeeper.
//!
//! - **Fixtures**: a temporary backup host with a device export, a repository
//!   and a bare remote, plus a remote that never answers
//! - **Mocks**: scripted [`SnapshotSource`](cfgkeeper_snapshot::SnapshotSource)
//!   implementations
//! - **Logs**: a scoped tracing subscriber for asserting on log output
//!
//! # Example Usage
//!
//! ```rust,ignore
//! use cfgkeeper_test_utils::{fixtures::BackupFixture, logs::LogCapture};
//!
//! #[tokio::test]
//! async fn test_backup() {
//!     let logs = LogCapture::new();
//!     let _guard = logs.install();
//!     let fixture = BackupFixture::new()
//!         .with_source("hostname r1\n")
//!         .with_bare_remote("origin", "main");
//!
//!     // Run a backup against fixture.source_path() and fixture.repo_path()
//!     assert!(logs.contains("Push successful."));
//! }
//! ```

pub mod fixtures;
pub mod logs;
pub mod mocks;

pub use fixtures::{unresponsive_remote_url, BackupFixture};
pub use logs::LogCapture;
pub use mocks::ScriptedSource;
