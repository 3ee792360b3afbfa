//! Snapshot sources.

use crate::{Snapshot, SnapshotError, SnapshotResult};
use async_trait::async_trait;
use cfgkeeper_util::TimingGuard;
use std::path::PathBuf;
use tracing::{error, info};

/// Something that can produce the current configuration content.
///
/// Implementations read once per call and never retry.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// Logical identifier of the source, used in logs and errors.
    fn id(&self) -> String;

    /// Capture the current content.
    async fn fetch(&self) -> SnapshotResult<Snapshot>;
}

/// Reads the configuration from a file on disk.
///
/// Stands in for a device driver: the file holds what `show running-config`
/// would return.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl SnapshotSource for FileSource {
    fn id(&self) -> String {
        self.path.display().to_string()
    }

    async fn fetch(&self) -> SnapshotResult<Snapshot> {
        let source_id = self.id();
        info!("Connecting to device source: {}...", source_id);
        let _timing = TimingGuard::fetch(source_id.clone());

        match tokio::fs::read(&self.path).await {
            Ok(content) => {
                let snapshot = Snapshot::new(source_id, content);
                info!(
                    bytes = snapshot.len(),
                    digest = %snapshot.digest(),
                    "Configuration retrieved successfully."
                );
                Ok(snapshot)
            }
            Err(e) => {
                let err = SnapshotError::unavailable(source_id, e);
                error!("Error retrieving config: {}", err);
                Err(err)
            }
        }
    }
}
