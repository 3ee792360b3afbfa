//! Snapshot data structure.

use chrono::{DateTime, Local};
use sha2::{Digest, Sha256};

/// The configuration content captured from a source at a point in time.
///
/// Content is kept as raw bytes; nothing is decoded or normalized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    content: Vec<u8>,
    source_id: String,
    captured_at: DateTime<Local>,
}

impl Snapshot {
    /// Create a snapshot captured now.
    pub fn new(source_id: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self::captured_at(source_id, content, Local::now())
    }

    pub fn captured_at(
        source_id: impl Into<String>,
        content: impl Into<Vec<u8>>,
        captured_at: DateTime<Local>,
    ) -> Self {
        Self {
            content: content.into(),
            source_id: source_id.into(),
            captured_at,
        }
    }

    pub fn content(&self) -> &[u8] {
        &self.content
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    pub fn timestamp(&self) -> DateTime<Local> {
        self.captured_at
    }

    pub fn len(&self) -> usize {
        self.content.len()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    /// SHA-256 of the content, hex encoded. For log lines only.
    pub fn digest(&self) -> String {
        format!("{:x}", Sha256::digest(&self.content))
    }
}
