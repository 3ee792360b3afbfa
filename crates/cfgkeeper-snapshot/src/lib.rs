//! Configuration snapshots for cfgkeeper.
//!
//! A [`SnapshotSource`] produces the current configuration of a device as an
//! opaque byte sequence. The shipped adapter, [`FileSource`], reads a file that
//! stands in for the device's running configuration.
//!
//! # Example
//!
//! ```no_run
//! use cfgkeeper_snapshot::{FileSource, SnapshotSource};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let source = FileSource::new("cisco_running_config.cfg");
//! let snapshot = source.fetch().await?;
//! println!("{} bytes from {}", snapshot.len(), snapshot.source_id());
//! # Ok(())
//! # }
//! ```

mod error;
mod snapshot;
mod source;

pub use error::{SnapshotError, SnapshotResult, UnavailableReason};
pub use snapshot::Snapshot;
pub use source::{FileSource, SnapshotSource};
