//! Shared utilities for cfgkeeper.
//!
//! - Logging setup with tracing (console plus a monthly log file)
//! - RAII-based timing for slow I/O steps (device fetch, remote push)

pub mod log;
pub mod timing;

pub use log::{LogConfig, LogLevel};
pub use timing::TimingGuard;
