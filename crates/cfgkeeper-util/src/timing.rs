//! RAII-based timing for the slow steps of a backup run.
//!
//! ```rust,ignore
//! use cfgkeeper_util::TimingGuard;
//!
//! let _timing = TimingGuard::push("origin");
//! // ... push ...
//! // Duration is logged when _timing is dropped
//! ```

use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// RAII guard that logs the elapsed time of an operation when dropped.
pub struct TimingGuard {
    /// Kind of operation (e.g. "fetch", "push").
    operation: &'static str,
    /// What the operation acted on (source path, remote name).
    target: String,
    start: Instant,
    /// Durations at or above this are logged at info level.
    info_threshold: Duration,
    /// Durations at or above this are logged as slow.
    warn_threshold: Duration,
}

impl TimingGuard {
    pub fn new(operation: &'static str, target: impl Into<String>) -> Self {
        Self {
            operation,
            target: target.into(),
            start: Instant::now(),
            info_threshold: Duration::from_millis(500),
            warn_threshold: Duration::from_secs(10),
        }
    }

    /// Timing guard for reading a configuration source.
    pub fn fetch(source: impl Into<String>) -> Self {
        Self::new("fetch", source)
    }

    /// Timing guard for replicating to a remote.
    pub fn push(remote: impl Into<String>) -> Self {
        Self::new("push", remote)
    }

    pub fn with_info_threshold(mut self, threshold: Duration) -> Self {
        self.info_threshold = threshold;
        self
    }

    pub fn with_warn_threshold(mut self, threshold: Duration) -> Self {
        self.warn_threshold = threshold;
        self
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Drop for TimingGuard {
    fn drop(&mut self) {
        let elapsed = self.start.elapsed();
        let duration_ms = elapsed.as_millis() as u64;

        if elapsed >= self.warn_threshold {
            warn!(
                operation = self.operation,
                target_name = %self.target,
                duration_ms,
                "Slow operation completed"
            );
        } else if elapsed >= self.info_threshold {
            info!(
                operation = self.operation,
                target_name = %self.target,
                duration_ms,
                "Operation completed"
            );
        } else {
            debug!(
                operation = self.operation,
                target_name = %self.target,
                duration_ms,
                "Operation completed"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn test_timing_guard_measures_elapsed() {
        let guard = TimingGuard::fetch("running-config.cfg");
        sleep(Duration::from_millis(10));
        assert!(guard.elapsed() >= Duration::from_millis(10));
    }

    #[test]
    fn test_timing_guard_thresholds() {
        let guard = TimingGuard::push("origin")
            .with_info_threshold(Duration::from_millis(1))
            .with_warn_threshold(Duration::from_millis(5));
        sleep(Duration::from_millis(6));
        drop(guard);
    }
}
