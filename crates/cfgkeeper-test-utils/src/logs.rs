//! Log capture for asserting on tracing output.
//!
//! [`LogCapture::install`] sets a thread-local subscriber that writes plain
//! text into a shared buffer. It works with `#[tokio::test]` because the
//! default test runtime is single-threaded.

use std::io;
use std::sync::{Arc, Mutex};
use tracing::subscriber::DefaultGuard;

/// Shared buffer receiving formatted log lines.
#[derive(Clone, Default)]
pub struct LogCapture {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl LogCapture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route this thread's tracing output into the buffer until the guard drops.
    pub fn install(&self) -> DefaultGuard {
        let buffer = self.buffer.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || CaptureWriter(buffer.clone()))
            .with_ansi(false)
            .with_max_level(tracing::Level::DEBUG)
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    /// Everything captured so far.
    pub fn contents(&self) -> String {
        let buffer = self.buffer.lock().expect("log buffer poisoned");
        String::from_utf8_lossy(&buffer).into_owned()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.contents().contains(needle)
    }

    /// Number of captured lines containing `needle`.
    pub fn count(&self, needle: &str) -> usize {
        self.contents()
            .lines()
            .filter(|line| line.contains(needle))
            .count()
    }
}

struct CaptureWriter(Arc<Mutex<Vec<u8>>>);

impl io::Write for CaptureWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut buffer = self
            .0
            .lock()
            .map_err(|_| io::Error::other("log buffer poisoned"))?;
        buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn captures_events_while_installed() {
        let logs = LogCapture::new();
        {
            let _guard = logs.install();
            tracing::info!("Push successful.");
            tracing::debug!("detail");
        }
        tracing::info!("after guard");

        assert!(logs.contains("Push successful."));
        assert!(logs.contains("detail"));
        assert!(!logs.contains("after guard"));
        assert_eq!(logs.count("INFO"), 1);
    }
}
