//! Mock implementations for testing.
//!
//! Provides [`SnapshotSource`] doubles so orchestration can be tested without
//! a device export on disk.

use async_trait::async_trait;
use cfgkeeper_snapshot::{Snapshot, SnapshotError, SnapshotResult, SnapshotSource};
use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// One scripted fetch result.
#[derive(Debug, Clone)]
enum Step {
    Content(Vec<u8>),
    Fail(io::ErrorKind),
}

/// A source that returns a scripted sequence of results.
///
/// Each fetch takes the next step; once the script runs out the last step
/// repeats, so an unchanged device is just a one-element script.
///
/// # Example
///
/// ```rust,ignore
/// let source = ScriptedSource::new(["hostname r1\n", "hostname r2\n"]);
/// assert_eq!(source.fetch().await?.content(), b"hostname r1\n");
/// assert_eq!(source.fetch().await?.content(), b"hostname r2\n");
/// assert_eq!(source.fetch().await?.content(), b"hostname r2\n");
/// ```
#[derive(Clone)]
pub struct ScriptedSource {
    id: String,
    steps: Arc<Mutex<VecDeque<Step>>>,
    last: Arc<Mutex<Option<Step>>>,
    fetches: Arc<AtomicUsize>,
}

impl ScriptedSource {
    /// Create a source returning each item in turn.
    pub fn new<I, C>(contents: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: AsRef<[u8]>,
    {
        let steps = contents
            .into_iter()
            .map(|c| Step::Content(c.as_ref().to_vec()))
            .collect();
        Self {
            id: "scripted://device".to_string(),
            steps: Arc::new(Mutex::new(steps)),
            last: Arc::new(Mutex::new(None)),
            fetches: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Create a source whose every fetch fails with `kind`.
    pub fn failing(kind: io::ErrorKind) -> Self {
        Self::new(Vec::<Vec<u8>>::new()).then_fail(kind)
    }

    /// Append a failing step to the script.
    pub fn then_fail(self, kind: io::ErrorKind) -> Self {
        self.steps
            .lock()
            .expect("script lock poisoned")
            .push_back(Step::Fail(kind));
        self
    }

    /// Append a content step to the script.
    pub fn then(self, content: impl AsRef<[u8]>) -> Self {
        self.steps
            .lock()
            .expect("script lock poisoned")
            .push_back(Step::Content(content.as_ref().to_vec()));
        self
    }

    /// Set the identifier reported by [`SnapshotSource::id`].
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Number of fetches performed so far.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    fn next_step(&self) -> Option<Step> {
        let mut last = self.last.lock().expect("script lock poisoned");
        if let Some(step) = self.steps.lock().expect("script lock poisoned").pop_front() {
            *last = Some(step);
        }
        last.clone()
    }
}

#[async_trait]
impl SnapshotSource for ScriptedSource {
    fn id(&self) -> String {
        self.id.clone()
    }

    async fn fetch(&self) -> SnapshotResult<Snapshot> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        match self.next_step() {
            Some(Step::Content(content)) => Ok(Snapshot::new(self.id.clone(), content)),
            Some(Step::Fail(kind)) => Err(SnapshotError::unavailable(
                self.id.clone(),
                io::Error::new(kind, "scripted failure"),
            )),
            None => Err(SnapshotError::unavailable(
                self.id.clone(),
                io::Error::new(io::ErrorKind::NotFound, "script is empty"),
            )),
        }
    }
}
