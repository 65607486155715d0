//! Cancellation and progress reporting

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use serde::Serialize;

use super::state::OrchestratorState;

/// Cooperative cancellation, checked between chunks.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Progress of the current or last migration run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProgressSnapshot {
    pub job_id: Option<String>,
    pub state: OrchestratorState,
    pub processed: usize,
    pub total: usize,
    pub updated_posts: usize,
    pub updated_blocks: usize,
    pub updated_markings: usize,
    pub errors: usize,
}

/// Receives progress while a migration runs.
pub trait ProgressSink: Send + Sync {
    /// Called after every document, success or failure.
    fn document_done(&self, processed: usize, total: usize);

    /// Called after every chunk with the job's running totals.
    fn chunk_done(&self, snapshot: &ProgressSnapshot);
}

/// Discards progress.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn document_done(&self, _processed: usize, _total: usize) {}

    fn chunk_done(&self, _snapshot: &ProgressSnapshot) {}
}

/// Keeps the latest snapshot for polling, e.g. from the HTTP surface.
#[derive(Debug, Clone, Default)]
pub struct SharedProgress(Arc<Mutex<ProgressSnapshot>>);

impl SharedProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn latest(&self) -> ProgressSnapshot {
        self.0.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl ProgressSink for SharedProgress {
    fn document_done(&self, processed: usize, total: usize) {
        let mut latest = self.0.lock().unwrap_or_else(|e| e.into_inner());
        latest.processed = processed;
        latest.total = total;
    }

    fn chunk_done(&self, snapshot: &ProgressSnapshot) {
        *self.0.lock().unwrap_or_else(|e| e.into_inner()) = snapshot.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancellation_is_shared_between_clones() {
        let token = CancellationToken::new();
        let observer = token.clone();
        assert!(!observer.is_cancelled());
        token.cancel();
        assert!(observer.is_cancelled());
    }

    #[test]
    fn test_shared_progress_tracks_latest() {
        let progress = SharedProgress::new();
        progress.document_done(3, 10);
        assert_eq!(progress.latest().processed, 3);
        assert_eq!(progress.latest().total, 10);

        let snapshot = ProgressSnapshot {
            processed: 10,
            total: 10,
            updated_posts: 9,
            errors: 1,
            ..Default::default()
        };
        progress.chunk_done(&snapshot);
        assert_eq!(progress.latest(), snapshot);
    }
}
