//! Migration counters
//!
//! Monotonic counters only, relaxed atomics. A registry lives as long as
//! the orchestrator that owns it.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

#[derive(Debug, Default)]
pub struct MetricsRegistry {
    documents_scanned: AtomicU64,
    blocks_scanned: AtomicU64,
    documents_migrated: AtomicU64,
    documents_failed: AtomicU64,
    ids_issued: AtomicU64,
    id_collisions: AtomicU64,
    markings_updated: AtomicU64,
    chunks_completed: AtomicU64,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_documents_scanned(&self, n: u64) {
        self.documents_scanned.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_blocks_scanned(&self, n: u64) {
        self.blocks_scanned.fetch_add(n, Ordering::Relaxed);
    }

    pub fn increment_documents_migrated(&self) {
        self.documents_migrated.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_documents_failed(&self) {
        self.documents_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_ids_issued(&self, n: u64) {
        self.ids_issued.fetch_add(n, Ordering::Relaxed);
    }

    pub fn increment_id_collisions(&self) {
        self.id_collisions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_markings_updated(&self, n: u64) {
        self.markings_updated.fetch_add(n, Ordering::Relaxed);
    }

    pub fn increment_chunks_completed(&self) {
        self.chunks_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            documents_scanned: self.documents_scanned.load(Ordering::Relaxed),
            blocks_scanned: self.blocks_scanned.load(Ordering::Relaxed),
            documents_migrated: self.documents_migrated.load(Ordering::Relaxed),
            documents_failed: self.documents_failed.load(Ordering::Relaxed),
            ids_issued: self.ids_issued.load(Ordering::Relaxed),
            id_collisions: self.id_collisions.load(Ordering::Relaxed),
            markings_updated: self.markings_updated.load(Ordering::Relaxed),
            chunks_completed: self.chunks_completed.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of every counter
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub documents_scanned: u64,
    pub blocks_scanned: u64,
    pub documents_migrated: u64,
    pub documents_failed: u64,
    pub ids_issued: u64,
    pub id_collisions: u64,
    pub markings_updated: u64,
    pub chunks_completed: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_new_registry_is_zero() {
        assert_eq!(MetricsRegistry::new().snapshot(), MetricsSnapshot::default());
    }

    #[test]
    fn test_counters_accumulate() {
        let registry = MetricsRegistry::new();
        registry.add_ids_issued(3);
        registry.add_ids_issued(2);
        registry.increment_id_collisions();
        registry.add_markings_updated(4);
        let snapshot = registry.snapshot();
        assert_eq!(snapshot.ids_issued, 5);
        assert_eq!(snapshot.id_collisions, 1);
        assert_eq!(snapshot.markings_updated, 4);
    }

    #[test]
    fn test_concurrent_increments() {
        let registry = Arc::new(MetricsRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || {
                    for _ in 0..50 {
                        registry.increment_documents_migrated();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(registry.snapshot().documents_migrated, 400);
    }
}
