//! In-memory corpus store
//!
//! Used by tests and by callers embedding the engine over their own
//! storage. Commits are atomic under the state lock. Fault injection hooks
//! let tests exercise write failures and an unreachable store.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, RwLock};

use super::errors::{StoreError, StoreResult};
use super::record::{
    AnnotationId, AnnotationRecord, CommitReceipt, Document, DocumentCommit, DocumentId,
    StoreEntry,
};
use super::state::CorpusState;
use super::{AnnotationStore, CorpusStore, DocumentStore};

/// Thread-safe in-memory store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<CorpusState>,
    failing_documents: Mutex<HashSet<DocumentId>>,
    unavailable: AtomicBool,
    commits: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a document (an outside edit).
    pub fn put_document(&self, document: Document) {
        self.write_state().apply(StoreEntry::PutDocument { document });
    }

    /// Insert or replace an annotation.
    pub fn put_annotation(&self, annotation: AnnotationRecord) {
        self.write_state().apply(StoreEntry::PutAnnotation { annotation });
    }

    /// Make every future commit for `document_id` fail.
    pub fn fail_commits_for(&self, document_id: DocumentId) {
        self.failing_documents
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(document_id);
    }

    /// Simulate an unreachable store.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of successful commits, for asserting "zero writes".
    pub fn commit_count(&self) -> u64 {
        self.commits.load(Ordering::SeqCst)
    }

    pub fn document(&self, id: DocumentId) -> Option<Document> {
        self.read_state().document(id).ok()
    }

    pub fn annotation(&self, id: AnnotationId) -> Option<AnnotationRecord> {
        self.read_state().annotation(id).ok()
    }

    fn read_state(&self) -> std::sync::RwLockReadGuard<'_, CorpusState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_state(&self) -> std::sync::RwLockWriteGuard<'_, CorpusState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    fn check_available(&self) -> StoreResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::unavailable("Memory store marked unavailable"));
        }
        Ok(())
    }
}

impl DocumentStore for MemoryStore {
    fn list_block_documents(&self) -> StoreResult<Vec<DocumentId>> {
        self.check_available()?;
        Ok(self.read_state().block_document_ids())
    }

    fn read_document(&self, id: DocumentId) -> StoreResult<Document> {
        self.check_available()?;
        self.read_state().document(id)
    }
}

impl AnnotationStore for MemoryStore {
    fn annotations_for(&self, document_id: DocumentId) -> StoreResult<Vec<AnnotationRecord>> {
        self.check_available()?;
        Ok(self.read_state().annotations_for(document_id))
    }
}

impl CorpusStore for MemoryStore {
    fn commit_migration(&self, commit: &DocumentCommit) -> StoreResult<()> {
        self.check_available()?;
        let failing = self
            .failing_documents
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&commit.document_id);
        if failing {
            return Err(StoreError::write_rejected(format!(
                "Commit rejected for document {}",
                commit.document_id
            )));
        }

        let mut state = self.write_state();
        state.validate_commit(commit)?;
        state.apply(StoreEntry::Commit {
            commit: commit.clone(),
        });
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn commit_receipt(&self, document_id: DocumentId) -> StoreResult<Option<CommitReceipt>> {
        self.check_available()?;
        Ok(self.read_state().receipt(document_id))
    }

    fn edit_generation(&self) -> StoreResult<u64> {
        self.check_available()?;
        Ok(self.read_state().edit_generation())
    }

    fn corpus_migration_version(&self) -> StoreResult<u32> {
        self.check_available()?;
        Ok(self.read_state().corpus_version())
    }

    fn set_corpus_migration_version(&self, version: u32) -> StoreResult<()> {
        self.check_available()?;
        self.write_state()
            .apply(StoreEntry::CorpusVersion { version });
        Ok(())
    }

    fn mark_corpus_migrated(&self, version: u32, expected_generation: u64) -> StoreResult<bool> {
        self.check_available()?;
        let mut state = self.write_state();
        if state.edit_generation() != expected_generation {
            return Ok(false);
        }
        state.apply(StoreEntry::CorpusVersion { version });
        Ok(true)
    }
}
