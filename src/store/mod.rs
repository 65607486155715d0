//! Corpus storage: documents, annotations and the corpus marker
//!
//! The engine talks to storage only through the traits below. A
//! `DocumentCommit` carries the rewritten content together with every
//! annotation reference update for that document, and `commit_migration`
//! applies it as one unit or not at all.

mod checksum;
mod errors;
mod file;
mod memory;
mod record;
mod state;

pub use checksum::{compute_checksum, compute_checksum_parts};
pub use errors::{Severity, StoreError, StoreErrorCode, StoreResult};
pub use file::{FileStore, CORPUS_FILE};
pub use memory::MemoryStore;
pub use record::{
    contains_block_markup, AnnotationId, AnnotationRecord, BlockReference, CommitReceipt,
    Document, DocumentCommit, DocumentId, LegacyAddress, ReferenceUpdate, StoreEntry,
};
pub use state::CorpusState;

/// Read access to stored documents.
pub trait DocumentStore: Send + Sync {
    /// Ids of every document containing block markup, ascending.
    ///
    /// Failure here means the corpus cannot be enumerated at all.
    fn list_block_documents(&self) -> StoreResult<Vec<DocumentId>>;

    fn read_document(&self, id: DocumentId) -> StoreResult<Document>;
}

/// Read access to annotation records.
pub trait AnnotationStore: Send + Sync {
    fn annotations_for(&self, document_id: DocumentId) -> StoreResult<Vec<AnnotationRecord>>;
}

/// Everything the migration needs from storage.
pub trait CorpusStore: DocumentStore + AnnotationStore {
    /// Apply content, reference updates and the per-document marker
    /// atomically.
    ///
    /// Rejected with `BLOCKMARK_STORE_CONFLICT` if the stored content no
    /// longer matches `expected_checksum` or any annotation no longer has
    /// its expected `from` reference.
    fn commit_migration(&self, commit: &DocumentCommit) -> StoreResult<()>;

    /// Receipt of the latest migration commit for `document_id`, if the
    /// document was not edited since.
    fn commit_receipt(&self, document_id: DocumentId) -> StoreResult<Option<CommitReceipt>>;

    /// Counter bumped by every outside document or annotation write.
    /// Migration commits and the corpus marker leave it alone.
    fn edit_generation(&self) -> StoreResult<u64>;

    /// Corpus-wide migration marker, 0 if never set or reset by an edit.
    fn corpus_migration_version(&self) -> StoreResult<u32>;

    fn set_corpus_migration_version(&self, version: u32) -> StoreResult<()>;

    /// Set the marker only if no outside edit happened since
    /// `expected_generation` was read. Returns whether it was set.
    fn mark_corpus_migrated(&self, version: u32, expected_generation: u64) -> StoreResult<bool>;
}
