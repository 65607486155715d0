//! File-backed corpus store
//!
//! All state lives in `<data_dir>/data/corpus.dat` as an append-only
//! sequence of checksummed frames (see `record`). On open the file is
//! replayed into a `CorpusState`; the latest record for a key wins.
//!
//! Recovery rules:
//! - A frame cut short at the end of the file is a torn write. It is
//!   discarded and the file truncated back to the last complete frame.
//! - A complete frame that fails its checksum is corruption. Opening
//!   fails with a FATAL error and nothing is repaired.
//!
//! Every write is one frame followed by fsync. The in-memory state only
//! changes after the fsync succeeds; if the write or fsync fails the file
//! is cut back to its previous length.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use super::errors::{StoreError, StoreResult};
use super::record::{
    read_frame, AnnotationRecord, CommitReceipt, Document, DocumentCommit, DocumentId, FrameRead,
    StoreEntry,
};
use super::state::CorpusState;
use super::{AnnotationStore, CorpusStore, DocumentStore};
use crate::crash_point::{maybe_crash, points};
use crate::observability::{log_event, warn_event, Event};

/// Corpus file name inside `<data_dir>/data`
pub const CORPUS_FILE: &str = "corpus.dat";

struct Inner {
    file: File,
    offset: u64,
    state: CorpusState,
}

/// Durable store over a single append-only file.
pub struct FileStore {
    path: PathBuf,
    inner: Mutex<Inner>,
}

impl FileStore {
    /// Open or create the store under `data_dir`.
    ///
    /// # Errors
    ///
    /// `BLOCKMARK_STORE_CORRUPTION` if a committed frame fails its
    /// checksum, `BLOCKMARK_STORE_IO_ERROR` for filesystem failures.
    pub fn open(data_dir: &Path) -> StoreResult<Self> {
        let dir = data_dir.join("data");
        fs::create_dir_all(&dir).map_err(|e| {
            StoreError::io_error(
                format!("Failed to create data directory: {}", dir.display()),
                e,
            )
        })?;
        let path = dir.join(CORPUS_FILE);

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)
            .map_err(|e| {
                StoreError::io_error(format!("Failed to open corpus file: {}", path.display()), e)
            })?;

        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)
            .map_err(|e| StoreError::read_failed("Failed to read corpus file", e))?;

        let (state, valid_len, frames) = replay(&bytes)?;

        if (valid_len as usize) < bytes.len() {
            let discarded = (bytes.len() - valid_len as usize).to_string();
            file.set_len(valid_len)
                .and_then(|_| file.sync_all())
                .map_err(|e| StoreError::io_error("Failed to truncate torn tail", e))?;
            warn_event(
                Event::StoreRecovered,
                &[
                    ("discarded_bytes", discarded.as_str()),
                    ("path", &path.display().to_string()),
                ],
            );
        }

        log_event(
            Event::StoreOpened,
            &[
                ("documents", &state.document_count().to_string()),
                ("frames", &frames.to_string()),
                ("path", &path.display().to_string()),
            ],
        );

        Ok(Self {
            path,
            inner: Mutex::new(Inner {
                file,
                offset: valid_len,
                state,
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Bytes of committed frames.
    pub fn len_bytes(&self) -> u64 {
        self.lock().offset
    }

    pub fn document_count(&self) -> usize {
        self.lock().state.document_count()
    }

    pub fn annotation_count(&self) -> usize {
        self.lock().state.annotation_count()
    }

    /// Insert or replace a document (an outside edit).
    pub fn put_document(&self, document: Document) -> StoreResult<()> {
        let mut inner = self.lock();
        append(&mut inner, StoreEntry::PutDocument { document })
    }

    /// Insert or replace an annotation.
    pub fn put_annotation(&self, annotation: AnnotationRecord) -> StoreResult<()> {
        let mut inner = self.lock();
        append(&mut inner, StoreEntry::PutAnnotation { annotation })
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Rebuild state from raw file bytes.
///
/// Returns the state, the length of the verified prefix and the number of
/// frames replayed.
fn replay(bytes: &[u8]) -> StoreResult<(CorpusState, u64, usize)> {
    let mut state = CorpusState::new();
    let mut offset = 0usize;
    let mut frames = 0usize;

    while offset < bytes.len() {
        match read_frame(&bytes[offset..]) {
            Ok(FrameRead::Entry(entry, consumed)) => {
                state.apply(entry);
                offset += consumed;
                frames += 1;
            }
            Ok(FrameRead::Truncated) => break,
            Err(e) => {
                let at = offset.to_string();
                log_event(
                    Event::StoreCorruption,
                    &[("byte_offset", at.as_str()), ("reason", &e.to_string())],
                );
                return Err(StoreError::corruption_at_offset(offset as u64, e.to_string()));
            }
        }
    }

    Ok((state, offset as u64, frames))
}

/// Write one frame durably, then apply it.
fn append(inner: &mut Inner, entry: StoreEntry) -> StoreResult<()> {
    let frame = entry
        .to_frame()
        .map_err(|e| StoreError::write_failed("Failed to encode entry", e))?;

    maybe_crash(points::COMMIT_BEFORE_WRITE);

    if let Err(e) = inner.file.write_all(&frame) {
        rollback(inner);
        return Err(StoreError::write_failed("Failed to write frame", e));
    }

    maybe_crash(points::COMMIT_AFTER_WRITE);

    if let Err(e) = inner.file.sync_all() {
        rollback(inner);
        return Err(StoreError::write_failed("fsync failed after writing frame", e));
    }

    maybe_crash(points::COMMIT_AFTER_FSYNC);

    inner.offset += frame.len() as u64;
    inner.state.apply(entry);
    Ok(())
}

fn rollback(inner: &mut Inner) {
    // Best effort; a leftover partial frame is discarded on next open.
    let _ = inner.file.set_len(inner.offset);
}

impl DocumentStore for FileStore {
    fn list_block_documents(&self) -> StoreResult<Vec<DocumentId>> {
        Ok(self.lock().state.block_document_ids())
    }

    fn read_document(&self, id: DocumentId) -> StoreResult<Document> {
        self.lock().state.document(id)
    }
}

impl AnnotationStore for FileStore {
    fn annotations_for(&self, document_id: DocumentId) -> StoreResult<Vec<AnnotationRecord>> {
        Ok(self.lock().state.annotations_for(document_id))
    }
}

impl CorpusStore for FileStore {
    fn commit_migration(&self, commit: &DocumentCommit) -> StoreResult<()> {
        let mut inner = self.lock();
        inner.state.validate_commit(commit)?;
        append(
            &mut inner,
            StoreEntry::Commit {
                commit: commit.clone(),
            },
        )
    }

    fn commit_receipt(&self, document_id: DocumentId) -> StoreResult<Option<CommitReceipt>> {
        Ok(self.lock().state.receipt(document_id))
    }

    fn edit_generation(&self) -> StoreResult<u64> {
        Ok(self.lock().state.edit_generation())
    }

    fn corpus_migration_version(&self) -> StoreResult<u32> {
        Ok(self.lock().state.corpus_version())
    }

    fn set_corpus_migration_version(&self, version: u32) -> StoreResult<()> {
        let mut inner = self.lock();
        append(&mut inner, StoreEntry::CorpusVersion { version })
    }

    fn mark_corpus_migrated(&self, version: u32, expected_generation: u64) -> StoreResult<bool> {
        let mut inner = self.lock();
        if inner.state.edit_generation() != expected_generation {
            return Ok(false);
        }
        append(&mut inner, StoreEntry::CorpusVersion { version })?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::record::BlockReference;
    use serde_json::json;
    use tempfile::TempDir;

    fn seed(store: &FileStore) {
        store
            .put_document(Document::new(1, "post", "One", "<!-- wp:paragraph /-->"))
            .unwrap();
        store
            .put_annotation(AnnotationRecord::new(
                3,
                1,
                BlockReference::legacy("p0-hash1"),
                json!({"note": "see here"}),
            ))
            .unwrap();
    }

    #[test]
    fn test_creates_file_under_data_dir() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        assert!(store.path().ends_with("data/corpus.dat"));
        assert!(store.path().exists());
        assert_eq!(store.len_bytes(), 0);
    }

    #[test]
    fn test_state_survives_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let store = FileStore::open(dir.path()).unwrap();
            seed(&store);
            store.set_corpus_migration_version(1).unwrap();
        }
        let store = FileStore::open(dir.path()).unwrap();
        assert_eq!(store.document_count(), 1);
        assert_eq!(store.annotation_count(), 1);
        assert_eq!(store.corpus_migration_version().unwrap(), 1);
        assert_eq!(
            store.annotations_for(1).unwrap()[0].payload,
            json!({"note": "see here"})
        );
    }

    #[test]
    fn test_rejected_commit_appends_nothing() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        seed(&store);
        let before = store.len_bytes();

        let commit = DocumentCommit {
            document_id: 1,
            expected_checksum: 0xdead_beef,
            content: "x".into(),
            migration_version: 1,
            reference_updates: vec![],
            receipt: None,
        };
        let err = store.commit_migration(&commit).unwrap_err();
        assert_eq!(err.code().code(), "BLOCKMARK_STORE_CONFLICT");
        assert_eq!(store.len_bytes(), before);
    }

    #[test]
    fn test_replay_stops_at_truncated_frame() {
        let frame = StoreEntry::CorpusVersion { version: 1 }.to_frame().unwrap();
        let mut bytes = frame.clone();
        bytes.extend_from_slice(&frame[..5]);
        let (state, valid, frames) = replay(&bytes).unwrap();
        assert_eq!(valid as usize, frame.len());
        assert_eq!(frames, 1);
        assert_eq!(state.corpus_version(), 1);
    }

    #[test]
    fn test_receipt_and_generation_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let job_id = uuid::Uuid::new_v4();
        let generation = {
            let store = FileStore::open(dir.path()).unwrap();
            seed(&store);
            let document = store.read_document(1).unwrap();
            store
                .commit_migration(&DocumentCommit {
                    document_id: 1,
                    expected_checksum: document.content_checksum(),
                    content: "<!-- wp:paragraph {\"stableId\":\"abc123\"} /-->".into(),
                    migration_version: 1,
                    reference_updates: vec![],
                    receipt: Some(CommitReceipt {
                        job_id,
                        blocks: 1,
                        markings: 0,
                        unresolved: 1,
                    }),
                })
                .unwrap();
            store.edit_generation().unwrap()
        };

        let store = FileStore::open(dir.path()).unwrap();
        assert_eq!(store.edit_generation().unwrap(), generation);
        assert_eq!(store.commit_receipt(1).unwrap().unwrap().job_id, job_id);
        assert!(store.mark_corpus_migrated(1, generation).unwrap());
        assert!(!store.mark_corpus_migrated(1, generation + 1).unwrap());
    }
}
