//! In-memory corpus state shared by the memory and file stores
//!
//! Both stores validate a commit against this state before making it
//! durable, then apply it. Validation is all-or-nothing: a commit with one
//! stale annotation reference is rejected as a whole.

use std::collections::BTreeMap;

use super::errors::{StoreError, StoreResult};
use super::record::{
    AnnotationId, AnnotationRecord, CommitReceipt, Document, DocumentCommit, DocumentId,
    StoreEntry,
};

/// Latest-wins view of every document, annotation and the corpus marker.
#[derive(Debug, Default, Clone)]
pub struct CorpusState {
    documents: BTreeMap<DocumentId, Document>,
    annotations: BTreeMap<AnnotationId, AnnotationRecord>,
    receipts: BTreeMap<DocumentId, CommitReceipt>,
    corpus_version: u32,
    edit_generation: u64,
}

impl CorpusState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn document(&self, id: DocumentId) -> StoreResult<Document> {
        self.documents
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::document_not_found(id))
    }

    /// Ids of documents containing block markup, ascending.
    pub fn block_document_ids(&self) -> Vec<DocumentId> {
        self.documents
            .values()
            .filter(|d| d.has_block_markup())
            .map(|d| d.id)
            .collect()
    }

    pub fn annotations_for(&self, document_id: DocumentId) -> Vec<AnnotationRecord> {
        self.annotations
            .values()
            .filter(|a| a.document_id == document_id)
            .cloned()
            .collect()
    }

    pub fn annotation(&self, id: AnnotationId) -> StoreResult<AnnotationRecord> {
        self.annotations
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::annotation_not_found(id))
    }

    pub fn document_count(&self) -> usize {
        self.documents.len()
    }

    pub fn annotation_count(&self) -> usize {
        self.annotations.len()
    }

    pub fn corpus_version(&self) -> u32 {
        self.corpus_version
    }

    pub fn edit_generation(&self) -> u64 {
        self.edit_generation
    }

    pub fn receipt(&self, document_id: DocumentId) -> Option<CommitReceipt> {
        self.receipts.get(&document_id).copied()
    }

    /// Check that `commit` still applies to the current state.
    pub fn validate_commit(&self, commit: &DocumentCommit) -> StoreResult<()> {
        let document = self.document(commit.document_id)?;
        if document.content_checksum() != commit.expected_checksum {
            return Err(StoreError::conflict(
                commit.document_id,
                "Document content changed since it was read",
            ));
        }

        for update in &commit.reference_updates {
            let annotation = self
                .annotations
                .get(&update.annotation_id)
                .ok_or_else(|| StoreError::annotation_not_found(update.annotation_id))?;
            if annotation.document_id != commit.document_id {
                return Err(StoreError::conflict(
                    commit.document_id,
                    format!(
                        "Annotation {} belongs to document {}",
                        annotation.id, annotation.document_id
                    ),
                ));
            }
            if annotation.reference != update.from {
                return Err(StoreError::conflict(
                    commit.document_id,
                    format!("Annotation {} reference changed since it was read", annotation.id),
                ));
            }
        }

        Ok(())
    }

    /// Apply an entry. Commits must have been validated first.
    pub fn apply(&mut self, entry: StoreEntry) {
        match entry {
            StoreEntry::PutDocument { document } => {
                // Outside edits may introduce id-less blocks again.
                self.corpus_version = 0;
                self.edit_generation += 1;
                self.receipts.remove(&document.id);
                self.documents.insert(document.id, document);
            }
            StoreEntry::PutAnnotation { annotation } => {
                self.corpus_version = 0;
                self.edit_generation += 1;
                self.annotations.insert(annotation.id, annotation);
            }
            StoreEntry::Commit { commit } => {
                if let Some(document) = self.documents.get_mut(&commit.document_id) {
                    document.content = commit.content;
                    document.migration_version = commit.migration_version;
                }
                match commit.receipt {
                    Some(receipt) => self.receipts.insert(commit.document_id, receipt),
                    None => self.receipts.remove(&commit.document_id),
                };
                for update in commit.reference_updates {
                    if let Some(annotation) = self.annotations.get_mut(&update.annotation_id) {
                        annotation.reference = update.to;
                    }
                }
            }
            StoreEntry::CorpusVersion { version } => {
                self.corpus_version = version;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::record::{BlockReference, ReferenceUpdate};
    use crate::block::StableId;
    use serde_json::json;

    fn seeded() -> CorpusState {
        let mut state = CorpusState::new();
        state.apply(StoreEntry::PutDocument {
            document: Document::new(1, "post", "One", "<!-- wp:paragraph /-->"),
        });
        state.apply(StoreEntry::PutAnnotation {
            annotation: AnnotationRecord::new(10, 1, BlockReference::legacy("p0-hash1"), json!({})),
        });
        state
    }

    fn commit_for(state: &CorpusState) -> DocumentCommit {
        let document = state.document(1).unwrap();
        DocumentCommit {
            document_id: 1,
            expected_checksum: document.content_checksum(),
            content: "<!-- wp:paragraph {\"stableId\":\"abc123\"} /-->".into(),
            migration_version: 1,
            reference_updates: vec![ReferenceUpdate {
                annotation_id: 10,
                from: BlockReference::legacy("p0-hash1"),
                to: BlockReference::Stable(StableId::parse("abc123").unwrap()),
            }],
            receipt: None,
        }
    }

    #[test]
    fn test_valid_commit_applies_everything() {
        let mut state = seeded();
        let commit = commit_for(&state);
        state.validate_commit(&commit).unwrap();
        state.apply(StoreEntry::Commit { commit });

        let document = state.document(1).unwrap();
        assert!(document.content.contains("abc123"));
        assert_eq!(document.migration_version, 1);
        let annotations = state.annotations_for(1);
        assert_eq!(annotations[0].reference.stable_id().unwrap().as_str(), "abc123");
    }

    #[test]
    fn test_stale_content_is_conflict() {
        let mut state = seeded();
        let commit = commit_for(&state);
        state.apply(StoreEntry::PutDocument {
            document: Document::new(1, "post", "One", "<!-- wp:heading /-->"),
        });
        let err = state.validate_commit(&commit).unwrap_err();
        assert_eq!(err.code().code(), "BLOCKMARK_STORE_CONFLICT");
    }

    #[test]
    fn test_stale_reference_is_conflict() {
        let mut state = seeded();
        let mut commit = commit_for(&state);
        commit.reference_updates[0].from = BlockReference::legacy("p9-hashff");
        assert!(state.validate_commit(&commit).is_err());
        // Nothing was applied.
        assert!(state.annotations_for(1)[0].reference.is_legacy());
        state.apply(StoreEntry::CorpusVersion { version: 1 });
        assert_eq!(state.corpus_version(), 1);
    }

    #[test]
    fn test_outside_edit_resets_corpus_version() {
        let mut state = seeded();
        state.apply(StoreEntry::CorpusVersion { version: 1 });
        state.apply(StoreEntry::PutDocument {
            document: Document::new(2, "page", "Two", "<!-- wp:paragraph /-->"),
        });
        assert_eq!(state.corpus_version(), 0);
    }

    #[test]
    fn test_only_outside_writes_bump_edit_generation() {
        let mut state = seeded();
        assert_eq!(state.edit_generation(), 2);

        let commit = commit_for(&state);
        state.apply(StoreEntry::Commit { commit });
        state.apply(StoreEntry::CorpusVersion { version: 1 });
        assert_eq!(state.edit_generation(), 2);

        state.apply(StoreEntry::PutAnnotation {
            annotation: AnnotationRecord::new(11, 1, BlockReference::legacy("p1-hash2"), json!({})),
        });
        assert_eq!(state.edit_generation(), 3);
    }

    #[test]
    fn test_receipt_lives_until_the_document_is_edited() {
        let mut state = seeded();
        let receipt = CommitReceipt {
            job_id: uuid::Uuid::new_v4(),
            blocks: 1,
            markings: 1,
            unresolved: 0,
        };
        let mut commit = commit_for(&state);
        commit.receipt = Some(receipt);
        state.apply(StoreEntry::Commit { commit });
        assert_eq!(state.receipt(1), Some(receipt));

        state.apply(StoreEntry::PutDocument {
            document: Document::new(1, "post", "One", "<!-- wp:paragraph /-->"),
        });
        assert_eq!(state.receipt(1), None);
    }

    #[test]
    fn test_block_document_listing_skips_classic_content() {
        let mut state = seeded();
        state.apply(StoreEntry::PutDocument {
            document: Document::new(3, "post", "Classic", "<p>no blocks</p>"),
        });
        assert_eq!(state.block_document_ids(), vec![1]);
        assert_eq!(state.document_count(), 2);
    }
}
