//! Read-only corpus inspection
//!
//! Scanning never writes and never fails because of one document: content
//! that does not parse, or cannot be read, becomes a `ScanError` entry and
//! is left out of every count.
//!
//! Annotations are only looked at for documents with nothing to migrate:
//! legacy references there can never be repointed and are counted.

mod report;

use std::collections::BTreeMap;

pub use report::{AffectedPost, MigrationReport, ScanError};

use crate::block::{parse, ParseError, StableId};
use crate::errors::{MigrationError, MigrationResult};
use crate::observability::{warn_event, Event};
use crate::store::{
    AnnotationRecord, AnnotationStore, Document, DocumentId, DocumentStore, StoreResult,
};

/// Block counts for a single document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentScan {
    pub blocks: usize,
    pub with_stable_id: usize,
    pub without_stable_id: usize,
    pub stable_ids: Vec<StableId>,
}

/// Scan one document.
pub fn scan_document(document: &Document) -> Result<DocumentScan, ParseError> {
    let parsed = parse(&document.content)?;
    Ok(DocumentScan {
        blocks: parsed.block_count(),
        with_stable_id: parsed.blocks_with_stable_id(),
        without_stable_id: parsed.blocks_without_stable_id(),
        stable_ids: parsed
            .blocks
            .iter()
            .filter_map(|b| b.stable_id.clone())
            .collect(),
    })
}

/// Accumulates per-document results into a report.
#[derive(Default)]
struct ReportBuilder {
    report: MigrationReport,
    occurrences: BTreeMap<StableId, usize>,
}

impl ReportBuilder {
    /// Returns true if every block of the document already has an id.
    fn add(&mut self, document: &Document) -> bool {
        let scan = match scan_document(document) {
            Ok(scan) => scan,
            Err(e) => {
                self.skip(document.id, &document.title, e.to_string());
                return false;
            }
        };

        if scan.blocks == 0 {
            return false;
        }

        let report = &mut self.report;
        report.total_posts += 1;
        report.total_blocks += scan.blocks;
        report.blocks_with_stable_id += scan.with_stable_id;
        report.blocks_without_stable_id += scan.without_stable_id;

        if scan.without_stable_id > 0 {
            report.affected_posts.push(AffectedPost {
                id: document.id,
                title: document.title.clone(),
                doc_type: document.doc_type.clone(),
                blocks: scan.without_stable_id,
                url: document.edit_url.clone(),
            });
        }

        for id in scan.stable_ids {
            *self.occurrences.entry(id).or_insert(0) += 1;
        }
        scan.without_stable_id == 0
    }

    fn count_legacy_markings(
        &mut self,
        document_id: DocumentId,
        annotations: StoreResult<Vec<AnnotationRecord>>,
    ) -> MigrationResult<()> {
        let annotations = match annotations {
            Ok(annotations) => annotations,
            Err(e) if e.is_fatal() => return Err(MigrationError::StoreUnavailable(e)),
            Err(_) => return Ok(()),
        };
        let legacy = annotations.iter().filter(|a| a.reference.is_legacy()).count();
        if legacy > 0 {
            warn_event(
                Event::LegacyMarkingsRemain,
                &[
                    ("document_id", &document_id.to_string()),
                    ("markings", &legacy.to_string()),
                ],
            );
            self.report.legacy_markings_on_identified_posts += legacy;
        }
        Ok(())
    }

    fn skip(&mut self, id: u64, title: &str, error: String) {
        warn_event(
            Event::ScanDocumentSkipped,
            &[("document_id", &id.to_string()), ("error", error.as_str())],
        );
        self.report.scan_errors.push(ScanError {
            id,
            title: title.to_string(),
            error,
        });
    }

    fn finish(mut self) -> MigrationReport {
        for (id, count) in self.occurrences {
            if count > 1 {
                warn_event(
                    Event::DuplicateStableId,
                    &[("count", &count.to_string()), ("stable_id", id.as_str())],
                );
                self.report.duplicate_stable_ids.push(id.clone());
            }
            self.report.existing_ids.insert(id);
        }
        self.report
    }
}

/// Scan a set of documents.
pub fn scan<'a>(documents: impl IntoIterator<Item = &'a Document>) -> MigrationReport {
    let mut builder = ReportBuilder::default();
    for document in documents {
        builder.add(document);
    }
    builder.finish()
}

/// Scan every block document of a store.
///
/// # Errors
///
/// `StoreUnavailable` if the store cannot be enumerated. A document that
/// is listed but cannot be read becomes a scan error entry.
pub fn scan_store<S>(store: &S) -> MigrationResult<MigrationReport>
where
    S: DocumentStore + AnnotationStore + ?Sized,
{
    let ids = store
        .list_block_documents()
        .map_err(MigrationError::StoreUnavailable)?;

    let mut builder = ReportBuilder::default();
    for id in ids {
        match store.read_document(id) {
            Ok(document) => {
                if builder.add(&document) {
                    builder.count_legacy_markings(id, store.annotations_for(id))?;
                }
            }
            Err(e) if e.is_fatal() => return Err(MigrationError::StoreUnavailable(e)),
            Err(e) => builder.skip(id, &format!("Document {}", id), e.to_string()),
        }
    }
    Ok(builder.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{BlockReference, MemoryStore};
    use serde_json::json;

    fn doc(id: u64, content: &str) -> Document {
        Document::new(id, "post", format!("Doc {}", id), content)
    }

    #[test]
    fn test_counts_across_documents() {
        let docs = vec![
            doc(1, r#"<!-- wp:paragraph {"stableId":"abc123"} /--><!-- wp:heading /-->"#),
            doc(2, r#"<!-- wp:group --><!-- wp:paragraph /--><!-- /wp:group -->"#),
            doc(3, "<p>classic</p>"),
        ];
        let report = scan(&docs);
        assert_eq!(report.total_posts, 2);
        assert_eq!(report.total_blocks, 4);
        assert_eq!(report.blocks_with_stable_id, 1);
        assert_eq!(report.blocks_without_stable_id, 3);
        assert_eq!(report.affected_ids(), vec![1, 2]);
        assert_eq!(report.affected_posts[1].blocks, 2);
        assert_eq!(report.affected_posts[0].url, "/edit?post=1");
        assert!(report.existing_ids.contains(&StableId::parse("abc123").unwrap()));
    }

    #[test]
    fn test_malformed_document_is_excluded() {
        let docs = vec![
            doc(1, "<!-- wp:paragraph /-->"),
            doc(2, "<!-- wp:paragraph {oops} /-->"),
        ];
        let report = scan(&docs);
        assert_eq!(report.total_posts, 1);
        assert_eq!(report.total_blocks, 1);
        assert_eq!(report.scan_errors.len(), 1);
        assert_eq!(report.scan_errors[0].id, 2);
    }

    #[test]
    fn test_duplicates_are_reported() {
        let docs = vec![
            doc(1, r#"<!-- wp:paragraph {"stableId":"same01"} /-->"#),
            doc(2, r#"<!-- wp:paragraph {"stableId":"same01"} /-->"#),
        ];
        let report = scan(&docs);
        assert_eq!(report.duplicate_stable_ids, vec![StableId::parse("same01").unwrap()]);
        assert!(!report.needs_migration());
    }

    #[test]
    fn test_malformed_stable_id_counts_as_missing() {
        let report = scan(&[doc(1, r#"<!-- wp:paragraph {"stableId":7} /-->"#)]);
        assert_eq!(report.blocks_without_stable_id, 1);
    }

    #[test]
    fn test_report_json_shape() {
        let report = scan(&[doc(1, "<!-- wp:paragraph /-->")]);
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["affected_posts"][0]["type"], "post");
        assert!(value.get("scan_errors").is_none());
        assert!(value.get("existing_ids").is_none());
    }

    #[test]
    fn test_scan_store_unavailable() {
        let store = MemoryStore::new();
        store.set_unavailable(true);
        let err = scan_store(&store).unwrap_err();
        assert_eq!(err.code(), "BLOCKMARK_STORE_UNAVAILABLE");
    }

    #[test]
    fn test_legacy_markings_on_identified_documents_are_counted() {
        let store = MemoryStore::new();
        store.put_document(doc(1, r#"<!-- wp:paragraph {"stableId":"abc123"} /-->"#));
        store.put_document(doc(2, "<!-- wp:paragraph /-->"));
        for (id, document_id) in [(10, 1), (11, 1), (12, 2)] {
            store.put_annotation(AnnotationRecord::new(
                id,
                document_id,
                BlockReference::legacy("p0-hash1"),
                json!({}),
            ));
        }

        let report = scan_store(&store).unwrap();
        // Document 2 is affected; its references are handled by migration.
        assert_eq!(report.legacy_markings_on_identified_posts, 2);
        assert_eq!(report.affected_ids(), vec![2]);
    }

    #[test]
    fn test_scan_is_repeatable() {
        let store = MemoryStore::new();
        store.put_document(doc(4, "<!-- wp:paragraph /-->"));
        assert_eq!(scan_store(&store).unwrap(), scan_store(&store).unwrap());
    }
}
