//! Repointing annotations from legacy addresses to stable ids

use std::collections::BTreeMap;

use super::legacy::LegacyAddressing;
use crate::block::{BlockSpan, ParsedContent, StableId};
use crate::observability::{warn_event, Event};
use crate::store::{
    AnnotationRecord, AnnotationStore, BlockReference, DocumentId, LegacyAddress,
    ReferenceUpdate, StoreResult,
};

/// Reference updates planned for one document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnnotationPlan {
    pub updates: Vec<ReferenceUpdate>,
    /// Legacy references that matched no block of the document
    pub unresolved: Vec<(u64, LegacyAddress)>,
}

impl AnnotationPlan {
    pub fn updated_count(&self) -> usize {
        self.updates.len()
    }

    pub fn unresolved_count(&self) -> usize {
        self.unresolved.len()
    }
}

/// Map legacy addresses to stable ids for one document.
///
/// `before` is the parse of the content as it was read, `assignments`
/// the ids about to be written. Blocks that already carried a stable id
/// are included too, so stale legacy references to them get repointed
/// in the same commit.
pub fn build_mapping(
    addressing: &dyn LegacyAddressing,
    before: &ParsedContent,
    assignments: &BTreeMap<BlockSpan, StableId>,
) -> BTreeMap<LegacyAddress, StableId> {
    before
        .blocks
        .iter()
        .filter_map(|block| {
            let id = assignments
                .get(&block.span)
                .or(block.stable_id.as_ref())?;
            Some((addressing.address(block), id.clone()))
        })
        .collect()
}

/// Plan updates for a set of annotations. Pure.
pub fn plan_updates(
    annotations: &[AnnotationRecord],
    mapping: &BTreeMap<LegacyAddress, StableId>,
) -> AnnotationPlan {
    let mut plan = AnnotationPlan::default();
    for annotation in annotations {
        let Some(address) = annotation.reference.legacy_address() else {
            continue;
        };
        match mapping.get(address) {
            Some(id) => plan.updates.push(ReferenceUpdate {
                annotation_id: annotation.id,
                from: annotation.reference.clone(),
                to: BlockReference::Stable(id.clone()),
            }),
            None => plan.unresolved.push((annotation.id, address.clone())),
        }
    }
    plan
}

/// Plans annotation updates against an annotation store.
///
/// The migrator never writes. Its plan travels with the rewritten content
/// in a single `DocumentCommit`.
pub struct AnnotationMigrator<'a, S: AnnotationStore + ?Sized> {
    store: &'a S,
}

impl<'a, S: AnnotationStore + ?Sized> AnnotationMigrator<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Plan the repointing of every annotation of `document_id`.
    pub fn migrate_annotations(
        &self,
        document_id: DocumentId,
        mapping: &BTreeMap<LegacyAddress, StableId>,
    ) -> StoreResult<AnnotationPlan> {
        let annotations = self.store.annotations_for(document_id)?;
        let plan = plan_updates(&annotations, mapping);

        let doc = document_id.to_string();
        for (annotation_id, address) in &plan.unresolved {
            warn_event(
                Event::MarkingUnresolved,
                &[
                    ("address", address.as_str()),
                    ("annotation_id", &annotation_id.to_string()),
                    ("document_id", doc.as_str()),
                ],
            );
        }

        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::PositionFingerprintV1;
    use crate::block::parse;
    use crate::store::MemoryStore;
    use serde_json::json;

    fn id(s: &str) -> StableId {
        StableId::parse(s).unwrap()
    }

    #[test]
    fn test_plan_skips_stable_and_counts_unmatched() {
        let mut mapping = BTreeMap::new();
        mapping.insert(LegacyAddress::new("p0-hash1"), id("newid1"));

        let annotations = vec![
            AnnotationRecord::new(1, 7, BlockReference::legacy("p0-hash1"), json!(null)),
            AnnotationRecord::new(2, 7, BlockReference::Stable(id("oldid9")), json!(null)),
            AnnotationRecord::new(3, 7, BlockReference::legacy("p5-hashff"), json!(null)),
        ];
        let plan = plan_updates(&annotations, &mapping);

        assert_eq!(plan.updated_count(), 1);
        assert_eq!(plan.updates[0].annotation_id, 1);
        assert_eq!(plan.updates[0].to, BlockReference::Stable(id("newid1")));
        assert_eq!(plan.unresolved, vec![(3, LegacyAddress::new("p5-hashff"))]);
    }

    #[test]
    fn test_mapping_covers_assigned_and_existing_ids() {
        let content = concat!(
            r#"<!-- wp:paragraph {"stableId":"abc123"} /-->"#,
            "<!-- wp:heading /-->"
        );
        let before = parse(content).unwrap();
        let mut assignments = BTreeMap::new();
        assignments.insert(before.blocks[1].span, id("fresh01"));

        let mapping = build_mapping(&PositionFingerprintV1, &before, &assignments);
        assert_eq!(mapping.len(), 2);
        let heading_addr = PositionFingerprintV1.address(&before.blocks[1]);
        assert_eq!(mapping[&heading_addr], id("fresh01"));
        let paragraph_addr = PositionFingerprintV1.address(&before.blocks[0]);
        assert_eq!(mapping[&paragraph_addr], id("abc123"));
    }

    #[test]
    fn test_migrator_reads_only_its_document() {
        let store = MemoryStore::new();
        store.put_annotation(AnnotationRecord::new(
            1,
            42,
            BlockReference::legacy("p0-hash9f3"),
            json!({"grade": "B"}),
        ));
        store.put_annotation(AnnotationRecord::new(
            2,
            43,
            BlockReference::legacy("p0-hash9f3"),
            json!({}),
        ));

        let mut mapping = BTreeMap::new();
        mapping.insert(LegacyAddress::new("p0-hash9f3"), id("stable42"));
        let plan = AnnotationMigrator::new(&store)
            .migrate_annotations(42, &mapping)
            .unwrap();

        assert_eq!(plan.updated_count(), 1);
        assert_eq!(plan.updates[0].annotation_id, 1);
        // Planning writes nothing.
        assert!(store.annotation(1).unwrap().reference.is_legacy());
    }
}
