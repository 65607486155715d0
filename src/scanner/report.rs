//! Scan report types

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::block::StableId;
use crate::store::DocumentId;

/// A document with at least one block lacking a stable id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AffectedPost {
    pub id: DocumentId,
    pub title: String,
    #[serde(rename = "type")]
    pub doc_type: String,
    /// Blocks in this document still lacking a stable id
    pub blocks: usize,
    pub url: String,
}

/// A document left out of the counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanError {
    pub id: DocumentId,
    pub title: String,
    pub error: String,
}

/// Corpus-wide result of a scan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationReport {
    pub total_posts: usize,
    pub total_blocks: usize,
    pub blocks_without_stable_id: usize,
    pub blocks_with_stable_id: usize,
    pub affected_posts: Vec<AffectedPost>,
    /// Legacy annotation references on documents whose blocks all carry
    /// ids. No migration will touch them.
    #[serde(default)]
    pub legacy_markings_on_identified_posts: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scan_errors: Vec<ScanError>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub duplicate_stable_ids: Vec<StableId>,
    /// Every well-formed id seen, used to seed the id assigner
    #[serde(skip)]
    pub existing_ids: BTreeSet<StableId>,
}

impl MigrationReport {
    /// Ids of affected documents, ascending.
    pub fn affected_ids(&self) -> Vec<DocumentId> {
        let mut ids: Vec<DocumentId> = self.affected_posts.iter().map(|p| p.id).collect();
        ids.sort_unstable();
        ids
    }

    pub fn needs_migration(&self) -> bool {
        !self.affected_posts.is_empty()
    }
}
