//! Corpus records and their on-disk frame format
//!
//! Every write to the corpus file is one frame:
//!
//! ```text
//! +------------------+
//! | Frame Length     | (u32 LE, includes this field and the checksum)
//! +------------------+
//! | Entry            | (JSON-encoded StoreEntry)
//! +------------------+
//! | Checksum         | (u32 LE, CRC32 over length + entry)
//! +------------------+
//! ```
//!
//! A migration commit (rewritten content plus every annotation reference
//! update for that document) is a single frame, so it is either fully on
//! disk or not at all.

use std::fmt;
use std::io;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::checksum::compute_checksum;
use crate::block::StableId;

/// Document primary key
pub type DocumentId = u64;

/// Annotation primary key
pub type AnnotationId = u64;

/// Minimum frame size: length + checksum
const MIN_FRAME_SIZE: usize = 4 + 4;

/// A stored document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    /// Block markup
    pub content: String,
    /// page, post, ...
    pub doc_type: String,
    pub title: String,
    /// Edit link shown in reports
    pub edit_url: String,
    /// Migration version last applied to this document (0 = never)
    #[serde(default)]
    pub migration_version: u32,
}

impl Document {
    pub fn new(
        id: DocumentId,
        doc_type: impl Into<String>,
        title: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id,
            content: content.into(),
            doc_type: doc_type.into(),
            title: title.into(),
            edit_url: format!("/edit?post={}", id),
            migration_version: 0,
        }
    }

    pub fn with_edit_url(mut self, url: impl Into<String>) -> Self {
        self.edit_url = url.into();
        self
    }

    /// CRC32 of the current content, used for optimistic commits.
    pub fn content_checksum(&self) -> u32 {
        compute_checksum(self.content.as_bytes())
    }

    /// True if the content contains at least one block delimiter.
    pub fn has_block_markup(&self) -> bool {
        contains_block_markup(&self.content)
    }
}

/// Cheap pre-filter used when listing documents.
pub fn contains_block_markup(content: &str) -> bool {
    content.contains("<!-- wp:") || content.contains("<!--\twp:") || content.contains("<!--\nwp:")
}

/// Pre-migration block key, derived from position and attributes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LegacyAddress(String);

impl LegacyAddress {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LegacyAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How an annotation points at its block.
///
/// Exactly one scheme at any time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockReference {
    Legacy(LegacyAddress),
    Stable(StableId),
}

impl BlockReference {
    pub fn legacy(address: impl Into<String>) -> Self {
        Self::Legacy(LegacyAddress::new(address))
    }

    pub fn is_legacy(&self) -> bool {
        matches!(self, Self::Legacy(_))
    }

    pub fn legacy_address(&self) -> Option<&LegacyAddress> {
        match self {
            Self::Legacy(address) => Some(address),
            Self::Stable(_) => None,
        }
    }

    pub fn stable_id(&self) -> Option<&StableId> {
        match self {
            Self::Stable(id) => Some(id),
            Self::Legacy(_) => None,
        }
    }
}

/// A marking (or any other annotation) attached to one block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotationRecord {
    pub id: AnnotationId,
    pub document_id: DocumentId,
    pub reference: BlockReference,
    /// Opaque payload, never touched by migration
    #[serde(default)]
    pub payload: Value,
}

impl AnnotationRecord {
    pub fn new(
        id: AnnotationId,
        document_id: DocumentId,
        reference: BlockReference,
        payload: Value,
    ) -> Self {
        Self {
            id,
            document_id,
            reference,
            payload,
        }
    }
}

/// Repoint one annotation, guarded by its expected current reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceUpdate {
    pub annotation_id: AnnotationId,
    pub from: BlockReference,
    pub to: BlockReference,
}

/// What a migration job wrote for one document.
///
/// Stored with the commit itself, so a job that crashed between a commit
/// and saving its own progress can still count the write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitReceipt {
    pub job_id: Uuid,
    pub blocks: usize,
    pub markings: usize,
    pub unresolved: usize,
}

/// Everything one document's migration writes, applied atomically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentCommit {
    pub document_id: DocumentId,
    /// Checksum of the content the rewrite was planned against
    pub expected_checksum: u32,
    pub content: String,
    pub migration_version: u32,
    pub reference_updates: Vec<ReferenceUpdate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receipt: Option<CommitReceipt>,
}

/// One logical change to the corpus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StoreEntry {
    PutDocument { document: Document },
    PutAnnotation { annotation: AnnotationRecord },
    Commit { commit: DocumentCommit },
    CorpusVersion { version: u32 },
}

impl StoreEntry {
    /// Serialize the entry into a checksummed frame.
    pub fn to_frame(&self) -> io::Result<Vec<u8>> {
        let body = serde_json::to_vec(self)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        let frame_length = (MIN_FRAME_SIZE + body.len()) as u32;

        let mut frame = Vec::with_capacity(frame_length as usize);
        frame.extend_from_slice(&frame_length.to_le_bytes());
        frame.extend_from_slice(&body);
        let checksum = compute_checksum(&frame);
        frame.extend_from_slice(&checksum.to_le_bytes());

        Ok(frame)
    }
}

/// Outcome of decoding one frame from a byte buffer.
#[derive(Debug)]
pub enum FrameRead {
    /// A complete, verified frame and the bytes it consumed
    Entry(StoreEntry, usize),
    /// The buffer ends inside a frame (torn write)
    Truncated,
}

/// Decode the frame at the start of `data`, verifying its checksum.
///
/// Returns `Truncated` when the buffer is too short to hold the frame and
/// `InvalidData` when a complete frame fails its checksum.
pub fn read_frame(data: &[u8]) -> io::Result<FrameRead> {
    if data.len() < MIN_FRAME_SIZE {
        return Ok(FrameRead::Truncated);
    }

    let frame_length = u32::from_le_bytes([data[0], data[1], data[2], data[3]]) as usize;
    if frame_length < MIN_FRAME_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Invalid frame length: {}", frame_length),
        ));
    }
    if data.len() < frame_length {
        return Ok(FrameRead::Truncated);
    }

    let checksum_offset = frame_length - 4;
    let stored = u32::from_le_bytes([
        data[checksum_offset],
        data[checksum_offset + 1],
        data[checksum_offset + 2],
        data[checksum_offset + 3],
    ]);
    let computed = compute_checksum(&data[..checksum_offset]);
    if computed != stored {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!(
                "Checksum mismatch: computed {:08x}, stored {:08x}",
                computed, stored
            ),
        ));
    }

    let entry: StoreEntry = serde_json::from_slice(&data[4..checksum_offset])
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

    Ok(FrameRead::Entry(entry, frame_length))
}
