//! Typed lifecycle events
//!
//! Every event the engine logs outside of an `ObservationScope` is listed
//! here so the set of log lines is closed and greppable.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Process
    ConfigLoaded,
    StoreOpened,
    StoreRecovered,
    StoreCorruption,
    Serving,
    ShutdownComplete,

    // Scan
    ScanDocumentSkipped,
    DuplicateStableId,

    // Migration
    MigrationAlreadyCurrent,
    DocumentMigrated,
    DocumentUnchanged,
    DocumentFailed,
    CommitRecovered,
    MarkingUnresolved,
    LegacyMarkingsRemain,
    IdCollision,
    ChunkComplete,
    ChunkAborted,
    JobResumed,
    JobCancelled,
    CorpusMarked,
    CorpusMarkSkipped,

    // Operator surface
    MigrationRequested,
    RequestRejected,
}

impl Event {
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::ConfigLoaded => "CONFIG_LOADED",
            Event::StoreOpened => "STORE_OPENED",
            Event::StoreRecovered => "STORE_TAIL_RECOVERED",
            Event::StoreCorruption => "STORE_CORRUPTION",
            Event::Serving => "BLOCKMARK_SERVING",
            Event::ShutdownComplete => "SHUTDOWN_COMPLETE",
            Event::ScanDocumentSkipped => "SCAN_DOCUMENT_SKIPPED",
            Event::DuplicateStableId => "DUPLICATE_STABLE_ID",
            Event::MigrationAlreadyCurrent => "MIGRATION_ALREADY_CURRENT",
            Event::DocumentMigrated => "DOCUMENT_MIGRATED",
            Event::DocumentUnchanged => "DOCUMENT_UNCHANGED",
            Event::DocumentFailed => "DOCUMENT_FAILED",
            Event::CommitRecovered => "COMMIT_RECOVERED",
            Event::LegacyMarkingsRemain => "LEGACY_MARKINGS_REMAIN",
            Event::MarkingUnresolved => "MARKING_UNRESOLVED",
            Event::IdCollision => "ID_COLLISION",
            Event::ChunkComplete => "CHUNK_COMPLETE",
            Event::ChunkAborted => "CHUNK_ABORTED",
            Event::JobResumed => "JOB_RESUMED",
            Event::JobCancelled => "JOB_CANCELLED",
            Event::CorpusMarked => "CORPUS_MARKED",
            Event::CorpusMarkSkipped => "CORPUS_MARK_SKIPPED",
            Event::MigrationRequested => "MIGRATION_REQUESTED",
            Event::RequestRejected => "REQUEST_REJECTED",
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, Event::StoreCorruption)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_names_are_upper_snake() {
        let events = [
            Event::ConfigLoaded,
            Event::StoreRecovered,
            Event::ScanDocumentSkipped,
            Event::DocumentMigrated,
            Event::MarkingUnresolved,
            Event::ChunkComplete,
            Event::CorpusMarked,
            Event::RequestRejected,
        ];
        for event in events {
            assert!(event.as_str().chars().all(|c| c.is_ascii_uppercase() || c == '_'));
        }
    }

    #[test]
    fn test_only_corruption_is_fatal() {
        assert!(Event::StoreCorruption.is_fatal());
        assert!(!Event::DocumentFailed.is_fatal());
    }
}
