//! Persisted migration job
//!
//! A job snapshots the ids of every affected document when it starts and
//! works through them one chunk at a time. The record is saved after
//! every chunk, so a cancelled or interrupted run resumes after the last
//! finished chunk. Documents in an unfinished chunk are processed again:
//! one that already carries its ids is skipped without a write, and its
//! counts are taken from the commit receipt the store kept for this job.
//!
//! Documents that became affected while the job was paused are appended
//! to `pending` when it resumes.
//!
//! Location: `<data_dir>/migration_job.json`

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::crash_point::{maybe_crash, points};
use crate::errors::{MigrationError, MigrationResult};
use crate::store::DocumentId;

/// Job file name inside the data directory
pub const JOB_FILE: &str = "migration_job.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Running,
    Paused,
    Completed,
}

/// One failed document (or skipped scan entry).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationFailure {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_id: Option<DocumentId>,
    pub title: String,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationJob {
    pub job_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub status: JobStatus,
    /// Affected document ids at job start, ascending, followed by any
    /// appended on resume
    pub pending: Vec<DocumentId>,
    /// Last document id of the last finished chunk
    pub cursor: Option<DocumentId>,
    /// Entries of `pending` already done
    pub processed: usize,
    pub updated_posts: usize,
    pub updated_blocks: usize,
    pub updated_markings: usize,
    pub unresolved_markings: usize,
    pub errors: Vec<MigrationFailure>,
}

impl MigrationJob {
    /// Start a job over `pending`, carrying errors found by the scan.
    pub fn new(mut pending: Vec<DocumentId>, scan_errors: Vec<MigrationFailure>) -> Self {
        pending.sort_unstable();
        pending.dedup();
        let now = Utc::now();
        Self {
            job_id: Uuid::new_v4(),
            started_at: now,
            updated_at: now,
            status: JobStatus::Running,
            pending,
            cursor: None,
            processed: 0,
            updated_posts: 0,
            updated_blocks: 0,
            updated_markings: 0,
            unresolved_markings: 0,
            errors: scan_errors,
        }
    }

    pub fn total(&self) -> usize {
        self.pending.len()
    }

    /// Up to `batch_size` ids after the cursor.
    pub fn next_batch(&self, batch_size: usize) -> Vec<DocumentId> {
        self.remaining()
            .iter()
            .take(batch_size.max(1))
            .copied()
            .collect()
    }

    pub fn remaining(&self) -> &[DocumentId] {
        &self.pending[self.processed.min(self.pending.len())..]
    }

    /// Append affected ids that are not queued yet. Documents that already
    /// failed in this job are left for the next one. Returns how many
    /// were appended.
    pub fn requeue(&mut self, affected: &[DocumentId]) -> usize {
        let mut appended = Vec::new();
        for id in affected {
            let queued = self.remaining().contains(id) || appended.contains(id);
            if !queued && !self.has_failed(*id) {
                appended.push(*id);
            }
        }
        let count = appended.len();
        self.pending.extend(appended);
        count
    }

    /// Record scan failures not already recorded for the same document.
    pub fn add_scan_errors(&mut self, failures: Vec<MigrationFailure>) {
        for failure in failures {
            let known = failure.document_id.is_some_and(|id| self.has_failed(id));
            if !known {
                self.errors.push(failure);
            }
        }
    }

    fn has_failed(&self, id: DocumentId) -> bool {
        self.errors.iter().any(|e| e.document_id == Some(id))
    }

    pub fn is_finished(&self) -> bool {
        self.remaining().is_empty()
    }

    pub fn is_resumable(&self) -> bool {
        self.status != JobStatus::Completed
    }

    /// Move the cursor past a finished chunk.
    pub fn advance(&mut self, last: DocumentId, processed: usize) {
        self.cursor = Some(last);
        self.processed += processed;
        self.updated_at = Utc::now();
    }

    pub fn mark(&mut self, status: JobStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }
}

/// Where job records live between invocations.
pub trait JobStore: Send + Sync {
    fn load(&self) -> MigrationResult<Option<MigrationJob>>;
    fn save(&self, job: &MigrationJob) -> MigrationResult<()>;
    fn clear(&self) -> MigrationResult<()>;
}

/// Job record as a JSON file, replaced atomically.
pub struct FileJobStore {
    path: PathBuf,
}

impl FileJobStore {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join(JOB_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn job_error(action: &str, path: &Path, e: impl std::fmt::Display) -> MigrationError {
    MigrationError::Job(format!("Failed to {} {}: {}", action, path.display(), e))
}

impl JobStore for FileJobStore {
    fn load(&self) -> MigrationResult<Option<MigrationJob>> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(job_error("read", &self.path, e)),
        };
        serde_json::from_str(&contents)
            .map(Some)
            .map_err(|e| job_error("parse", &self.path, e))
    }

    fn save(&self, job: &MigrationJob) -> MigrationResult<()> {
        let json =
            serde_json::to_string_pretty(job).map_err(|e| job_error("encode", &self.path, e))?;

        let parent = self.path.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent).map_err(|e| job_error("create directory for", &self.path, e))?;

        let tmp = self.path.with_extension("json.tmp");
        let mut file = File::create(&tmp).map_err(|e| job_error("create", &tmp, e))?;
        file.write_all(json.as_bytes())
            .map_err(|e| job_error("write", &tmp, e))?;
        file.sync_all().map_err(|e| job_error("fsync", &tmp, e))?;

        maybe_crash(points::JOB_BEFORE_RENAME);

        fs::rename(&tmp, &self.path).map_err(|e| job_error("replace", &self.path, e))?;

        // fsync the directory so the rename itself is durable
        let dir = OpenOptions::new()
            .read(true)
            .open(parent)
            .map_err(|e| job_error("open directory of", &self.path, e))?;
        dir.sync_all()
            .map_err(|e| job_error("fsync directory of", &self.path, e))?;
        Ok(())
    }

    fn clear(&self) -> MigrationResult<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(job_error("remove", &self.path, e)),
        }
    }
}

/// In-memory job record for tests and embedding.
#[derive(Debug, Default)]
pub struct MemoryJobStore {
    job: Mutex<Option<MigrationJob>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl JobStore for MemoryJobStore {
    fn load(&self) -> MigrationResult<Option<MigrationJob>> {
        Ok(self.job.lock().unwrap_or_else(|e| e.into_inner()).clone())
    }

    fn save(&self, job: &MigrationJob) -> MigrationResult<()> {
        *self.job.lock().unwrap_or_else(|e| e.into_inner()) = Some(job.clone());
        Ok(())
    }

    fn clear(&self) -> MigrationResult<()> {
        *self.job.lock().unwrap_or_else(|e| e.into_inner()) = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_batches_follow_cursor() {
        let mut job = MigrationJob::new(vec![9, 3, 5, 3, 7], vec![]);
        assert_eq!(job.pending, vec![3, 5, 7, 9]);
        assert_eq!(job.next_batch(2), vec![3, 5]);

        job.advance(5, 2);
        assert_eq!(job.next_batch(2), vec![7, 9]);
        assert_eq!(job.remaining(), &[7, 9]);

        job.advance(9, 2);
        assert!(job.is_finished());
        assert_eq!(job.processed, 4);
        assert!(job.next_batch(2).is_empty());
    }

    #[test]
    fn test_requeue_appends_new_and_reedited_documents() {
        let mut job = MigrationJob::new(vec![1, 2, 3, 4], vec![]);
        job.advance(2, 2);
        job.errors.push(MigrationFailure {
            document_id: Some(3),
            title: "Three".into(),
            error: "Write failed".into(),
        });

        // 4 is still queued, 3 already failed, 1 was edited after its chunk.
        assert_eq!(job.requeue(&[1, 3, 4, 9]), 2);
        assert_eq!(job.pending, vec![1, 2, 3, 4, 1, 9]);
        assert_eq!(job.remaining(), &[3, 4, 1, 9]);
        assert_eq!(job.total(), 6);

        job.add_scan_errors(vec![
            MigrationFailure {
                document_id: Some(3),
                title: "Three".into(),
                error: "parse".into(),
            },
            MigrationFailure {
                document_id: Some(8),
                title: "Eight".into(),
                error: "parse".into(),
            },
        ]);
        assert_eq!(job.errors.len(), 2);
    }

    #[test]
    fn test_file_store_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = FileJobStore::new(dir.path());
        assert!(store.load().unwrap().is_none());

        let mut job = MigrationJob::new(vec![1, 2], vec![]);
        job.advance(1, 1);
        job.mark(JobStatus::Paused);
        store.save(&job).unwrap();

        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded, job);
        assert!(loaded.is_resumable());
        assert!(!dir.path().join("migration_job.json.tmp").exists());

        store.clear().unwrap();
        assert!(store.load().unwrap().is_none());
        store.clear().unwrap();
    }

    #[test]
    fn test_unreadable_job_file_is_job_error() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(JOB_FILE), "{not json").unwrap();
        let err = FileJobStore::new(dir.path()).load().unwrap_err();
        assert_eq!(err.code(), "BLOCKMARK_JOB_FAILED");
    }

    #[test]
    fn test_timestamps_serialize_as_rfc3339() {
        let job = MigrationJob::new(vec![], vec![]);
        let value = serde_json::to_value(&job).unwrap();
        let started = value["started_at"].as_str().unwrap();
        assert!(DateTime::parse_from_rfc3339(started).is_ok());
        assert_eq!(value["status"], "running");
    }
}
