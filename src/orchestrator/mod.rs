//! Migration orchestrator
//!
//! Owns the state machine, the id assigner and the job record, and drives
//! the per-document unit of work over a bounded worker pool:
//!
//! 1. re-read the document and parse it fresh
//! 2. skip it without a write if every block already has an id
//! 3. issue ids, rewrite and verify the content
//! 4. plan annotation updates from the pre-migration legacy addresses
//! 5. commit content, annotation updates and the per-document marker as
//!    one unit
//!
//! Any failure inside that unit is recorded against the document and the
//! run continues. Only an unreachable store or an unusable job record
//! aborts the run.
//!
//! The corpus marker is set with a compare-and-set against the store's
//! edit generation read at scan time, so an outside edit during the run
//! leaves it unset.

mod job;
mod pool;
mod progress;
mod state;

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

pub use job::{FileJobStore, JobStatus, JobStore, MemoryJobStore, MigrationFailure, MigrationJob, JOB_FILE};
pub use pool::run_pool;
pub use progress::{CancellationToken, NoProgress, ProgressSink, ProgressSnapshot, SharedProgress};
pub use state::OrchestratorState;

use crate::annotation::{build_mapping, AnnotationMigrator, LegacyAddressing, PositionFingerprintV1};
use crate::assigner::{IdAssigner, IdGenerator, RandomIdGenerator, DEFAULT_MAX_RETRIES};
use crate::block::{parse, BlockSpan, StableId};
use crate::crash_point::{maybe_crash, points};
use crate::errors::{MigrationError, MigrationResult};
use crate::observability::{
    error_event, log_event, warn_event, Event, Logger, MetricsRegistry, ObservationScope,
};
use crate::rewriter::rewrite;
use crate::scanner::{scan_store, MigrationReport};
use crate::store::{CommitReceipt, CorpusStore, Document, DocumentCommit, DocumentId};

/// Version written into the per-document and corpus markers
pub const MIGRATION_VERSION: u32 = 1;

/// Tuning knobs for a run.
#[derive(Clone)]
pub struct OrchestratorConfig {
    pub workers: usize,
    pub batch_size: usize,
    pub max_id_retries: u32,
    pub stable_id_length: usize,
    pub addressing: Arc<dyn LegacyAddressing>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            batch_size: 50,
            max_id_retries: DEFAULT_MAX_RETRIES,
            stable_id_length: RandomIdGenerator::DEFAULT_LENGTH,
            addressing: Arc::new(PositionFingerprintV1),
        }
    }
}

/// Result of a `migrate` call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MigrationOutcome {
    pub updated_posts: usize,
    pub updated_blocks: usize,
    pub updated_markings: usize,
    pub errors: Vec<MigrationFailure>,
    pub unresolved_markings: usize,
    pub state: OrchestratorState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    pub processed: usize,
    pub total: usize,
    pub cancelled: bool,
}

impl MigrationOutcome {
    fn from_job(job: &MigrationJob, state: OrchestratorState, cancelled: bool) -> Self {
        Self {
            updated_posts: job.updated_posts,
            updated_blocks: job.updated_blocks,
            updated_markings: job.updated_markings,
            errors: job.errors.clone(),
            unresolved_markings: job.unresolved_markings,
            state,
            job_id: Some(job.job_id.to_string()),
            processed: job.processed,
            total: job.total(),
            cancelled,
        }
    }
}

/// What happened to one document.
#[derive(Debug)]
enum DocumentOutcome {
    Migrated {
        blocks: usize,
        markings: usize,
        unresolved: usize,
    },
    Unchanged,
}

/// Results of one chunk, added to the job only when the chunk finished.
#[derive(Default)]
struct ChunkTally {
    posts: usize,
    blocks: usize,
    markings: usize,
    unresolved: usize,
    errors: Vec<MigrationFailure>,
}

impl ChunkTally {
    fn apply_to(self, job: &mut MigrationJob) {
        job.updated_posts += self.posts;
        job.updated_blocks += self.blocks;
        job.updated_markings += self.markings;
        job.unresolved_markings += self.unresolved;
        job.errors.extend(self.errors);
    }
}

struct DocumentError {
    document_id: DocumentId,
    title: String,
    error: MigrationError,
}

pub struct MigrationOrchestrator {
    store: Arc<dyn CorpusStore>,
    jobs: Arc<dyn JobStore>,
    assigner: IdAssigner,
    metrics: Arc<MetricsRegistry>,
    progress: Arc<dyn ProgressSink>,
    config: OrchestratorConfig,
    state: OrchestratorState,
    snapshot: Option<MigrationReport>,
    /// Store edit generation read just before `snapshot` was taken
    scan_generation: Option<u64>,
}

impl MigrationOrchestrator {
    pub fn new(
        store: Arc<dyn CorpusStore>,
        jobs: Arc<dyn JobStore>,
        config: OrchestratorConfig,
    ) -> Self {
        let metrics = Arc::new(MetricsRegistry::new());
        let assigner = IdAssigner::new(
            Box::new(RandomIdGenerator::new(config.stable_id_length)),
            config.max_id_retries,
            Arc::clone(&metrics),
        );
        Self {
            store,
            jobs,
            assigner,
            metrics,
            progress: Arc::new(NoProgress),
            config,
            state: OrchestratorState::Idle,
            snapshot: None,
            scan_generation: None,
        }
    }

    /// Replace the id generator.
    pub fn with_id_generator(mut self, generator: Box<dyn IdGenerator>) -> Self {
        self.assigner = IdAssigner::new(
            generator,
            self.config.max_id_retries,
            Arc::clone(&self.metrics),
        );
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    pub fn state(&self) -> OrchestratorState {
        self.state
    }

    pub fn metrics(&self) -> Arc<MetricsRegistry> {
        Arc::clone(&self.metrics)
    }

    /// Report of the last completed scan.
    pub fn last_report(&self) -> Option<&MigrationReport> {
        self.snapshot.as_ref()
    }

    pub fn set_batch_size(&mut self, batch_size: usize) {
        self.config.batch_size = batch_size.max(1);
    }

    /// Scan the corpus and keep the report as the migration snapshot.
    ///
    /// # Errors
    ///
    /// `StoreUnavailable` if the store cannot be enumerated;
    /// `InvalidTransition` while a scan or migration is running.
    pub fn scan(&mut self) -> MigrationResult<MigrationReport> {
        self.state = self.state.begin_scan()?;
        let scope = ObservationScope::new("SCAN");

        let scanned = self
            .store
            .edit_generation()
            .map_err(MigrationError::StoreUnavailable)
            .and_then(|generation| Ok((generation, scan_store(self.store.as_ref())?)));

        match scanned {
            Ok((generation, report)) => {
                self.assigner.register_existing(&report.existing_ids);
                self.metrics
                    .add_documents_scanned((report.total_posts + report.scan_errors.len()) as u64);
                self.metrics.add_blocks_scanned(report.total_blocks as u64);
                scope.complete_with_fields(&[
                    ("affected_posts", &report.affected_posts.len().to_string()),
                    ("total_blocks", &report.total_blocks.to_string()),
                    ("total_posts", &report.total_posts.to_string()),
                ]);
                self.snapshot = Some(report.clone());
                self.scan_generation = Some(generation);
                self.state = self.state.finish_scan()?;
                Ok(report)
            }
            Err(e) => {
                scope.fail(&e.to_string());
                self.state = self.state.fail_scan()?;
                Err(e)
            }
        }
    }

    /// Migrate every affected document in one call.
    pub fn migrate(&mut self) -> MigrationResult<MigrationOutcome> {
        self.run_job(&CancellationToken::new(), None)
    }

    /// Start or resume the persisted job and run chunks until it finishes,
    /// `cancel` fires, or `max_chunks` chunks have run.
    ///
    /// A run that stops early leaves the job paused; the next call resumes
    /// it, adding documents the fresh scan found affected since.
    pub fn run_job(
        &mut self,
        cancel: &CancellationToken,
        max_chunks: Option<usize>,
    ) -> MigrationResult<MigrationOutcome> {
        let resumable = self.jobs.load()?.filter(|job| job.is_resumable());

        if resumable.is_none() && self.state == OrchestratorState::Idle && self.corpus_is_current()? {
            log_event(
                Event::MigrationAlreadyCurrent,
                &[("migration_version", &MIGRATION_VERSION.to_string())],
            );
            return Ok(MigrationOutcome {
                state: self.state,
                ..Default::default()
            });
        }

        if self.state != OrchestratorState::ScanComplete {
            self.scan()?;
        }

        let mut job = match resumable {
            Some(mut job) => {
                let requeued = match &self.snapshot {
                    Some(report) => {
                        job.add_scan_errors(scan_failures(report));
                        job.requeue(&report.affected_ids())
                    }
                    None => 0,
                };
                log_event(
                    Event::JobResumed,
                    &[
                        ("job_id", &job.job_id.to_string()),
                        ("remaining", &job.remaining().len().to_string()),
                        ("requeued", &requeued.to_string()),
                    ],
                );
                job
            }
            None => self.new_job(),
        };
        job.mark(JobStatus::Running);
        self.jobs.save(&job)?;

        self.state = self.state.begin_migration()?;
        self.progress.chunk_done(&self.progress_snapshot(&job));
        let job_id = job.job_id.to_string();
        let scope = ObservationScope::with_fields("MIGRATION", &[("job_id", job_id.as_str())]);

        let mut chunks = 0usize;
        let mut cancelled = false;
        while !job.is_finished() {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }
            if max_chunks.is_some_and(|max| chunks >= max) {
                break;
            }
            if let Err(e) = self.migrate_chunk(&mut job, self.config.batch_size) {
                job.mark(JobStatus::Paused);
                // The operation error is what the caller needs to see.
                let _ = self.jobs.save(&job);
                self.state = self.state.abort_migration()?;
                scope.fail(&e.to_string());
                return Err(e);
            }
            chunks += 1;
        }

        if !job.is_finished() {
            job.mark(JobStatus::Paused);
            self.jobs.save(&job)?;
            self.state = self.state.pause_migration()?;
            self.progress.chunk_done(&self.progress_snapshot(&job));
            if cancelled {
                log_event(
                    Event::JobCancelled,
                    &[("job_id", job_id.as_str()), ("processed", &job.processed.to_string())],
                );
            }
            scope.complete_with_fields(&[("status", "paused")]);
            return Ok(MigrationOutcome::from_job(&job, self.state, cancelled));
        }

        job.mark(JobStatus::Completed);
        self.jobs.save(&job)?;
        let had_errors = !job.errors.is_empty();
        self.state = self.state.finish_migration(had_errors)?;

        if !had_errors {
            self.mark_corpus()?;
        }

        let outcome = MigrationOutcome::from_job(&job, self.state, false);
        self.progress.chunk_done(&self.progress_snapshot(&job));
        scope.complete_with_fields(&[
            ("errors", &outcome.errors.len().to_string()),
            ("updated_blocks", &outcome.updated_blocks.to_string()),
            ("updated_posts", &outcome.updated_posts.to_string()),
        ]);
        Ok(outcome)
    }

    /// Process the next `batch_size` documents of `job` and persist it.
    ///
    /// Returns the number of documents processed. Requires the
    /// `Migrating` state.
    pub fn migrate_chunk(
        &mut self,
        job: &mut MigrationJob,
        batch_size: usize,
    ) -> MigrationResult<usize> {
        if self.state != OrchestratorState::Migrating {
            return Err(MigrationError::forbidden(self.state.as_str(), "run a chunk"));
        }

        let batch = job.next_batch(batch_size);
        let Some(&last) = batch.last() else {
            return Ok(0);
        };

        let total = job.total();
        let base = job.processed;
        let job_id = job.job_id;
        let mut done = 0usize;
        let mut tally = ChunkTally::default();
        let mut fatal: Option<MigrationError> = None;

        let this = &*self;
        run_pool(
            &batch,
            this.config.workers,
            |id| (id, this.migrate_document(id, job_id)),
            |(id, result)| {
                done += 1;
                match result {
                    Ok(DocumentOutcome::Migrated {
                        blocks,
                        markings,
                        unresolved,
                    }) => {
                        tally.posts += 1;
                        tally.blocks += blocks;
                        tally.markings += markings;
                        tally.unresolved += unresolved;
                    }
                    Ok(DocumentOutcome::Unchanged) => {}
                    Err(failure) if failure.error.is_document_level() => {
                        tally.errors.push(MigrationFailure {
                            document_id: Some(failure.document_id),
                            title: failure.title,
                            error: failure.error.to_string(),
                        });
                    }
                    Err(failure) => {
                        error_event(
                            Event::ChunkAborted,
                            &[("document_id", &id.to_string()), ("error", &failure.error.to_string())],
                        );
                        fatal.get_or_insert(failure.error);
                    }
                }
                this.progress.document_done(base + done, total);
            },
        );

        // Commits already made in an aborted chunk are counted from their
        // receipts when the chunk runs again.
        if let Some(e) = fatal {
            return Err(e);
        }

        tally.apply_to(job);
        job.advance(last, batch.len());
        maybe_crash(points::CHUNK_BEFORE_SAVE);
        self.jobs.save(job)?;

        self.metrics.increment_chunks_completed();
        self.progress.chunk_done(&self.progress_snapshot(job));
        log_event(
            Event::ChunkComplete,
            &[
                ("cursor", &last.to_string()),
                ("processed", &job.processed.to_string()),
                ("total", &total.to_string()),
            ],
        );
        Ok(batch.len())
    }

    /// One document, start to commit.
    fn migrate_document(
        &self,
        id: DocumentId,
        job_id: Uuid,
    ) -> Result<DocumentOutcome, DocumentError> {
        let document = self.store.read_document(id).map_err(|e| {
            let error = MigrationError::from_store_read(e);
            self.document_failed(id, format!("Document {}", id), error)
        })?;
        let fail = |error: MigrationError| self.document_failed(id, document.title.clone(), error);

        let before = parse(&document.content).map_err(|e| fail(e.into()))?;
        let targets: Vec<BlockSpan> = before.id_less_blocks().map(|b| b.span).collect();
        if targets.is_empty() {
            return self.already_migrated(&document, job_id).map_err(fail);
        }

        let ids = self.assigner.issue(targets.len()).map_err(fail)?;
        let assignments: BTreeMap<BlockSpan, StableId> = targets.into_iter().zip(ids).collect();

        let content =
            rewrite(&document.content, &before, &assignments).map_err(|e| fail(e.into()))?;

        let mapping = build_mapping(self.config.addressing.as_ref(), &before, &assignments);
        let plan = AnnotationMigrator::new(self.store.as_ref())
            .migrate_annotations(id, &mapping)
            .map_err(|e| fail(MigrationError::from_store_read(e)))?;

        let commit = DocumentCommit {
            document_id: id,
            expected_checksum: document.content_checksum(),
            content,
            migration_version: MIGRATION_VERSION,
            reference_updates: plan.updates.clone(),
            receipt: Some(CommitReceipt {
                job_id,
                blocks: assignments.len(),
                markings: plan.updated_count(),
                unresolved: plan.unresolved_count(),
            }),
        };
        self.store.commit_migration(&commit).map_err(|e| {
            if e.is_fatal() {
                fail(MigrationError::StoreUnavailable(e))
            } else {
                fail(MigrationError::WriteFailure(e))
            }
        })?;

        self.metrics.increment_documents_migrated();
        self.metrics.add_markings_updated(plan.updated_count() as u64);
        log_event(
            Event::DocumentMigrated,
            &[
                ("blocks", &assignments.len().to_string()),
                ("document_id", &id.to_string()),
                ("markings", &plan.updated_count().to_string()),
            ],
        );

        Ok(DocumentOutcome::Migrated {
            blocks: assignments.len(),
            markings: plan.updated_count(),
            unresolved: plan.unresolved_count(),
        })
    }

    /// Nothing left to do for `document`. If this job committed it in a
    /// chunk that never finished, its receipt still counts the write.
    fn already_migrated(
        &self,
        document: &Document,
        job_id: Uuid,
    ) -> MigrationResult<DocumentOutcome> {
        let receipt = if document.migration_version == MIGRATION_VERSION {
            self.store
                .commit_receipt(document.id)
                .map_err(MigrationError::from_store_read)?
        } else {
            None
        };

        match receipt.filter(|r| r.job_id == job_id) {
            Some(receipt) => {
                log_event(
                    Event::CommitRecovered,
                    &[
                        ("blocks", &receipt.blocks.to_string()),
                        ("document_id", &document.id.to_string()),
                        ("job_id", &job_id.to_string()),
                    ],
                );
                Ok(DocumentOutcome::Migrated {
                    blocks: receipt.blocks,
                    markings: receipt.markings,
                    unresolved: receipt.unresolved,
                })
            }
            None => {
                Logger::trace(
                    Event::DocumentUnchanged.as_str(),
                    &[("document_id", &document.id.to_string())],
                );
                Ok(DocumentOutcome::Unchanged)
            }
        }
    }

    fn document_failed(
        &self,
        id: DocumentId,
        title: String,
        error: MigrationError,
    ) -> DocumentError {
        self.metrics.increment_documents_failed();
        error_event(
            Event::DocumentFailed,
            &[
                ("code", error.code()),
                ("document_id", &id.to_string()),
                ("error", &error.to_string()),
            ],
        );
        DocumentError {
            document_id: id,
            title,
            error,
        }
    }

    fn new_job(&self) -> MigrationJob {
        let Some(report) = &self.snapshot else {
            return MigrationJob::new(Vec::new(), Vec::new());
        };
        let mut job = MigrationJob::new(report.affected_ids(), scan_failures(report));
        job.unresolved_markings = report.legacy_markings_on_identified_posts;
        job
    }

    fn mark_corpus(&self) -> MigrationResult<()> {
        let Some(generation) = self.scan_generation else {
            return Ok(());
        };
        let version = MIGRATION_VERSION.to_string();
        let marked = self
            .store
            .mark_corpus_migrated(MIGRATION_VERSION, generation)
            .map_err(MigrationError::StoreUnavailable)?;
        if marked {
            log_event(Event::CorpusMarked, &[("migration_version", version.as_str())]);
        } else {
            warn_event(
                Event::CorpusMarkSkipped,
                &[
                    ("migration_version", version.as_str()),
                    ("reason", "corpus edited during migration"),
                ],
            );
        }
        Ok(())
    }

    fn corpus_is_current(&self) -> MigrationResult<bool> {
        let version = self
            .store
            .corpus_migration_version()
            .map_err(MigrationError::StoreUnavailable)?;
        Ok(version >= MIGRATION_VERSION)
    }

    fn progress_snapshot(&self, job: &MigrationJob) -> ProgressSnapshot {
        ProgressSnapshot {
            job_id: Some(job.job_id.to_string()),
            state: self.state,
            processed: job.processed,
            total: job.total(),
            updated_posts: job.updated_posts,
            updated_blocks: job.updated_blocks,
            updated_markings: job.updated_markings,
            errors: job.errors.len(),
        }
    }
}

fn scan_failures(report: &MigrationReport) -> Vec<MigrationFailure> {
    report
        .scan_errors
        .iter()
        .map(|e| MigrationFailure {
            document_id: Some(e.id),
            title: e.title.clone(),
            error: e.error.clone(),
        })
        .collect()
}
