//! Operator-facing migration service
//!
//! Wraps one orchestrator behind a mutex. Authority is checked before the
//! orchestrator is touched, so a refused caller never triggers a scan.
//! Only one scan or migration runs at a time; a second request while one
//! is running is refused rather than queued. Progress and metrics stay
//! readable while a migration holds the lock.

use std::sync::{Arc, Mutex, MutexGuard, TryLockError};

use crate::errors::{MigrationError, MigrationResult};
use crate::observability::{log_event, warn_event, Event, MetricsRegistry, MetricsSnapshot};
use crate::orchestrator::{
    CancellationToken, MigrationOrchestrator, MigrationOutcome, ProgressSnapshot, SharedProgress,
};
use crate::scanner::MigrationReport;

use super::authority::{Action, Caller};

pub struct MigrationService {
    orchestrator: Mutex<MigrationOrchestrator>,
    progress: SharedProgress,
    metrics: Arc<MetricsRegistry>,
}

impl MigrationService {
    pub fn new(orchestrator: MigrationOrchestrator) -> Self {
        let progress = SharedProgress::new();
        let metrics = orchestrator.metrics();
        let orchestrator = orchestrator.with_progress(Arc::new(progress.clone()));
        Self {
            orchestrator: Mutex::new(orchestrator),
            progress,
            metrics,
        }
    }

    /// Scan the corpus. Requires the migrator role.
    pub fn scan(&self, caller: &Caller) -> MigrationResult<MigrationReport> {
        authorize(caller, Action::Scan)?;
        self.lock("scan")?.scan()
    }

    /// Run the whole migration. Requires the migrator role.
    pub fn migrate(&self, caller: &Caller) -> MigrationResult<MigrationOutcome> {
        self.run_job(caller, &CancellationToken::new(), None)
    }

    /// Start or resume a chunked migration.
    pub fn run_job(
        &self,
        caller: &Caller,
        cancel: &CancellationToken,
        max_chunks: Option<usize>,
    ) -> MigrationResult<MigrationOutcome> {
        authorize(caller, Action::Migrate)?;
        log_event(
            Event::MigrationRequested,
            &[("caller", caller.label())],
        );
        self.lock("migrate")?.run_job(cancel, max_chunks)
    }

    pub fn progress(&self) -> ProgressSnapshot {
        self.progress.latest()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    fn lock(&self, action: &str) -> MigrationResult<MutexGuard<'_, MigrationOrchestrator>> {
        match self.orchestrator.try_lock() {
            Ok(guard) => Ok(guard),
            Err(TryLockError::Poisoned(e)) => Ok(e.into_inner()),
            Err(TryLockError::WouldBlock) => Err(MigrationError::forbidden(
                "another operation is running",
                action,
            )),
        }
    }
}

fn authorize(caller: &Caller, action: Action) -> MigrationResult<()> {
    if caller.permits(action) {
        return Ok(());
    }
    let role = caller.role.to_string();
    warn_event(
        Event::RequestRejected,
        &[
            ("action", action.as_str()),
            ("role", role.as_str()),
            ("caller", caller.label()),
        ],
    );
    Err(MigrationError::Authorization(format!(
        "{} role cannot {}",
        role,
        action.as_str()
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::{MemoryJobStore, OrchestratorConfig, OrchestratorState};
    use crate::store::{Document, MemoryStore};

    fn service(store: Arc<MemoryStore>) -> MigrationService {
        MigrationService::new(MigrationOrchestrator::new(
            store,
            Arc::new(MemoryJobStore::new()),
            OrchestratorConfig::default(),
        ))
    }

    #[test]
    fn test_observer_is_refused_before_scanning() {
        let store = Arc::new(MemoryStore::new());
        // An attempted scan would surface as StoreUnavailable instead.
        store.set_unavailable(true);
        let service = service(store);

        let err = service.scan(&Caller::viewer()).unwrap_err();
        assert_eq!(err.code(), "BLOCKMARK_UNAUTHORIZED");
        let err = service.migrate(&Caller::viewer()).unwrap_err();
        assert_eq!(err.code(), "BLOCKMARK_UNAUTHORIZED");
        assert_eq!(service.metrics().documents_scanned, 0);
    }

    #[test]
    fn test_operator_migrates_and_progress_is_published() {
        let store = Arc::new(MemoryStore::new());
        store.put_document(Document::new(1, "post", "A", "<!-- wp:paragraph /-->"));
        store.put_document(Document::new(2, "post", "B", "<!-- wp:image {\"id\":3} /-->"));
        let service = service(Arc::clone(&store));

        let outcome = service.migrate(&Caller::migrator("test")).unwrap();
        assert_eq!(outcome.updated_posts, 2);

        let progress = service.progress();
        assert_eq!(progress.state, OrchestratorState::MigrationComplete);
        assert_eq!(progress.processed, 2);
        assert_eq!(progress.total, 2);
        assert_eq!(service.metrics().documents_migrated, 2);
    }
}
