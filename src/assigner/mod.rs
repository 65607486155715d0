//! Stable id issuance
//!
//! One mutex guards the generator and the registry of every id already in
//! use (seeded from the corpus scan) or issued by this process. Ids reserved
//! by a batch that later fails stay reserved.

mod generator;

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

pub use generator::{IdGenerator, RandomIdGenerator};

use crate::block::StableId;
use crate::errors::{MigrationError, MigrationResult};
use crate::observability::{warn_event, Event, MetricsRegistry};

/// Default number of fresh candidates tried per id
pub const DEFAULT_MAX_RETRIES: u32 = 8;

struct Registry {
    generator: Box<dyn IdGenerator>,
    issued: HashSet<StableId>,
}

pub struct IdAssigner {
    registry: Mutex<Registry>,
    max_retries: u32,
    metrics: Arc<MetricsRegistry>,
}

impl IdAssigner {
    pub fn new(
        generator: Box<dyn IdGenerator>,
        max_retries: u32,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        Self {
            registry: Mutex::new(Registry {
                generator,
                issued: HashSet::new(),
            }),
            max_retries,
            metrics,
        }
    }

    /// Random generator with default settings.
    pub fn with_defaults(metrics: Arc<MetricsRegistry>) -> Self {
        Self::new(
            Box::new(RandomIdGenerator::default()),
            DEFAULT_MAX_RETRIES,
            metrics,
        )
    }

    /// Reserve ids already present in the corpus.
    pub fn register_existing<'a>(&self, ids: impl IntoIterator<Item = &'a StableId>) {
        let mut registry = self.lock();
        registry.issued.extend(ids.into_iter().cloned());
    }

    pub fn is_reserved(&self, id: &StableId) -> bool {
        self.lock().issued.contains(id)
    }

    pub fn reserved_count(&self) -> usize {
        self.lock().issued.len()
    }

    /// Issue `n` ids, unique against each other and every reserved id.
    ///
    /// # Errors
    ///
    /// `IdCollision` if some id needs more than `max_retries` fresh
    /// candidates. Ids issued earlier in the batch remain reserved.
    pub fn issue(&self, n: usize) -> MigrationResult<Vec<StableId>> {
        let mut registry = self.lock();
        let mut ids = Vec::with_capacity(n);

        for _ in 0..n {
            let id = self.issue_one(&mut registry)?;
            ids.push(id);
        }

        self.metrics.add_ids_issued(ids.len() as u64);
        Ok(ids)
    }

    fn issue_one(&self, registry: &mut Registry) -> MigrationResult<StableId> {
        for _ in 0..self.max_retries.max(1) {
            let candidate = registry.generator.candidate();
            // A malformed candidate is treated like a collision.
            if let Some(id) = StableId::parse(candidate.as_str()) {
                if registry.issued.insert(id.clone()) {
                    return Ok(id);
                }
            }
            self.metrics.increment_id_collisions();
            warn_event(Event::IdCollision, &[("candidate", candidate.as_str())]);
        }
        Err(MigrationError::IdCollision {
            attempts: self.max_retries.max(1),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(|e| e.into_inner())
    }
}
