//! Begin/complete/failed logging around a unit of work
//!
//! `ObservationScope::new("MIGRATION")` logs `MIGRATION_BEGIN`. Consuming
//! it with `complete` or `fail` logs `MIGRATION_COMPLETE` or
//! `MIGRATION_FAILED` with the elapsed time. Dropping it unconsumed logs
//! `MIGRATION_INCOMPLETE` as a warning.

use std::time::Instant;

use super::logger::Logger;

pub struct ObservationScope {
    name: &'static str,
    fields: Vec<(&'static str, String)>,
    started: Instant,
    finished: bool,
}

impl ObservationScope {
    pub fn new(name: &'static str) -> Self {
        Self::with_fields(name, &[])
    }

    /// Fields given here are repeated on the closing line.
    pub fn with_fields(name: &'static str, fields: &[(&'static str, &str)]) -> Self {
        Logger::info(&format!("{}_BEGIN", name), fields);
        Self {
            name,
            fields: fields.iter().map(|(k, v)| (*k, v.to_string())).collect(),
            started: Instant::now(),
            finished: false,
        }
    }

    pub fn complete(self) {
        self.complete_with_fields(&[]);
    }

    pub fn complete_with_fields(mut self, extra: &[(&str, &str)]) {
        self.finished = true;
        let elapsed = self.elapsed_ms();
        let mut fields = self.field_refs();
        fields.push(("elapsed_ms", elapsed.as_str()));
        fields.extend(extra.iter().copied());
        Logger::info(&format!("{}_COMPLETE", self.name), &fields);
    }

    pub fn fail(mut self, reason: &str) {
        self.finished = true;
        let elapsed = self.elapsed_ms();
        let mut fields = self.field_refs();
        fields.push(("elapsed_ms", elapsed.as_str()));
        fields.push(("reason", reason));
        Logger::error(&format!("{}_FAILED", self.name), &fields);
    }

    fn field_refs(&self) -> Vec<(&str, &str)> {
        self.fields.iter().map(|(k, v)| (*k, v.as_str())).collect()
    }

    fn elapsed_ms(&self) -> String {
        self.started.elapsed().as_millis().to_string()
    }
}

impl Drop for ObservationScope {
    fn drop(&mut self) {
        if !self.finished {
            Logger::warn(
                &format!("{}_INCOMPLETE", self.name),
                &[("reason", "scope dropped without completion")],
            );
        }
    }
}
