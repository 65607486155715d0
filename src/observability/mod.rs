//! Structured logging, lifecycle events and counters
//!
//! Everything here is synchronous and side-effect free apart from the
//! log lines themselves. Nothing in the engine depends on whether a line
//! was written.

mod events;
mod logger;
mod metrics;
mod scope;

pub use events::Event;
pub use logger::{Logger, Severity};
pub use metrics::{MetricsRegistry, MetricsSnapshot};
pub use scope::ObservationScope;

/// Log a lifecycle event with fields at its natural severity.
pub fn log_event(event: Event, fields: &[(&str, &str)]) {
    let severity = if event.is_fatal() {
        Severity::Fatal
    } else {
        Severity::Info
    };
    Logger::log(severity, event.as_str(), fields);
}

/// Log a lifecycle event as a warning.
pub fn warn_event(event: Event, fields: &[(&str, &str)]) {
    Logger::warn(event.as_str(), fields);
}

/// Log a lifecycle event as an error.
pub fn error_event(event: Event, fields: &[(&str, &str)]) {
    Logger::error(event.as_str(), fields);
}
