//! Crash injection for durability tests
//!
//! Setting `BLOCKMARK_CRASH_POINT=<name>` makes the process abort the first
//! time execution reaches `maybe_crash(<name>)`. No unwinding, no cleanup,
//! so a test harness can inspect exactly what reached the disk.
//!
//! ```bash
//! BLOCKMARK_CRASH_POINT=commit_after_write blockmark migrate --config c.json
//! ```

use std::sync::OnceLock;

static CRASH_POINT: OnceLock<Option<String>> = OnceLock::new();

fn configured() -> Option<&'static str> {
    CRASH_POINT
        .get_or_init(|| std::env::var("BLOCKMARK_CRASH_POINT").ok())
        .as_deref()
}

/// True if the environment names this crash point.
#[inline]
pub fn crash_point_enabled(name: &str) -> bool {
    configured() == Some(name)
}

/// Abort the process if `name` is the configured crash point.
#[inline]
pub fn maybe_crash(name: &str) {
    if crash_point_enabled(name) {
        eprintln!("[CRASH] Triggering crash at point: {}", name);
        std::process::abort();
    }
}

pub mod points {
    /// Before a commit frame is written
    pub const COMMIT_BEFORE_WRITE: &str = "commit_before_write";
    /// Frame written, not yet fsynced
    pub const COMMIT_AFTER_WRITE: &str = "commit_after_write";
    /// Frame fsynced, in-memory state not yet updated
    pub const COMMIT_AFTER_FSYNC: &str = "commit_after_fsync";
    /// Job record temp file written, not yet renamed
    pub const JOB_BEFORE_RENAME: &str = "job_before_rename";
    /// Chunk finished, job record not yet saved
    pub const CHUNK_BEFORE_SAVE: &str = "chunk_before_save";

    pub fn all() -> &'static [&'static str] {
        &[
            COMMIT_BEFORE_WRITE,
            COMMIT_AFTER_WRITE,
            COMMIT_AFTER_FSYNC,
            JOB_BEFORE_RENAME,
            CHUNK_BEFORE_SAVE,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_without_env() {
        assert!(!crash_point_enabled("not_a_point"));
        maybe_crash("not_a_point");
    }

    #[test]
    fn test_point_names_are_lower_snake() {
        for point in points::all() {
            assert!(point.chars().all(|c| c.is_ascii_lowercase() || c == '_'));
        }
    }
}
