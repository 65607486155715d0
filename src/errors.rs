//! Migration error taxonomy
//!
//! Document-level errors are caught by the orchestrator, recorded in the
//! outcome and the run moves on. Everything else aborts the operation and
//! is returned to the caller.

use thiserror::Error;

use crate::block::ParseError;
use crate::rewriter::RewriteError;
use crate::store::StoreError;

pub type MigrationResult<T> = Result<T, MigrationError>;

#[derive(Debug, Error)]
pub enum MigrationError {
    // ==================
    // Document-level
    // ==================
    /// Content is not valid block markup
    #[error("Malformed block markup: {0}")]
    Parse(#[from] ParseError),

    /// No unique id could be generated within the retry budget
    #[error("Could not generate a unique stable id after {attempts} attempts")]
    IdCollision { attempts: u32 },

    /// Rewritten content failed verification
    #[error("{0}")]
    Rewrite(#[from] RewriteError),

    /// Store rejected the per-document commit or could not read the document
    #[error("Document store operation failed: {0}")]
    WriteFailure(#[source] StoreError),

    // ==================
    // Operation-level
    // ==================
    /// Store cannot be enumerated; nothing was written
    #[error("Document store unavailable: {0}")]
    StoreUnavailable(#[source] StoreError),

    /// Caller lacks the migrator role
    #[error("Unauthorized: {0}")]
    Authorization(String),

    /// Operation not allowed in the current orchestrator state
    #[error("Invalid state transition: {0}")]
    InvalidTransition(String),

    /// Job record could not be read or written
    #[error("Migration job error: {0}")]
    Job(String),
}

impl MigrationError {
    pub fn code(&self) -> &'static str {
        match self {
            MigrationError::Parse(_) => "BLOCKMARK_PARSE_ERROR",
            MigrationError::IdCollision { .. } => "BLOCKMARK_ID_COLLISION",
            MigrationError::Rewrite(_) => "BLOCKMARK_REWRITE_FAILED",
            MigrationError::WriteFailure(_) => "BLOCKMARK_WRITE_FAILED",
            MigrationError::StoreUnavailable(_) => "BLOCKMARK_STORE_UNAVAILABLE",
            MigrationError::Authorization(_) => "BLOCKMARK_UNAUTHORIZED",
            MigrationError::InvalidTransition(_) => "BLOCKMARK_INVALID_STATE",
            MigrationError::Job(_) => "BLOCKMARK_JOB_FAILED",
        }
    }

    /// True if the error only fails the document being processed.
    pub fn is_document_level(&self) -> bool {
        matches!(
            self,
            MigrationError::Parse(_)
                | MigrationError::IdCollision { .. }
                | MigrationError::Rewrite(_)
                | MigrationError::WriteFailure(_)
        )
    }

    /// Map a failed store read during migration.
    ///
    /// A fatal store error means the whole corpus is unreachable.
    pub fn from_store_read(err: StoreError) -> Self {
        if err.is_fatal() {
            MigrationError::StoreUnavailable(err)
        } else {
            MigrationError::WriteFailure(err)
        }
    }

    pub(crate) fn forbidden(from: &str, action: &str) -> Self {
        MigrationError::InvalidTransition(format!("cannot {} while {}", action, from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{ParseError, ParseErrorKind};

    #[test]
    fn test_codes() {
        assert_eq!(
            MigrationError::IdCollision { attempts: 8 }.code(),
            "BLOCKMARK_ID_COLLISION"
        );
        assert_eq!(
            MigrationError::Authorization("viewer".into()).code(),
            "BLOCKMARK_UNAUTHORIZED"
        );
        assert_eq!(
            MigrationError::StoreUnavailable(StoreError::unavailable("down")).code(),
            "BLOCKMARK_STORE_UNAVAILABLE"
        );
    }

    #[test]
    fn test_document_level_classification() {
        let parse = MigrationError::from(ParseError::new(ParseErrorKind::MalformedDelimiter, 4));
        assert!(parse.is_document_level());
        assert!(MigrationError::WriteFailure(StoreError::write_rejected("x")).is_document_level());
        assert!(!MigrationError::StoreUnavailable(StoreError::unavailable("x")).is_document_level());
        assert!(!MigrationError::Job("unreadable".into()).is_document_level());
    }

    #[test]
    fn test_store_read_mapping() {
        assert!(matches!(
            MigrationError::from_store_read(StoreError::unavailable("down")),
            MigrationError::StoreUnavailable(_)
        ));
        assert!(matches!(
            MigrationError::from_store_read(StoreError::document_not_found(9)),
            MigrationError::WriteFailure(_)
        ));
    }

    #[test]
    fn test_parse_message_carries_offset() {
        let err = MigrationError::from(ParseError::new(ParseErrorKind::MalformedDelimiter, 17));
        assert!(err.to_string().contains("17"));
    }
}
