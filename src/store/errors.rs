//! Store error types
//!
//! Error codes:
//! - BLOCKMARK_STORE_IO_ERROR (ERROR severity)
//! - BLOCKMARK_STORE_WRITE_FAILED (ERROR severity)
//! - BLOCKMARK_STORE_READ_FAILED (ERROR severity)
//! - BLOCKMARK_STORE_NOT_FOUND (ERROR severity)
//! - BLOCKMARK_STORE_CONFLICT (ERROR severity)
//! - BLOCKMARK_STORE_UNAVAILABLE (FATAL severity)
//! - BLOCKMARK_STORE_CORRUPTION (FATAL severity)

use std::fmt;
use std::io;

/// Severity levels for store errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Operation fails, the run continues
    Error,
    /// The store cannot be used at all
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "ERROR"),
            Severity::Fatal => write!(f, "FATAL"),
        }
    }
}

/// Store-specific error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreErrorCode {
    /// Disk I/O failure
    IoError,
    /// Write or commit rejected
    WriteFailed,
    /// Read failed
    ReadFailed,
    /// Document or annotation does not exist
    NotFound,
    /// Stored state changed since it was read
    Conflict,
    /// Store cannot be reached or enumerated
    Unavailable,
    /// Checksum failure in committed data
    Corruption,
}

impl StoreErrorCode {
    /// Returns the string code
    pub fn code(&self) -> &'static str {
        match self {
            StoreErrorCode::IoError => "BLOCKMARK_STORE_IO_ERROR",
            StoreErrorCode::WriteFailed => "BLOCKMARK_STORE_WRITE_FAILED",
            StoreErrorCode::ReadFailed => "BLOCKMARK_STORE_READ_FAILED",
            StoreErrorCode::NotFound => "BLOCKMARK_STORE_NOT_FOUND",
            StoreErrorCode::Conflict => "BLOCKMARK_STORE_CONFLICT",
            StoreErrorCode::Unavailable => "BLOCKMARK_STORE_UNAVAILABLE",
            StoreErrorCode::Corruption => "BLOCKMARK_STORE_CORRUPTION",
        }
    }

    /// Returns the severity level for this error
    pub fn severity(&self) -> Severity {
        match self {
            StoreErrorCode::Unavailable | StoreErrorCode::Corruption => Severity::Fatal,
            _ => Severity::Error,
        }
    }
}

impl fmt::Display for StoreErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Store error with full context
#[derive(Debug)]
pub struct StoreError {
    code: StoreErrorCode,
    message: String,
    details: Option<String>,
    source: Option<io::Error>,
}

impl StoreError {
    fn new(code: StoreErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
            source: None,
        }
    }

    /// Create a new store I/O error
    pub fn io_error(message: impl Into<String>, source: io::Error) -> Self {
        Self {
            source: Some(source),
            ..Self::new(StoreErrorCode::IoError, message)
        }
    }

    /// Create a write failed error caused by I/O
    pub fn write_failed(message: impl Into<String>, source: io::Error) -> Self {
        Self {
            source: Some(source),
            ..Self::new(StoreErrorCode::WriteFailed, message)
        }
    }

    /// Create a write failed error without I/O source
    pub fn write_rejected(message: impl Into<String>) -> Self {
        Self::new(StoreErrorCode::WriteFailed, message)
    }

    /// Create a read failed error
    pub fn read_failed(message: impl Into<String>, source: io::Error) -> Self {
        Self {
            source: Some(source),
            ..Self::new(StoreErrorCode::ReadFailed, message)
        }
    }

    /// Document not present in the store
    pub fn document_not_found(document_id: u64) -> Self {
        Self {
            details: Some(format!("document_id: {}", document_id)),
            ..Self::new(StoreErrorCode::NotFound, "Document not found")
        }
    }

    /// Annotation not present in the store
    pub fn annotation_not_found(annotation_id: u64) -> Self {
        Self {
            details: Some(format!("annotation_id: {}", annotation_id)),
            ..Self::new(StoreErrorCode::NotFound, "Annotation not found")
        }
    }

    /// Stored state no longer matches what the commit was planned against
    pub fn conflict(document_id: u64, reason: impl Into<String>) -> Self {
        Self {
            details: Some(format!("document_id: {}", document_id)),
            ..Self::new(StoreErrorCode::Conflict, reason)
        }
    }

    /// Store cannot be reached or enumerated (FATAL)
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(StoreErrorCode::Unavailable, message)
    }

    /// Checksum failure at a byte offset (FATAL)
    pub fn corruption_at_offset(offset: u64, reason: impl Into<String>) -> Self {
        Self {
            details: Some(format!("byte_offset: {}", offset)),
            ..Self::new(StoreErrorCode::Corruption, reason)
        }
    }

    /// Returns the error code
    pub fn code(&self) -> StoreErrorCode {
        self.code
    }

    /// Returns the severity level
    pub fn severity(&self) -> Severity {
        self.code.severity()
    }

    /// Returns the error message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns additional error details
    pub fn details(&self) -> Option<&str> {
        self.details.as_deref()
    }

    /// Returns whether this error makes the store unusable
    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {}",
            self.code.severity(),
            self.code.code(),
            self.message
        )?;
        if let Some(ref details) = self.details {
            write!(f, " ({})", details)?;
        }
        if let Some(ref source) = self.source {
            write!(f, " (caused by: {})", source)?;
        }
        Ok(())
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e as &(dyn std::error::Error + 'static))
    }
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;
