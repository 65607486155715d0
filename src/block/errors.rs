//! Block markup parse errors
//!
//! Malformed markup is never fatal to a scan: the caller records the
//! document as a scan error and moves on. The byte offset points at the
//! delimiter that could not be understood.

use thiserror::Error;

/// Result type for block parsing
pub type ParseResult<T> = Result<T, ParseError>;

/// What went wrong while reading block markup
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseErrorKind {
    #[error("malformed block delimiter")]
    MalformedDelimiter,

    #[error("unterminated block attributes")]
    UnterminatedAttributes,

    #[error("block attributes are not a JSON object: {0}")]
    InvalidAttributes(String),

    #[error("closing delimiter for `{0}` without an open block")]
    UnexpectedCloser(String),

    #[error("closing delimiter `{found}` does not match open block `{expected}`")]
    MismatchedCloser { expected: String, found: String },

    #[error("block `{0}` is never closed")]
    UnclosedBlock(String),
}

/// Parse error with the byte offset of the offending delimiter
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} (byte offset {offset})")]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub offset: usize,
}

impl ParseError {
    pub fn new(kind: ParseErrorKind, offset: usize) -> Self {
        Self { kind, offset }
    }

    pub fn malformed(offset: usize) -> Self {
        Self::new(ParseErrorKind::MalformedDelimiter, offset)
    }
}
