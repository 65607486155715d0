//! CLI error types
//!
//! Every CLI error ends the process with a non-zero exit code after an
//! error envelope has been written to stdout.

use std::fmt;
use std::io;

use crate::config::ConfigError;
use crate::errors::MigrationError;
use crate::store::StoreError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliErrorCode {
    /// Configuration file error
    ConfigError,
    /// I/O error (stdin/stdout, input files)
    IoError,
    /// Already initialized
    AlreadyInitialized,
    /// Not initialized
    NotInitialized,
    /// Store could not be opened or written
    StoreFailed,
    /// Scan or migration failed; carries the engine's code
    Migration(&'static str),
}

impl CliErrorCode {
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConfigError => "BLOCKMARK_CLI_CONFIG_ERROR",
            Self::IoError => "BLOCKMARK_CLI_IO_ERROR",
            Self::AlreadyInitialized => "BLOCKMARK_CLI_ALREADY_INITIALIZED",
            Self::NotInitialized => "BLOCKMARK_CLI_NOT_INITIALIZED",
            Self::StoreFailed => "BLOCKMARK_CLI_STORE_FAILED",
            Self::Migration(code) => *code,
        }
    }
}

#[derive(Debug)]
pub struct CliError {
    code: CliErrorCode,
    message: String,
}

impl CliError {
    pub fn new(code: CliErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::ConfigError, msg)
    }

    pub fn io_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::IoError, msg)
    }

    pub fn already_initialized() -> Self {
        Self::new(
            CliErrorCode::AlreadyInitialized,
            "Data directory already initialized",
        )
    }

    pub fn not_initialized() -> Self {
        Self::new(
            CliErrorCode::NotInitialized,
            "Data directory not initialized. Run 'blockmark init' first.",
        )
    }

    pub fn code(&self) -> &CliErrorCode {
        &self.code
    }

    pub fn code_str(&self) -> &'static str {
        self.code.code()
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code.code(), self.message)
    }
}

impl std::error::Error for CliError {}

impl From<io::Error> for CliError {
    fn from(e: io::Error) -> Self {
        Self::io_error(e.to_string())
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        Self::io_error(format!("JSON error: {}", e))
    }
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        Self::config_error(e.message())
    }
}

impl From<StoreError> for CliError {
    fn from(e: StoreError) -> Self {
        Self::new(CliErrorCode::StoreFailed, e.to_string())
    }
}

impl From<MigrationError> for CliError {
    fn from(e: MigrationError) -> Self {
        Self::new(CliErrorCode::Migration(e.code()), e.to_string())
    }
}

pub type CliResult<T> = Result<T, CliError>;
