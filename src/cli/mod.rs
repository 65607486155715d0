//! Command-line interface
//!
//! - init: create the data directory
//! - import: load documents and annotations
//! - scan: report blocks without stable ids
//! - migrate: run or resume the migration job
//! - status: show the persisted job
//! - inspect: list a document's blocks and legacy addresses
//! - serve: run the HTTP surface

mod args;
mod commands;
mod errors;
mod io;

pub use args::{Cli, Command};
pub use commands::{import, init, inspect, migrate, run, run_command, scan, serve, status};
pub use errors::{CliError, CliErrorCode, CliResult};
pub use io::{write_error, write_response};
