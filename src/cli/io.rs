//! JSON output for the CLI
//!
//! One JSON object per line on stdout, UTF-8.

use std::io::{self, Write};

use serde::Serialize;
use serde_json::Value;

use super::errors::CliResult;

/// Write a success envelope to stdout
pub fn write_response(data: impl Serialize) -> CliResult<()> {
    let response = serde_json::json!({
        "status": "ok",
        "data": serde_json::to_value(data)?
    });
    write_value(&response)
}

/// Write an error envelope to stdout
pub fn write_error(code: &str, message: &str) -> CliResult<()> {
    let response = serde_json::json!({
        "status": "error",
        "code": code,
        "message": message
    });
    write_value(&response)
}

fn write_value(value: &Value) -> CliResult<()> {
    let mut stdout = io::stdout();
    serde_json::to_writer(&mut stdout, value)?;
    writeln!(stdout)?;
    stdout.flush()?;
    Ok(())
}
