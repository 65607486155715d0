//! JSON response envelopes
//!
//! `{"status":"ok","data":...}` on success,
//! `{"status":"error","code":...,"message":...}` on failure. Shared by the
//! CLI and the HTTP surface.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::MigrationError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuccessResponse {
    pub status: String,
    pub data: Value,
}

impl SuccessResponse {
    pub fn new(data: Value) -> Self {
        Self {
            status: "ok".to_string(),
            data,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub status: String,
    pub code: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn from_error(err: &MigrationError) -> Self {
        Self::new(err.code(), err.to_string())
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Response {
    Success(SuccessResponse),
    Error(ErrorResponse),
}

impl Response {
    /// Serialize `data` into a success envelope.
    pub fn success(data: impl Serialize) -> Self {
        match serde_json::to_value(data) {
            Ok(value) => Response::Success(SuccessResponse::new(value)),
            Err(e) => Response::Error(ErrorResponse::new(
                "BLOCKMARK_ENCODE_FAILED",
                format!("Failed to encode response: {}", e),
            )),
        }
    }

    pub fn error(err: &MigrationError) -> Self {
        Response::Error(ErrorResponse::from_error(err))
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Response::Success(_))
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            r#"{"status":"error","code":"BLOCKMARK_ENCODE_FAILED","message":"response encoding failed"}"#
                .to_string()
        })
    }
}
