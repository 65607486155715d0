//! Operator API
//!
//! `MigrationService` is the single entry point used by the CLI and the
//! HTTP surface. Every mutating call checks the caller's authority first
//! and results are wrapped in the JSON envelopes from `response`.

mod authority;
mod response;
mod service;

pub use authority::{Action, Caller, Role};
pub use response::{ErrorResponse, Response, SuccessResponse};
pub use service::MigrationService;
