//! HTTP surface
//!
//! # Endpoints
//!
//! - `/health` - Health check
//! - `/migration/scan`, `/migration/migrate` - Operator actions
//! - `/migration/progress` - Latest progress snapshot
//! - `/observability/metrics` - Migration counters

pub mod config;
pub mod migration_routes;
pub mod observability_routes;
pub mod server;

pub use config::HttpServerConfig;
pub use migration_routes::{migration_routes, HttpError, MigrationState};
pub use server::HttpServer;
