//! Observability HTTP routes
//!
//! Health check and migration counters. Both are open to any caller.

use std::sync::Arc;

use axum::extract::State;
use axum::{http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde::Serialize;

use crate::api::{MigrationService, Response};

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

pub fn observability_routes(service: Arc<MigrationService>) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(service)
}

/// Health check at the root
pub fn health_routes() -> Router {
    Router::new().route("/health", get(health_handler))
}

async fn health_handler() -> impl IntoResponse {
    let response = HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    };

    (StatusCode::OK, Json(response))
}

async fn metrics_handler(State(service): State<Arc<MigrationService>>) -> impl IntoResponse {
    (StatusCode::OK, Json(Response::success(service.metrics())))
}
