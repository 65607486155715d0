//! Migration HTTP routes
//!
//! - `POST /migration/scan`
//! - `POST /migration/migrate?max_chunks=N`
//! - `GET  /migration/progress`
//!
//! A request carrying `Authorization: Bearer <api_token>` acts with
//! the migrator role; anything else is a viewer. Scans and migrations
//! run on the blocking pool.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use subtle::ConstantTimeEq;
use thiserror::Error;

use crate::api::{Caller, ErrorResponse, MigrationService, Response};
use crate::errors::MigrationError;
use crate::orchestrator::CancellationToken;

/// Shared state for migration routes
pub struct MigrationState {
    service: Arc<MigrationService>,
    api_token: Option<String>,
}

impl MigrationState {
    pub fn new(service: Arc<MigrationService>, api_token: Option<String>) -> Self {
        Self { service, api_token }
    }

    /// Resolve the caller's role from the bearer token.
    fn caller(&self, headers: &HeaderMap) -> Caller {
        let Some(expected) = self.api_token.as_deref() else {
            return Caller::viewer();
        };
        let presented = headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "));

        match presented {
            Some(token) if bool::from(token.as_bytes().ct_eq(expected.as_bytes())) => {
                Caller::migrator("http")
            }
            _ => Caller::viewer(),
        }
    }
}

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("{0}")]
    Migration(#[from] MigrationError),

    /// Blocking task panicked or was cancelled
    #[error("Worker task failed: {0}")]
    Worker(String),
}

impl HttpError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            HttpError::Migration(err) => match err {
                // 403 Forbidden
                MigrationError::Authorization(_) => StatusCode::FORBIDDEN,

                // 409 Conflict
                MigrationError::InvalidTransition(_) => StatusCode::CONFLICT,

                // 503 Service Unavailable
                MigrationError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,

                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            HttpError::Worker(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn body(&self) -> ErrorResponse {
        match self {
            HttpError::Migration(err) => ErrorResponse::from_error(err),
            HttpError::Worker(msg) => ErrorResponse::new("BLOCKMARK_INTERNAL", msg.clone()),
        }
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> axum::response::Response {
        (self.status_code(), Json(self.body())).into_response()
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct MigrateParams {
    /// Stop after this many chunks; the next request resumes
    pub max_chunks: Option<usize>,
}

pub fn migration_routes(state: Arc<MigrationState>) -> Router {
    Router::new()
        .route("/scan", post(scan_handler))
        .route("/migrate", post(migrate_handler))
        .route("/progress", get(progress_handler))
        .with_state(state)
}

async fn scan_handler(
    State(state): State<Arc<MigrationState>>,
    headers: HeaderMap,
) -> Result<Json<Response>, HttpError> {
    let caller = state.caller(&headers);
    let service = Arc::clone(&state.service);
    let report = tokio::task::spawn_blocking(move || service.scan(&caller))
        .await
        .map_err(|e| HttpError::Worker(e.to_string()))??;
    Ok(Json(Response::success(report)))
}

async fn migrate_handler(
    State(state): State<Arc<MigrationState>>,
    headers: HeaderMap,
    Query(params): Query<MigrateParams>,
) -> Result<Json<Response>, HttpError> {
    let caller = state.caller(&headers);
    let service = Arc::clone(&state.service);
    let outcome = tokio::task::spawn_blocking(move || {
        service.run_job(&caller, &CancellationToken::new(), params.max_chunks)
    })
    .await
    .map_err(|e| HttpError::Worker(e.to_string()))??;
    Ok(Json(Response::success(outcome)))
}

async fn progress_handler(State(state): State<Arc<MigrationState>>) -> impl IntoResponse {
    (StatusCode::OK, Json(Response::success(state.service.progress())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::{MemoryJobStore, MigrationOrchestrator, OrchestratorConfig};
    use crate::store::{Document, MemoryStore};
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::Value;
    use tower::ServiceExt;

    const TOKEN: &str = "s3cret-token";

    fn router(store: Arc<MemoryStore>) -> Router {
        let service = Arc::new(MigrationService::new(MigrationOrchestrator::new(
            store,
            Arc::new(MemoryJobStore::new()),
            OrchestratorConfig::default(),
        )));
        migration_routes(Arc::new(MigrationState::new(service, Some(TOKEN.to_string()))))
    }

    fn seeded_store() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        store.put_document(Document::new(
            1,
            "post",
            "Hello",
            "<!-- wp:paragraph --><p>a</p><!-- /wp:paragraph -->",
        ));
        store
    }

    fn post(uri: &str, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().method("POST").uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {}", token));
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_scan_requires_token() {
        let app = router(seeded_store());

        let response = app.clone().oneshot(post("/scan", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let body = json_body(response).await;
        assert_eq!(body["code"], "BLOCKMARK_UNAUTHORIZED");

        let response = app.oneshot(post("/scan", Some("wrong"))).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_scan_with_token() {
        let app = router(seeded_store());
        let response = app.oneshot(post("/scan", Some(TOKEN))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["data"]["total_posts"], 1);
        assert_eq!(body["data"]["blocks_without_stable_id"], 1);
        assert_eq!(body["data"]["affected_posts"][0]["type"], "post");
    }

    #[tokio::test]
    async fn test_migrate_then_progress() {
        let app = router(seeded_store());
        let response = app
            .clone()
            .oneshot(post("/migrate", Some(TOKEN)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["data"]["updated_posts"], 1);
        assert_eq!(body["data"]["updated_blocks"], 1);

        let request = Request::builder()
            .uri("/progress")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["data"]["state"], "migration_complete");
        assert_eq!(body["data"]["processed"], 1);
    }

    #[tokio::test]
    async fn test_unavailable_store_is_503() {
        let store = seeded_store();
        store.set_unavailable(true);
        let app = router(store);
        let response = app.oneshot(post("/scan", Some(TOKEN))).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = json_body(response).await;
        assert_eq!(body["code"], "BLOCKMARK_STORE_UNAVAILABLE");
    }
}
