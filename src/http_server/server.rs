//! HTTP server
//!
//! Combines the endpoint routers and serves them until ctrl-c.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use super::config::HttpServerConfig;
use super::migration_routes::{migration_routes, MigrationState};
use super::observability_routes::{health_routes, observability_routes};
use crate::api::MigrationService;
use crate::observability::{log_event, Event};

pub struct HttpServer {
    config: HttpServerConfig,
    router: Router,
}

impl HttpServer {
    pub fn new(config: HttpServerConfig, service: Arc<MigrationService>) -> Self {
        let router = Self::build_router(&config, service);
        Self { config, router }
    }

    fn build_router(config: &HttpServerConfig, service: Arc<MigrationService>) -> Router {
        let migration_state = Arc::new(MigrationState::new(
            Arc::clone(&service),
            config.api_token.clone(),
        ));

        let cors = if config.cors_origins.is_empty() {
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        } else {
            let origins: Vec<_> = config
                .cors_origins
                .iter()
                .filter_map(|s| s.parse().ok())
                .collect();

            CorsLayer::new()
                .allow_origin(AllowOrigin::list(origins))
                .allow_methods(Any)
                .allow_headers(Any)
        };

        Router::new()
            .merge(health_routes())
            .nest("/migration", migration_routes(migration_state))
            .nest("/observability", observability_routes(service))
            .layer(cors)
    }

    pub fn socket_addr(&self) -> String {
        self.config.socket_addr()
    }

    /// The combined router, for tests
    pub fn router(self) -> Router {
        self.router
    }

    /// Bind and serve until ctrl-c.
    pub async fn start(self) -> Result<(), std::io::Error> {
        let addr: SocketAddr = self.config.socket_addr().parse().map_err(|e| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("Invalid socket address {}: {}", self.config.socket_addr(), e),
            )
        })?;

        let listener = TcpListener::bind(addr).await?;
        log_event(
            Event::Serving,
            &[
                ("addr", &addr.to_string()),
                ("operator_token", if self.config.api_token.is_some() { "set" } else { "unset" }),
            ],
        );

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        log_event(Event::ShutdownComplete, &[]);
        Ok(())
    }
}

async fn shutdown_signal() {
    // An error here means no signal handler; serve until killed.
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}
