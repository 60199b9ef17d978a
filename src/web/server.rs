//! Axum router and server entry point.

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};

use super::handlers;
use crate::config::ServerSettings;
use crate::metadata::MetadataStore;
use crate::query::QueryService;
use crate::schema::SchemaSynchronizer;

/// Application state shared across handlers.
pub struct AppState {
    pub store: Arc<dyn MetadataStore>,
    pub queries: QueryService,
    pub synchronizer: SchemaSynchronizer,
}

impl AppState {
    pub fn new(store: Arc<dyn MetadataStore>, queries: QueryService) -> Self {
        Self {
            synchronizer: SchemaSynchronizer::new(store.clone()),
            store,
            queries,
        }
    }
}

/// Build the router with all routes.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/query/analyze", post(handlers::analyze))
        .route("/api/query/generate", post(handlers::generate))
        .route("/api/query/execute", post(handlers::execute))
        .route("/api/query/process", post(handlers::process))
        .route("/api/databases", get(handlers::list_databases))
        .route("/api/databases/{id}/test", post(handlers::test_database))
        .route("/api/databases/{id}/sync", post(handlers::sync_database))
        .route("/api/databases/{id}/schema", post(handlers::import_schema))
        .route("/api/health", get(handlers::health))
        .layer(cors)
        .with_state(state)
}

/// Bind and serve until the process is stopped.
pub async fn serve(state: Arc<AppState>, settings: &ServerSettings) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", settings.host, settings.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!(
        addr = %listener.local_addr()?,
        provider = state.queries.llm().name(),
        "askdb server listening"
    );

    axum::serve(listener, router(state)).await?;
    Ok(())
}
