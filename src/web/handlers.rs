//! HTTP handlers.
//!
//! Query routes always answer 200: the structured result carries `success`.
//! Database routes use status codes.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use super::server::AppState;
use crate::connection::ConnectionTestResult;
use crate::error::{ErrorKind, QueryError};
use crate::metadata::{DatabaseTarget, IncomingSchema, MetadataError, MetadataStoreExt, SyncReport};
use crate::query::{
    AnalysisResult, AnalyzeRequest, CombinedResult, ExecuteRequest, GenerateRequest, QueryExecutionResult,
    SqlGenerationResult,
};

/// Error body for non-query routes.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    error_message: String,
    error_kind: ErrorKind,
}

pub struct ApiError(QueryError);

impl From<QueryError> for ApiError {
    fn from(err: QueryError) -> Self {
        Self(err)
    }
}

impl From<MetadataError> for ApiError {
    fn from(err: MetadataError) -> Self {
        Self(err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = self.0.kind();
        let status = match kind {
            ErrorKind::InvalidArgument | ErrorKind::ExecutionFailure => StatusCode::BAD_REQUEST,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::UnsupportedEngine | ErrorKind::Configuration => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorKind::ConnectionFailure | ErrorKind::ProviderCallFailure => StatusCode::BAD_GATEWAY,
            ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
            ErrorKind::Storage => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %self.0, "request failed");
        }

        let body = ErrorBody {
            error_message: self.0.user_message(),
            error_kind: kind,
        };
        (status, Json(body)).into_response()
    }
}

/// A body that does not deserialize is an invalid argument like any other.
fn rejected(rejection: JsonRejection) -> QueryError {
    tracing::warn!(status = rejection.status().as_u16(), "rejected query request body");
    QueryError::invalid_argument(rejection.body_text())
}

/// POST /api/query/analyze
pub async fn analyze(
    State(state): State<Arc<AppState>>,
    body: Result<Json<AnalyzeRequest>, JsonRejection>,
) -> Json<AnalysisResult> {
    match body {
        Ok(Json(req)) => Json(state.queries.analyze(&req).await),
        Err(rejection) => Json(AnalysisResult::failed(&AnalyzeRequest::default(), &rejected(rejection))),
    }
}

/// POST /api/query/generate
pub async fn generate(
    State(state): State<Arc<AppState>>,
    body: Result<Json<GenerateRequest>, JsonRejection>,
) -> Json<SqlGenerationResult> {
    match body {
        Ok(Json(req)) => Json(state.queries.generate(&req).await),
        Err(rejection) => Json(SqlGenerationResult::failed(&GenerateRequest::default(), &rejected(rejection))),
    }
}

/// POST /api/query/execute
pub async fn execute(
    State(state): State<Arc<AppState>>,
    body: Result<Json<ExecuteRequest>, JsonRejection>,
) -> Json<QueryExecutionResult> {
    match body {
        Ok(Json(req)) => Json(state.queries.execute(&req).await),
        Err(rejection) => Json(QueryExecutionResult::failed(&ExecuteRequest::default(), &rejected(rejection))),
    }
}

/// POST /api/query/process
pub async fn process(
    State(state): State<Arc<AppState>>,
    body: Result<Json<AnalyzeRequest>, JsonRejection>,
) -> Json<CombinedResult> {
    match body {
        Ok(Json(req)) => Json(state.queries.process(&req).await),
        Err(rejection) => Json(CombinedResult::failed(&AnalyzeRequest::default(), &rejected(rejection))),
    }
}

/// GET /api/databases
pub async fn list_databases(State(state): State<Arc<AppState>>) -> Result<Json<Vec<DatabaseTarget>>, ApiError> {
    Ok(Json(state.store.list_database_targets(false).await?))
}

/// POST /api/databases/{id}/test
pub async fn test_database(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<ConnectionTestResult>, ApiError> {
    let target = state.store.require_active_target(id).await?;
    Ok(Json(state.queries.connections().test_connection(&target).await))
}

/// POST /api/databases/{id}/sync - introspect the live database and sync
pub async fn sync_database(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<SyncReport>, ApiError> {
    let target = state.store.require_active_target(id).await?;
    let report = state
        .synchronizer
        .introspect_and_sync(state.queries.connections(), &target)
        .await?;
    Ok(Json(report))
}

/// POST /api/databases/{id}/schema - sync an externally supplied schema
pub async fn import_schema(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(schema): Json<IncomingSchema>,
) -> Result<Json<SyncReport>, ApiError> {
    Ok(Json(state.synchronizer.sync(id, &schema).await?))
}

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    provider: String,
    version: &'static str,
}

/// GET /api/health
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        provider: state.queries.llm().name().to_string(),
        version: env!("CARGO_PKG_VERSION"),
    })
}
