//! Top-level error taxonomy.
//!
//! Lower layers have their own error enums; the query orchestrator converts
//! them into [`QueryError`] and from there into a structured failure response.

use serde::Serialize;
use thiserror::Error;

use crate::config::ConnectionError;
use crate::connection::DbError;
use crate::llm::LlmError;
use crate::metadata::MetadataError;

/// Result type for orchestrator operations.
pub type QueryResultT<T> = Result<T, QueryError>;

/// Coarse classification reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    InvalidArgument,
    UnsupportedEngine,
    Configuration,
    ConnectionFailure,
    ProviderCallFailure,
    ExecutionFailure,
    Timeout,
    NotFound,
    Storage,
}

/// Errors surfaced at the orchestrator boundary.
#[derive(Debug, Error)]
pub enum QueryError {
    /// A required input is missing or empty. Raised before any external call.
    #[error("{0}")]
    InvalidArgument(String),

    #[error("unsupported database engine: {0}")]
    UnsupportedEngine(String),

    /// Missing or malformed configuration (provider, API key, endpoint, bridge).
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("database connection failed: {0}")]
    ConnectionFailure(String),

    /// The LLM provider answered with a non-success status or the call failed.
    #[error("{provider} request failed{}: {message}", status.map(|s| format!(" (HTTP {})", s)).unwrap_or_default())]
    ProviderCallFailure {
        provider: String,
        status: Option<u16>,
        message: String,
    },

    #[error("query execution failed: {0}")]
    ExecutionFailure(String),

    /// A deadline expired. The only retriable kind.
    #[error("{stage} timed out after {seconds} seconds")]
    Timeout { stage: String, seconds: u64 },

    #[error("{0}")]
    NotFound(String),

    #[error("metadata store error: {0}")]
    Storage(String),
}

impl QueryError {
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            QueryError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            QueryError::UnsupportedEngine(_) => ErrorKind::UnsupportedEngine,
            QueryError::Configuration(_) => ErrorKind::Configuration,
            QueryError::ConnectionFailure(_) => ErrorKind::ConnectionFailure,
            QueryError::ProviderCallFailure { .. } => ErrorKind::ProviderCallFailure,
            QueryError::ExecutionFailure(_) => ErrorKind::ExecutionFailure,
            QueryError::Timeout { .. } => ErrorKind::Timeout,
            QueryError::NotFound(_) => ErrorKind::NotFound,
            QueryError::Storage(_) => ErrorKind::Storage,
        }
    }

    pub fn is_retriable(&self) -> bool {
        matches!(self, QueryError::Timeout { .. })
    }

    /// Message safe to show to an end user.
    ///
    /// Provider failures only report the status; the response body stays in the logs.
    pub fn user_message(&self) -> String {
        match self {
            QueryError::ProviderCallFailure {
                status: Some(status),
                ..
            } => format!("The language model provider request failed (HTTP {})", status),
            QueryError::ProviderCallFailure { status: None, .. } => {
                "The language model provider request failed".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl From<ConnectionError> for QueryError {
    fn from(err: ConnectionError) -> Self {
        match err {
            ConnectionError::UnsupportedEngine(kind) => QueryError::UnsupportedEngine(kind),
            other => QueryError::Configuration(other.to_string()),
        }
    }
}

impl From<DbError> for QueryError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::Config(e) => e.into(),
            DbError::BridgeUnavailable(msg) => QueryError::Configuration(msg),
            DbError::ConnectionFailed(msg) => QueryError::ConnectionFailure(msg),
            DbError::QueryFailed(msg) | DbError::Internal(msg) => QueryError::ExecutionFailure(msg),
            DbError::Timeout(seconds) => QueryError::Timeout {
                stage: "database call".to_string(),
                seconds,
            },
        }
    }
}

impl From<MetadataError> for QueryError {
    fn from(err: MetadataError) -> Self {
        match err {
            MetadataError::NotFound(msg) => QueryError::NotFound(msg),
            other => QueryError::Storage(other.to_string()),
        }
    }
}

impl From<LlmError> for QueryError {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::UnknownProvider(_) | LlmError::MissingConfig { .. } | LlmError::InvalidEndpoint { .. } => {
                QueryError::Configuration(err.to_string())
            }
            LlmError::ProviderStatus {
                provider,
                status,
                body,
            } => QueryError::ProviderCallFailure {
                provider,
                status: Some(status),
                message: body,
            },
            LlmError::Timeout { seconds, .. } => QueryError::Timeout {
                stage: "language model call".to_string(),
                seconds,
            },
            LlmError::Request { provider, source } => QueryError::ProviderCallFailure {
                provider,
                status: None,
                message: source.to_string(),
            },
            LlmError::EmptyResponse(provider) => QueryError::ProviderCallFailure {
                provider,
                status: None,
                message: "empty response".to_string(),
            },
        }
    }
}
