//! Connection-layer errors.

use thiserror::Error;

use crate::bridge::BridgeError;
use crate::config::ConnectionError;

/// Result type for connection operations.
pub type DbResult<T> = Result<T, DbError>;

/// Errors raised while opening or using a target database.
#[derive(Debug, Error)]
pub enum DbError {
    /// Engine kind or connection fields are unusable.
    #[error(transparent)]
    Config(#[from] ConnectionError),

    /// The driver bridge needed for this engine could not be started.
    #[error("driver bridge unavailable: {0}")]
    BridgeUnavailable(String),

    /// Host unreachable, credentials rejected, file missing.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// The database rejected the statement.
    #[error("{0}")]
    QueryFailed(String),

    #[error("timed out after {0} seconds")]
    Timeout(u64),

    #[error("internal error: {0}")]
    Internal(String),
}

impl DbError {
    /// Map a bridge error raised while opening a connection.
    pub(crate) fn from_bridge_open(err: BridgeError) -> Self {
        match err {
            BridgeError::Timeout(secs) => DbError::Timeout(secs),
            BridgeError::NotFound(msg) => DbError::BridgeUnavailable(msg),
            BridgeError::SpawnFailed(e) => DbError::BridgeUnavailable(e.to_string()),
            other => DbError::ConnectionFailed(other.to_string()),
        }
    }

    /// Map a bridge error raised while running a statement.
    pub(crate) fn from_bridge_query(err: BridgeError) -> Self {
        match err {
            BridgeError::Timeout(secs) => DbError::Timeout(secs),
            BridgeError::QueryFailed(msg) => DbError::QueryFailed(msg),
            BridgeError::Remote { message, .. } => DbError::QueryFailed(message),
            BridgeError::ConnectionFailed(msg) => DbError::ConnectionFailed(msg),
            other => DbError::Internal(other.to_string()),
        }
    }
}
