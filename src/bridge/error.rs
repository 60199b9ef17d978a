//! Bridge-specific error types.

use std::io;
use thiserror::Error;

/// Result type for bridge operations.
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Errors that can occur while talking to the driver bridge.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// No bridge binary could be located.
    #[error("driver bridge not found: {0}")]
    NotFound(String),

    /// Failed to spawn the bridge process.
    #[error("failed to spawn driver bridge: {0}")]
    SpawnFailed(#[source] io::Error),

    /// Failed to write to bridge stdin.
    #[error("failed to write to driver bridge: {0}")]
    WriteFailed(#[source] io::Error),

    /// Failed to serialize request to JSON.
    #[error("failed to serialize request: {0}")]
    SerializeFailed(#[source] serde_json::Error),

    /// Failed to deserialize response from JSON.
    #[error("failed to deserialize response: {0}")]
    DeserializeFailed(#[source] serde_json::Error),

    /// Request timed out waiting for response.
    #[error("request timed out after {0} seconds")]
    Timeout(u64),

    /// Bridge process exited or closed the response channel.
    #[error("driver bridge exited unexpectedly")]
    Exited,

    /// Database driver not available in the bridge.
    #[error("database driver not found: {0}")]
    DriverNotFound(String),

    /// Database connection failed.
    #[error("database connection failed: {0}")]
    ConnectionFailed(String),

    /// The database rejected the query.
    #[error("query failed: {0}")]
    QueryFailed(String),

    /// Bridge returned an error response with an unrecognised code.
    #[error("bridge error: {message} (code: {code})")]
    Remote { code: String, message: String },
}

impl BridgeError {
    pub fn remote(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Remote {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Map a bridge error code to a typed error.
    pub fn classify(code: &str, message: &str) -> Self {
        match code {
            "DRIVER_NOT_FOUND" => Self::DriverNotFound(message.to_string()),
            "CONNECTION_FAILED" => Self::ConnectionFailed(message.to_string()),
            "QUERY_FAILED" | "INVALID_REQUEST" => Self::QueryFailed(message.to_string()),
            "BRIDGE_EXITED" => Self::Exited,
            _ => Self::remote(code, message),
        }
    }

    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Exited)
    }
}

impl From<tokio::sync::oneshot::error::RecvError> for BridgeError {
    fn from(_: tokio::sync::oneshot::error::RecvError) -> Self {
        Self::Exited
    }
}
