//! LLM provider errors.

use thiserror::Error;

pub type LlmResult<T> = Result<T, LlmError>;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("unknown LLM provider: {0}")]
    UnknownProvider(String),

    #[error("missing {field} for LLM provider {provider}")]
    MissingConfig { provider: String, field: String },

    #[error("invalid endpoint for LLM provider {provider}: {endpoint}")]
    InvalidEndpoint { provider: String, endpoint: String },

    #[error("{provider} request failed: {source}")]
    Request {
        provider: String,
        #[source]
        source: reqwest::Error,
    },

    /// Non-success HTTP status. The body is kept for logs only.
    #[error("{provider} returned HTTP {status}: {body}")]
    ProviderStatus {
        provider: String,
        status: u16,
        body: String,
    },

    #[error("{provider} did not answer within {seconds} seconds")]
    Timeout { provider: String, seconds: u64 },

    #[error("{0} returned an empty response")]
    EmptyResponse(String),
}

impl LlmError {
    pub fn missing(provider: &str, field: &str) -> Self {
        Self::MissingConfig {
            provider: provider.to_string(),
            field: field.to_string(),
        }
    }
}
