//! Anthropic Messages API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use serde::Deserialize;
use serde_json::json;

use super::error::{LlmError, LlmResult};
use super::prompts::Prompt;
use super::provider::{endpoint_url, http_client, send, ChatCompletion, PromptedProvider};
use crate::config::ProviderSettings;

pub const DEFAULT_ENDPOINT: &str = "https://api.anthropic.com/v1/messages";
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
const API_VERSION: &str = "2023-06-01";

pub type ClaudeProvider = PromptedProvider<ClaudeClient>;

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

pub struct ClaudeClient {
    http: reqwest::Client,
    endpoint: Url,
    api_key: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
    timeout: Duration,
}

impl ClaudeClient {
    pub fn new(api_key: String, settings: &ProviderSettings, timeout: Duration) -> LlmResult<Self> {
        Ok(Self {
            http: http_client("claude", timeout)?,
            endpoint: endpoint_url("claude", settings.endpoint.as_deref(), DEFAULT_ENDPOINT)?,
            api_key,
            model: settings.model.clone().unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            max_tokens: settings.max_tokens.unwrap_or(4096),
            temperature: settings.temperature.unwrap_or(0.0),
            timeout,
        })
    }
}

#[async_trait]
impl ChatCompletion for ClaudeClient {
    fn name(&self) -> &str {
        "claude"
    }

    async fn complete(&self, prompt: &Prompt) -> LlmResult<String> {
        let request = self
            .http
            .post(self.endpoint.clone())
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&json!({
                "model": self.model,
                "max_tokens": self.max_tokens,
                "temperature": self.temperature,
                "system": prompt.system,
                "messages": [{"role": "user", "content": prompt.user}],
            }));

        let body = send(self.name(), self.timeout, request).await?;
        let parsed: MessagesResponse = serde_json::from_str(&body).map_err(|e| {
            tracing::warn!(provider = "claude", error = %e, "unreadable response envelope");
            LlmError::EmptyResponse(self.name().to_string())
        })?;

        let text: String = parsed
            .content
            .into_iter()
            .filter(|block| block.kind == "text")
            .map(|block| block.text)
            .collect();

        if text.trim().is_empty() {
            return Err(LlmError::EmptyResponse(self.name().to_string()));
        }
        Ok(text)
    }
}
