//! OpenAI-style chat completions, used by OpenAI and DeepSeek.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use serde::Deserialize;
use serde_json::json;

use super::error::{LlmError, LlmResult};
use super::prompts::Prompt;
use super::provider::{endpoint_url, http_client, send, ChatCompletion, PromptedProvider};
use crate::config::ProviderSettings;

pub const OPENAI_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";
pub const OPENAI_MODEL: &str = "gpt-4o";
pub const DEEPSEEK_ENDPOINT: &str = "https://api.deepseek.com/v1/chat/completions";
pub const DEEPSEEK_MODEL: &str = "deepseek-chat";

pub type OpenAiProvider = PromptedProvider<ChatCompletionsClient>;
pub type DeepSeekProvider = PromptedProvider<ChatCompletionsClient>;

#[derive(Debug, Deserialize)]
struct CompletionsResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Debug, Deserialize)]
struct Message {
    #[serde(default)]
    content: Option<String>,
}

/// Bearer-authenticated `/chat/completions` client.
pub struct ChatCompletionsClient {
    name: &'static str,
    http: reqwest::Client,
    endpoint: Url,
    api_key: String,
    model: String,
    max_tokens: Option<u32>,
    temperature: f32,
    timeout: Duration,
}

impl ChatCompletionsClient {
    fn build(
        name: &'static str,
        default_endpoint: &str,
        default_model: &str,
        api_key: String,
        settings: &ProviderSettings,
        timeout: Duration,
    ) -> LlmResult<Self> {
        Ok(Self {
            name,
            http: http_client(name, timeout)?,
            endpoint: endpoint_url(name, settings.endpoint.as_deref(), default_endpoint)?,
            api_key,
            model: settings.model.clone().unwrap_or_else(|| default_model.to_string()),
            max_tokens: settings.max_tokens,
            temperature: settings.temperature.unwrap_or(0.0),
            timeout,
        })
    }

    pub fn openai(api_key: String, settings: &ProviderSettings, timeout: Duration) -> LlmResult<Self> {
        Self::build("openai", OPENAI_ENDPOINT, OPENAI_MODEL, api_key, settings, timeout)
    }

    pub fn deepseek(api_key: String, settings: &ProviderSettings, timeout: Duration) -> LlmResult<Self> {
        Self::build("deepseek", DEEPSEEK_ENDPOINT, DEEPSEEK_MODEL, api_key, settings, timeout)
    }
}

#[async_trait]
impl ChatCompletion for ChatCompletionsClient {
    fn name(&self) -> &str {
        self.name
    }

    async fn complete(&self, prompt: &Prompt) -> LlmResult<String> {
        let mut payload = json!({
            "model": self.model,
            "temperature": self.temperature,
            "messages": [
                {"role": "system", "content": prompt.system},
                {"role": "user", "content": prompt.user},
            ],
        });
        if let Some(max_tokens) = self.max_tokens {
            payload["max_tokens"] = json!(max_tokens);
        }

        let request = self
            .http
            .post(self.endpoint.clone())
            .bearer_auth(&self.api_key)
            .json(&payload);

        let body = send(self.name, self.timeout, request).await?;
        let parsed: CompletionsResponse = serde_json::from_str(&body).map_err(|e| {
            tracing::warn!(provider = self.name, error = %e, "unreadable response envelope");
            LlmError::EmptyResponse(self.name.to_string())
        })?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|text| !text.trim().is_empty())
            .ok_or_else(|| LlmError::EmptyResponse(self.name.to_string()))
    }
}
