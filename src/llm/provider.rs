//! Prompt-driven implementation of [`LlmProvider`] over a chat endpoint.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{RequestBuilder, Url};

use super::error::{LlmError, LlmResult};
use super::parse::{extract_sql_from_markdown, parse_explanation};
use super::prompts::{explanation_prompt, result_explanation_prompt, sql_prompt, Prompt};
use super::types::ParseOutcome;
use super::LlmProvider;
use crate::connection::QueryResult;
use crate::schema::AdminTerms;

/// One provider-specific request/response envelope.
#[async_trait]
pub trait ChatCompletion: Send + Sync {
    fn name(&self) -> &str;

    /// Send one system + user exchange and return the completion text.
    async fn complete(&self, prompt: &Prompt) -> LlmResult<String>;
}

/// Turns the three provider operations into prompts for a [`ChatCompletion`].
pub struct PromptedProvider<C> {
    chat: C,
}

impl<C: ChatCompletion> PromptedProvider<C> {
    pub fn new(chat: C) -> Self {
        Self { chat }
    }

    async fn timed(&self, operation: &'static str, prompt: &Prompt) -> LlmResult<String> {
        tracing::debug!(provider = self.chat.name(), operation, "calling LLM provider");
        let started = Instant::now();
        let text = self.chat.complete(prompt).await?;
        tracing::info!(
            provider = self.chat.name(),
            operation,
            chars = text.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "LLM call completed"
        );
        Ok(text)
    }
}

#[async_trait]
impl<C: ChatCompletion> LlmProvider for PromptedProvider<C> {
    fn name(&self) -> &str {
        self.chat.name()
    }

    async fn generate_explanation(
        &self,
        question: &str,
        schema_text: &str,
        admin_terms: &AdminTerms,
    ) -> LlmResult<ParseOutcome> {
        let prompt = explanation_prompt(question, schema_text, admin_terms);
        let text = self.timed("explanation", &prompt).await?;
        Ok(parse_explanation(&text))
    }

    async fn generate_sql(
        &self,
        question: &str,
        confirmed_understanding: &str,
        schema_text: &str,
        resolved_ambiguities: &BTreeMap<String, String>,
    ) -> LlmResult<String> {
        let prompt = sql_prompt(question, confirmed_understanding, schema_text, resolved_ambiguities);
        let text = self.timed("sql", &prompt).await?;
        let sql = extract_sql_from_markdown(&text);
        if sql.is_empty() {
            return Err(LlmError::EmptyResponse(self.chat.name().to_string()));
        }
        Ok(sql)
    }

    async fn generate_result_explanation(
        &self,
        question: &str,
        sql: &str,
        result: &QueryResult,
    ) -> LlmResult<String> {
        let prompt = result_explanation_prompt(question, sql, result);
        let text = self.timed("result_explanation", &prompt).await?;
        Ok(text.trim().to_string())
    }
}

/// Build the shared HTTP client with the provider call deadline.
pub(crate) fn http_client(provider: &str, timeout: Duration) -> LlmResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|source| LlmError::Request {
            provider: provider.to_string(),
            source,
        })
}

/// Validate a configured endpoint, falling back to the provider default.
pub(crate) fn endpoint_url(provider: &str, configured: Option<&str>, default: &str) -> LlmResult<Url> {
    let raw = configured.map(str::trim).filter(|s| !s.is_empty()).unwrap_or(default);
    let invalid = || LlmError::InvalidEndpoint {
        provider: provider.to_string(),
        endpoint: raw.to_string(),
    };

    let url = Url::parse(raw).map_err(|_| invalid())?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(invalid());
    }
    Ok(url)
}

/// Send a request and return the body of a successful response.
///
/// Non-success statuses are logged with their body and returned as
/// [`LlmError::ProviderStatus`]. Client deadline expiry becomes [`LlmError::Timeout`].
pub(crate) async fn send(provider: &str, timeout: Duration, request: RequestBuilder) -> LlmResult<String> {
    let map_err = |source: reqwest::Error| {
        if source.is_timeout() {
            LlmError::Timeout {
                provider: provider.to_string(),
                seconds: timeout.as_secs(),
            }
        } else {
            LlmError::Request {
                provider: provider.to_string(),
                source,
            }
        }
    };

    let response = request.send().await.map_err(map_err)?;
    let status = response.status();
    let body = response.text().await.map_err(map_err)?;

    if !status.is_success() {
        tracing::error!(provider, status = status.as_u16(), body = %body, "LLM provider returned an error");
        return Err(LlmError::ProviderStatus {
            provider: provider.to_string(),
            status: status.as_u16(),
            body,
        });
    }

    Ok(body)
}
