//! Provider registry.
//!
//! Maps provider names to constructors. The active provider is built once at
//! startup so an unknown name, a missing key or a malformed endpoint fails
//! before the first request.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use super::claude::ClaudeClient;
use super::error::{LlmError, LlmResult};
use super::openai_compat::ChatCompletionsClient;
use super::provider::PromptedProvider;
use super::LlmProvider;
use crate::config::{LlmSettings, ProviderSettings};

/// Builds a provider from its API key, settings and call timeout.
pub type ProviderConstructor =
    fn(api_key: String, settings: &ProviderSettings, timeout: Duration) -> LlmResult<Arc<dyn LlmProvider>>;

pub struct ProviderRegistry {
    constructors: BTreeMap<String, ProviderConstructor>,
}

impl ProviderRegistry {
    pub fn empty() -> Self {
        Self {
            constructors: BTreeMap::new(),
        }
    }

    /// Registry with the built-in Claude, DeepSeek and OpenAI providers.
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register("claude", |key, settings, timeout| {
            Ok(Arc::new(PromptedProvider::new(ClaudeClient::new(key, settings, timeout)?)))
        });
        registry.register("deepseek", |key, settings, timeout| {
            Ok(Arc::new(PromptedProvider::new(ChatCompletionsClient::deepseek(
                key, settings, timeout,
            )?)))
        });
        registry.register("openai", |key, settings, timeout| {
            Ok(Arc::new(PromptedProvider::new(ChatCompletionsClient::openai(
                key, settings, timeout,
            )?)))
        });
        registry
    }

    /// Register or replace a constructor. Names are case-insensitive.
    pub fn register(&mut self, name: &str, constructor: ProviderConstructor) {
        self.constructors.insert(name.to_lowercase(), constructor);
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.constructors.keys().map(String::as_str)
    }

    /// Build the provider selected in `settings`.
    pub fn build(&self, settings: &LlmSettings) -> LlmResult<Arc<dyn LlmProvider>> {
        let name = settings.provider.trim().to_lowercase();
        let constructor = self
            .constructors
            .get(&name)
            .ok_or_else(|| LlmError::UnknownProvider(settings.provider.clone()))?;

        let provider_settings = settings
            .active()
            .ok_or_else(|| LlmError::missing(&name, &format!("[llm.providers.{}] section", name)))?;

        let api_key = provider_settings
            .resolved_api_key()
            .map_err(|e| LlmError::missing(&name, &format!("api_key ({})", e)))?;
        if api_key.trim().is_empty() {
            return Err(LlmError::missing(&name, "api_key"));
        }

        let provider = constructor(api_key, provider_settings, settings.timeout())?;
        tracing::info!(provider = %name, timeout_secs = settings.timeout_seconds, "LLM provider ready");
        Ok(provider)
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
