//! LLM provider abstraction.
//!
//! ```text
//! QueryService ──▶ dyn LlmProvider ──▶ PromptedProvider<C> ──prompts──▶ C: ChatCompletion ──HTTP──▶ provider
//!                                                │
//!                                     parse_explanation / extract_sql_from_markdown
//! ```
//!
//! Every provider normalizes its output to the same shapes. Explanation
//! completions that cannot be parsed degrade to [`ParseOutcome::Degraded`]
//! instead of failing.

mod claude;
mod error;
mod openai_compat;
mod parse;
mod prompts;
mod provider;
mod registry;
mod types;

use std::collections::BTreeMap;

use async_trait::async_trait;

pub use claude::{ClaudeClient, ClaudeProvider};
pub use error::{LlmError, LlmResult};
pub use openai_compat::{ChatCompletionsClient, DeepSeekProvider, OpenAiProvider};
pub use parse::{extract_json_object, extract_sql_from_markdown, parse_explanation};
pub use prompts::{explanation_prompt, result_explanation_prompt, sql_prompt, Prompt, RESULT_SAMPLE_ROWS};
pub use provider::{ChatCompletion, PromptedProvider};
pub use registry::{ProviderConstructor, ProviderRegistry};
pub use types::{AdjustableParameter, ExplanationResponse, ParseOutcome};

use crate::connection::QueryResult;
use crate::schema::AdminTerms;

/// Capability interface implemented by every LLM backend.
///
/// Each method issues one provider call.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Interpret a question against the schema: explanation, ambiguities,
    /// adjustable parameters and confidence.
    async fn generate_explanation(
        &self,
        question: &str,
        schema_text: &str,
        admin_terms: &AdminTerms,
    ) -> LlmResult<ParseOutcome>;

    /// Produce SQL for a confirmed understanding. Markdown fences are stripped.
    async fn generate_sql(
        &self,
        question: &str,
        confirmed_understanding: &str,
        schema_text: &str,
        resolved_ambiguities: &BTreeMap<String, String>,
    ) -> LlmResult<String>;

    /// Summarize executed rows in plain language.
    async fn generate_result_explanation(
        &self,
        question: &str,
        sql: &str,
        result: &QueryResult,
    ) -> LlmResult<String>;
}
