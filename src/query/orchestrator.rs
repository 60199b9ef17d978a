//! Natural-language query orchestrator.
//!
//! Every public operation is a recovery boundary: failures come back as a
//! response with `success = false`, never as an `Err`.

use std::sync::Arc;
use std::time::Instant;

use super::classify::{classify, NumberLocale};
use super::types::{
    AnalysisResult, AnalyzeRequest, CombinedResult, ExecuteRequest, GenerateRequest, ProcessStage,
    QueryExecutionResult, SqlGenerationResult,
};
use crate::config::Settings;
use crate::connection::{ConnectionProvider, QueryResult};
use crate::error::{QueryError, QueryResultT};
use crate::llm::{ExplanationResponse, LlmProvider};
use crate::metadata::{MetadataStore, MetadataStoreExt};
use crate::schema::SchemaContextBuilder;

/// Runs the analyze, generate and execute stages.
///
/// Holds only shared, immutable collaborators; concurrent calls do not interact.
#[derive(Clone)]
pub struct QueryService {
    store: Arc<dyn MetadataStore>,
    schema: SchemaContextBuilder,
    llm: Arc<dyn LlmProvider>,
    connections: ConnectionProvider,
    locale: NumberLocale,
    explain_results: bool,
}

impl QueryService {
    pub fn new(store: Arc<dyn MetadataStore>, llm: Arc<dyn LlmProvider>, connections: ConnectionProvider) -> Self {
        Self {
            schema: SchemaContextBuilder::new(store.clone()),
            store,
            llm,
            connections,
            locale: NumberLocale::default(),
            explain_results: true,
        }
    }

    /// Build from settings. An unknown `[format] locale` is a configuration error.
    pub fn from_settings(
        settings: &Settings,
        store: Arc<dyn MetadataStore>,
        llm: Arc<dyn LlmProvider>,
    ) -> QueryResultT<Self> {
        let locale = settings
            .format
            .locale
            .parse::<NumberLocale>()
            .map_err(QueryError::Configuration)?;

        Ok(Self::new(store, llm, ConnectionProvider::from_settings(settings))
            .with_locale(locale)
            .with_result_explanations(settings.query.explain_results))
    }

    pub fn with_locale(mut self, locale: NumberLocale) -> Self {
        self.locale = locale;
        self
    }

    pub fn with_result_explanations(mut self, enabled: bool) -> Self {
        self.explain_results = enabled;
        self
    }

    pub fn llm(&self) -> &Arc<dyn LlmProvider> {
        &self.llm
    }

    pub fn connections(&self) -> &ConnectionProvider {
        &self.connections
    }

    /// Interpret a question. `Idle -> Analyzed`.
    pub async fn analyze(&self, request: &AnalyzeRequest) -> AnalysisResult {
        tracing::debug!(database_id = ?request.database_id, "analyze");
        let started = Instant::now();

        match self.try_analyze(request).await {
            Ok((response, degraded)) => {
                tracing::info!(
                    database_id = ?request.database_id,
                    confidence = response.confidence_score,
                    ambiguities = response.ambiguities.len(),
                    degraded,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "analyze completed"
                );
                AnalysisResult::succeeded(request, response, degraded)
            }
            Err(err) => {
                log_failure("analyze", &err);
                AnalysisResult::failed(request, &err)
            }
        }
    }

    async fn try_analyze(&self, request: &AnalyzeRequest) -> QueryResultT<(ExplanationResponse, bool)> {
        let question = required("question", &request.question)?;
        let database_id = required_id(request.database_id)?;

        let context = self.schema.build(database_id).await?;
        let outcome = self
            .llm
            .generate_explanation(question, &context.schema_text, &context.admin_terms)
            .await?;

        let degraded = outcome.is_degraded();
        if degraded {
            tracing::warn!(database_id, provider = self.llm.name(), "explanation degraded to raw text");
        }
        Ok((outcome.into_response(), degraded))
    }

    /// Generate SQL for a confirmed understanding. `Analyzed -> SqlGenerated`.
    pub async fn generate(&self, request: &GenerateRequest) -> SqlGenerationResult {
        tracing::debug!(database_id = ?request.database_id, "generate");
        let started = Instant::now();

        match self.try_generate(request).await {
            Ok(sql) => {
                tracing::info!(
                    database_id = ?request.database_id,
                    sql_chars = sql.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "generate completed"
                );
                SqlGenerationResult::succeeded(request, sql)
            }
            Err(err) => {
                log_failure("generate", &err);
                SqlGenerationResult::failed(request, &err)
            }
        }
    }

    async fn try_generate(&self, request: &GenerateRequest) -> QueryResultT<String> {
        let question = required("original question", &request.original_question)?;
        let database_id = required_id(request.database_id)?;
        let understanding = required("confirmed understanding", &request.confirmed_understanding)?;

        let schema_text = self.schema.build_schema_text(database_id).await?;
        let sql = self
            .llm
            .generate_sql(question, understanding, &schema_text, &request.resolved_ambiguities)
            .await?;
        Ok(sql)
    }

    /// Run SQL against the target and classify the rows. `SqlGenerated -> Executed`.
    ///
    /// The rows are explained only when the original question is supplied.
    pub async fn execute(&self, request: &ExecuteRequest) -> QueryExecutionResult {
        tracing::debug!(database_id = ?request.database_id, "execute");
        let started = Instant::now();

        let rows = match self.try_execute(request).await {
            Ok(rows) => rows,
            Err(err) => {
                log_failure("execute", &err);
                let mut failed = QueryExecutionResult::failed(request, &err);
                failed.elapsed_ms = started.elapsed().as_millis() as u64;
                return failed;
            }
        };

        let classification = classify(&rows, &request.sql, self.locale);
        let result_explanation = self.explain_rows(request, &rows).await;

        let mut response = QueryExecutionResult::echo(request);
        response.success = true;
        response.viewing_type = classification.viewing_type;
        response.formatted_value = classification.formatted_value;
        response.result_explanation = result_explanation;
        response.result = Some(rows);
        response.elapsed_ms = started.elapsed().as_millis() as u64;

        tracing::info!(
            database_id = ?request.database_id,
            rows = response.row_count(),
            viewing_type = %response.viewing_type,
            elapsed_ms = response.elapsed_ms,
            "execute completed"
        );
        response
    }

    async fn try_execute(&self, request: &ExecuteRequest) -> QueryResultT<QueryResult> {
        let sql = required("SQL", &request.sql)?;
        let database_id = required_id(request.database_id)?;

        let target = self.store.require_active_target(database_id).await?;
        let connection = self.connections.open(&target).await?;
        let rows = self.connections.run(connection.execute(sql)).await;
        connection.close().await;
        Ok(rows?)
    }

    async fn explain_rows(&self, request: &ExecuteRequest, rows: &QueryResult) -> Option<String> {
        let question = request
            .original_question
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())?;
        if !self.explain_results {
            return None;
        }

        match self
            .llm
            .generate_result_explanation(question, &request.sql, rows)
            .await
        {
            Ok(text) => Some(text),
            Err(err) => {
                tracing::warn!(provider = self.llm.name(), error = %err, "result explanation skipped");
                None
            }
        }
    }

    /// One-shot path: analyze, auto-confirm, generate and execute.
    ///
    /// The explanation is used verbatim as the confirmed understanding and no
    /// ambiguity is resolved. This keeps single-call clients working at the
    /// cost of the disambiguation step.
    pub async fn process(&self, request: &AnalyzeRequest) -> CombinedResult {
        let analysis = self.analyze(request).await;
        let mut combined = CombinedResult {
            question: request.question.clone(),
            explanation: analysis.explanation.clone(),
            has_ambiguities: analysis.has_ambiguities,
            ambiguities: analysis.ambiguities.clone(),
            adjustable_parameters: analysis.adjustable_parameters.clone(),
            confidence_score: analysis.confidence_score,
            term_mapping: analysis.term_mapping.clone(),
            degraded: analysis.degraded,
            failed_stage: None,
            execution: QueryExecutionResult::echo(&ExecuteRequest {
                sql: String::new(),
                database_id: request.database_id,
                original_question: Some(request.question.clone()),
            }),
        };

        if !analysis.success {
            combined.failed_stage = Some(ProcessStage::Analyze);
            combined.execution.failure = analysis.failure;
            return combined;
        }

        let generated = self
            .generate(&GenerateRequest {
                original_question: request.question.clone(),
                database_id: request.database_id,
                confirmed_understanding: analysis.explanation.clone(),
                resolved_ambiguities: Default::default(),
            })
            .await;

        let Some(sql) = generated.sql.filter(|_| generated.success) else {
            combined.failed_stage = Some(ProcessStage::Generate);
            combined.execution.failure = generated.failure;
            return combined;
        };

        combined.execution = self
            .execute(&ExecuteRequest {
                sql,
                database_id: request.database_id,
                original_question: Some(request.question.clone()),
            })
            .await;
        if !combined.execution.success {
            combined.failed_stage = Some(ProcessStage::Execute);
        }
        combined
    }
}

fn required<'a>(field: &str, value: &'a str) -> QueryResultT<&'a str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(QueryError::invalid_argument(format!("{} is required", field)));
    }
    Ok(trimmed)
}

fn required_id(database_id: Option<i64>) -> QueryResultT<i64> {
    match database_id {
        Some(id) if id > 0 => Ok(id),
        _ => Err(QueryError::invalid_argument("database id is required")),
    }
}

fn log_failure(stage: &'static str, err: &QueryError) {
    match err {
        QueryError::InvalidArgument(_) => tracing::debug!(stage, error = %err, "request rejected"),
        _ => tracing::warn!(stage, kind = ?err.kind(), retriable = err.is_retriable(), error = %err, "stage failed"),
    }
}
