//! Request and response shapes for the query workflow.
//!
//! Responses always echo their inputs so a caller can show context even when
//! `success` is false.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::classify::ViewingType;
use crate::connection::QueryResult;
use crate::error::{ErrorKind, QueryError};
use crate::llm::{AdjustableParameter, ExplanationResponse};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeRequest {
    #[serde(default)]
    pub question: String,
    #[serde(default)]
    pub database_id: Option<i64>,
}

impl AnalyzeRequest {
    pub fn new(question: impl Into<String>, database_id: i64) -> Self {
        Self {
            question: question.into(),
            database_id: Some(database_id),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    #[serde(default)]
    pub original_question: String,
    #[serde(default)]
    pub database_id: Option<i64>,
    #[serde(default)]
    pub confirmed_understanding: String,
    /// Ambiguous term -> chosen interpretation.
    #[serde(default)]
    pub resolved_ambiguities: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteRequest {
    #[serde(default)]
    pub sql: String,
    #[serde(default)]
    pub database_id: Option<i64>,
    /// When present, the rows are also explained in plain language.
    #[serde(default)]
    pub original_question: Option<String>,
}

/// Error fields shared by every response.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Failure {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub retriable: bool,
}

impl Failure {
    pub fn from_error(err: &QueryError) -> Self {
        Self {
            error_message: Some(err.user_message()),
            error_kind: Some(err.kind()),
            retriable: err.is_retriable(),
        }
    }
}

/// Outcome of the analyze stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub success: bool,
    pub question: String,
    pub database_id: Option<i64>,
    pub explanation: String,
    pub has_ambiguities: bool,
    pub ambiguities: BTreeMap<String, Vec<String>>,
    pub adjustable_parameters: BTreeMap<String, AdjustableParameter>,
    pub confidence_score: f64,
    pub preview_sql: Option<String>,
    pub term_mapping: BTreeMap<String, String>,
    /// The provider's answer could not be parsed; `explanation` holds its raw text.
    pub degraded: bool,
    #[serde(flatten)]
    pub failure: Failure,
}

impl AnalysisResult {
    pub fn succeeded(request: &AnalyzeRequest, response: ExplanationResponse, degraded: bool) -> Self {
        Self {
            success: true,
            question: request.question.clone(),
            database_id: request.database_id,
            explanation: response.explanation,
            has_ambiguities: response.has_ambiguities,
            ambiguities: response.ambiguities,
            adjustable_parameters: response.adjustable_parameters,
            confidence_score: response.confidence_score,
            preview_sql: response.preview_sql,
            term_mapping: response.term_mapping,
            degraded,
            failure: Failure::default(),
        }
    }

    pub fn failed(request: &AnalyzeRequest, err: &QueryError) -> Self {
        Self {
            success: false,
            question: request.question.clone(),
            database_id: request.database_id,
            failure: Failure::from_error(err),
            ..Default::default()
        }
    }
}

/// Outcome of the generate stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SqlGenerationResult {
    pub success: bool,
    pub original_question: String,
    pub database_id: Option<i64>,
    pub confirmed_understanding: String,
    pub resolved_ambiguities: BTreeMap<String, String>,
    pub sql: Option<String>,
    #[serde(flatten)]
    pub failure: Failure,
}

impl SqlGenerationResult {
    pub fn succeeded(request: &GenerateRequest, sql: String) -> Self {
        Self {
            success: true,
            sql: Some(sql),
            ..Self::echo(request)
        }
    }

    pub fn failed(request: &GenerateRequest, err: &QueryError) -> Self {
        Self {
            failure: Failure::from_error(err),
            ..Self::echo(request)
        }
    }

    fn echo(request: &GenerateRequest) -> Self {
        Self {
            original_question: request.original_question.clone(),
            database_id: request.database_id,
            confirmed_understanding: request.confirmed_understanding.clone(),
            resolved_ambiguities: request.resolved_ambiguities.clone(),
            ..Default::default()
        }
    }
}

/// Outcome of the execute stage.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryExecutionResult {
    pub success: bool,
    /// The executed SQL, echoed unchanged.
    pub sql: String,
    pub database_id: Option<i64>,
    pub original_question: Option<String>,
    pub result: Option<QueryResult>,
    pub viewing_type: ViewingType,
    pub formatted_value: Option<String>,
    pub result_explanation: Option<String>,
    pub elapsed_ms: u64,
    #[serde(flatten)]
    pub failure: Failure,
}

impl QueryExecutionResult {
    pub fn echo(request: &ExecuteRequest) -> Self {
        Self {
            success: false,
            sql: request.sql.clone(),
            database_id: request.database_id,
            original_question: request.original_question.clone(),
            result: None,
            viewing_type: ViewingType::Table,
            formatted_value: None,
            result_explanation: None,
            elapsed_ms: 0,
            failure: Failure::default(),
        }
    }

    pub fn failed(request: &ExecuteRequest, err: &QueryError) -> Self {
        Self {
            failure: Failure::from_error(err),
            ..Self::echo(request)
        }
    }

    pub fn row_count(&self) -> usize {
        self.result.as_ref().map(QueryResult::row_count).unwrap_or(0)
    }
}

/// Stage reached by the one-shot path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ProcessStage {
    Analyze,
    Generate,
    Execute,
}

/// Outcome of the one-shot path: the execution shape plus the analysis metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CombinedResult {
    pub question: String,
    pub explanation: String,
    pub has_ambiguities: bool,
    pub ambiguities: BTreeMap<String, Vec<String>>,
    pub adjustable_parameters: BTreeMap<String, AdjustableParameter>,
    pub confidence_score: f64,
    pub term_mapping: BTreeMap<String, String>,
    pub degraded: bool,
    /// Set when a stage failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_stage: Option<ProcessStage>,
    #[serde(flatten)]
    pub execution: QueryExecutionResult,
}

impl CombinedResult {
    /// Failure before the analyze stage produced anything.
    pub fn failed(request: &AnalyzeRequest, err: &QueryError) -> Self {
        let execute = ExecuteRequest {
            sql: String::new(),
            database_id: request.database_id,
            original_question: Some(request.question.clone()),
        };
        Self {
            question: request.question.clone(),
            explanation: String::new(),
            has_ambiguities: false,
            ambiguities: BTreeMap::new(),
            adjustable_parameters: BTreeMap::new(),
            confidence_score: 0.0,
            term_mapping: BTreeMap::new(),
            degraded: false,
            failed_stage: Some(ProcessStage::Analyze),
            execution: QueryExecutionResult::failed(&execute, err),
        }
    }

    pub fn success(&self) -> bool {
        self.execution.success
    }
}
