//! Client-side workflow state.
//!
//! The server keeps no session: callers carry this state between the analyze,
//! generate and execute calls and rebuild each request from it.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::types::{AnalysisResult, ExecuteRequest, GenerateRequest, QueryExecutionResult, SqlGenerationResult};
use crate::error::{QueryError, QueryResultT};
use crate::llm::AdjustableParameter;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WorkflowStage {
    #[default]
    Idle,
    Analyzed,
    SqlGenerated,
    Executed,
}

impl fmt::Display for WorkflowStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            WorkflowStage::Idle => "idle",
            WorkflowStage::Analyzed => "analyzed",
            WorkflowStage::SqlGenerated => "sql generated",
            WorkflowStage::Executed => "executed",
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryWorkflowState {
    pub stage: WorkflowStage,
    pub question: String,
    pub database_id: i64,
    pub explanation: String,
    pub ambiguities: BTreeMap<String, Vec<String>>,
    pub adjustable_parameters: BTreeMap<String, AdjustableParameter>,
    pub confirmed_understanding: Option<String>,
    pub resolutions: BTreeMap<String, String>,
    pub sql: Option<String>,
}

impl QueryWorkflowState {
    /// State after a successful analysis.
    pub fn from_analysis(analysis: &AnalysisResult) -> QueryResultT<Self> {
        if !analysis.success {
            return Err(QueryError::invalid_argument("analysis did not succeed"));
        }
        let database_id = analysis
            .database_id
            .ok_or_else(|| QueryError::invalid_argument("analysis has no database id"))?;

        Ok(Self {
            stage: WorkflowStage::Analyzed,
            question: analysis.question.clone(),
            database_id,
            explanation: analysis.explanation.clone(),
            ambiguities: analysis.ambiguities.clone(),
            adjustable_parameters: analysis.adjustable_parameters.clone(),
            ..Default::default()
        })
    }

    /// Ambiguous terms the caller has not resolved yet.
    pub fn unresolved(&self) -> Vec<&str> {
        self.ambiguities
            .keys()
            .filter(|term| !self.resolutions.contains_key(*term))
            .map(String::as_str)
            .collect()
    }

    /// Confirm an understanding and build the generate request.
    ///
    /// Requires the analyzed stage and a non-empty understanding. Resolutions
    /// may only name ambiguities reported by the analysis.
    pub fn confirm(
        &mut self,
        understanding: &str,
        resolutions: BTreeMap<String, String>,
    ) -> QueryResultT<GenerateRequest> {
        self.expect_stage(WorkflowStage::Analyzed)?;

        let understanding = understanding.trim();
        if understanding.is_empty() {
            return Err(QueryError::invalid_argument("confirmed understanding is required"));
        }
        if let Some(term) = resolutions.keys().find(|t| !self.ambiguities.contains_key(*t)) {
            return Err(QueryError::invalid_argument(format!(
                "'{}' is not one of the reported ambiguities",
                term
            )));
        }

        self.confirmed_understanding = Some(understanding.to_string());
        self.resolutions = resolutions;

        Ok(GenerateRequest {
            original_question: self.question.clone(),
            database_id: Some(self.database_id),
            confirmed_understanding: understanding.to_string(),
            resolved_ambiguities: self.resolutions.clone(),
        })
    }

    /// Record the generated SQL and build the execute request.
    pub fn record_sql(&mut self, generated: &SqlGenerationResult) -> QueryResultT<ExecuteRequest> {
        self.expect_stage(WorkflowStage::Analyzed)?;
        let sql = match (&generated.sql, generated.success) {
            (Some(sql), true) => sql.clone(),
            _ => return Err(QueryError::invalid_argument("SQL generation did not succeed")),
        };

        self.sql = Some(sql.clone());
        self.stage = WorkflowStage::SqlGenerated;

        Ok(ExecuteRequest {
            sql,
            database_id: Some(self.database_id),
            original_question: Some(self.question.clone()),
        })
    }

    pub fn record_execution(&mut self, executed: &QueryExecutionResult) -> QueryResultT<()> {
        self.expect_stage(WorkflowStage::SqlGenerated)?;
        if executed.success {
            self.stage = WorkflowStage::Executed;
        }
        Ok(())
    }

    fn expect_stage(&self, expected: WorkflowStage) -> QueryResultT<()> {
        if self.stage != expected {
            return Err(QueryError::invalid_argument(format!(
                "workflow is {}, expected {}",
                self.stage, expected
            )));
        }
        Ok(())
    }
}
