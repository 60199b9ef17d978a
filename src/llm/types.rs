//! Normalized provider outputs.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A tunable value embedded in the SQL the model intends to generate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdjustableParameter {
    pub default_value: String,
    #[serde(rename = "type")]
    pub param_type: String,
    #[serde(default)]
    pub alternatives: Vec<String>,
}

/// The model's reading of a question, before any SQL is generated.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExplanationResponse {
    pub explanation: String,
    pub has_ambiguities: bool,
    /// Term -> candidate interpretations.
    pub ambiguities: BTreeMap<String, Vec<String>>,
    pub adjustable_parameters: BTreeMap<String, AdjustableParameter>,
    /// Between 0 and 1.
    pub confidence_score: f64,
    pub preview_sql: Option<String>,
    /// Question term -> schema element.
    pub term_mapping: BTreeMap<String, String>,
}

/// Result of parsing an explanation completion.
///
/// Model output is not guaranteed to be well-formed; a completion that cannot
/// be read as an explanation object is `Degraded` rather than an error.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseOutcome {
    Parsed(ExplanationResponse),
    Degraded(String),
}

impl ParseOutcome {
    pub fn is_degraded(&self) -> bool {
        matches!(self, ParseOutcome::Degraded(_))
    }

    /// Collapse into a response. A degraded outcome keeps the trimmed raw text
    /// as the explanation with zero confidence.
    pub fn into_response(self) -> ExplanationResponse {
        match self {
            ParseOutcome::Parsed(response) => response,
            ParseOutcome::Degraded(raw) => ExplanationResponse {
                explanation: raw.trim().to_string(),
                ..Default::default()
            },
        }
    }
}
