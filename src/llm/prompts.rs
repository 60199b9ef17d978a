//! Prompt templates shared by every provider.

use std::collections::BTreeMap;

use crate::connection::QueryResult;
use crate::schema::{render_admin_terms, AdminTerms};

/// Rows included when asking for a result explanation.
pub const RESULT_SAMPLE_ROWS: usize = 50;

/// A system + user message pair.
#[derive(Debug, Clone, PartialEq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

const EXPLANATION_SYSTEM: &str = "You are a data analyst who translates business questions into \
precise plans over a relational database. You never invent tables or columns that are not in the \
schema. Reply with a single JSON object and nothing else.";

const EXPLANATION_FORMAT: &str = r#"Respond with JSON in exactly this shape:
{
  "explanation": "plain-language description of what will be queried and how",
  "hasAmbiguities": false,
  "ambiguities": {"<term from the question>": ["<interpretation 1>", "<interpretation 2>"]},
  "adjustableParameters": {"<name>": {"defaultValue": "<value>", "type": "date|number|string", "alternatives": ["<value>"]}},
  "confidenceScore": 0.0,
  "previewSql": "<draft SQL or empty string>",
  "termMapping": {"<term from the question>": "<table or table.column>"}
}"#;

const SQL_SYSTEM: &str = "You write a single read-only SQL query for the given database. Use only \
tables and columns from the schema. Reply with the SQL only, without commentary.";

const RESULT_SYSTEM: &str = "You summarize query results for business users in two or three \
sentences. Mention concrete numbers. Do not describe the SQL.";

/// Prompt for the analyze stage.
pub fn explanation_prompt(question: &str, schema_text: &str, admin_terms: &AdminTerms) -> Prompt {
    let user = format!(
        "Database schema:\n{schema}\n\n\
         Business terms used by administrators:\n{terms}\n\n\
         Question: {question}\n\n\
         List every term in the question that could map to more than one table, column or \
         filter as an ambiguity, and every literal value (dates, thresholds, categories) as an \
         adjustable parameter.\n\n{format}",
        schema = schema_text,
        terms = render_admin_terms(admin_terms),
        question = question.trim(),
        format = EXPLANATION_FORMAT,
    );

    Prompt {
        system: EXPLANATION_SYSTEM.to_string(),
        user,
    }
}

/// Prompt for the generate stage.
pub fn sql_prompt(
    question: &str,
    confirmed_understanding: &str,
    schema_text: &str,
    resolved_ambiguities: &BTreeMap<String, String>,
) -> Prompt {
    let resolutions = if resolved_ambiguities.is_empty() {
        "(none)".to_string()
    } else {
        resolved_ambiguities
            .iter()
            .map(|(term, meaning)| format!("- \"{}\" means {}", term, meaning))
            .collect::<Vec<_>>()
            .join("\n")
    };

    let user = format!(
        "Database schema:\n{schema}\n\n\
         Question: {question}\n\n\
         Confirmed understanding:\n{understanding}\n\n\
         Resolved ambiguities:\n{resolutions}\n\n\
         Write the SQL query.",
        schema = schema_text,
        question = question.trim(),
        understanding = confirmed_understanding.trim(),
        resolutions = resolutions,
    );

    Prompt {
        system: SQL_SYSTEM.to_string(),
        user,
    }
}

/// Prompt for explaining executed rows. Only the first rows are included.
pub fn result_explanation_prompt(question: &str, sql: &str, result: &QueryResult) -> Prompt {
    let rows = serde_json::to_string_pretty(&result.row_maps(RESULT_SAMPLE_ROWS))
        .unwrap_or_else(|_| "[]".to_string());
    let truncated = if result.row_count() > RESULT_SAMPLE_ROWS {
        format!(" (first {} of {})", RESULT_SAMPLE_ROWS, result.row_count())
    } else {
        String::new()
    };

    let user = format!(
        "Question: {question}\n\nSQL:\n{sql}\n\nRows{truncated}:\n{rows}\n\nExplain what the result means.",
        question = question.trim(),
        sql = sql.trim(),
        truncated = truncated,
        rows = rows,
    );

    Prompt {
        system: RESULT_SYSTEM.to_string(),
        user,
    }
}
