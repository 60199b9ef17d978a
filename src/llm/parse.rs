//! Lenient parsing of model completions.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

use super::types::{AdjustableParameter, ExplanationResponse, ParseOutcome};

static FENCED_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```(?:[A-Za-z0-9_-]*[ \t]*\r?\n)?(.*?)```").unwrap());

/// Slice from the first `{` to the last `}`, if that forms a range.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (start < end).then(|| &text[start..=end])
}

/// Strip a markdown fence (```` ```sql ... ``` ````) and surrounding whitespace.
///
/// Text without a fence is only trimmed. An unterminated fence loses its
/// opening line.
pub fn extract_sql_from_markdown(text: &str) -> String {
    if let Some(caps) = FENCED_BLOCK.captures(text) {
        if let Some(body) = caps.get(1) {
            return body.as_str().trim().to_string();
        }
    }

    let trimmed = text.trim();
    match trimmed.strip_prefix("```") {
        Some(rest) => {
            let body = rest.split_once('\n').map(|(_, body)| body).unwrap_or("");
            body.trim_end_matches('`').trim().to_string()
        }
        None => trimmed.to_string(),
    }
}

/// Parse an explanation completion.
///
/// Prose around the JSON object is ignored. Anything that does not yield an
/// object with a string `explanation` degrades to the raw text.
pub fn parse_explanation(raw: &str) -> ParseOutcome {
    let object = extract_json_object(raw)
        .and_then(|json| serde_json::from_str::<Value>(json).ok())
        .and_then(|value| match value {
            Value::Object(map) => Some(map),
            _ => None,
        });

    let Some(object) = object else {
        tracing::warn!(chars = raw.len(), "explanation is not a JSON object, degrading");
        return ParseOutcome::Degraded(raw.to_string());
    };

    let Some(explanation) = object.get("explanation").and_then(Value::as_str) else {
        tracing::warn!("explanation object has no explanation field, degrading");
        return ParseOutcome::Degraded(raw.to_string());
    };

    let ambiguities = read_ambiguities(object.get("ambiguities"));
    let has_ambiguities = object
        .get("hasAmbiguities")
        .and_then(Value::as_bool)
        .unwrap_or(false)
        || !ambiguities.is_empty();

    ParseOutcome::Parsed(ExplanationResponse {
        explanation: explanation.trim().to_string(),
        has_ambiguities,
        ambiguities,
        adjustable_parameters: read_parameters(object.get("adjustableParameters")),
        confidence_score: read_confidence(object.get("confidenceScore")),
        preview_sql: object
            .get("previewSql")
            .and_then(Value::as_str)
            .map(extract_sql_from_markdown)
            .filter(|sql| !sql.is_empty()),
        term_mapping: read_string_map(object.get("termMapping")),
    })
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items.iter().filter_map(scalar_string).collect(),
        Some(other) => scalar_string(other).into_iter().collect(),
        None => Vec::new(),
    }
}

/// Accepts `{"term": ["a", "b"]}` or `[{"term": "...", "options": [...]}]`.
fn read_ambiguities(value: Option<&Value>) -> BTreeMap<String, Vec<String>> {
    let mut out = BTreeMap::new();
    match value {
        Some(Value::Object(map)) => {
            for (term, candidates) in map {
                out.insert(term.clone(), string_list(Some(candidates)));
            }
        }
        Some(Value::Array(items)) => {
            for item in items.iter().filter_map(Value::as_object) {
                let Some(term) = item.get("term").and_then(scalar_string) else {
                    continue;
                };
                let candidates = ["options", "interpretations", "candidates"]
                    .iter()
                    .find_map(|key| item.get(*key));
                out.insert(term, string_list(candidates));
            }
        }
        _ => {}
    }
    out
}

fn read_parameters(value: Option<&Value>) -> BTreeMap<String, AdjustableParameter> {
    let Some(Value::Object(map)) = value else {
        return BTreeMap::new();
    };

    map.iter()
        .map(|(name, spec)| {
            let parameter = match spec {
                Value::Object(fields) => read_parameter(fields),
                other => AdjustableParameter {
                    default_value: scalar_string(other).unwrap_or_default(),
                    ..Default::default()
                },
            };
            (name.clone(), parameter)
        })
        .collect()
}

fn read_parameter(fields: &Map<String, Value>) -> AdjustableParameter {
    AdjustableParameter {
        default_value: fields
            .get("defaultValue")
            .and_then(scalar_string)
            .unwrap_or_default(),
        param_type: fields
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or("string")
            .to_string(),
        alternatives: string_list(fields.get("alternatives")),
    }
}

fn read_confidence(value: Option<&Value>) -> f64 {
    let score = match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    };
    if score.is_finite() {
        score.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

fn read_string_map(value: Option<&Value>) -> BTreeMap<String, String> {
    let Some(Value::Object(map)) = value else {
        return BTreeMap::new();
    };
    map.iter()
        .filter_map(|(k, v)| scalar_string(v).map(|v| (k.clone(), v)))
        .collect()
}
