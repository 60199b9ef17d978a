//! Result shape classification and scalar formatting.

use std::fmt;
use std::str::FromStr;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::connection::{QueryResult, SqlValue};

/// Aggregate calls that mark a query as producing a headline number.
const AGGREGATE_MARKERS: [&str; 5] = ["count(", "sum(", "avg(", "max(", "min("];

/// Presentation mode for a result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ViewingType {
    Table,
    Label,
    Number,
}

impl fmt::Display for ViewingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ViewingType::Table => "table",
            ViewingType::Label => "label",
            ViewingType::Number => "number",
        })
    }
}

/// Separators used when formatting numbers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum NumberLocale {
    #[default]
    EnUs,
    DeDe,
    FrFr,
    Invariant,
}

impl NumberLocale {
    fn separators(self) -> (&'static str, &'static str) {
        match self {
            NumberLocale::EnUs | NumberLocale::Invariant => (",", "."),
            NumberLocale::DeDe => (".", ","),
            NumberLocale::FrFr => ("\u{202f}", ","),
        }
    }
}

impl FromStr for NumberLocale {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "en-us" | "en" => Ok(NumberLocale::EnUs),
            "de-de" | "de" => Ok(NumberLocale::DeDe),
            "fr-fr" | "fr" => Ok(NumberLocale::FrFr),
            "invariant" | "" => Ok(NumberLocale::Invariant),
            other => Err(format!("unsupported number locale: {}", other)),
        }
    }
}

/// Recommended presentation plus the formatted scalar, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub viewing_type: ViewingType,
    pub formatted_value: Option<String>,
}

impl Classification {
    fn table() -> Self {
        Self {
            viewing_type: ViewingType::Table,
            formatted_value: None,
        }
    }

    fn number(value: &SqlValue, locale: NumberLocale) -> Self {
        Self {
            viewing_type: ViewingType::Number,
            formatted_value: Some(format_number(value, locale)),
        }
    }
}

/// Pick a presentation mode from the result shape and the SQL text.
///
/// - no rows: table
/// - one row, one column: number when numeric, otherwise a label
/// - an aggregate call in the SQL with a numeric first value: number
/// - anything else: table
pub fn classify(result: &QueryResult, sql: &str, locale: NumberLocale) -> Classification {
    let Some(first) = result.first_value() else {
        return Classification::table();
    };

    if result.row_count() == 1 && result.column_count() == 1 {
        if first.is_numeric() {
            return Classification::number(first, locale);
        }
        return Classification {
            viewing_type: ViewingType::Label,
            formatted_value: Some(first.to_string()),
        };
    }

    if first.is_numeric() && has_aggregate(sql) {
        return Classification::number(first, locale);
    }

    Classification::table()
}

fn has_aggregate(sql: &str) -> bool {
    let lowered = sql.to_lowercase();
    AGGREGATE_MARKERS.iter().any(|marker| lowered.contains(marker))
}

/// Format a numeric value with two decimals and locale grouping.
///
/// Values without an exact decimal form fall back to their plain string.
pub fn format_number(value: &SqlValue, locale: NumberLocale) -> String {
    match value.to_decimal() {
        Some(decimal) => format_decimal(decimal, locale),
        None => value.to_string(),
    }
}

pub fn format_decimal(value: Decimal, locale: NumberLocale) -> String {
    let mut rounded = value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(2);
    if rounded.is_zero() {
        rounded.set_sign_positive(true);
    }

    let text = rounded.abs().to_string();
    // `rescale` stops short of two places near the top of the range.
    let (int_part, frac_part) = text.split_once('.').unwrap_or((text.as_str(), ""));
    let frac_part = format!("{:0<2}", frac_part);
    let (group_sep, decimal_sep) = locale.separators();

    let mut out = String::with_capacity(text.len() + int_part.len() / 3 + 1);
    if rounded.is_sign_negative() {
        out.push('-');
    }
    for (i, digit) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            out.push_str(group_sep);
        }
        out.push(digit);
    }
    out.push_str(decimal_sep);
    out.push_str(&frac_part);
    out
}
