//! Query result values.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde::ser::{SerializeMap, SerializeSeq, SerializeStruct};
use serde::{Serialize, Serializer};

/// A dynamically typed scalar from a result row.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Decimal(Decimal),
    Text(String),
    DateTime(NaiveDateTime),
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, SqlValue::Int(_) | SqlValue::Float(_) | SqlValue::Decimal(_))
    }

    /// Exact decimal form of a numeric value.
    ///
    /// `None` for non-numeric values and for floats with no decimal form
    /// (NaN, infinities, out of range).
    pub fn to_decimal(&self) -> Option<Decimal> {
        match self {
            SqlValue::Int(i) => Some(Decimal::from(*i)),
            SqlValue::Float(f) => Decimal::from_f64(*f),
            SqlValue::Decimal(d) => Some(*d),
            _ => None,
        }
    }

    pub fn to_f64(&self) -> Option<f64> {
        match self {
            SqlValue::Int(i) => Some(*i as f64),
            SqlValue::Float(f) => Some(*f),
            SqlValue::Decimal(d) => d.to_f64(),
            _ => None,
        }
    }

    /// Convert a JSON value from the driver bridge, using the column's
    /// database type to recover decimals and timestamps.
    pub fn from_json(value: &serde_json::Value, data_type: &str) -> Self {
        use serde_json::Value;

        let ty = data_type.to_lowercase();
        let is_decimal = ["decimal", "numeric", "money", "number"]
            .iter()
            .any(|t| ty.contains(t));
        let is_temporal = ty.contains("date") || ty.contains("time");

        match value {
            Value::Null => SqlValue::Null,
            Value::Bool(b) => SqlValue::Bool(*b),
            Value::Number(n) => {
                if is_decimal {
                    if let Ok(d) = Decimal::from_str(&n.to_string()) {
                        return SqlValue::Decimal(d);
                    }
                }
                match (n.as_i64(), n.as_f64()) {
                    (Some(i), _) => SqlValue::Int(i),
                    (None, Some(f)) => SqlValue::Float(f),
                    _ => SqlValue::Text(n.to_string()),
                }
            }
            Value::String(s) => {
                if is_decimal {
                    if let Ok(d) = Decimal::from_str(s.trim()) {
                        return SqlValue::Decimal(d);
                    }
                }
                if is_temporal {
                    if let Some(dt) = parse_datetime(s) {
                        return SqlValue::DateTime(dt);
                    }
                }
                SqlValue::Text(s.clone())
            }
            other => SqlValue::Text(other.to_string()),
        }
    }
}

/// Parse the timestamp layouts drivers commonly emit.
pub fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_utc());
    }
    for layout in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, layout) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlValue::Null => Ok(()),
            SqlValue::Bool(b) => write!(f, "{}", b),
            SqlValue::Int(i) => write!(f, "{}", i),
            SqlValue::Float(x) => write!(f, "{}", x),
            SqlValue::Decimal(d) => write!(f, "{}", d),
            SqlValue::Text(s) => f.write_str(s),
            SqlValue::DateTime(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S")),
        }
    }
}

impl Serialize for SqlValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            SqlValue::Null => serializer.serialize_none(),
            SqlValue::Bool(b) => serializer.serialize_bool(*b),
            SqlValue::Int(i) => serializer.serialize_i64(*i),
            SqlValue::Float(x) => serializer.serialize_f64(*x),
            SqlValue::Decimal(d) => serializer.serialize_str(&d.to_string()),
            SqlValue::Text(s) => serializer.serialize_str(s),
            SqlValue::DateTime(dt) => {
                serializer.serialize_str(&dt.format("%Y-%m-%dT%H:%M:%S%.f").to_string())
            }
        }
    }
}

/// Rows returned by one statement. Produced fresh per execution.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<SqlValue>>,
}

impl QueryResult {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<SqlValue>>) -> Self {
        Self { columns, rows }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// First value of the first row.
    pub fn first_value(&self) -> Option<&SqlValue> {
        self.rows.first().and_then(|row| row.first())
    }

    /// Borrow the first `limit` rows as column-ordered maps.
    pub fn row_maps(&self, limit: usize) -> RowMaps<'_> {
        RowMaps {
            result: self,
            limit,
        }
    }
}

/// Serializes rows as objects keyed by column name, in column order.
pub struct RowMaps<'a> {
    result: &'a QueryResult,
    limit: usize,
}

struct RowMap<'a> {
    columns: &'a [String],
    values: &'a [SqlValue],
}

impl Serialize for RowMap<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for (column, value) in self.columns.iter().zip(self.values) {
            map.serialize_entry(column, value)?;
        }
        map.end()
    }
}

impl Serialize for RowMaps<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let rows = &self.result.rows[..self.result.rows.len().min(self.limit)];
        let mut seq = serializer.serialize_seq(Some(rows.len()))?;
        for values in rows {
            seq.serialize_element(&RowMap {
                columns: &self.result.columns,
                values,
            })?;
        }
        seq.end()
    }
}

impl Serialize for QueryResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("QueryResult", 3)?;
        s.serialize_field("columns", &self.columns)?;
        s.serialize_field("rows", &self.row_maps(usize::MAX))?;
        s.serialize_field("rowCount", &self.rows.len())?;
        s.end()
    }
}
