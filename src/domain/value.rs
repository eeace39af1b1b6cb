//! Typed cell values and semantic column types

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Semantic type of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SemanticType {
    Integer,
    Float,
    Text,
    Date,
    Timestamp,
    Boolean,
}

impl SemanticType {
    /// PostgreSQL column type used when materializing this type
    pub fn sql_type(&self) -> &'static str {
        match self {
            SemanticType::Integer => "BIGINT",
            SemanticType::Float => "DOUBLE PRECISION",
            SemanticType::Text => "TEXT",
            SemanticType::Date => "DATE",
            SemanticType::Timestamp => "TIMESTAMP",
            SemanticType::Boolean => "BOOLEAN",
        }
    }
}

impl fmt::Display for SemanticType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SemanticType::Integer => "integer",
            SemanticType::Float => "float",
            SemanticType::Text => "text",
            SemanticType::Date => "date",
            SemanticType::Timestamp => "timestamp",
            SemanticType::Boolean => "boolean",
        };
        write!(f, "{name}")
    }
}

/// A single cell
///
/// Ordering is total: nulls sort first, floats use IEEE total ordering, and
/// values of different variants order by variant. This lets values act as
/// grouping and sort keys without any floating-point surprises.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
}

impl Value {
    fn rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Int(_) => 2,
            Value::Float(_) => 3,
            Value::Text(_) => 4,
            Value::Date(_) => 5,
            Value::Timestamp(_) => 6,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Numeric view used by measures; integers widen to f64
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Calendar year of a date or timestamp value
    pub fn year(&self) -> Option<i64> {
        match self {
            Value::Date(d) => Some(i64::from(d.year())),
            Value::Timestamp(ts) => Some(i64::from(ts.date().year())),
            _ => None,
        }
    }

    /// First day of the month of a date or timestamp value
    pub fn month_start(&self) -> Option<NaiveDate> {
        let date = match self {
            Value::Date(d) => *d,
            Value::Timestamp(ts) => ts.date(),
            _ => return None,
        };
        NaiveDate::from_ymd_opt(date.year(), date.month(), 1)
    }

    /// Canonical JSON encoding used by the aggregated store payloads
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Text(s) => serde_json::Value::String(s.clone()),
            Value::Date(d) => serde_json::Value::String(format_date(*d)),
            Value::Timestamp(ts) => serde_json::Value::String(format_timestamp(*ts)),
        }
    }

    /// Decodes a payload cell according to the column's semantic type
    pub fn from_json(value: &serde_json::Value, ty: SemanticType) -> Result<Value, String> {
        if value.is_null() {
            return Ok(Value::Null);
        }
        let mismatch = || format!("cannot decode {value} as {ty}");
        match ty {
            SemanticType::Boolean => value.as_bool().map(Value::Bool).ok_or_else(mismatch),
            SemanticType::Integer => value.as_i64().map(Value::Int).ok_or_else(mismatch),
            SemanticType::Float => value.as_f64().map(Value::Float).ok_or_else(mismatch),
            SemanticType::Text => value
                .as_str()
                .map(|s| Value::Text(s.to_string()))
                .ok_or_else(mismatch),
            SemanticType::Date => value
                .as_str()
                .and_then(parse_date)
                .map(Value::Date)
                .ok_or_else(mismatch),
            SemanticType::Timestamp => value
                .as_str()
                .and_then(parse_timestamp)
                .map(Value::Timestamp)
                .ok_or_else(mismatch),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::Float(a), Value::Float(b)) => a.total_cmp(b),
            (Value::Text(a), Value::Text(b)) => a.cmp(b),
            (Value::Date(a), Value::Date(b)) => a.cmp(b),
            (Value::Timestamp(a), Value::Timestamp(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, ""),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Text(s) => write!(f, "{s}"),
            Value::Date(d) => write!(f, "{}", format_date(*d)),
            Value::Timestamp(ts) => write!(f, "{}", format_timestamp(*ts)),
        }
    }
}

pub fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

pub fn format_timestamp(ts: NaiveDateTime) -> String {
    ts.format("%Y-%m-%dT%H:%M:%S").to_string()
}

const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%Y/%m/%d"];

/// Parses a timestamp into the canonical naive wall clock
///
/// Offset-bearing values are converted to UTC; date-only values become
/// midnight.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_utc());
    }
    for format in TIMESTAMP_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(ts);
        }
    }
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(raw, format).ok())
        .map(|d| d.and_time(NaiveTime::MIN))
}

/// Parses a calendar date
///
/// Accepts plain dates, timestamps (time part dropped) and `YYYY-MM`
/// month strings, which map to the first of the month.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    for format in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(raw, format) {
            return Some(d);
        }
    }
    if let Some(ts) = parse_timestamp(raw) {
        return Some(ts.date());
    }
    NaiveDate::parse_from_str(&format!("{raw}-01"), "%Y-%m-%d").ok()
}

/// Parses an integer, accepting integral floats such as `"12.0"`
pub fn parse_integer(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    if let Ok(i) = raw.parse::<i64>() {
        return Some(i);
    }
    let f = parse_float(raw)?;
    if f.fract() == 0.0 && f.abs() < 9.0e15 {
        Some(f as i64)
    } else {
        None
    }
}

/// Parses a finite float; `NaN` and infinities are rejected
pub fn parse_float(raw: &str) -> Option<f64> {
    raw.trim()
        .replace(',', "")
        .parse::<f64>()
        .ok()
        .filter(|f| f.is_finite())
}
