//! Attribute values and coercion

use crate::error::{Result, RuntimeError};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Base type of an attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BaseType {
    Number,
    String,
    Boolean,
    Date,
    Binary,
    Json,
}

impl BaseType {
    pub fn name(&self) -> &'static str {
        match self {
            BaseType::Number => "number",
            BaseType::String => "string",
            BaseType::Boolean => "boolean",
            BaseType::Date => "date",
            BaseType::Binary => "binary",
            BaseType::Json => "json",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "number" => Some(BaseType::Number),
            "string" => Some(BaseType::String),
            "boolean" => Some(BaseType::Boolean),
            "date" => Some(BaseType::Date),
            "binary" => Some(BaseType::Binary),
            "json" => Some(BaseType::Json),
            _ => None,
        }
    }
}

impl fmt::Display for BaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A single attribute value
///
/// Equality and ordering are total: `NaN` equals itself and values of
/// different types order by type. Query operators apply their own numeric
/// semantics on top of this.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Value {
    Number(f64),
    String(String),
    Boolean(bool),
    Date(DateTime<Utc>),
    Binary(Vec<u8>),
    Json(#[serde(with = "json_text")] serde_json::Value),
}

/// Stores json values as text so non-self-describing formats can hold them
mod json_text {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &serde_json::Value, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<serde_json::Value, D::Error> {
        let text = String::deserialize(deserializer)?;
        serde_json::from_str(&text).map_err(serde::de::Error::custom)
    }
}

impl Value {
    pub fn base_type(&self) -> BaseType {
        match self {
            Value::Number(_) => BaseType::Number,
            Value::String(_) => BaseType::String,
            Value::Boolean(_) => BaseType::Boolean,
            Value::Date(_) => BaseType::Date,
            Value::Binary(_) => BaseType::Binary,
            Value::Json(_) => BaseType::Json,
        }
    }

    pub fn truthy(&self) -> bool {
        match self {
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
            Value::Boolean(b) => *b,
            Value::Date(_) | Value::Binary(_) => true,
            Value::Json(json) => match json {
                serde_json::Value::Null => false,
                serde_json::Value::Bool(b) => *b,
                serde_json::Value::Number(n) => n.as_f64().map(|n| n != 0.0).unwrap_or(false),
                serde_json::Value::String(s) => !s.is_empty(),
                _ => true,
            },
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Natural value of a script-side json value
    pub fn from_json(json: &serde_json::Value) -> Self {
        match json {
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::String(s.clone()),
            serde_json::Value::Bool(b) => Value::Boolean(*b),
            other => Value::Json(other.clone()),
        }
    }

    /// Script-side representation; non-finite numbers become `null`
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Number(n) => match integral(*n) {
                Some(i) => serde_json::Value::from(i),
                None => serde_json::Number::from_f64(*n)
                    .map(serde_json::Value::Number)
                    .unwrap_or(serde_json::Value::Null),
            },
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Boolean(b) => serde_json::Value::Bool(*b),
            Value::Date(d) => serde_json::Value::String(d.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)),
            Value::Binary(bytes) => serde_json::Value::from(bytes.clone()),
            Value::Json(json) => json.clone(),
        }
    }

    /// Convert to `target`, failing with `TypeError` where no conversion exists
    pub fn coerce(self, target: BaseType) -> Result<Value> {
        if self.base_type() == target {
            return Ok(self);
        }
        let converted = match (target, &self) {
            (BaseType::Boolean, _) => Some(Value::Boolean(self.truthy())),
            (BaseType::Json, _) => Some(Value::Json(self.to_json())),
            (BaseType::String, Value::Number(_) | Value::Boolean(_) | Value::Date(_)) => {
                Some(Value::String(self.to_string()))
            }
            (BaseType::String, Value::Json(serde_json::Value::String(s))) => Some(Value::String(s.clone())),
            (BaseType::Number, Value::Boolean(b)) => Some(Value::Number(if *b { 1.0 } else { 0.0 })),
            (BaseType::Number, Value::Date(d)) => Some(Value::Number(d.timestamp_millis() as f64)),
            (BaseType::Number, Value::Json(json)) => json.as_f64().map(Value::Number),
            (BaseType::Date, Value::Number(ms)) => date_from_millis(*ms).map(Value::Date),
            (BaseType::Date, Value::String(s)) => parse_date(s).map(Value::Date),
            (BaseType::Date, Value::Json(serde_json::Value::String(s))) => parse_date(s).map(Value::Date),
            (BaseType::Binary, Value::String(s)) => Some(Value::Binary(s.as_bytes().to_vec())),
            (BaseType::Binary, Value::Json(serde_json::Value::Array(items))) => items
                .iter()
                .map(|item| item.as_u64().filter(|b| *b <= u8::MAX as u64).map(|b| b as u8))
                .collect::<Option<Vec<u8>>>()
                .map(Value::Binary),
            _ => None,
        };
        converted.ok_or_else(|| {
            RuntimeError::Type(format!("Cannot convert {} value {} to {}", self.base_type(), self, target))
        })
    }

    fn rank(&self) -> u8 {
        match self {
            Value::Number(_) => 0,
            Value::String(_) => 1,
            Value::Boolean(_) => 2,
            Value::Date(_) => 3,
            Value::Binary(_) => 4,
            Value::Json(_) => 5,
        }
    }

    /// Total order used for keys, sorting and set semantics
    pub fn total_cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => a.total_cmp(b),
            (Value::String(a), Value::String(b)) => a.cmp(b),
            (Value::Boolean(a), Value::Boolean(b)) => a.cmp(b),
            (Value::Date(a), Value::Date(b)) => a.cmp(b),
            (Value::Binary(a), Value::Binary(b)) => a.cmp(b),
            (Value::Json(a), Value::Json(b)) => a.to_string().cmp(&b.to_string()),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

fn integral(n: f64) -> Option<i64> {
    if n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
        Some(n as i64)
    } else {
        None
    }
}

fn date_from_millis(ms: f64) -> Option<DateTime<Utc>> {
    if !ms.is_finite() {
        return None;
    }
    Utc.timestamp_millis_opt(ms as i64).single()
}

/// RFC 3339 instants or plain `YYYY-MM-DD` dates (midnight UTC)
fn parse_date(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(instant) = DateTime::parse_from_rfc3339(text) {
        return Some(instant.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.total_cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.total_cmp(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        self.total_cmp(other)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) if n.is_nan() => f.write_str("NaN"),
            Value::Number(n) if n.is_infinite() => {
                f.write_str(if *n > 0.0 { "Infinity" } else { "-Infinity" })
            }
            Value::Number(n) => match integral(*n) {
                Some(i) => write!(f, "{}", i),
                None => write!(f, "{}", n),
            },
            Value::String(s) => f.write_str(s),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Date(d) => f.write_str(&d.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)),
            Value::Binary(bytes) => write!(f, "<binary {} bytes>", bytes.len()),
            Value::Json(json) => write!(f, "{}", json),
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(n as f64)
    }
}

impl From<u64> for Value {
    fn from(n: u64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(d: DateTime<Utc>) -> Self {
        Value::Date(d)
    }
}

impl From<Vec<u8>> for Value {
    fn from(bytes: Vec<u8>) -> Self {
        Value::Binary(bytes)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        Value::Json(json)
    }
}
