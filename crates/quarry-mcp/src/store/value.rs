//! SQL values exchanged with the backing store.

use crate::error::StoreError;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde_json::{Value, json};

/// Largest integer a JSON consumer can hold without losing precision (2^53 - 1).
pub const MAX_SAFE_INTEGER: i64 = 9_007_199_254_740_991;

/// A single SQLite value.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl SqlValue {
    /// Convert a JSON argument into a bound parameter.
    pub fn from_json(value: &Value) -> Result<Self, StoreError> {
        match value {
            Value::Null => Ok(SqlValue::Null),
            Value::Bool(b) => Ok(SqlValue::Integer(i64::from(*b))),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(SqlValue::Integer(i))
                } else if let Some(f) = n.as_f64() {
                    Ok(SqlValue::Real(f))
                } else {
                    Err(StoreError::InvalidArguments(format!(
                        "unsupported numeric parameter: {n}"
                    )))
                }
            }
            Value::String(s) => Ok(SqlValue::Text(s.clone())),
            Value::Array(_) | Value::Object(_) => Err(StoreError::InvalidArguments(
                "parameters must be strings, numbers, booleans or null".to_string(),
            )),
        }
    }

    /// Convert a list of JSON arguments.
    pub fn from_json_list(values: &[Value]) -> Result<Vec<Self>, StoreError> {
        values.iter().map(Self::from_json).collect()
    }

    /// JSON form of a result value.
    pub fn to_json(&self) -> Value {
        match self {
            SqlValue::Null => Value::Null,
            SqlValue::Integer(i) => json_integer(*i),
            SqlValue::Real(f) => serde_json::Number::from_f64(*f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            SqlValue::Text(s) => Value::String(s.clone()),
            SqlValue::Blob(bytes) => json!({ "type": "blob", "base64": BASE64.encode(bytes) }),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// Integer view; text holding an integer is accepted.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SqlValue::Integer(i) => Some(*i),
            SqlValue::Real(f) if f.fract() == 0.0 => Some(*f as i64),
            SqlValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Text view. Numbers are rendered, blobs and null have none.
    pub fn as_text(&self) -> Option<String> {
        match self {
            SqlValue::Text(s) => Some(s.clone()),
            SqlValue::Integer(i) => Some(i.to_string()),
            SqlValue::Real(f) => Some(f.to_string()),
            SqlValue::Null | SqlValue::Blob(_) => None,
        }
    }
}

/// Integers outside the JSON-safe range are emitted as decimal strings.
pub fn json_integer(value: i64) -> Value {
    if (-MAX_SAFE_INTEGER..=MAX_SAFE_INTEGER).contains(&value) {
        Value::from(value)
    } else {
        Value::String(value.to_string())
    }
}
