//! Parameter values bound to statement placeholders.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// A parameter value for parameterized statements.
///
/// Values deserialize from plain JSON: `null`, booleans, numbers and strings
/// map to the scalar variants, arrays become [`SqlValue::List`] and objects
/// become [`SqlValue::Json`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "JsonValue", into = "JsonValue")]
pub enum SqlValue {
    /// NULL value
    Null,
    Bool(bool),
    Int(i64),
    /// Integers above `i64::MAX`
    UInt(u64),
    Float(f64),
    String(String),
    /// Binary data (base64 encoded in JSON)
    Bytes(Vec<u8>),
    DateTime(DateTime<Utc>),
    Json(JsonValue),
    /// Expanded to `?, ?, ...` when consumed by a literal fragment placeholder.
    List(Vec<SqlValue>),
}

impl SqlValue {
    /// Check if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Get the type name of this value for debugging.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::UInt(_) => "uint",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Bytes(_) => "bytes",
            Self::DateTime(_) => "datetime",
            Self::Json(_) => "json",
            Self::List(_) => "list",
        }
    }
}

impl From<JsonValue> for SqlValue {
    fn from(value: JsonValue) -> Self {
        match value {
            JsonValue::Null => Self::Null,
            JsonValue::Bool(b) => Self::Bool(b),
            JsonValue::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Self::Int(i)
                } else if let Some(u) = n.as_u64() {
                    Self::UInt(u)
                } else {
                    Self::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            JsonValue::String(s) => Self::String(s),
            JsonValue::Array(items) => Self::List(items.into_iter().map(Self::from).collect()),
            obj @ JsonValue::Object(_) => Self::Json(obj),
        }
    }
}

impl From<SqlValue> for JsonValue {
    fn from(value: SqlValue) -> Self {
        use base64::{Engine as _, engine::general_purpose::STANDARD};

        match value {
            SqlValue::Null => JsonValue::Null,
            SqlValue::Bool(b) => JsonValue::Bool(b),
            SqlValue::Int(i) => JsonValue::from(i),
            SqlValue::UInt(u) => JsonValue::from(u),
            SqlValue::Float(f) => serde_json::Number::from_f64(f)
                .map(JsonValue::Number)
                .unwrap_or_else(|| JsonValue::String(f.to_string())),
            SqlValue::String(s) => JsonValue::String(s),
            SqlValue::Bytes(bytes) => JsonValue::String(STANDARD.encode(bytes)),
            SqlValue::DateTime(dt) => JsonValue::String(dt.to_rfc3339()),
            SqlValue::Json(v) => v,
            SqlValue::List(items) => JsonValue::Array(items.into_iter().map(JsonValue::from).collect()),
        }
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        Self::Int(v.into())
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<u32> for SqlValue {
    fn from(v: u32) -> Self {
        Self::Int(v.into())
    }
}

impl From<u64> for SqlValue {
    fn from(v: u64) -> Self {
        i64::try_from(v).map(Self::Int).unwrap_or(Self::UInt(v))
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<Vec<u8>> for SqlValue {
    fn from(v: Vec<u8>) -> Self {
        Self::Bytes(v)
    }
}

impl From<DateTime<Utc>> for SqlValue {
    fn from(v: DateTime<Utc>) -> Self {
        Self::DateTime(v)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Self::Null)
    }
}
