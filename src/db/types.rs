//! MySQL row decoding.
//!
//! Type conversion uses a two-phase approach:
//! 1. `TypeCategory` classifies the server's column type name
//! 2. A per-category decoder extracts the value as JSON
//!
//! Values that cannot be decoded become `null` and are logged.

use crate::models::ColumnMetadata;
use serde_json::Value as JsonValue;
use sqlx::mysql::{MySqlRow, MySqlTypeInfo, MySqlValueRef};
use sqlx::{Column, Decode, Row, Type, TypeInfo};

/// Logical category for MySQL column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    Integer,
    Float,
    Decimal,
    Boolean,
    Temporal,
    Text,
    Binary,
    Json,
}

/// Classify a MySQL type name such as `INT UNSIGNED` or `DATETIME`.
pub fn categorize_type(type_name: &str) -> TypeCategory {
    let lower = type_name.to_lowercase();
    let base = lower.split_whitespace().next().unwrap_or("");

    match base {
        "decimal" | "numeric" => TypeCategory::Decimal,
        "tinyint" | "smallint" | "mediumint" | "int" | "integer" | "bigint" | "year" => {
            TypeCategory::Integer
        }
        "bool" | "boolean" => TypeCategory::Boolean,
        "float" | "double" | "real" => TypeCategory::Float,
        "date" | "datetime" | "timestamp" | "time" => TypeCategory::Temporal,
        "json" => TypeCategory::Json,
        "blob" | "tinyblob" | "mediumblob" | "longblob" | "binary" | "varbinary" | "bit"
        | "geometry" => TypeCategory::Binary,
        _ => TypeCategory::Text,
    }
}

/// Raw DECIMAL text, preserving the exact server representation.
#[derive(Debug)]
pub struct RawDecimal(pub String);

impl Type<sqlx::MySql> for RawDecimal {
    fn type_info() -> MySqlTypeInfo {
        <String as Type<sqlx::MySql>>::type_info()
    }

    fn compatible(ty: &MySqlTypeInfo) -> bool {
        let name = ty.name().to_lowercase();
        name.contains("decimal") || name.contains("numeric")
    }
}

impl<'r> Decode<'r, sqlx::MySql> for RawDecimal {
    fn decode(value: MySqlValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as Decode<sqlx::MySql>>::decode(value)?;
        Ok(RawDecimal(s.to_string()))
    }
}

/// Binary data is always returned base64 encoded.
pub fn encode_binary(bytes: &[u8]) -> JsonValue {
    use base64::{Engine as _, engine::general_purpose::STANDARD};
    JsonValue::String(STANDARD.encode(bytes))
}

/// Conversion of a fetched row into JSON.
pub trait RowToJson {
    fn to_json_map(&self) -> serde_json::Map<String, JsonValue>;
    fn get_column_metadata(&self) -> Vec<ColumnMetadata>;
}

impl RowToJson for MySqlRow {
    fn to_json_map(&self) -> serde_json::Map<String, JsonValue> {
        self.columns()
            .iter()
            .enumerate()
            .map(|(idx, col)| {
                let type_name = col.type_info().name();
                let value = decode_column(self, idx, categorize_type(type_name));
                (col.name().to_string(), value)
            })
            .collect()
    }

    fn get_column_metadata(&self) -> Vec<ColumnMetadata> {
        self.columns()
            .iter()
            .map(|col| ColumnMetadata::new(col.name(), col.type_info().name()))
            .collect()
    }
}

fn decode_column(row: &MySqlRow, idx: usize, category: TypeCategory) -> JsonValue {
    match category {
        TypeCategory::Decimal => decode_decimal(row, idx),
        TypeCategory::Integer => decode_integer(row, idx),
        TypeCategory::Boolean => decode_boolean(row, idx),
        TypeCategory::Float => decode_float(row, idx),
        TypeCategory::Temporal => decode_temporal(row, idx),
        TypeCategory::Binary => decode_binary(row, idx),
        TypeCategory::Json => decode_json(row, idx),
        TypeCategory::Text => decode_text(row, idx),
    }
}

fn decode_decimal(row: &MySqlRow, idx: usize) -> JsonValue {
    match row.try_get::<Option<RawDecimal>, _>(idx) {
        Ok(Some(v)) => JsonValue::String(v.0),
        Ok(None) => JsonValue::Null,
        Err(e) => {
            tracing::error!("Failed to decode DECIMAL: {:?}", e);
            JsonValue::Null
        }
    }
}

fn decode_integer(row: &MySqlRow, idx: usize) -> JsonValue {
    if let Ok(Some(v)) = row.try_get::<Option<i64>, _>(idx) {
        return JsonValue::Number(v.into());
    }
    // Unsigned BIGINT does not fit an i64
    if let Ok(Some(v)) = row.try_get::<Option<u64>, _>(idx) {
        return JsonValue::Number(v.into());
    }
    JsonValue::Null
}

fn decode_boolean(row: &MySqlRow, idx: usize) -> JsonValue {
    row.try_get::<Option<bool>, _>(idx)
        .ok()
        .flatten()
        .map(JsonValue::Bool)
        .unwrap_or(JsonValue::Null)
}

fn decode_float(row: &MySqlRow, idx: usize) -> JsonValue {
    if let Ok(Some(v)) = row.try_get::<Option<f64>, _>(idx) {
        return serde_json::Number::from_f64(v)
            .map(JsonValue::Number)
            .unwrap_or_else(|| JsonValue::String(v.to_string()));
    }
    if let Ok(Some(v)) = row.try_get::<Option<f32>, _>(idx) {
        return serde_json::Number::from_f64(v as f64)
            .map(JsonValue::Number)
            .unwrap_or_else(|| JsonValue::String(v.to_string()));
    }
    JsonValue::Null
}

fn decode_temporal(row: &MySqlRow, idx: usize) -> JsonValue {
    use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};

    if let Ok(Some(v)) = row.try_get::<Option<DateTime<Utc>>, _>(idx) {
        return JsonValue::String(v.to_rfc3339());
    }
    if let Ok(Some(v)) = row.try_get::<Option<NaiveDateTime>, _>(idx) {
        return JsonValue::String(v.format("%Y-%m-%d %H:%M:%S%.f").to_string());
    }
    if let Ok(Some(v)) = row.try_get::<Option<NaiveDate>, _>(idx) {
        return JsonValue::String(v.to_string());
    }
    if let Ok(Some(v)) = row.try_get::<Option<NaiveTime>, _>(idx) {
        return JsonValue::String(v.to_string());
    }
    // Zero dates and negative TIME values only decode as text
    decode_text(row, idx)
}

fn decode_binary(row: &MySqlRow, idx: usize) -> JsonValue {
    row.try_get::<Option<Vec<u8>>, _>(idx)
        .ok()
        .flatten()
        .map(|v| encode_binary(&v))
        .unwrap_or(JsonValue::Null)
}

fn decode_json(row: &MySqlRow, idx: usize) -> JsonValue {
    row.try_get::<Option<JsonValue>, _>(idx)
        .ok()
        .flatten()
        .unwrap_or(JsonValue::Null)
}

fn decode_text(row: &MySqlRow, idx: usize) -> JsonValue {
    if let Ok(Some(v)) = row.try_get::<Option<String>, _>(idx) {
        return JsonValue::String(v);
    }
    // TEXT columns with a binary collation arrive as bytes
    if let Ok(Some(v)) = row.try_get::<Option<Vec<u8>>, _>(idx) {
        return match String::from_utf8(v) {
            Ok(s) => JsonValue::String(s),
            Err(e) => encode_binary(e.as_bytes()),
        };
    }
    JsonValue::Null
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categorize_integer() {
        assert_eq!(categorize_type("INT"), TypeCategory::Integer);
        assert_eq!(categorize_type("BIGINT UNSIGNED"), TypeCategory::Integer);
        assert_eq!(categorize_type("TINYINT"), TypeCategory::Integer);
        assert_eq!(categorize_type("YEAR"), TypeCategory::Integer);
    }

    #[test]
    fn test_categorize_does_not_match_substrings() {
        assert_eq!(categorize_type("POINT"), TypeCategory::Text);
        assert_eq!(categorize_type("VARCHAR"), TypeCategory::Text);
    }

    #[test]
    fn test_categorize_temporal() {
        assert_eq!(categorize_type("DATETIME"), TypeCategory::Temporal);
        assert_eq!(categorize_type("TIMESTAMP"), TypeCategory::Temporal);
        assert_eq!(categorize_type("DATE"), TypeCategory::Temporal);
        assert_eq!(categorize_type("TIME"), TypeCategory::Temporal);
    }

    #[test]
    fn test_categorize_other() {
        assert_eq!(categorize_type("DECIMAL"), TypeCategory::Decimal);
        assert_eq!(categorize_type("BOOLEAN"), TypeCategory::Boolean);
        assert_eq!(categorize_type("DOUBLE"), TypeCategory::Float);
        assert_eq!(categorize_type("JSON"), TypeCategory::Json);
        assert_eq!(categorize_type("VARBINARY"), TypeCategory::Binary);
        assert_eq!(categorize_type("LONGBLOB"), TypeCategory::Binary);
    }

    #[test]
    fn test_encode_binary() {
        assert_eq!(encode_binary(b"hi"), JsonValue::String("aGk=".into()));
        assert_eq!(encode_binary(&[]), JsonValue::String(String::new()));
    }
}
