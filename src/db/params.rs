//! Parameter binding for MySQL queries.

use crate::models::SqlValue;
use sqlx::MySql;
use sqlx::mysql::MySqlArguments;
use sqlx::types::Json;

/// Bind one value to a MySQL query.
///
/// Lists are expanded into separate placeholders by the builder; one that
/// reaches the driver unexpanded (a raw statement) is sent as a JSON array.
pub(crate) fn bind_mysql_param<'q>(
    query: sqlx::query::Query<'q, MySql, MySqlArguments>,
    param: &'q SqlValue,
) -> sqlx::query::Query<'q, MySql, MySqlArguments> {
    match param {
        SqlValue::Null => query.bind(None::<String>),
        SqlValue::Bool(v) => query.bind(*v),
        SqlValue::Int(v) => query.bind(*v),
        SqlValue::UInt(v) => query.bind(*v),
        SqlValue::Float(v) => query.bind(*v),
        SqlValue::String(v) => query.bind(v.as_str()),
        SqlValue::Bytes(v) => query.bind(v.as_slice()),
        SqlValue::DateTime(v) => query.bind(*v),
        SqlValue::Json(v) => query.bind(Json(v)),
        SqlValue::List(v) => query.bind(Json(v)),
    }
}
