//! Statement result models.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnMetadata {
    pub name: String,
    /// Server type name (e.g., "BIGINT", "VARCHAR")
    pub type_name: String,
}

impl ColumnMetadata {
    /// Create new column metadata.
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
        }
    }
}

/// Result of one executed statement.
///
/// Row-returning statements fill `columns` and `rows`; writes report
/// `rows_affected` and, for inserts into an auto-increment table,
/// `last_insert_id`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryResult {
    pub columns: Vec<ColumnMetadata>,
    pub rows: Vec<serde_json::Map<String, JsonValue>>,
    pub rows_affected: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_insert_id: Option<u64>,
    pub execution_time_ms: u64,
}

impl QueryResult {
    /// Create a result for write operations (INSERT/UPDATE/DELETE).
    pub fn write_result(rows_affected: u64, last_insert_id: Option<u64>) -> Self {
        Self {
            rows_affected,
            last_insert_id,
            ..Self::default()
        }
    }

    /// Get the number of rows in the result.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Check if the result carries neither rows nor affected rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty() && self.rows_affected == 0
    }
}
