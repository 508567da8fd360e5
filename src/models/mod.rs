//! Data models for dbroute.
//!
//! This module re-exports the value, record and result types shared by the
//! builder and the router.

pub mod query;
pub mod record;
pub mod value;

// Re-export commonly used types
pub use query::{ColumnMetadata, QueryResult};
pub use record::Record;
pub use value::SqlValue;
