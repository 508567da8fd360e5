//! dbroute
//!
//! A MySQL data-access layer: a statement builder that turns structured
//! options into parameterized SQL, and a router that sends each statement
//! to the primary (writes) or a random replica (reads) of a logical
//! database, with transactions held on one exclusive connection.
//!
//! ```ignore
//! let registry = PoolRegistry::connect(&descriptors).await?;
//! let router = ConnectionRouter::new(registry);
//!
//! let people = router
//!     .select("person", SelectOptions::new().where_eq("id", 1), "app", true)
//!     .await?;
//!
//! let mut tx = router.begin_transaction("app").await?;
//! tx.update("person", UpdateOptions::new().set("age", 30).where_eq("id", 1)).await?;
//! tx.commit().await?;
//! ```

pub mod builder;
pub mod config;
pub mod db;
pub mod error;
pub mod models;

pub use builder::{
    BuiltStatement, Direction, InsertOptions, QueryOptions, SelectOptions, Statement,
    UpdateOptions, build,
};
pub use config::{Config, DatabaseDescriptor, PoolOptions};
pub use db::{ConnectionRouter, PoolRegistry, SqlExecutor, TransactionSession};
pub use error::{DbError, DbResult};
pub use models::{QueryResult, Record, SqlValue};
