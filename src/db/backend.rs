//! Driver boundary.
//!
//! The router and the transaction session only talk to a database through
//! these two traits. [`crate::db::mysql::MySqlBackend`] is the production
//! implementation; tests plug in an in-memory one.

use crate::builder::BuiltStatement;
use crate::error::DbResult;
use crate::models::QueryResult;
use async_trait::async_trait;

/// A pool of reusable physical connections to one endpoint.
#[async_trait]
pub trait Backend: Send + Sync + 'static {
    type Connection: BackendConnection;

    /// Check out a connection. Dropping the connection returns it.
    async fn acquire(&self) -> DbResult<Self::Connection>;

    /// Close the pool. Leased connections are closed as they come back.
    async fn close(&self);
}

/// One physical connection checked out from a [`Backend`].
///
/// Failures are reported as [`crate::error::DbError::Driver`]; the caller
/// attaches statement context.
#[async_trait]
pub trait BackendConnection: Send + 'static {
    async fn run(&mut self, statement: &BuiltStatement) -> DbResult<QueryResult>;

    async fn begin(&mut self) -> DbResult<()>;

    async fn commit(&mut self) -> DbResult<()>;

    async fn rollback(&mut self) -> DbResult<()>;
}
