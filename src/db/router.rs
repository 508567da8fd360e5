//! Connection router.
//!
//! Every statement leases a connection from the selected pool, runs, and
//! returns the connection whatever the outcome. Structured statements are
//! built before any pool is touched.

use crate::builder::options::{InsertOptions, QueryOptions, SelectOptions, UpdateOptions};
use crate::builder::{BuiltStatement, Statement};
use crate::db::backend::{Backend, BackendConnection};
use crate::db::executor::SqlExecutor;
use crate::db::pool::PoolHandle;
use crate::db::registry::PoolRegistry;
use crate::db::session::TransactionSession;
use crate::error::DbResult;
use crate::models::{QueryResult, SqlValue};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Lease a connection from `pool`, run `statement` and release the lease.
async fn run_leased<B: Backend>(
    pool: &PoolHandle<B>,
    statement: &BuiltStatement,
) -> DbResult<QueryResult> {
    let mut lease = pool.acquire().await?;
    let result = lease.run(statement).await;
    lease.release();

    result.map_err(|e| e.with_statement(statement.sql(), statement.params()))
}

/// Routes statements by logical database name and read/write intent.
pub struct ConnectionRouter<B: Backend> {
    registry: Arc<PoolRegistry<B>>,
}

impl<B: Backend> Clone for ConnectionRouter<B> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
        }
    }
}

impl<B: Backend> ConnectionRouter<B> {
    pub fn new(registry: PoolRegistry<B>) -> Self {
        Self {
            registry: Arc::new(registry),
        }
    }

    pub fn registry(&self) -> &PoolRegistry<B> {
        &self.registry
    }

    /// Run a built statement on a pool chosen for `database` and `read`.
    pub async fn execute(
        &self,
        database: &str,
        read: bool,
        statement: &BuiltStatement,
    ) -> DbResult<QueryResult> {
        let pool = self.registry.select(database, read)?;
        debug!(
            database = %database,
            role = %pool.role(),
            sql = %statement.sql(),
            "Routing statement"
        );
        run_leased(&pool, statement).await
    }

    /// Build `statement` and run it.
    pub async fn run(
        &self,
        statement: Statement,
        database: &str,
        read: bool,
    ) -> DbResult<QueryResult> {
        let kind = statement.kind();
        let built = statement.build()?;
        debug!(database = %database, kind = %kind, "Statement built");
        self.execute(database, read, &built).await
    }

    /// Run SQL verbatim with positional params.
    pub async fn raw(
        &self,
        sql: &str,
        params: Vec<SqlValue>,
        database: &str,
        read: bool,
    ) -> DbResult<QueryResult> {
        self.run(Statement::raw(sql, params), database, read).await
    }

    /// Run caller SQL extended with the clauses in `options`.
    pub async fn query(
        &self,
        sql: &str,
        options: QueryOptions,
        database: &str,
        read: bool,
    ) -> DbResult<QueryResult> {
        self.run(Statement::query(sql, options), database, read).await
    }

    pub async fn select(
        &self,
        table: &str,
        options: SelectOptions,
        database: &str,
        read: bool,
    ) -> DbResult<QueryResult> {
        self.run(Statement::select(table, options), database, read).await
    }

    /// Inserts always go to the primary.
    pub async fn insert(
        &self,
        table: &str,
        options: InsertOptions,
        database: &str,
    ) -> DbResult<QueryResult> {
        self.run(Statement::insert(table, options), database, false).await
    }

    /// Updates always go to the primary.
    pub async fn update(
        &self,
        table: &str,
        options: UpdateOptions,
        database: &str,
    ) -> DbResult<QueryResult> {
        self.run(Statement::update(table, options), database, false).await
    }

    /// Open a transaction on the primary of `database`.
    pub async fn begin_transaction(
        &self,
        database: &str,
    ) -> DbResult<TransactionSession<B::Connection>> {
        let pool = self.registry.primary(database)?;
        TransactionSession::begin(&pool).await
    }

    /// A handle pinned to the pool selected now for `database` and `read`.
    pub fn get(&self, database: &str, read: bool) -> DbResult<BoundPool<B>> {
        let pool = self.registry.select(database, read)?;
        Ok(BoundPool { pool })
    }

    /// Set the connection ceiling of every pool under `database`.
    pub fn update_connection_limit(&self, database: &str, limit: u32) {
        self.registry.update_connection_limit(database, limit);
    }

    pub async fn close(&self) {
        self.registry.close().await;
    }
}

/// Statement execution against one already selected pool.
///
/// Each statement still leases and releases its own connection.
pub struct BoundPool<B: Backend> {
    pool: Arc<PoolHandle<B>>,
}

impl<B: Backend> Clone for BoundPool<B> {
    fn clone(&self) -> Self {
        Self {
            pool: Arc::clone(&self.pool),
        }
    }
}

impl<B: Backend> BoundPool<B> {
    pub fn pool(&self) -> &PoolHandle<B> {
        &self.pool
    }
}

#[async_trait]
impl<B: Backend> SqlExecutor for BoundPool<B> {
    async fn execute(&mut self, statement: &BuiltStatement) -> DbResult<QueryResult> {
        run_leased(&self.pool, statement).await
    }
}
