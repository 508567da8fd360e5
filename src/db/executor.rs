//! Statement execution contract.
//!
//! [`SqlExecutor`] is shared by the pool-bound handle and the transaction
//! session: implementors run an already built statement, and the provided
//! methods build structured statements first so builder errors surface
//! before any connection is touched.

use crate::builder::options::{InsertOptions, QueryOptions, SelectOptions, UpdateOptions};
use crate::builder::{BuiltStatement, Statement};
use crate::error::DbResult;
use crate::models::{QueryResult, SqlValue};
use async_trait::async_trait;

#[async_trait]
pub trait SqlExecutor: Send {
    /// Run a built statement.
    async fn execute(&mut self, statement: &BuiltStatement) -> DbResult<QueryResult>;

    /// Build `statement` and run it.
    async fn exec(&mut self, statement: Statement) -> DbResult<QueryResult> {
        let built = statement.build()?;
        self.execute(&built).await
    }

    /// Run SQL verbatim with positional params.
    async fn raw(&mut self, sql: &str, params: Vec<SqlValue>) -> DbResult<QueryResult> {
        self.exec(Statement::raw(sql, params)).await
    }

    /// Run caller SQL extended with the clauses in `options`.
    async fn query(&mut self, sql: &str, options: QueryOptions) -> DbResult<QueryResult> {
        self.exec(Statement::query(sql, options)).await
    }

    async fn select(&mut self, table: &str, options: SelectOptions) -> DbResult<QueryResult> {
        self.exec(Statement::select(table, options)).await
    }

    async fn insert(&mut self, table: &str, options: InsertOptions) -> DbResult<QueryResult> {
        self.exec(Statement::insert(table, options)).await
    }

    async fn update(&mut self, table: &str, options: UpdateOptions) -> DbResult<QueryResult> {
        self.exec(Statement::update(table, options)).await
    }
}
