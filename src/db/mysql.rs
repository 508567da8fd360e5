//! MySQL backend over `sqlx`.

use crate::builder::BuiltStatement;
use crate::config::DatabaseDescriptor;
use crate::db::backend::{Backend, BackendConnection};
use crate::db::params::bind_mysql_param;
use crate::db::types::RowToJson;
use crate::error::{DbError, DbResult};
use crate::models::QueryResult;
use async_trait::async_trait;
use futures_util::TryStreamExt;
use sqlx::mysql::{MySqlPoolOptions, MySqlQueryResult, MySqlRow};
use sqlx::pool::PoolConnection;
use sqlx::{Either, Executor, MySql, MySqlConnection, MySqlPool};
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, info};

/// One `sqlx` pool to one MySQL endpoint.
#[derive(Debug, Clone)]
pub struct MySqlBackend {
    pool: MySqlPool,
    query_timeout: Duration,
}

impl MySqlBackend {
    /// Connect to the endpoint described by `descriptor`.
    pub async fn connect(descriptor: &DatabaseDescriptor) -> DbResult<Self> {
        let pool_opts = &descriptor.pool;
        let options = descriptor.connect_options()?;

        let pool = MySqlPoolOptions::new()
            .min_connections(pool_opts.min_connections_or_default())
            .max_connections(pool_opts.max_connections_or_default())
            .acquire_timeout(pool_opts.acquire_timeout_or_default())
            .idle_timeout(Some(pool_opts.idle_timeout_or_default()))
            .test_before_acquire(pool_opts.test_before_acquire_or_default())
            .connect_with(options)
            .await
            .map_err(|e| {
                DbError::configuration(format!(
                    "Failed to connect to {}: {}",
                    descriptor.endpoint(),
                    e
                ))
            })?;

        info!(
            endpoint = %descriptor.endpoint(),
            readonly = descriptor.readonly,
            max_connections = pool_opts.max_connections_or_default(),
            "Connected to MySQL"
        );

        Ok(Self {
            pool,
            query_timeout: pool_opts.query_timeout_or_default(),
        })
    }
}

#[async_trait]
impl Backend for MySqlBackend {
    type Connection = MySqlPooledConnection;

    async fn acquire(&self) -> DbResult<MySqlPooledConnection> {
        let conn = self.pool.acquire().await?;
        Ok(MySqlPooledConnection {
            conn,
            query_timeout: self.query_timeout,
            in_transaction: false,
        })
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

/// A checked-out MySQL connection.
///
/// If it is dropped while a transaction it opened is still unresolved, the
/// connection is closed instead of being returned to the pool.
#[derive(Debug)]
pub struct MySqlPooledConnection {
    conn: PoolConnection<MySql>,
    query_timeout: Duration,
    in_transaction: bool,
}

impl MySqlPooledConnection {
    fn connection(&mut self) -> &mut MySqlConnection {
        &mut self.conn
    }

    async fn command(&mut self, sql: &'static str) -> DbResult<()> {
        let query_timeout = self.query_timeout;
        match timeout(query_timeout, self.connection().execute(sql)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(DbError::from(e)),
            Err(_) => Err(timeout_error(sql, query_timeout)),
        }
    }
}

fn timeout_error(operation: &str, query_timeout: Duration) -> DbError {
    DbError::driver(
        format!(
            "{} timed out after {}s",
            operation,
            query_timeout.as_secs()
        ),
        None,
    )
}

#[async_trait]
impl BackendConnection for MySqlPooledConnection {
    async fn run(&mut self, statement: &BuiltStatement) -> DbResult<QueryResult> {
        let start = Instant::now();
        let query_timeout = self.query_timeout;

        debug!(
            sql = %statement.sql(),
            params = statement.params().len(),
            timeout_secs = query_timeout.as_secs(),
            "Executing statement"
        );

        let conn = self.connection();
        // Without params, send plain text so statements that cannot be
        // prepared (e.g. CREATE PROCEDURE) still work.
        let results = if statement.params().is_empty() {
            timeout(query_timeout, collect(conn.fetch_many(statement.sql()))).await
        } else {
            let mut query = sqlx::query(statement.sql());
            for param in statement.params() {
                query = bind_mysql_param(query, param);
            }
            timeout(query_timeout, collect(conn.fetch_many(query))).await
        };

        let mut result = match results {
            Ok(result) => result?,
            Err(_) => return Err(timeout_error("statement", query_timeout)),
        };
        result.execution_time_ms = start.elapsed().as_millis() as u64;
        Ok(result)
    }

    async fn begin(&mut self) -> DbResult<()> {
        self.command("BEGIN").await?;
        self.in_transaction = true;
        Ok(())
    }

    async fn commit(&mut self) -> DbResult<()> {
        self.command("COMMIT").await?;
        self.in_transaction = false;
        Ok(())
    }

    async fn rollback(&mut self) -> DbResult<()> {
        self.command("ROLLBACK").await?;
        self.in_transaction = false;
        Ok(())
    }
}

impl Drop for MySqlPooledConnection {
    fn drop(&mut self) {
        if self.in_transaction {
            self.conn.close_on_drop();
        }
    }
}

/// Fold a result stream into one [`QueryResult`].
async fn collect<S>(mut stream: S) -> DbResult<QueryResult>
where
    S: futures_util::Stream<Item = Result<Either<MySqlQueryResult, MySqlRow>, sqlx::Error>>
        + Unpin,
{
    let mut result = QueryResult::default();
    while let Some(item) = stream.try_next().await? {
        match item {
            Either::Left(done) => {
                result.rows_affected += done.rows_affected();
                if done.last_insert_id() > 0 {
                    result.last_insert_id = Some(done.last_insert_id());
                }
            }
            Either::Right(row) => {
                if result.columns.is_empty() {
                    result.columns = row.get_column_metadata();
                }
                result.rows.push(row.to_json_map());
            }
        }
    }
    Ok(result)
}
