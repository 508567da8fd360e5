//! Transaction sessions.
//!
//! A session holds one leased primary connection from `BEGIN` until it is
//! committed or rolled back. Statements run on that connection without
//! releasing it. Taking `&mut self` rules out concurrent statements.

use crate::builder::BuiltStatement;
use crate::db::backend::{Backend, BackendConnection};
use crate::db::executor::SqlExecutor;
use crate::db::pool::{LeasedConnection, PoolHandle};
use crate::error::{DbError, DbResult};
use crate::models::QueryResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

/// Lifecycle of a [`TransactionSession`]. Only `Open` accepts statements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Open,
    Committed,
    RolledBack,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open => write!(f, "open"),
            Self::Committed => write!(f, "committed"),
            Self::RolledBack => write!(f, "rolled back"),
        }
    }
}

fn generate_transaction_id() -> String {
    format!("tx_{}", uuid::Uuid::new_v4().simple())
}

/// An open transaction bound to one connection.
///
/// Dropping a session that is still open rolls it back on a spawned task
/// before the connection goes back to its pool.
pub struct TransactionSession<C: BackendConnection> {
    id: String,
    database: String,
    state: SessionState,
    lease: Option<LeasedConnection<C>>,
    started_at: DateTime<Utc>,
}

impl<C: BackendConnection> TransactionSession<C> {
    /// Lease a connection from `pool` and issue `BEGIN`.
    ///
    /// The connection is released if `BEGIN` fails.
    pub async fn begin<B>(pool: &PoolHandle<B>) -> DbResult<Self>
    where
        B: Backend<Connection = C>,
    {
        let mut lease = pool.acquire().await?;
        if let Err(e) = lease.begin().await {
            lease.release();
            return Err(DbError::begin_failed(pool.database(), e.to_string()));
        }

        let session = Self {
            id: generate_transaction_id(),
            database: pool.database().to_string(),
            state: SessionState::Open,
            lease: Some(lease),
            started_at: Utc::now(),
        };
        info!(
            transaction_id = %session.id,
            database = %session.database,
            "Transaction started"
        );
        Ok(session)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == SessionState::Open
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    fn ensure_open(&self) -> DbResult<()> {
        if self.state != SessionState::Open {
            return Err(DbError::invalid_session_state(
                &self.id,
                self.state.to_string(),
            ));
        }
        Ok(())
    }

    /// The bound connection. Present exactly while the session is open.
    fn lease(&mut self) -> DbResult<&mut LeasedConnection<C>> {
        let state = self.state;
        let id = &self.id;
        self.lease
            .as_mut()
            .ok_or_else(|| DbError::invalid_session_state(id, state.to_string()))
    }

    /// Commit and release the connection.
    ///
    /// If `COMMIT` fails, a `ROLLBACK` is attempted, the connection is
    /// released either way, and the session ends rolled back. The returned
    /// error says whether that rollback succeeded.
    pub async fn commit(&mut self) -> DbResult<()> {
        self.ensure_open()?;
        let lease = self.lease()?;

        match lease.commit().await {
            Ok(()) => {
                self.finish(SessionState::Committed);
                info!(transaction_id = %self.id, database = %self.database, "Transaction committed");
                Ok(())
            }
            Err(commit_err) => {
                let rolled_back = match lease.rollback().await {
                    Ok(()) => true,
                    Err(rollback_err) => {
                        error!(
                            transaction_id = %self.id,
                            error = %rollback_err,
                            "Rollback after failed commit also failed"
                        );
                        false
                    }
                };
                self.finish(SessionState::RolledBack);
                warn!(
                    transaction_id = %self.id,
                    database = %self.database,
                    error = %commit_err,
                    rolled_back,
                    "Transaction commit failed"
                );
                Err(DbError::commit_failed(
                    &self.id,
                    commit_err.to_string(),
                    rolled_back,
                ))
            }
        }
    }

    /// Roll back and release the connection.
    ///
    /// The connection is released and the session ends rolled back even if
    /// the `ROLLBACK` command fails; that failure is then returned.
    pub async fn rollback(&mut self) -> DbResult<()> {
        self.ensure_open()?;
        let result = self.lease()?.rollback().await;
        self.finish(SessionState::RolledBack);

        match result {
            Ok(()) => {
                info!(transaction_id = %self.id, database = %self.database, "Transaction rolled back");
                Ok(())
            }
            Err(e) => Err(DbError::rollback_failed(&self.id, e.to_string())),
        }
    }

    /// Roll back after `cause` and hand `cause` back.
    ///
    /// A failing `ROLLBACK` is logged, not returned, so the caller keeps the
    /// error that ended the transaction.
    pub async fn abort(&mut self, cause: DbError) -> DbError {
        if let Err(rollback_err) = self.rollback().await {
            error!(
                transaction_id = %self.id,
                cause = %cause,
                error = %rollback_err,
                "Rollback after failed statement also failed"
            );
        }
        cause
    }

    fn finish(&mut self, state: SessionState) {
        self.state = state;
        if let Some(lease) = self.lease.take() {
            lease.release();
        }
        debug!(
            transaction_id = %self.id,
            duration_ms = (Utc::now() - self.started_at).num_milliseconds(),
            state = %state,
            "Transaction finished"
        );
    }
}

impl<C: BackendConnection> std::fmt::Debug for TransactionSession<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionSession")
            .field("id", &self.id)
            .field("database", &self.database)
            .field("state", &self.state)
            .field("started_at", &self.started_at)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<C: BackendConnection> SqlExecutor for TransactionSession<C> {
    /// Run on the bound connection. A failed statement leaves the session open.
    async fn execute(&mut self, statement: &BuiltStatement) -> DbResult<QueryResult> {
        self.ensure_open()?;
        debug!(
            transaction_id = %self.id,
            sql = %statement.sql(),
            "Executing statement in transaction"
        );
        self.lease()?
            .run(statement)
            .await
            .map_err(|e| e.with_statement(statement.sql(), statement.params()))
    }
}

impl<C: BackendConnection> Drop for TransactionSession<C> {
    fn drop(&mut self) {
        let Some(mut lease) = self.lease.take() else {
            return;
        };
        warn!(
            transaction_id = %self.id,
            database = %self.database,
            "Transaction dropped while open; rolling back"
        );

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let id = std::mem::take(&mut self.id);
                handle.spawn(async move {
                    if let Err(e) = lease.rollback().await {
                        error!(transaction_id = %id, error = %e, "Rollback of dropped transaction failed");
                    }
                    lease.release();
                });
            }
            // No runtime to roll back on; the backend discards the connection.
            Err(_) => lease.release(),
        }
    }
}
