//! Error types for dbroute.
//!
//! Every failure in the builder, the router and the transaction session is
//! reported through [`DbError`]. Nothing is retried internally; callers can
//! use [`DbError::is_retryable`] to decide for themselves.

use crate::models::SqlValue;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("No pool for database '{database}': {reason}")]
    NoPoolForDatabase { database: String, reason: String },

    #[error("Failed to acquire connection for '{database}': {message}")]
    ConnectionAcquireFailed { database: String, message: String },

    #[error("Statement failed: {message} (sql: {sql})")]
    StatementFailed {
        message: String,
        /// e.g., "42S02" for an unknown table
        sql_state: Option<String>,
        sql: String,
        params: Vec<SqlValue>,
    },

    #[error("Failed to begin transaction on '{database}': {message}")]
    TransactionBeginFailed { database: String, message: String },

    #[error(
        "Commit failed for transaction {transaction_id}: {message} (rolled back: {rolled_back})"
    )]
    TransactionCommitFailed {
        transaction_id: String,
        message: String,
        rolled_back: bool,
    },

    #[error("Rollback failed for transaction {transaction_id}: {message}")]
    TransactionRollbackFailed {
        transaction_id: String,
        message: String,
    },

    #[error("Invalid session state: transaction {transaction_id} is already {state}")]
    InvalidSessionState {
        transaction_id: String,
        state: String,
    },

    #[error("Invalid statement: {message}")]
    BuilderValidationFailed { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Driver error: {message}")]
    Driver {
        message: String,
        sql_state: Option<String>,
    },
}

impl DbError {
    /// Create a no-pool error for a database name.
    pub fn no_pool(database: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::NoPoolForDatabase {
            database: database.into(),
            reason: reason.into(),
        }
    }

    /// Create a connection acquisition error.
    pub fn acquire_failed(database: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConnectionAcquireFailed {
            database: database.into(),
            message: message.into(),
        }
    }

    /// Create a statement error carrying the SQL text and its parameters.
    pub fn statement_failed(
        message: impl Into<String>,
        sql_state: Option<String>,
        sql: impl Into<String>,
        params: Vec<SqlValue>,
    ) -> Self {
        Self::StatementFailed {
            message: message.into(),
            sql_state,
            sql: sql.into(),
            params,
        }
    }

    /// Create a transaction begin error.
    pub fn begin_failed(database: impl Into<String>, message: impl Into<String>) -> Self {
        Self::TransactionBeginFailed {
            database: database.into(),
            message: message.into(),
        }
    }

    /// Create a commit error.
    pub fn commit_failed(
        transaction_id: impl Into<String>,
        message: impl Into<String>,
        rolled_back: bool,
    ) -> Self {
        Self::TransactionCommitFailed {
            transaction_id: transaction_id.into(),
            message: message.into(),
            rolled_back,
        }
    }

    /// Create a rollback error.
    pub fn rollback_failed(transaction_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::TransactionRollbackFailed {
            transaction_id: transaction_id.into(),
            message: message.into(),
        }
    }

    /// Create an invalid session state error.
    pub fn invalid_session_state(
        transaction_id: impl Into<String>,
        state: impl Into<String>,
    ) -> Self {
        Self::InvalidSessionState {
            transaction_id: transaction_id.into(),
            state: state.into(),
        }
    }

    /// Create a builder validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::BuilderValidationFailed {
            message: message.into(),
        }
    }

    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a driver error.
    pub fn driver(message: impl Into<String>, sql_state: Option<String>) -> Self {
        Self::Driver {
            message: message.into(),
            sql_state,
        }
    }

    /// Attach statement context to a driver error.
    ///
    /// Errors that already carry their own category pass through unchanged.
    pub fn with_statement(self, sql: &str, params: &[SqlValue]) -> Self {
        match self {
            Self::Driver { message, sql_state } => {
                Self::statement_failed(message, sql_state, sql, params.to_vec())
            }
            other => other,
        }
    }

    /// Get the SQLSTATE code reported by the server, if any.
    pub fn sql_state(&self) -> Option<&str> {
        match self {
            Self::StatementFailed { sql_state, .. } | Self::Driver { sql_state, .. } => {
                sql_state.as_deref()
            }
            _ => None,
        }
    }

    /// Check if this error is retryable by the caller.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ConnectionAcquireFailed { .. })
    }
}

/// Convert sqlx errors to DbError.
///
/// The conversion has no statement context; call sites that run a statement
/// use [`DbError::with_statement`] to turn the result into `StatementFailed`.
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string());
                DbError::driver(db_err.message(), code)
            }
            sqlx::Error::Configuration(msg) => DbError::configuration(msg.to_string()),
            sqlx::Error::PoolTimedOut => {
                DbError::acquire_failed("", "timed out waiting for a pooled connection")
            }
            sqlx::Error::PoolClosed => DbError::acquire_failed("", "connection pool is closed"),
            sqlx::Error::Io(io_err) => DbError::driver(format!("I/O error: {}", io_err), None),
            sqlx::Error::Tls(tls_err) => DbError::driver(format!("TLS error: {}", tls_err), None),
            sqlx::Error::Protocol(msg) => DbError::driver(format!("Protocol error: {}", msg), None),
            sqlx::Error::ColumnDecode { index, source } => {
                DbError::driver(format!("Failed to decode column {}: {}", index, source), None)
            }
            sqlx::Error::Decode(source) => DbError::driver(format!("Decode error: {}", source), None),
            sqlx::Error::WorkerCrashed => DbError::driver("Database worker crashed", None),
            _ => DbError::driver(format!("Unknown database error: {}", err), None),
        }
    }
}

/// Result type alias for database operations.
pub type DbResult<T> = Result<T, DbError>;
