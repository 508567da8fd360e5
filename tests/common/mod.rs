//! In-memory backend shared by the integration tests.
//!
//! Every pool records the statements it ran and counts the connections it
//! handed out and got back. Failures can be switched on per pool.

#![allow(dead_code)]

use async_trait::async_trait;
use dbroute::builder::BuiltStatement;
use dbroute::db::{Backend, BackendConnection, ConnectionRouter, PoolRegistry};
use dbroute::error::{DbError, DbResult};
use dbroute::models::{QueryResult, SqlValue};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const ACQUIRE_TIMEOUT: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, PartialEq)]
pub struct Executed {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

#[derive(Debug, Default)]
pub struct Failures {
    pub acquire: bool,
    pub begin: bool,
    pub commit: bool,
    pub rollback: bool,
    /// Statements containing this text fail
    pub statement: Option<String>,
}

#[derive(Debug, Default)]
pub struct MemoryState {
    pub label: String,
    acquired: AtomicUsize,
    released: AtomicUsize,
    closed: AtomicBool,
    executed: Mutex<Vec<Executed>>,
    pub failures: Mutex<Failures>,
}

impl MemoryState {
    fn new(label: &str) -> Arc<Self> {
        Arc::new(Self {
            label: label.to_string(),
            ..Default::default()
        })
    }

    pub fn acquired(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    /// Connections currently out of the pool.
    pub fn outstanding(&self) -> usize {
        self.acquired() - self.released()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn executed(&self) -> Vec<Executed> {
        self.executed.lock().unwrap().clone()
    }

    pub fn sql_log(&self) -> Vec<String> {
        self.executed().into_iter().map(|e| e.sql).collect()
    }

    pub fn fail(&self, configure: impl FnOnce(&mut Failures)) {
        configure(&mut self.failures.lock().unwrap());
    }

    fn record(&self, sql: &str, params: &[SqlValue]) {
        self.executed.lock().unwrap().push(Executed {
            sql: sql.to_string(),
            params: params.to_vec(),
        });
    }
}

pub struct MemoryBackend {
    state: Arc<MemoryState>,
}

#[async_trait]
impl Backend for MemoryBackend {
    type Connection = MemoryConnection;

    async fn acquire(&self) -> DbResult<MemoryConnection> {
        if self.state.failures.lock().unwrap().acquire {
            return Err(DbError::acquire_failed("", "connection refused"));
        }
        self.state.acquired.fetch_add(1, Ordering::SeqCst);
        Ok(MemoryConnection {
            state: Arc::clone(&self.state),
        })
    }

    async fn close(&self) {
        self.state.closed.store(true, Ordering::SeqCst);
    }
}

pub struct MemoryConnection {
    state: Arc<MemoryState>,
}

impl MemoryConnection {
    fn command(&self, sql: &str, fail: bool) -> DbResult<()> {
        self.state.record(sql, &[]);
        if fail {
            return Err(DbError::driver(format!("{sql} failed"), Some("HY000".into())));
        }
        Ok(())
    }
}

#[async_trait]
impl BackendConnection for MemoryConnection {
    async fn run(&mut self, statement: &BuiltStatement) -> DbResult<QueryResult> {
        self.state.record(statement.sql(), statement.params());

        let failing = self.state.failures.lock().unwrap().statement.clone();
        if let Some(pattern) = failing {
            if statement.sql().contains(&pattern) {
                return Err(DbError::driver(
                    "You have an error in your SQL syntax",
                    Some("42000".into()),
                ));
            }
        }

        if statement.sql().trim_start().to_uppercase().starts_with("SELECT") {
            let mut row = serde_json::Map::new();
            row.insert("source".into(), self.state.label.clone().into());
            Ok(QueryResult {
                rows: vec![row],
                ..Default::default()
            })
        } else {
            Ok(QueryResult::write_result(1, None))
        }
    }

    async fn begin(&mut self) -> DbResult<()> {
        let fail = self.state.failures.lock().unwrap().begin;
        self.command("BEGIN", fail)
    }

    async fn commit(&mut self) -> DbResult<()> {
        let fail = self.state.failures.lock().unwrap().commit;
        self.command("COMMIT", fail)
    }

    async fn rollback(&mut self) -> DbResult<()> {
        let fail = self.state.failures.lock().unwrap().rollback;
        self.command("ROLLBACK", fail)
    }
}

impl Drop for MemoryConnection {
    fn drop(&mut self) {
        self.state.released.fetch_add(1, Ordering::SeqCst);
    }
}

/// Builds a registry of in-memory pools.
#[derive(Default)]
pub struct TestPools {
    registry: PoolRegistry<MemoryBackend>,
}

impl TestPools {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn primary(&mut self, name: &str, label: &str) -> Arc<MemoryState> {
        self.add(name, false, label, 10)
    }

    pub fn replica(&mut self, name: &str, label: &str) -> Arc<MemoryState> {
        self.add(name, true, label, 10)
    }

    pub fn add(
        &mut self,
        name: &str,
        readonly: bool,
        label: &str,
        connection_limit: u32,
    ) -> Arc<MemoryState> {
        self.try_add(name, readonly, label, connection_limit)
            .unwrap()
    }

    pub fn try_add(
        &mut self,
        name: &str,
        readonly: bool,
        label: &str,
        connection_limit: u32,
    ) -> DbResult<Arc<MemoryState>> {
        let state = MemoryState::new(label);
        self.registry.register(
            name,
            readonly,
            label,
            MemoryBackend {
                state: Arc::clone(&state),
            },
            connection_limit,
            ACQUIRE_TIMEOUT,
        )?;
        Ok(state)
    }

    pub fn registry(self) -> PoolRegistry<MemoryBackend> {
        self.registry
    }

    pub fn router(self) -> ConnectionRouter<MemoryBackend> {
        ConnectionRouter::new(self.registry)
    }
}
