//! Pool handles and connection leases.
//!
//! A [`PoolHandle`] wraps one backend pool behind a [`ConnectionGate`], an
//! adjustable ceiling on the number of connections leased at once. The
//! ceiling can be changed at any time; leases already handed out are never
//! revoked.

use crate::db::backend::Backend;
use crate::error::{DbError, DbResult};
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Whether a pool serves writes or reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolRole {
    Primary,
    /// Position in the replica list
    Replica(usize),
}

impl std::fmt::Display for PoolRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Primary => write!(f, "primary"),
            Self::Replica(idx) => write!(f, "replica#{}", idx),
        }
    }
}

#[derive(Debug)]
struct GateState {
    limit: u32,
    /// Permits still out that must be forgotten instead of returned,
    /// left over from lowering the limit below the number in use.
    debt: u32,
}

/// Adjustable ceiling on concurrent leases.
#[derive(Debug)]
pub struct ConnectionGate {
    semaphore: Arc<Semaphore>,
    state: Mutex<GateState>,
}

impl ConnectionGate {
    pub fn new(limit: u32) -> Arc<Self> {
        Arc::new(Self {
            semaphore: Arc::new(Semaphore::new(limit as usize)),
            state: Mutex::new(GateState { limit, debt: 0 }),
        })
    }

    fn state(&self) -> MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Wait for a free slot.
    pub async fn acquire(self: &Arc<Self>) -> DbResult<GatePermit> {
        let permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| DbError::acquire_failed("", "connection gate is closed"))?;
        Ok(GatePermit {
            permit: Some(permit),
            gate: Arc::clone(self),
        })
    }

    pub fn limit(&self) -> u32 {
        self.state().limit
    }

    /// Number of leases currently held.
    pub fn in_use(&self) -> u32 {
        let state = self.state();
        let available = self.semaphore.available_permits() as u32;
        (state.limit + state.debt).saturating_sub(available)
    }

    pub fn set_limit(&self, limit: u32) {
        let mut state = self.state();
        if limit > state.limit {
            let mut grow = limit - state.limit;
            let paid = grow.min(state.debt);
            state.debt -= paid;
            grow -= paid;
            self.semaphore.add_permits(grow as usize);
        } else if limit < state.limit {
            let shrink = state.limit - limit;
            let forgotten = self.semaphore.forget_permits(shrink as usize) as u32;
            state.debt += shrink - forgotten;
        }
        state.limit = limit;
    }

    pub fn close(&self) {
        self.semaphore.close();
    }

    fn release(&self, permit: OwnedSemaphorePermit) {
        let mut state = self.state();
        if state.debt > 0 {
            state.debt -= 1;
            permit.forget();
        } else {
            drop(permit);
        }
    }
}

/// A slot taken from a [`ConnectionGate`]; returned on drop.
#[derive(Debug)]
pub struct GatePermit {
    permit: Option<OwnedSemaphorePermit>,
    gate: Arc<ConnectionGate>,
}

impl Drop for GatePermit {
    fn drop(&mut self) {
        if let Some(permit) = self.permit.take() {
            self.gate.release(permit);
        }
    }
}

/// A connection exclusively held by one caller.
///
/// Dropping the lease returns the connection to its pool and frees its
/// ceiling slot. Ownership makes a second release impossible.
pub struct LeasedConnection<C> {
    // Declared before the permit so the connection goes back first.
    connection: C,
    _permit: GatePermit,
    database: String,
    role: PoolRole,
}

impl<C> LeasedConnection<C> {
    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn role(&self) -> PoolRole {
        self.role
    }

    /// Return the connection to its pool.
    pub fn release(self) {
        debug!(database = %self.database, role = %self.role, "Connection released");
    }
}

impl<C> Deref for LeasedConnection<C> {
    type Target = C;

    fn deref(&self) -> &C {
        &self.connection
    }
}

impl<C> DerefMut for LeasedConnection<C> {
    fn deref_mut(&mut self) -> &mut C {
        &mut self.connection
    }
}

impl<C> std::fmt::Debug for LeasedConnection<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LeasedConnection")
            .field("database", &self.database)
            .field("role", &self.role)
            .finish_non_exhaustive()
    }
}

/// One physical pool registered under a logical database name.
pub struct PoolHandle<B: Backend> {
    database: String,
    role: PoolRole,
    /// host:port/schema, never credentials
    endpoint: String,
    backend: B,
    gate: Arc<ConnectionGate>,
    acquire_timeout: Duration,
}

impl<B: Backend> PoolHandle<B> {
    pub fn new(
        database: impl Into<String>,
        role: PoolRole,
        endpoint: impl Into<String>,
        backend: B,
        connection_limit: u32,
        acquire_timeout: Duration,
    ) -> Self {
        Self {
            database: database.into(),
            role,
            endpoint: endpoint.into(),
            backend,
            gate: ConnectionGate::new(connection_limit),
            acquire_timeout,
        }
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn role(&self) -> PoolRole {
        self.role
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn connection_limit(&self) -> u32 {
        self.gate.limit()
    }

    /// Number of connections currently leased from this pool.
    pub fn leased(&self) -> u32 {
        self.gate.in_use()
    }

    /// Change the ceiling in place. Existing leases stay valid.
    pub fn set_connection_limit(&self, limit: u32) {
        let previous = self.gate.limit();
        self.gate.set_limit(limit);
        info!(
            database = %self.database,
            role = %self.role,
            previous,
            limit,
            "Connection limit updated"
        );
        if self.gate.in_use() > limit {
            warn!(
                database = %self.database,
                role = %self.role,
                in_use = self.gate.in_use(),
                limit,
                "More connections leased than the new limit; new leases wait until enough are returned"
            );
        }
    }

    /// Lease a connection, waiting at most the acquire timeout for a free slot.
    pub async fn acquire(&self) -> DbResult<LeasedConnection<B::Connection>> {
        let permit = match timeout(self.acquire_timeout, self.gate.acquire()).await {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => {
                return Err(DbError::acquire_failed(&self.database, "pool is closed"));
            }
            Err(_) => {
                return Err(DbError::acquire_failed(
                    &self.database,
                    format!(
                        "timed out after {}s waiting for one of {} connections on {}",
                        self.acquire_timeout.as_secs(),
                        self.gate.limit(),
                        self.role
                    ),
                ));
            }
        };

        let connection = self.backend.acquire().await.map_err(|e| match e {
            DbError::ConnectionAcquireFailed { message, .. } => {
                DbError::acquire_failed(&self.database, message)
            }
            other => DbError::acquire_failed(&self.database, other.to_string()),
        })?;

        debug!(
            database = %self.database,
            role = %self.role,
            endpoint = %self.endpoint,
            "Connection leased"
        );

        Ok(LeasedConnection {
            connection,
            _permit: permit,
            database: self.database.clone(),
            role: self.role,
        })
    }

    /// Close the pool. Waiters fail and new leases are refused.
    pub async fn close(&self) {
        self.gate.close();
        self.backend.close().await;
        info!(database = %self.database, role = %self.role, "Pool closed");
    }
}

impl<B: Backend> std::fmt::Debug for PoolHandle<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolHandle")
            .field("database", &self.database)
            .field("role", &self.role)
            .field("endpoint", &self.endpoint)
            .field("connection_limit", &self.gate.limit())
            .finish_non_exhaustive()
    }
}
