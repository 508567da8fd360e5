//! Pool registry and replica selection.
//!
//! Each logical database name owns one optional primary pool and an ordered
//! list of replica pools. Reads go to a uniformly random replica when there
//! is one and fall back to the primary; writes always use the primary.
//!
//! ```text
//!          ┌──────────────┐
//!          │ PoolRegistry │
//!          └──────┬───────┘
//!                 │ name
//!         ┌───────┴────────┐
//!         ↓                ↓
//!     ┌───────┐   ┌───────────────┐
//!     │Primary│   │ Replica 0..n  │
//!     └───────┘   └───────────────┘
//! ```

use crate::config::DatabaseDescriptor;
use crate::db::backend::Backend;
use crate::db::mysql::MySqlBackend;
use crate::db::pool::{PoolHandle, PoolRole};
use crate::error::{DbError, DbResult};
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// The pools registered under one name.
pub struct LogicalDatabase<B: Backend> {
    primary: Option<Arc<PoolHandle<B>>>,
    replicas: Vec<Arc<PoolHandle<B>>>,
}

impl<B: Backend> LogicalDatabase<B> {
    fn new() -> Self {
        Self {
            primary: None,
            replicas: Vec::new(),
        }
    }

    pub fn primary(&self) -> Option<&Arc<PoolHandle<B>>> {
        self.primary.as_ref()
    }

    pub fn replicas(&self) -> &[Arc<PoolHandle<B>>] {
        &self.replicas
    }

    fn pools(&self) -> impl Iterator<Item = &Arc<PoolHandle<B>>> {
        self.primary.iter().chain(self.replicas.iter())
    }
}

/// All pools, keyed by logical database name. Built once at startup.
pub struct PoolRegistry<B: Backend> {
    databases: HashMap<String, LogicalDatabase<B>>,
}

impl<B: Backend> Default for PoolRegistry<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: Backend> PoolRegistry<B> {
    pub fn new() -> Self {
        Self {
            databases: HashMap::new(),
        }
    }

    /// Register a pool under `name`: a replica when `readonly`, otherwise
    /// the primary. A second primary for the same name is rejected.
    pub fn register(
        &mut self,
        name: &str,
        readonly: bool,
        endpoint: &str,
        backend: B,
        connection_limit: u32,
        acquire_timeout: Duration,
    ) -> DbResult<()> {
        let database = self
            .databases
            .entry(name.to_string())
            .or_insert_with(LogicalDatabase::new);

        if readonly {
            let role = PoolRole::Replica(database.replicas.len());
            database.replicas.push(Arc::new(PoolHandle::new(
                name,
                role,
                endpoint,
                backend,
                connection_limit,
                acquire_timeout,
            )));
        } else {
            if let Some(existing) = &database.primary {
                return Err(DbError::configuration(format!(
                    "database '{}' already has a primary at {}; mark {} readonly to add a replica",
                    name,
                    existing.endpoint(),
                    endpoint
                )));
            }
            database.primary = Some(Arc::new(PoolHandle::new(
                name,
                PoolRole::Primary,
                endpoint,
                backend,
                connection_limit,
                acquire_timeout,
            )));
        }

        info!(
            database = %name,
            endpoint = %endpoint,
            readonly,
            connection_limit,
            "Pool registered"
        );
        Ok(())
    }

    /// Pick the pool for `name` and the read/write intent.
    pub fn select(&self, name: &str, read: bool) -> DbResult<Arc<PoolHandle<B>>> {
        let database = self
            .databases
            .get(name)
            .ok_or_else(|| DbError::no_pool(name, "database is not registered"))?;

        if read {
            match database.replicas.len() {
                0 => {}
                1 => return Ok(Arc::clone(&database.replicas[0])),
                n => {
                    let idx = rand::thread_rng().gen_range(0..n);
                    debug!(database = %name, replica = idx, "Replica selected");
                    return Ok(Arc::clone(&database.replicas[idx]));
                }
            }
        }

        database.primary.clone().ok_or_else(|| {
            DbError::no_pool(
                name,
                if read {
                    "no replica or primary pool"
                } else {
                    "no primary pool"
                },
            )
        })
    }

    /// The primary pool for `name`, used for writes and transactions.
    pub fn primary(&self, name: &str) -> DbResult<Arc<PoolHandle<B>>> {
        self.select(name, false)
    }

    /// Set the connection ceiling of every pool under `name`.
    /// Unknown names are ignored.
    pub fn update_connection_limit(&self, name: &str, limit: u32) {
        if limit == 0 {
            tracing::warn!(database = %name, "Ignoring connection limit of 0");
            return;
        }
        match self.databases.get(name) {
            Some(database) => {
                for pool in database.pools() {
                    pool.set_connection_limit(limit);
                }
            }
            None => debug!(database = %name, "Connection limit update for unknown database ignored"),
        }
    }

    pub fn database(&self, name: &str) -> Option<&LogicalDatabase<B>> {
        self.databases.get(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.databases.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn is_empty(&self) -> bool {
        self.databases.is_empty()
    }

    /// Close every pool.
    pub async fn close(&self) {
        for database in self.databases.values() {
            for pool in database.pools() {
                pool.close().await;
            }
        }
    }
}

impl PoolRegistry<MySqlBackend> {
    /// Connect every descriptor, in order.
    pub async fn connect(descriptors: &[DatabaseDescriptor]) -> DbResult<Self> {
        // Reject bad configuration before opening any connection
        let mut primaries = std::collections::HashSet::new();
        for descriptor in descriptors {
            let name = descriptor.name()?;
            descriptor.pool.validate().map_err(DbError::configuration)?;
            if !descriptor.readonly && !primaries.insert(name) {
                return Err(DbError::configuration(format!(
                    "database '{}' has more than one primary",
                    name
                )));
            }
        }

        let mut registry = Self::new();
        for descriptor in descriptors {
            let name = descriptor.name()?.to_string();
            let backend = MySqlBackend::connect(descriptor).await?;
            registry.register(
                &name,
                descriptor.readonly,
                &descriptor.endpoint(),
                backend,
                descriptor.pool.connection_limit_or_default(),
                descriptor.pool.acquire_timeout_or_default(),
            )?;
        }
        Ok(registry)
    }
}
