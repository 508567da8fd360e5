//! Database access layer.
//!
//! - Driver boundary (`backend`) and its MySQL implementation (`mysql`)
//! - Pool handles with an adjustable connection ceiling (`pool`)
//! - Registry of primary and replica pools per logical database (`registry`)
//! - Statement routing (`router`) and transaction sessions (`session`)

pub mod backend;
pub mod executor;
pub mod mysql;
pub mod params;
pub mod pool;
pub mod registry;
pub mod router;
pub mod session;
pub mod types;

pub use backend::{Backend, BackendConnection};
pub use executor::SqlExecutor;
pub use mysql::{MySqlBackend, MySqlPooledConnection};
pub use pool::{ConnectionGate, LeasedConnection, PoolHandle, PoolRole};
pub use registry::{LogicalDatabase, PoolRegistry};
pub use router::{BoundPool, ConnectionRouter};
pub use session::{SessionState, TransactionSession};

/// Router over MySQL pools.
pub type MySqlRouter = ConnectionRouter<MySqlBackend>;
