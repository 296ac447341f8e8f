//! dovarr-db: the persistent catalog.
//!
//! SQLite-backed storage with connection pooling, embedded migrations, typed
//! models, and one query module per entity (settings, scanned, discovered,
//! processed, failed, current conversion). The catalog is the only durable
//! state in the system; every other component passes values.

pub mod migrations;
pub mod models;
pub mod pool;
pub mod queries;

pub use pool::{get_conn, init_memory_pool, init_pool, DbPool, PooledConnection};
