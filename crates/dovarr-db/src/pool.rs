//! SQLite connection handling for the catalog.
//!
//! The daemon's decision loop is single-threaded, but the CLI and the
//! notifier-adjacent paths open connections of their own, so the catalog
//! sits behind a small r2d2 pool. Opening a pool also brings the schema up
//! to date and seeds missing setting defaults, so a freshly created
//! database file is immediately usable.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use dovarr_core::{Error, Result};

use crate::{migrations, queries};

/// Handle to the catalog's connection pool.
pub type DbPool = Pool<SqliteConnectionManager>;

/// One checked-out catalog connection.
pub type PooledConnection = r2d2::PooledConnection<SqliteConnectionManager>;

/// A handful of connections covers the decision loop plus any concurrent
/// CLI invocations against the same file.
const MAX_CONNECTIONS: u32 = 4;

/// Open (creating if necessary) the catalog database at `db_path`.
///
/// Every connection handed out runs in WAL mode with foreign keys
/// enforced; migrations and setting defaults are applied before the pool
/// is returned.
pub fn init_pool(db_path: &Path) -> Result<DbPool> {
    let manager = SqliteConnectionManager::file(db_path).with_init(|conn| {
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")
    });

    build_pool(manager)
}

/// Open a throwaway in-memory catalog, for tests.
///
/// SQLite's shared-cache URIs make all of one pool's connections see the
/// same data; a per-process sequence number keeps separate pools (and
/// therefore concurrently running tests) fully isolated from each other.
pub fn init_memory_pool() -> Result<DbPool> {
    static NEXT_DB: AtomicU64 = AtomicU64::new(0);
    let uri = format!(
        "file:dovarr_test_{}_{}?mode=memory&cache=shared",
        std::process::id(),
        NEXT_DB.fetch_add(1, Ordering::Relaxed)
    );

    let manager = SqliteConnectionManager::file(uri)
        .with_init(|conn| conn.pragma_update(None, "foreign_keys", "ON"));

    build_pool(manager)
}

/// Build the pool, then prepare the schema over one bootstrap connection.
fn build_pool(manager: SqliteConnectionManager) -> Result<DbPool> {
    let pool = Pool::builder()
        .max_size(MAX_CONNECTIONS)
        .build(manager)
        .map_err(|e| Error::database(format!("cannot open catalog: {e}")))?;

    let conn = get_conn(&pool)?;
    migrations::run_migrations(&conn)?;
    queries::settings::init_defaults(&conn)?;

    Ok(pool)
}

/// Check a connection out of the pool.
pub fn get_conn(pool: &DbPool) -> Result<PooledConnection> {
    pool.get()
        .map_err(|e| Error::database(format!("no catalog connection available: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_pools_are_isolated_from_each_other() {
        let a = init_memory_pool().unwrap();
        let b = init_memory_pool().unwrap();

        let conn_a = get_conn(&a).unwrap();
        conn_a
            .execute(
                "INSERT OR REPLACE INTO settings (key, value) VALUES ('probe', 'x')",
                [],
            )
            .unwrap();

        let conn_b = get_conn(&b).unwrap();
        let count: i64 = conn_b
            .query_row(
                "SELECT COUNT(*) FROM settings WHERE key = 'probe'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn connections_within_a_pool_share_state() {
        let pool = init_memory_pool().unwrap();

        let writer = get_conn(&pool).unwrap();
        writer
            .execute(
                "INSERT OR REPLACE INTO settings (key, value) VALUES ('shared', 'yes')",
                [],
            )
            .unwrap();
        drop(writer);

        let reader = get_conn(&pool).unwrap();
        let value: String = reader
            .query_row(
                "SELECT value FROM settings WHERE key = 'shared'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(value, "yes");
    }

    #[test]
    fn schema_and_defaults_ready_after_init() {
        let pool = init_memory_pool().unwrap();
        let conn = get_conn(&pool).unwrap();

        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='scanned_files'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 1);

        let mode: String = conn
            .query_row(
                "SELECT value FROM settings WHERE key = 'auto_process_mode'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(mode, "off");
    }

    #[test]
    fn on_disk_pool_uses_wal() {
        let dir = tempfile::tempdir().unwrap();
        let pool = init_pool(&dir.path().join("dovarr.db")).unwrap();
        let conn = get_conn(&pool).unwrap();

        let journal: String = conn
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap();
        assert_eq!(journal.to_lowercase(), "wal");

        let fk: i64 = conn
            .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
            .unwrap();
        assert_eq!(fk, 1);
    }
}
