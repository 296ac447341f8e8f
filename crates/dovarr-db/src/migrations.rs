//! Embedded SQL migrations and runner.
//!
//! Migrations are stored as `&str` constants and executed in order. A
//! `schema_migrations` table tracks which versions have been applied.

use rusqlite::Connection;

use dovarr_core::{Error, Result};

/// V1: initial schema -- all catalog tables and their file-path indexes.
const V1_INITIAL: &str = r#"
-- Every file the scanner has classified, keyed by canonical path.
CREATE TABLE scanned_files (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    file_path       TEXT UNIQUE NOT NULL,
    has_dovi        INTEGER NOT NULL,
    dovi_profile    TEXT,
    el_type         TEXT,
    file_size_bytes INTEGER NOT NULL,
    scanned_at      TEXT NOT NULL
);

-- Profile 7 files awaiting conversion.
CREATE TABLE discovered_files (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    file_path     TEXT UNIQUE NOT NULL,
    title         TEXT NOT NULL,
    el_type       TEXT,
    discovered_at TEXT NOT NULL
);

-- Successfully converted files.
CREATE TABLE processed_files (
    id               INTEGER PRIMARY KEY AUTOINCREMENT,
    file_path        TEXT UNIQUE NOT NULL,
    original_profile TEXT NOT NULL,
    new_profile      TEXT NOT NULL,
    el_type          TEXT,
    file_size_bytes  INTEGER NOT NULL,
    processed_at     TEXT NOT NULL
);

-- Conversion attempts that errored out.
CREATE TABLE failed_files (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    file_path     TEXT UNIQUE NOT NULL,
    error_message TEXT NOT NULL,
    failed_at     TEXT NOT NULL,
    retry_count   INTEGER NOT NULL DEFAULT 0
);

-- Singleton marker for the conversion currently in flight.
CREATE TABLE current_conversion (
    id         INTEGER PRIMARY KEY CHECK (id = 1),
    file_path  TEXT NOT NULL,
    title      TEXT NOT NULL,
    started_at TEXT NOT NULL
);

-- Operator-tunable runtime policy.
CREATE TABLE settings (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

CREATE INDEX idx_scanned_path ON scanned_files(file_path);
CREATE INDEX idx_discovered_path ON discovered_files(file_path);
CREATE INDEX idx_processed_path ON processed_files(file_path);
CREATE INDEX idx_failed_path ON failed_files(file_path);
"#;

/// All migrations in order. Index + 1 is the schema version.
const MIGRATIONS: &[&str] = &[V1_INITIAL];

/// Run any migrations not yet recorded in `schema_migrations`.
pub fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
             version    INTEGER PRIMARY KEY,
             applied_at TEXT NOT NULL
         );",
    )
    .map_err(|e| Error::database(e.to_string()))?;

    let current: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .map_err(|e| Error::database(e.to_string()))?;

    for (i, sql) in MIGRATIONS.iter().enumerate() {
        let version = (i + 1) as i64;
        if version <= current {
            continue;
        }

        conn.execute_batch(sql)
            .map_err(|e| Error::database(format!("migration v{version} failed: {e}")))?;
        conn.execute(
            "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
            rusqlite::params![version, chrono::Utc::now().to_rfc3339()],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();

        let version: i64 = conn
            .query_row("SELECT MAX(version) FROM schema_migrations", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(version, MIGRATIONS.len() as i64);
    }

    #[test]
    fn v1_creates_all_tables() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();

        for table in [
            "scanned_files",
            "discovered_files",
            "processed_files",
            "failed_files",
            "current_conversion",
            "settings",
        ] {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
                    [table],
                    |row| row.get(0),
                )
                .unwrap();
            assert_eq!(count, 1, "missing table {table}");
        }
    }
}
