//! Scanned-file records: one upserted row per classified path.

use std::collections::HashSet;

use chrono::Utc;
use rusqlite::Connection;

use dovarr_core::{Error, Result};

use crate::models::ScanRecord;

/// Check whether a path has already been classified.
pub fn is_scanned(conn: &Connection, file_path: &str) -> Result<bool> {
    let count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM scanned_files WHERE file_path = ?1",
            [file_path],
            |row| row.get(0),
        )
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(count > 0)
}

/// Record a classification verdict (upsert; at most one row per path).
pub fn add_scanned(
    conn: &Connection,
    file_path: &str,
    has_dovi: bool,
    dovi_profile: Option<&str>,
    el_type: Option<&str>,
    file_size_bytes: i64,
) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO scanned_files
         (file_path, has_dovi, dovi_profile, el_type, file_size_bytes, scanned_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        rusqlite::params![
            file_path,
            has_dovi,
            dovi_profile,
            el_type,
            file_size_bytes,
            Utc::now().to_rfc3339()
        ],
    )
    .map_err(|e| Error::database(e.to_string()))?;
    Ok(())
}

/// Batch-load every scanned path. The delta scan uses this as its skip set.
pub fn all_scanned_paths(conn: &Connection) -> Result<HashSet<String>> {
    let mut stmt = conn
        .prepare("SELECT file_path FROM scanned_files")
        .map_err(|e| Error::database(e.to_string()))?;
    let rows = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .map_err(|e| Error::database(e.to_string()))?
        .collect::<std::result::Result<HashSet<_>, _>>()
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(rows)
}

/// Fetch a single scan record.
pub fn get_scanned(conn: &Connection, file_path: &str) -> Result<Option<ScanRecord>> {
    let result = conn.query_row(
        "SELECT file_path, has_dovi, dovi_profile, el_type, file_size_bytes, scanned_at
         FROM scanned_files WHERE file_path = ?1",
        [file_path],
        ScanRecord::from_row,
    );
    match result {
        Ok(record) => Ok(Some(record)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(Error::database(e.to_string())),
    }
}

/// Delete all scan records. Returns the number of rows removed.
pub fn clear_scanned(conn: &Connection) -> Result<usize> {
    conn.execute("DELETE FROM scanned_files", [])
        .map_err(|e| Error::database(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{get_conn, init_memory_pool};

    #[test]
    fn upsert_keeps_one_row_per_path() {
        let pool = init_memory_pool().unwrap();
        let conn = get_conn(&pool).unwrap();

        add_scanned(&conn, "/movies/a.mkv", true, Some("7"), Some("MEL"), 100).unwrap();
        add_scanned(&conn, "/movies/a.mkv", true, Some("8"), None, 100).unwrap();

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM scanned_files", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);

        let record = get_scanned(&conn, "/movies/a.mkv").unwrap().unwrap();
        assert_eq!(record.dovi_profile.as_deref(), Some("8"));
        assert_eq!(record.el_type, None);
    }

    #[test]
    fn skip_set_contains_all_paths() {
        let pool = init_memory_pool().unwrap();
        let conn = get_conn(&pool).unwrap();

        add_scanned(&conn, "/movies/a.mkv", false, None, None, 1).unwrap();
        add_scanned(&conn, "/tv/b.mkv", true, Some("7"), Some("FEL_SIMPLE"), 2).unwrap();

        let paths = all_scanned_paths(&conn).unwrap();
        assert_eq!(paths.len(), 2);
        assert!(paths.contains("/movies/a.mkv"));
        assert!(paths.contains("/tv/b.mkv"));
    }

    #[test]
    fn probe_error_recorded_with_null_profile() {
        let pool = init_memory_pool().unwrap();
        let conn = get_conn(&pool).unwrap();

        // A ProbeError verdict is recorded with dovi_profile = NULL so the
        // scheduler does not rescan the file every cycle.
        add_scanned(&conn, "/movies/broken.mkv", false, None, None, 5).unwrap();
        assert!(is_scanned(&conn, "/movies/broken.mkv").unwrap());

        let record = get_scanned(&conn, "/movies/broken.mkv").unwrap().unwrap();
        assert!(record.dovi_profile.is_none());
    }

    #[test]
    fn clear_returns_count() {
        let pool = init_memory_pool().unwrap();
        let conn = get_conn(&pool).unwrap();

        add_scanned(&conn, "/movies/a.mkv", false, None, None, 1).unwrap();
        add_scanned(&conn, "/movies/b.mkv", false, None, None, 1).unwrap();
        assert_eq!(clear_scanned(&conn).unwrap(), 2);
        assert!(!is_scanned(&conn, "/movies/a.mkv").unwrap());
    }
}
