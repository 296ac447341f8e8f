//! Discovered Profile 7 files awaiting conversion.
//!
//! The listing joins against `processed_files` so an entry disappears from
//! the queue the moment its path is marked processed.

use chrono::Utc;
use rusqlite::Connection;

use dovarr_core::{Error, Result};

use crate::models::DiscoveredEntry;

const COLS: &str = "file_path, title, el_type, discovered_at";

/// Add a discovered Profile 7 file. No-op when the path is already present.
/// Returns true when a new row was inserted.
pub fn add_discovered(
    conn: &Connection,
    file_path: &str,
    title: &str,
    el_type: Option<&str>,
) -> Result<bool> {
    let n = conn
        .execute(
            "INSERT OR IGNORE INTO discovered_files (file_path, title, el_type, discovered_at)
             VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![file_path, title, el_type, Utc::now().to_rfc3339()],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}

/// Check whether a path is already queued.
pub fn is_discovered(conn: &Connection, file_path: &str) -> Result<bool> {
    let count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM discovered_files WHERE file_path = ?1",
            [file_path],
            |row| row.get(0),
        )
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(count > 0)
}

/// All discovered files not yet processed, oldest first (conversion is FIFO
/// by discovery time).
pub fn get_discovered(conn: &Connection) -> Result<Vec<DiscoveredEntry>> {
    query_discovered(conn, None)
}

/// Discovered MEL entries not yet processed, oldest first.
pub fn get_mel_entries(conn: &Connection) -> Result<Vec<DiscoveredEntry>> {
    query_discovered(conn, Some("d.el_type = 'MEL'"))
}

/// Discovered FEL entries (simple, complex, or unknown) not yet processed.
pub fn get_fel_entries(conn: &Connection) -> Result<Vec<DiscoveredEntry>> {
    query_discovered(conn, Some("d.el_type IS NOT NULL AND d.el_type != 'MEL'"))
}

fn query_discovered(
    conn: &Connection,
    extra_where: Option<&str>,
) -> Result<Vec<DiscoveredEntry>> {
    let filter = extra_where.map(|w| format!("AND {w}")).unwrap_or_default();
    let q = format!(
        "SELECT {COLS} FROM discovered_files d
         WHERE d.file_path NOT IN (SELECT file_path FROM processed_files) {filter}
         ORDER BY d.discovered_at ASC, d.id ASC"
    );

    let mut stmt = conn
        .prepare(&q)
        .map_err(|e| Error::database(e.to_string()))?;
    let rows = stmt
        .query_map([], DiscoveredEntry::from_row)
        .map_err(|e| Error::database(e.to_string()))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(rows)
}

/// The scheduler's next conversion candidate: the oldest safe entry that is
/// neither processed nor failed. `include_simple_fel` widens the selection
/// from MEL-only to MEL plus simple FELs; complex and unclassified FELs are
/// never auto-converted, and failed entries are never re-queued.
pub fn next_candidate(
    conn: &Connection,
    include_simple_fel: bool,
) -> Result<Option<DiscoveredEntry>> {
    let el_filter = if include_simple_fel {
        "d.el_type IN ('MEL', 'FEL_SIMPLE')"
    } else {
        "d.el_type = 'MEL'"
    };
    let q = format!(
        "SELECT {COLS} FROM discovered_files d
         WHERE d.file_path NOT IN (SELECT file_path FROM processed_files)
           AND d.file_path NOT IN (SELECT file_path FROM failed_files)
           AND {el_filter}
         ORDER BY d.discovered_at ASC, d.id ASC
         LIMIT 1"
    );

    let result = conn.query_row(&q, [], DiscoveredEntry::from_row);
    match result {
        Ok(entry) => Ok(Some(entry)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(Error::database(e.to_string())),
    }
}

/// Remove a path from the queue (after conversion or when the file is gone).
/// Returns true when a row was deleted.
pub fn remove_discovered(conn: &Connection, file_path: &str) -> Result<bool> {
    let n = conn
        .execute(
            "DELETE FROM discovered_files WHERE file_path = ?1",
            [file_path],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}

/// Clear the whole queue. Returns the number of rows removed.
pub fn clear_discovered(conn: &Connection) -> Result<usize> {
    conn.execute("DELETE FROM discovered_files", [])
        .map_err(|e| Error::database(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{get_conn, init_memory_pool};
    use crate::queries::processed;

    #[test]
    fn duplicate_add_is_a_noop() {
        let pool = init_memory_pool().unwrap();
        let conn = get_conn(&pool).unwrap();

        assert!(add_discovered(&conn, "/movies/a.mkv", "a", Some("MEL")).unwrap());
        assert!(!add_discovered(&conn, "/movies/a.mkv", "a", Some("MEL")).unwrap());
        assert_eq!(get_discovered(&conn).unwrap().len(), 1);
    }

    #[test]
    fn processed_paths_are_hidden() {
        let pool = init_memory_pool().unwrap();
        let conn = get_conn(&pool).unwrap();

        add_discovered(&conn, "/movies/a.mkv", "a", Some("MEL")).unwrap();
        add_discovered(&conn, "/movies/b.mkv", "b", Some("MEL")).unwrap();
        processed::mark_processed(&conn, "/movies/a.mkv", "7", "8", Some("MEL"), 100).unwrap();

        let listed = get_discovered(&conn).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].file_path, "/movies/b.mkv");
    }

    #[test]
    fn fifo_ordering() {
        let pool = init_memory_pool().unwrap();
        let conn = get_conn(&pool).unwrap();

        add_discovered(&conn, "/movies/first.mkv", "first", Some("MEL")).unwrap();
        add_discovered(&conn, "/movies/second.mkv", "second", Some("FEL_SIMPLE")).unwrap();

        let listed = get_discovered(&conn).unwrap();
        assert_eq!(listed[0].file_path, "/movies/first.mkv");
        assert_eq!(listed[1].file_path, "/movies/second.mkv");
    }

    #[test]
    fn el_type_filters() {
        let pool = init_memory_pool().unwrap();
        let conn = get_conn(&pool).unwrap();

        add_discovered(&conn, "/movies/m.mkv", "m", Some("MEL")).unwrap();
        add_discovered(&conn, "/movies/fs.mkv", "fs", Some("FEL_SIMPLE")).unwrap();
        add_discovered(&conn, "/movies/fc.mkv", "fc", Some("FEL_COMPLEX")).unwrap();

        let mel = get_mel_entries(&conn).unwrap();
        assert_eq!(mel.len(), 1);
        assert_eq!(mel[0].file_path, "/movies/m.mkv");

        let fel = get_fel_entries(&conn).unwrap();
        assert_eq!(fel.len(), 2);
    }

    #[test]
    fn candidate_selection_respects_fel_policy() {
        let pool = init_memory_pool().unwrap();
        let conn = get_conn(&pool).unwrap();

        add_discovered(&conn, "/movies/fs.mkv", "fs", Some("FEL_SIMPLE")).unwrap();
        add_discovered(&conn, "/movies/fc.mkv", "fc", Some("FEL_COMPLEX")).unwrap();
        add_discovered(&conn, "/movies/m.mkv", "m", Some("MEL")).unwrap();

        // MEL-only mode holds simple FELs back.
        let mel_only = next_candidate(&conn, false).unwrap().unwrap();
        assert_eq!(mel_only.file_path, "/movies/m.mkv");

        // Widened mode takes the oldest safe entry; complex never qualifies.
        let widened = next_candidate(&conn, true).unwrap().unwrap();
        assert_eq!(widened.file_path, "/movies/fs.mkv");

        remove_discovered(&conn, "/movies/fs.mkv").unwrap();
        remove_discovered(&conn, "/movies/m.mkv").unwrap();
        assert!(next_candidate(&conn, true).unwrap().is_none());
    }

    #[test]
    fn candidate_selection_skips_failed_and_processed() {
        let pool = init_memory_pool().unwrap();
        let conn = get_conn(&pool).unwrap();
        use crate::queries::failed;

        add_discovered(&conn, "/movies/a.mkv", "a", Some("MEL")).unwrap();
        add_discovered(&conn, "/movies/b.mkv", "b", Some("MEL")).unwrap();

        failed::mark_failed(&conn, "/movies/a.mkv", "broken").unwrap();
        let candidate = next_candidate(&conn, false).unwrap().unwrap();
        assert_eq!(candidate.file_path, "/movies/b.mkv");

        processed::mark_processed(&conn, "/movies/b.mkv", "7", "8", Some("MEL"), 1).unwrap();
        assert!(next_candidate(&conn, false).unwrap().is_none());
    }

    #[test]
    fn remove_and_clear() {
        let pool = init_memory_pool().unwrap();
        let conn = get_conn(&pool).unwrap();

        add_discovered(&conn, "/movies/a.mkv", "a", None).unwrap();
        assert!(remove_discovered(&conn, "/movies/a.mkv").unwrap());
        assert!(!remove_discovered(&conn, "/movies/a.mkv").unwrap());

        add_discovered(&conn, "/movies/b.mkv", "b", None).unwrap();
        add_discovered(&conn, "/movies/c.mkv", "c", None).unwrap();
        assert_eq!(clear_discovered(&conn).unwrap(), 2);
    }
}
