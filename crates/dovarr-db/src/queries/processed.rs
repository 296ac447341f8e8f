//! Processed-file records: written once at the end of a successful
//! conversion, deleted only by explicit operator action.

use chrono::Utc;
use rusqlite::Connection;

use dovarr_core::{Error, Result};

use crate::models::ProcessedEntry;

/// Check whether a file has already been converted.
pub fn is_processed(conn: &Connection, file_path: &str) -> Result<bool> {
    let count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM processed_files WHERE file_path = ?1",
            [file_path],
            |row| row.get(0),
        )
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(count > 0)
}

/// Mark a file as successfully processed (upsert). Also clears any failed
/// entry for the same path.
pub fn mark_processed(
    conn: &Connection,
    file_path: &str,
    original_profile: &str,
    new_profile: &str,
    el_type: Option<&str>,
    file_size_bytes: i64,
) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO processed_files
         (file_path, original_profile, new_profile, el_type, file_size_bytes, processed_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        rusqlite::params![
            file_path,
            original_profile,
            new_profile,
            el_type,
            file_size_bytes,
            Utc::now().to_rfc3339()
        ],
    )
    .map_err(|e| Error::database(e.to_string()))?;

    conn.execute("DELETE FROM failed_files WHERE file_path = ?1", [file_path])
        .map_err(|e| Error::database(e.to_string()))?;

    Ok(())
}

/// List processed files, most recent first.
pub fn get_processed(conn: &Connection, limit: i64) -> Result<Vec<ProcessedEntry>> {
    let mut stmt = conn
        .prepare(
            "SELECT file_path, original_profile, new_profile, el_type, file_size_bytes,
                    processed_at
             FROM processed_files ORDER BY processed_at DESC LIMIT ?1",
        )
        .map_err(|e| Error::database(e.to_string()))?;
    let rows = stmt
        .query_map([limit], ProcessedEntry::from_row)
        .map_err(|e| Error::database(e.to_string()))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(rows)
}

/// Remove one path from the processed list, allowing reprocessing.
pub fn clear_processed(conn: &Connection, file_path: &str) -> Result<bool> {
    let n = conn
        .execute(
            "DELETE FROM processed_files WHERE file_path = ?1",
            [file_path],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{get_conn, init_memory_pool};
    use crate::queries::failed;

    #[test]
    fn mark_then_check() {
        let pool = init_memory_pool().unwrap();
        let conn = get_conn(&pool).unwrap();

        assert!(!is_processed(&conn, "/movies/a.mkv").unwrap());
        mark_processed(&conn, "/movies/a.mkv", "7", "8", Some("MEL"), 1024).unwrap();
        assert!(is_processed(&conn, "/movies/a.mkv").unwrap());

        let listed = get_processed(&conn, 10).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].original_profile, "7");
        assert_eq!(listed[0].new_profile, "8");
    }

    #[test]
    fn marking_processed_clears_failure() {
        let pool = init_memory_pool().unwrap();
        let conn = get_conn(&pool).unwrap();

        failed::mark_failed(&conn, "/movies/a.mkv", "boom").unwrap();
        mark_processed(&conn, "/movies/a.mkv", "7", "8", None, 1).unwrap();
        assert!(failed::get_failed(&conn, 10).unwrap().is_empty());
    }

    #[test]
    fn clear_one() {
        let pool = init_memory_pool().unwrap();
        let conn = get_conn(&pool).unwrap();

        mark_processed(&conn, "/movies/a.mkv", "7", "8", None, 1).unwrap();
        assert!(clear_processed(&conn, "/movies/a.mkv").unwrap());
        assert!(!is_processed(&conn, "/movies/a.mkv").unwrap());
    }
}
