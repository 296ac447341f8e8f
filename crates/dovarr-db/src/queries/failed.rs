//! Failed conversion attempts. Upserts increment the retry counter; failed
//! rows are never re-queued automatically.

use chrono::Utc;
use rusqlite::Connection;

use dovarr_core::{Error, Result};

use crate::models::FailedEntry;

/// Record a failure. Increments retry_count when the path already failed.
pub fn mark_failed(conn: &Connection, file_path: &str, error_message: &str) -> Result<()> {
    let now = Utc::now().to_rfc3339();
    let n = conn
        .execute(
            "UPDATE failed_files
             SET error_message = ?1, failed_at = ?2, retry_count = retry_count + 1
             WHERE file_path = ?3",
            rusqlite::params![error_message, now, file_path],
        )
        .map_err(|e| Error::database(e.to_string()))?;

    if n == 0 {
        conn.execute(
            "INSERT INTO failed_files (file_path, error_message, failed_at) VALUES (?1, ?2, ?3)",
            rusqlite::params![file_path, error_message, now],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    }

    Ok(())
}

/// Fetch the failure record for one path, if any.
pub fn get_failure(conn: &Connection, file_path: &str) -> Result<Option<FailedEntry>> {
    let result = conn.query_row(
        "SELECT file_path, error_message, failed_at, retry_count
         FROM failed_files WHERE file_path = ?1",
        [file_path],
        FailedEntry::from_row,
    );
    match result {
        Ok(entry) => Ok(Some(entry)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(Error::database(e.to_string())),
    }
}

/// List failures, most recent first.
pub fn get_failed(conn: &Connection, limit: i64) -> Result<Vec<FailedEntry>> {
    let mut stmt = conn
        .prepare(
            "SELECT file_path, error_message, failed_at, retry_count
             FROM failed_files ORDER BY failed_at DESC LIMIT ?1",
        )
        .map_err(|e| Error::database(e.to_string()))?;
    let rows = stmt
        .query_map([limit], FailedEntry::from_row)
        .map_err(|e| Error::database(e.to_string()))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(rows)
}

/// Clear failures. With a path, clears that row; otherwise clears all.
/// Returns the number of rows removed.
pub fn clear_failed(conn: &Connection, file_path: Option<&str>) -> Result<usize> {
    let n = match file_path {
        Some(path) => conn
            .execute("DELETE FROM failed_files WHERE file_path = ?1", [path])
            .map_err(|e| Error::database(e.to_string()))?,
        None => conn
            .execute("DELETE FROM failed_files", [])
            .map_err(|e| Error::database(e.to_string()))?,
    };
    Ok(n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{get_conn, init_memory_pool};

    #[test]
    fn retry_count_increments() {
        let pool = init_memory_pool().unwrap();
        let conn = get_conn(&pool).unwrap();

        mark_failed(&conn, "/movies/a.mkv", "first").unwrap();
        mark_failed(&conn, "/movies/a.mkv", "second").unwrap();

        let entry = get_failure(&conn, "/movies/a.mkv").unwrap().unwrap();
        assert_eq!(entry.retry_count, 1);
        assert_eq!(entry.error_message, "second");
    }

    #[test]
    fn clear_single_and_all() {
        let pool = init_memory_pool().unwrap();
        let conn = get_conn(&pool).unwrap();

        mark_failed(&conn, "/movies/a.mkv", "x").unwrap();
        mark_failed(&conn, "/movies/b.mkv", "y").unwrap();

        assert_eq!(clear_failed(&conn, Some("/movies/a.mkv")).unwrap(), 1);
        assert_eq!(clear_failed(&conn, None).unwrap(), 1);
        assert!(get_failed(&conn, 10).unwrap().is_empty());
    }
}
