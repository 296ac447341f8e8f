//! The in-flight conversion marker: a singleton row used for crash-recovery
//! diagnostics and live status display.

use chrono::Utc;
use rusqlite::Connection;

use dovarr_core::{Error, Result};

use crate::models::InFlightMarker;

/// Mark a file as currently being converted, replacing any previous marker.
pub fn set_current_conversion(conn: &Connection, file_path: &str, title: &str) -> Result<()> {
    conn.execute("DELETE FROM current_conversion", [])
        .map_err(|e| Error::database(e.to_string()))?;
    conn.execute(
        "INSERT INTO current_conversion (id, file_path, title, started_at)
         VALUES (1, ?1, ?2, ?3)",
        rusqlite::params![file_path, title, Utc::now().to_rfc3339()],
    )
    .map_err(|e| Error::database(e.to_string()))?;
    Ok(())
}

/// Clear the in-flight marker.
pub fn clear_current_conversion(conn: &Connection) -> Result<()> {
    conn.execute("DELETE FROM current_conversion", [])
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(())
}

/// Fetch the in-flight marker, if a conversion is running (or was running
/// when the process died).
pub fn get_current_conversion(conn: &Connection) -> Result<Option<InFlightMarker>> {
    let result = conn.query_row(
        "SELECT file_path, title, started_at FROM current_conversion WHERE id = 1",
        [],
        InFlightMarker::from_row,
    );
    match result {
        Ok(marker) => Ok(Some(marker)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(Error::database(e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{get_conn, init_memory_pool};

    #[test]
    fn singleton_replaces() {
        let pool = init_memory_pool().unwrap();
        let conn = get_conn(&pool).unwrap();

        set_current_conversion(&conn, "/movies/a.mkv", "a").unwrap();
        set_current_conversion(&conn, "/movies/b.mkv", "b").unwrap();

        let marker = get_current_conversion(&conn).unwrap().unwrap();
        assert_eq!(marker.file_path, "/movies/b.mkv");

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM current_conversion", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn clear_removes_marker() {
        let pool = init_memory_pool().unwrap();
        let conn = get_conn(&pool).unwrap();

        set_current_conversion(&conn, "/movies/a.mkv", "a").unwrap();
        clear_current_conversion(&conn).unwrap();
        assert!(get_current_conversion(&conn).unwrap().is_none());
    }
}
