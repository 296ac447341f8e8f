//! Catalog-wide administration: statistics, factory reset, JSON export.

use rusqlite::Connection;
use serde_json::json;

use dovarr_core::{Error, Result};

use crate::models::CatalogStats;

/// Aggregate counters across all tables.
pub fn stats(conn: &Connection) -> Result<CatalogStats> {
    let count = |q: &str| -> Result<i64> {
        conn.query_row(q, [], |row| row.get(0))
            .map_err(|e| Error::database(e.to_string()))
    };

    Ok(CatalogStats {
        scanned_total: count("SELECT COUNT(*) FROM scanned_files")?,
        scanned_with_dovi: count("SELECT COUNT(*) FROM scanned_files WHERE has_dovi = 1")?,
        scanned_profile7: count("SELECT COUNT(*) FROM scanned_files WHERE dovi_profile = '7'")?,
        scanned_profile8: count("SELECT COUNT(*) FROM scanned_files WHERE dovi_profile = '8'")?,
        discovered: count(
            "SELECT COUNT(*) FROM discovered_files
             WHERE file_path NOT IN (SELECT file_path FROM processed_files)",
        )?,
        processed: count("SELECT COUNT(*) FROM processed_files")?,
        processed_bytes: count("SELECT COALESCE(SUM(file_size_bytes), 0) FROM processed_files")?,
        failed: count("SELECT COUNT(*) FROM failed_files")?,
    })
}

/// Factory reset: clear all record tables and drop the first-run flag so the
/// idle gate re-engages. Settings other than `initial_setup_complete` are
/// kept. Returns the number of records removed.
pub fn clear_database(conn: &Connection) -> Result<usize> {
    let mut total = 0usize;
    for table in [
        "processed_files",
        "failed_files",
        "discovered_files",
        "scanned_files",
        "current_conversion",
    ] {
        total += conn
            .execute(&format!("DELETE FROM {table}"), [])
            .map_err(|e| Error::database(e.to_string()))?;
    }

    conn.execute(
        "DELETE FROM settings WHERE key = 'initial_setup_complete'",
        [],
    )
    .map_err(|e| Error::database(e.to_string()))?;

    Ok(total)
}

/// Export the catalog as pretty-printed JSON for offline inspection.
pub fn export_json(conn: &Connection) -> Result<String> {
    let dump_table = |q: &str, cols: &[&str]| -> Result<Vec<serde_json::Value>> {
        let mut stmt = conn.prepare(q).map_err(|e| Error::database(e.to_string()))?;
        let rows = stmt
            .query_map([], |row| {
                let mut obj = serde_json::Map::new();
                for (i, col) in cols.iter().enumerate() {
                    let value: rusqlite::types::Value = row.get(i)?;
                    let json_value = match value {
                        rusqlite::types::Value::Null => serde_json::Value::Null,
                        rusqlite::types::Value::Integer(n) => json!(n),
                        rusqlite::types::Value::Real(f) => json!(f),
                        rusqlite::types::Value::Text(s) => json!(s),
                        rusqlite::types::Value::Blob(_) => serde_json::Value::Null,
                    };
                    obj.insert(col.to_string(), json_value);
                }
                Ok(serde_json::Value::Object(obj))
            })
            .map_err(|e| Error::database(e.to_string()))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::database(e.to_string()))?;
        Ok(rows)
    };

    let export = json!({
        "exported_at": chrono::Utc::now().to_rfc3339(),
        "processed_files": dump_table(
            "SELECT file_path, original_profile, new_profile, el_type, file_size_bytes, \
             processed_at FROM processed_files ORDER BY processed_at",
            &["file_path", "original_profile", "new_profile", "el_type", "file_size_bytes",
              "processed_at"],
        )?,
        "failed_files": dump_table(
            "SELECT file_path, error_message, failed_at, retry_count FROM failed_files \
             ORDER BY failed_at",
            &["file_path", "error_message", "failed_at", "retry_count"],
        )?,
        "discovered_files": dump_table(
            "SELECT file_path, title, el_type, discovered_at FROM discovered_files \
             ORDER BY discovered_at",
            &["file_path", "title", "el_type", "discovered_at"],
        )?,
        "settings": dump_table(
            "SELECT key, value FROM settings ORDER BY key",
            &["key", "value"],
        )?,
    });

    serde_json::to_string_pretty(&export).map_err(|e| Error::database(e.to_string()))
}
