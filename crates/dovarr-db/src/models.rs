//! Typed rows for the catalog tables.

use rusqlite::Row;
use serde::Serialize;

/// Record of a classified file (`scanned_files` row).
#[derive(Debug, Clone, Serialize)]
pub struct ScanRecord {
    pub file_path: String,
    pub has_dovi: bool,
    pub dovi_profile: Option<String>,
    pub el_type: Option<String>,
    pub file_size_bytes: i64,
    pub scanned_at: String,
}

impl ScanRecord {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            file_path: row.get("file_path")?,
            has_dovi: row.get("has_dovi")?,
            dovi_profile: row.get("dovi_profile")?,
            el_type: row.get("el_type")?,
            file_size_bytes: row.get("file_size_bytes")?,
            scanned_at: row.get("scanned_at")?,
        })
    }
}

/// A Profile 7 file awaiting conversion (`discovered_files` row).
#[derive(Debug, Clone, Serialize)]
pub struct DiscoveredEntry {
    pub file_path: String,
    pub title: String,
    pub el_type: Option<String>,
    pub discovered_at: String,
}

impl DiscoveredEntry {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            file_path: row.get("file_path")?,
            title: row.get("title")?,
            el_type: row.get("el_type")?,
            discovered_at: row.get("discovered_at")?,
        })
    }
}

/// A successfully converted file (`processed_files` row).
#[derive(Debug, Clone, Serialize)]
pub struct ProcessedEntry {
    pub file_path: String,
    pub original_profile: String,
    pub new_profile: String,
    pub el_type: Option<String>,
    pub file_size_bytes: i64,
    pub processed_at: String,
}

impl ProcessedEntry {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            file_path: row.get("file_path")?,
            original_profile: row.get("original_profile")?,
            new_profile: row.get("new_profile")?,
            el_type: row.get("el_type")?,
            file_size_bytes: row.get("file_size_bytes")?,
            processed_at: row.get("processed_at")?,
        })
    }
}

/// A failed conversion attempt (`failed_files` row).
#[derive(Debug, Clone, Serialize)]
pub struct FailedEntry {
    pub file_path: String,
    pub error_message: String,
    pub failed_at: String,
    pub retry_count: i64,
}

impl FailedEntry {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            file_path: row.get("file_path")?,
            error_message: row.get("error_message")?,
            failed_at: row.get("failed_at")?,
            retry_count: row.get("retry_count")?,
        })
    }
}

/// The conversion currently in flight (`current_conversion` singleton).
#[derive(Debug, Clone, Serialize)]
pub struct InFlightMarker {
    pub file_path: String,
    pub title: String,
    pub started_at: String,
}

impl InFlightMarker {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            file_path: row.get("file_path")?,
            title: row.get("title")?,
            started_at: row.get("started_at")?,
        })
    }
}

/// Aggregate counters for `dovarr status`.
#[derive(Debug, Clone, Serialize)]
pub struct CatalogStats {
    pub scanned_total: i64,
    pub scanned_with_dovi: i64,
    pub scanned_profile7: i64,
    pub scanned_profile8: i64,
    pub discovered: i64,
    pub processed: i64,
    pub processed_bytes: i64,
    pub failed: i64,
}
