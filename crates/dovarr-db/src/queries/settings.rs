//! Operator-tunable settings stored as key/value rows.

use std::collections::HashMap;

use rusqlite::Connection;

use dovarr_core::{Error, Result};

/// Gates the scheduler and restricts the scan roots: off, all, movies, shows.
pub const AUTO_PROCESS_MODE: &str = "auto_process_mode";
/// When false the conversion loop converts MEL entries only.
pub const AUTO_PROCESS_FEL: &str = "auto_process_fel";
/// When false the original is deleted after a successful swap.
pub const BACKUP_ENABLED: &str = "backup_enabled";
/// Minutes between delta scans.
pub const DELTA_SCAN_INTERVAL_MINUTES: &str = "delta_scan_interval_minutes";
/// Weekday for the full library scan (monday..sunday).
pub const FULL_SCAN_DAY: &str = "full_scan_day";
/// Local time for the full library scan, HH:MM.
pub const FULL_SCAN_TIME: &str = "full_scan_time";
/// Set once the operator has confirmed the first-run batch; gates the daemon.
pub const INITIAL_SETUP_COMPLETE: &str = "initial_setup_complete";

/// Default values seeded into a fresh catalog. `initial_setup_complete` is
/// deliberately absent: its absence is the first-run interlock.
pub const DEFAULTS: &[(&str, &str)] = &[
    (AUTO_PROCESS_MODE, "off"),
    (AUTO_PROCESS_FEL, "false"),
    (BACKUP_ENABLED, "true"),
    (DELTA_SCAN_INTERVAL_MINUTES, "30"),
    (FULL_SCAN_DAY, "sunday"),
    (FULL_SCAN_TIME, "03:00"),
];

/// Seed any missing default settings.
pub fn init_defaults(conn: &Connection) -> Result<()> {
    for (key, value) in DEFAULTS {
        conn.execute(
            "INSERT OR IGNORE INTO settings (key, value) VALUES (?1, ?2)",
            [key, value],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    }
    Ok(())
}

/// Get a setting value by key.
pub fn get_setting(conn: &Connection, key: &str) -> Result<Option<String>> {
    let result = conn.query_row("SELECT value FROM settings WHERE key = ?1", [key], |row| {
        row.get(0)
    });
    match result {
        Ok(value) => Ok(Some(value)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(Error::database(e.to_string())),
    }
}

/// Set a setting value (upsert).
pub fn set_setting(conn: &Connection, key: &str, value: &str) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO settings (key, value) VALUES (?1, ?2)",
        [key, value],
    )
    .map_err(|e| Error::database(e.to_string()))?;
    Ok(())
}

/// Get all settings as a map.
pub fn get_all_settings(conn: &Connection) -> Result<HashMap<String, String>> {
    let mut stmt = conn
        .prepare("SELECT key, value FROM settings ORDER BY key")
        .map_err(|e| Error::database(e.to_string()))?;
    let rows = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
        .map_err(|e| Error::database(e.to_string()))?
        .collect::<std::result::Result<HashMap<_, _>, _>>()
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(rows)
}

/// Whether the operator has completed the first-run confirmation.
pub fn initial_setup_complete(conn: &Connection) -> Result<bool> {
    Ok(get_setting(conn, INITIAL_SETUP_COMPLETE)?.as_deref() == Some("true"))
}

/// Mark first-run setup as complete, enabling the daemon's conversion loop.
pub fn mark_initial_setup_complete(conn: &Connection) -> Result<()> {
    set_setting(conn, INITIAL_SETUP_COMPLETE, "true")
}

/// Convenience: read a boolean-valued setting with a default.
pub fn get_bool(conn: &Connection, key: &str, default: bool) -> Result<bool> {
    Ok(get_setting(conn, key)?
        .map(|v| v == "true")
        .unwrap_or(default))
}

const WEEKDAYS: &[&str] = &[
    "monday",
    "tuesday",
    "wednesday",
    "thursday",
    "friday",
    "saturday",
    "sunday",
];

/// Validate a setting value before writing it.
///
/// Unknown keys are rejected so a typo cannot silently create a dead row.
pub fn validate_setting(key: &str, value: &str) -> Result<()> {
    let ok = match key {
        AUTO_PROCESS_MODE => matches!(value, "off" | "all" | "movies" | "shows"),
        AUTO_PROCESS_FEL | BACKUP_ENABLED | INITIAL_SETUP_COMPLETE => {
            matches!(value, "true" | "false")
        }
        DELTA_SCAN_INTERVAL_MINUTES => value
            .parse::<u32>()
            .map(|minutes| (1..=1440).contains(&minutes))
            .unwrap_or(false),
        FULL_SCAN_DAY => WEEKDAYS.contains(&value),
        FULL_SCAN_TIME => parse_hh_mm(value).is_some(),
        _ => {
            return Err(Error::Validation(format!("unknown setting: {key}")));
        }
    };

    if ok {
        Ok(())
    } else {
        Err(Error::Validation(format!(
            "invalid value for {key}: {value}"
        )))
    }
}

/// Parse a HH:MM (24h) time into (hour, minute).
pub fn parse_hh_mm(value: &str) -> Option<(u32, u32)> {
    let (hh, mm) = value.split_once(':')?;
    let hour: u32 = hh.parse().ok()?;
    let minute: u32 = mm.parse().ok()?;
    (hour <= 23 && minute <= 59).then_some((hour, minute))
}
