//! The daemon scheduler: two-cadence scans plus the single-slot conversion
//! loop.
//!
//! The decision loop is single-threaded; external tools are the only
//! parallelism. Policy settings are re-read from the catalog on every
//! conversion attempt, so an operator flipping `auto_process_mode` off halts
//! the loop after the in-flight file finishes, never mid-file.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Datelike, Local, Weekday};
use tokio_util::sync::CancellationToken;

use dovarr_analyze::Classifier;
use dovarr_av::tools::ToolRegistry;
use dovarr_av::workspace::clean_orphans;
use dovarr_convert::{ConvertOptions, Converter};
use dovarr_core::{AutoProcessMode, Config, Result};
use dovarr_db::queries::{current, discovered, failed, processed, settings};
use dovarr_db::{get_conn, DbPool};

use crate::monitor::Monitor;
use crate::notify::{spawn_notify, Event, Notifier};
use crate::scan;

/// How often the idle gate re-reads the catalog while waiting for setup.
const IDLE_GATE_POLL: Duration = Duration::from_secs(30);

/// Sleep between loop iterations when there is nothing to convert.
const IDLE_SLEEP: Duration = Duration::from_secs(60);

/// Extra minutes of history requested from import monitors, to absorb
/// clock skew between the daemon and the media manager.
const MONITOR_SLACK_MINUTES: i64 = 5;

/// Outcome of one conversion attempt.
enum Attempt {
    Converted { title: String, path: String },
    Skipped,
}

/// The daemon's main event loop.
pub struct Scheduler {
    config: Config,
    db: DbPool,
    classifier: Classifier,
    converter: Converter,
    notifier: Option<Arc<Notifier>>,
    monitors: Vec<Box<dyn Monitor>>,
    cancel: CancellationToken,
    last_delta_scan: Option<DateTime<Local>>,
    last_full_scan_date: Option<String>,
}

impl Scheduler {
    pub fn new(
        config: Config,
        db: DbPool,
        tools: Arc<ToolRegistry>,
        notifier: Option<Arc<Notifier>>,
        monitors: Vec<Box<dyn Monitor>>,
        cancel: CancellationToken,
    ) -> Self {
        let classifier = Classifier::new(Arc::clone(&tools), config.temp_dir.clone());
        let converter = Converter::new(tools, config.temp_dir.clone());
        Self {
            config,
            db,
            classifier,
            converter,
            notifier,
            monitors,
            cancel,
            last_delta_scan: None,
            last_full_scan_date: None,
        }
    }

    /// Run until the cancellation token fires.
    pub async fn run(&mut self) -> Result<()> {
        if !self.idle_gate().await? {
            return Ok(());
        }

        // A marker left by a crash describes a conversion that is no longer
        // running.
        {
            let conn = get_conn(&self.db)?;
            if let Some(stale) = current::get_current_conversion(&conn)? {
                tracing::warn!(
                    "clearing stale in-flight marker for {} (started {})",
                    stale.file_path,
                    stale.started_at
                );
            }
            current::clear_current_conversion(&conn)?;
        }

        let cleaned = clean_orphans(&self.config.temp_dir);
        if cleaned > 0 {
            tracing::info!("cleaned up {cleaned} orphaned scratch entries");
        }

        spawn_notify(self.notifier.clone(), Event::Startup);
        tracing::info!("daemon started");

        while !self.cancel.is_cancelled() {
            if let Err(e) = self.run_due_scans().await {
                tracing::error!("scan error: {e}");
            }

            match self.try_convert_next().await {
                Ok(true) => {
                    // Re-check the queue immediately so back-to-back
                    // candidates convert without idle gaps.
                    continue;
                }
                Ok(false) => {}
                Err(e) => {
                    tracing::error!("conversion loop error: {e}");
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(IDLE_SLEEP) => {}
                _ = self.cancel.cancelled() => {}
            }
        }

        let conn = get_conn(&self.db)?;
        current::clear_current_conversion(&conn)?;
        drop(conn);

        if let Some(notifier) = &self.notifier {
            notifier.notify(Event::Shutdown).await;
        }
        tracing::info!("daemon stopped");
        Ok(())
    }

    /// First-run interlock: with setup incomplete, idle until the operator
    /// turns `auto_process_mode` on. Returns false when cancelled while
    /// gated.
    async fn idle_gate(&self) -> Result<bool> {
        {
            let conn = get_conn(&self.db)?;
            if settings::initial_setup_complete(&conn)? {
                return Ok(true);
            }
        }

        tracing::warn!("initial setup is not complete; scans and conversions are disabled");
        tracing::warn!(
            "run `dovarr scan --limit 50` to verify detection, then \
             `dovarr settings set auto_process_mode all` to enable"
        );

        loop {
            if self.cancel.is_cancelled() {
                return Ok(false);
            }

            let mode = {
                let conn = get_conn(&self.db)?;
                read_auto_mode(&conn)?
            };
            if mode != AutoProcessMode::Off {
                tracing::info!("auto-processing enabled; leaving idle gate");
                return Ok(true);
            }

            tokio::select! {
                _ = tokio::time::sleep(IDLE_GATE_POLL) => {}
                _ = self.cancel.cancelled() => {}
            }
        }
    }

    /// Run the full scan when its weekly slot has arrived, otherwise a delta
    /// scan when the interval has elapsed.
    async fn run_due_scans(&mut self) -> Result<()> {
        let now = Local::now();
        let (mode, full_day, full_time, delta_minutes) = {
            let conn = get_conn(&self.db)?;
            (
                read_auto_mode(&conn)?,
                settings::get_setting(&conn, settings::FULL_SCAN_DAY)?
                    .unwrap_or_else(|| "sunday".to_string()),
                settings::get_setting(&conn, settings::FULL_SCAN_TIME)?
                    .unwrap_or_else(|| "03:00".to_string()),
                settings::get_setting(&conn, settings::DELTA_SCAN_INTERVAL_MINUTES)?
                    .and_then(|v| v.parse::<i64>().ok())
                    .unwrap_or(30),
            )
        };

        if mode == AutoProcessMode::Off {
            return Ok(());
        }
        let roots = scan::scan_roots(mode, &self.config);
        if roots.is_empty() {
            return Ok(());
        }

        if full_scan_due(
            now,
            &full_day,
            &full_time,
            self.last_full_scan_date.as_deref(),
        ) {
            tracing::info!("starting scheduled full library scan");
            scan::full_scan(&self.db, &self.classifier, &roots, None, &self.cancel).await?;
            self.last_full_scan_date = Some(now.format("%Y-%m-%d").to_string());
        } else if delta_scan_due(now, self.last_delta_scan, delta_minutes) {
            self.poll_monitors(delta_minutes + MONITOR_SLACK_MINUTES)
                .await;
            tracing::info!("starting scheduled delta scan");
            scan::delta_scan(&self.db, &self.classifier, &roots, None, &self.cancel).await?;
            self.last_delta_scan = Some(now);
        }

        Ok(())
    }

    /// Classify files the media managers imported since the last delta scan,
    /// ahead of the tree walk.
    async fn poll_monitors(&self, since_minutes: i64) {
        for monitor in &self.monitors {
            let imports = match monitor.recent_imports(since_minutes).await {
                Ok(imports) => imports,
                Err(e) => {
                    tracing::warn!("{} polling failed: {e}", monitor.name());
                    continue;
                }
            };

            for import in imports {
                if self.cancel.is_cancelled() {
                    return;
                }
                if !import.path.exists() {
                    continue;
                }
                let already = {
                    let Ok(conn) = get_conn(&self.db) else { continue };
                    dovarr_db::queries::scanned::is_scanned(
                        &conn,
                        &import.path.to_string_lossy(),
                    )
                    .unwrap_or(false)
                };
                if already {
                    continue;
                }

                tracing::info!(
                    "classifying recent {} import: {}",
                    monitor.name(),
                    import.title
                );
                if let Err(e) =
                    scan::classify_and_record(&self.db, &self.classifier, &import.path).await
                {
                    tracing::debug!("error analyzing {}: {e}", import.path.display());
                }
            }
        }
    }

    /// Attempt one conversion. Returns Ok(true) when the loop should spin
    /// again immediately (a candidate was handled, even if only by pruning).
    async fn try_convert_next(&self) -> Result<bool> {
        let candidate = {
            let conn = get_conn(&self.db)?;
            let mode = read_auto_mode(&conn)?;
            if mode == AutoProcessMode::Off {
                return Ok(false);
            }
            let include_fel = settings::get_bool(&conn, settings::AUTO_PROCESS_FEL, false)?;
            discovered::next_candidate(&conn, include_fel)?
        };

        let Some(candidate) = candidate else {
            return Ok(false);
        };

        let path = PathBuf::from(&candidate.file_path);
        if !path.exists() {
            tracing::warn!("discovered file no longer exists: {}", candidate.file_path);
            let conn = get_conn(&self.db)?;
            discovered::remove_discovered(&conn, &candidate.file_path)?;
            return Ok(true);
        }

        {
            let conn = get_conn(&self.db)?;
            current::set_current_conversion(&conn, &candidate.file_path, &candidate.title)?;
        }

        let started = Instant::now();
        let result = self.process_candidate(&path).await;

        {
            let conn = get_conn(&self.db)?;
            current::clear_current_conversion(&conn)?;
        }

        match result {
            Ok(Attempt::Converted { title, path }) => {
                spawn_notify(
                    self.notifier.clone(),
                    Event::ConversionSuccess {
                        path,
                        title,
                        duration_secs: started.elapsed().as_secs(),
                    },
                );
            }
            Ok(Attempt::Skipped) => {}
            Err(e) => {
                tracing::error!("conversion failed for {}: {e}", candidate.file_path);
                if e.is_recordable_failure() {
                    let conn = get_conn(&self.db)?;
                    failed::mark_failed(&conn, &candidate.file_path, &e.to_string())?;
                }
                spawn_notify(
                    self.notifier.clone(),
                    Event::ConversionFailed {
                        path: candidate.file_path.clone(),
                        title: candidate.title.clone(),
                        error: e.to_string(),
                    },
                );
            }
        }

        Ok(true)
    }

    /// classify -> convert -> mark processed, strictly in that order.
    async fn process_candidate(&self, path: &Path) -> Result<Attempt> {
        let path_str = path.to_string_lossy().into_owned();

        let verdict = self.classifier.classify(path).await?;
        scan::record_verdict(&self.db, &verdict)?;

        if !verdict.needs_conversion() {
            tracing::info!("no longer needs conversion, dequeuing: {path_str}");
            let conn = get_conn(&self.db)?;
            discovered::remove_discovered(&conn, &path_str)?;
            return Ok(Attempt::Skipped);
        }

        if !verdict.safe_to_auto_convert() {
            // Fresh classification downgraded the enhancement layer; refresh
            // the queue entry so it waits for a manual forced conversion.
            tracing::warn!(
                "{path_str} re-classified as {}; holding for manual conversion",
                verdict.el_type.map(|el| el.label()).unwrap_or("UNKNOWN")
            );
            let conn = get_conn(&self.db)?;
            let title = title_of(path);
            discovered::remove_discovered(&conn, &path_str)?;
            discovered::add_discovered(&conn, &path_str, &title, verdict.el_type_label())?;
            return Ok(Attempt::Skipped);
        }

        // The backup policy is taken as of the swap, not as of enqueue.
        let backup_enabled = {
            let conn = get_conn(&self.db)?;
            settings::get_bool(&conn, settings::BACKUP_ENABLED, true)?
        };

        tracing::info!("converting {path_str}");
        let outcome = self
            .converter
            .convert_to_p8(&verdict, &ConvertOptions::default(), backup_enabled)
            .await?;

        let conn = get_conn(&self.db)?;
        processed::mark_processed(
            &conn,
            &path_str,
            "7",
            "8",
            verdict.el_type_label(),
            verdict.file_size as i64,
        )?;
        discovered::remove_discovered(&conn, &path_str)?;

        tracing::info!(
            "processed {path_str}: {} frames verified{}",
            outcome.frame_count,
            if outcome.backup.is_some() {
                ", backup retained"
            } else {
                ""
            }
        );

        Ok(Attempt::Converted {
            title: title_of(path),
            path: path_str,
        })
    }
}

fn title_of(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

fn read_auto_mode(conn: &dovarr_db::PooledConnection) -> Result<AutoProcessMode> {
    let value = settings::get_setting(conn, settings::AUTO_PROCESS_MODE)?;
    Ok(AutoProcessMode::parse(value.as_deref().unwrap_or("off")))
}

/// A full scan is due on the configured weekday, at or past the configured
/// time, at most once per day.
fn full_scan_due(
    now: DateTime<Local>,
    day: &str,
    time: &str,
    last_full_date: Option<&str>,
) -> bool {
    if weekday_name(now.weekday()) != day.to_lowercase() {
        return false;
    }

    let (hour, minute) = settings::parse_hh_mm(time).unwrap_or((3, 0));
    let past_slot = {
        use chrono::Timelike;
        (now.hour(), now.minute()) >= (hour, minute)
    };
    if !past_slot {
        return false;
    }

    let today = now.format("%Y-%m-%d").to_string();
    last_full_date != Some(today.as_str())
}

/// A delta scan is due when none has run yet or the interval has elapsed.
fn delta_scan_due(
    now: DateTime<Local>,
    last: Option<DateTime<Local>>,
    interval_minutes: i64,
) -> bool {
    match last {
        None => true,
        Some(last) => now.signed_duration_since(last).num_minutes() >= interval_minutes,
    }
}

fn weekday_name(weekday: Weekday) -> &'static str {
    match weekday {
        Weekday::Mon => "monday",
        Weekday::Tue => "tuesday",
        Weekday::Wed => "wednesday",
        Weekday::Thu => "thursday",
        Weekday::Fri => "friday",
        Weekday::Sat => "saturday",
        Weekday::Sun => "sunday",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn local(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn full_scan_waits_for_day_and_time() {
        // 2024-03-10 is a Sunday.
        let sunday_2am = local(2024, 3, 10, 2, 0);
        let sunday_3am = local(2024, 3, 10, 3, 0);
        let monday_3am = local(2024, 3, 11, 3, 0);

        assert!(!full_scan_due(sunday_2am, "sunday", "03:00", None));
        assert!(full_scan_due(sunday_3am, "sunday", "03:00", None));
        assert!(!full_scan_due(monday_3am, "sunday", "03:00", None));
    }

    #[test]
    fn full_scan_runs_once_per_day() {
        let sunday_4am = local(2024, 3, 10, 4, 0);
        assert!(full_scan_due(sunday_4am, "sunday", "03:00", Some("2024-03-03")));
        assert!(!full_scan_due(sunday_4am, "sunday", "03:00", Some("2024-03-10")));
    }

    #[test]
    fn unparseable_time_falls_back_to_3am() {
        let sunday_2am = local(2024, 3, 10, 2, 59);
        let sunday_3am = local(2024, 3, 10, 3, 0);
        assert!(!full_scan_due(sunday_2am, "sunday", "bogus", None));
        assert!(full_scan_due(sunday_3am, "sunday", "bogus", None));
    }

    #[test]
    fn delta_scan_interval() {
        let now = local(2024, 3, 10, 12, 0);
        assert!(delta_scan_due(now, None, 30));
        assert!(delta_scan_due(now, Some(local(2024, 3, 10, 11, 30)), 30));
        assert!(!delta_scan_due(now, Some(local(2024, 3, 10, 11, 45)), 30));
    }
}
