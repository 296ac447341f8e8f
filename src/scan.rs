//! The two-cadence scan engine.
//!
//! Delta scans classify only paths the catalog has never seen; full scans
//! re-inspect everything and upsert. Both record a scanned row per file and
//! queue Profile 7 verdicts for conversion, honoring the invariant that a
//! processed path is never re-queued.

use std::path::{Path, PathBuf};

use tokio_util::sync::CancellationToken;
use walkdir::WalkDir;

use dovarr_analyze::{describe_verdict, Classifier};
use dovarr_core::{AutoProcessMode, Config, Error, FileVerdict, Result};
use dovarr_db::queries::{discovered, processed, scanned};
use dovarr_db::{get_conn, DbPool};

/// Counters reported at the end of a scan.
#[derive(Debug, Default, Clone, Copy)]
pub struct ScanOutcome {
    pub scanned: usize,
    pub profile7: usize,
    pub skipped: usize,
    pub errors: usize,
}

/// The library roots a given auto-process mode covers. Unmounted roots are
/// dropped silently.
pub fn scan_roots(mode: AutoProcessMode, config: &Config) -> Vec<PathBuf> {
    let candidates: &[&Path] = match mode {
        AutoProcessMode::All => &[&config.movies_dir, &config.tv_dir],
        AutoProcessMode::Movies => &[&config.movies_dir],
        AutoProcessMode::Shows => &[&config.tv_dir],
        AutoProcessMode::Off => &[],
    };

    candidates
        .iter()
        .filter(|root| root.exists())
        .map(|root| root.to_path_buf())
        .collect()
}

/// Enumerate every `.mkv` under a root, depth-first.
pub fn find_mkvs(root: &Path) -> Vec<PathBuf> {
    WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| {
            path.extension()
                .map(|ext| ext.eq_ignore_ascii_case("mkv"))
                .unwrap_or(false)
        })
        .collect()
}

/// Delta scan: classify paths not yet in the scanned table.
pub async fn delta_scan(
    db: &DbPool,
    classifier: &Classifier,
    roots: &[PathBuf],
    limit: Option<usize>,
    cancel: &CancellationToken,
) -> Result<ScanOutcome> {
    scan_impl(db, classifier, roots, limit, cancel, false).await
}

/// Full scan: re-classify everything, upserting the scanned rows.
pub async fn full_scan(
    db: &DbPool,
    classifier: &Classifier,
    roots: &[PathBuf],
    limit: Option<usize>,
    cancel: &CancellationToken,
) -> Result<ScanOutcome> {
    scan_impl(db, classifier, roots, limit, cancel, true).await
}

async fn scan_impl(
    db: &DbPool,
    classifier: &Classifier,
    roots: &[PathBuf],
    limit: Option<usize>,
    cancel: &CancellationToken,
    full: bool,
) -> Result<ScanOutcome> {
    let skip_set = if full {
        Default::default()
    } else {
        let conn = get_conn(db)?;
        scanned::all_scanned_paths(&conn)?
    };

    let mut outcome = ScanOutcome::default();

    'roots: for root in roots {
        tracing::info!("scanning {}", root.display());
        for path in find_mkvs(root) {
            if cancel.is_cancelled() {
                tracing::info!("scan interrupted");
                break 'roots;
            }
            if let Some(limit) = limit {
                if outcome.scanned >= limit {
                    tracing::info!("reached scan limit of {limit} files");
                    break 'roots;
                }
            }

            let path_str = path.to_string_lossy().into_owned();
            if !full && skip_set.contains(&path_str) {
                outcome.skipped += 1;
                continue;
            }

            match classify_and_record(db, classifier, &path).await {
                Ok(found_p7) => {
                    outcome.scanned += 1;
                    if found_p7 {
                        outcome.profile7 += 1;
                    }
                }
                Err(e) => {
                    outcome.errors += 1;
                    tracing::debug!("error analyzing {}: {e}", path.display());
                }
            }
        }
    }

    tracing::info!(
        "scan complete: {} classified, {} Profile 7, {} skipped, {} errors",
        outcome.scanned,
        outcome.profile7,
        outcome.skipped,
        outcome.errors
    );
    Ok(outcome)
}

/// Classify one file, record its scanned row, and queue it when it needs
/// conversion. Returns whether a Profile 7 verdict was recorded.
pub async fn classify_and_record(
    db: &DbPool,
    classifier: &Classifier,
    path: &Path,
) -> Result<bool> {
    let path_str = path.to_string_lossy().into_owned();

    let verdict = match classifier.classify(path).await {
        Ok(verdict) => verdict,
        Err(Error::Probe(message)) => {
            // Record the probe failure with a null profile so the next delta
            // scan does not pay for this file again.
            let size = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
            let conn = get_conn(db)?;
            scanned::add_scanned(&conn, &path_str, false, None, None, size as i64)?;
            return Err(Error::Probe(message));
        }
        Err(e) => return Err(e),
    };

    record_verdict(db, &verdict)
}

/// Record an already-computed verdict (also used by the conversion loop's
/// re-classification and by recent-import handling).
pub fn record_verdict(db: &DbPool, verdict: &FileVerdict) -> Result<bool> {
    let conn = get_conn(db)?;
    let path_str = verdict.path.to_string_lossy().into_owned();

    scanned::add_scanned(
        &conn,
        &path_str,
        verdict.has_dovi,
        verdict.profile_label(),
        verdict.el_type_label(),
        verdict.file_size as i64,
    )?;

    if verdict.needs_conversion() && !processed::is_processed(&conn, &path_str)? {
        let title = verdict
            .path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| path_str.clone());
        if discovered::add_discovered(&conn, &path_str, &title, verdict.el_type_label())? {
            tracing::info!(
                "found Profile 7: {} ({})",
                verdict.path.display(),
                describe_verdict(verdict)
            );
        }
        return Ok(true);
    }

    Ok(verdict.needs_conversion())
}

#[cfg(test)]
mod tests {
    use super::*;
    use dovarr_core::{DoViProfile, ELType, HdrFormat};
    use dovarr_db::init_memory_pool;

    fn verdict(path: &str, profile: Option<DoViProfile>, el: Option<ELType>) -> FileVerdict {
        FileVerdict {
            path: PathBuf::from(path),
            has_dovi: profile.is_some(),
            profile,
            el_type: el,
            video_codec: Some("HEVC".into()),
            hdr_format: HdrFormat::DolbyVision,
            file_size: 10,
            is_mkv: true,
            default_peak_used: false,
        }
    }

    #[test]
    fn profile7_verdict_is_discovered() {
        let db = init_memory_pool().unwrap();
        let v = verdict("/m/a.mkv", Some(DoViProfile::Profile7), Some(ELType::Mel));
        assert!(record_verdict(&db, &v).unwrap());

        let conn = get_conn(&db).unwrap();
        assert!(scanned::is_scanned(&conn, "/m/a.mkv").unwrap());
        let listed = discovered::get_discovered(&conn).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].title, "a");
        assert_eq!(listed[0].el_type.as_deref(), Some("MEL"));
    }

    #[test]
    fn processed_paths_are_never_requeued() {
        let db = init_memory_pool().unwrap();
        let conn = get_conn(&db).unwrap();
        processed::mark_processed(&conn, "/m/a.mkv", "7", "8", Some("MEL"), 10).unwrap();
        drop(conn);

        let v = verdict("/m/a.mkv", Some(DoViProfile::Profile7), Some(ELType::Mel));
        record_verdict(&db, &v).unwrap();

        let conn = get_conn(&db).unwrap();
        assert!(discovered::get_discovered(&conn).unwrap().is_empty());
    }

    #[test]
    fn non_dovi_verdict_only_records_scanned() {
        let db = init_memory_pool().unwrap();
        let v = verdict("/m/plain.mkv", None, None);
        assert!(!record_verdict(&db, &v).unwrap());

        let conn = get_conn(&db).unwrap();
        assert!(scanned::is_scanned(&conn, "/m/plain.mkv").unwrap());
        assert!(discovered::get_discovered(&conn).unwrap().is_empty());
    }

    #[test]
    fn roots_follow_mode() {
        let movies = tempfile::tempdir().unwrap();
        let tv = tempfile::tempdir().unwrap();
        let config = Config {
            movies_dir: movies.path().to_path_buf(),
            tv_dir: tv.path().to_path_buf(),
            ..Config::default()
        };

        assert_eq!(scan_roots(AutoProcessMode::All, &config).len(), 2);
        assert_eq!(
            scan_roots(AutoProcessMode::Movies, &config),
            vec![movies.path().to_path_buf()]
        );
        assert_eq!(
            scan_roots(AutoProcessMode::Shows, &config),
            vec![tv.path().to_path_buf()]
        );
        assert!(scan_roots(AutoProcessMode::Off, &config).is_empty());
    }

    #[test]
    fn unmounted_roots_are_skipped() {
        let movies = tempfile::tempdir().unwrap();
        let config = Config {
            movies_dir: movies.path().to_path_buf(),
            tv_dir: PathBuf::from("/nonexistent-tv-root"),
            ..Config::default()
        };
        assert_eq!(
            scan_roots(AutoProcessMode::All, &config),
            vec![movies.path().to_path_buf()]
        );
    }

    #[test]
    fn mkv_enumeration_filters_extension() {
        let root = tempfile::tempdir().unwrap();
        let sub = root.path().join("Film (2020)");
        std::fs::create_dir(&sub).unwrap();
        std::fs::write(sub.join("film.mkv"), b"x").unwrap();
        std::fs::write(sub.join("film.MKV"), b"x").unwrap();
        std::fs::write(sub.join("film.mp4"), b"x").unwrap();
        std::fs::write(root.path().join("notes.txt"), b"x").unwrap();

        let found = find_mkvs(root.path());
        assert_eq!(found.len(), 2);
        assert!(found.iter().all(|p| {
            p.extension()
                .map(|e| e.eq_ignore_ascii_case("mkv"))
                .unwrap_or(false)
        }));
    }
}
