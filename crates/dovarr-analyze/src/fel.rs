//! FEL complexity probing.
//!
//! Decides whether a Full Enhancement Layer carries active brightness
//! expansion beyond the base layer. Samples one second of the bitstream at
//! ten evenly distributed timestamps and compares each sample's Level-1
//! `max_pq` peak against the base-layer peak plus a margin. Expansion
//! anywhere means a single-layer Profile 8 stream cannot reproduce the
//! image, so the file is held back from automatic conversion.

use std::path::{Path, PathBuf};

use dovarr_core::{ELType, Result};
use dovarr_av::extract::extract_annexb_window;
use dovarr_av::tools::ToolRegistry;
use dovarr_av::workspace::scratch_file;

use crate::pq::pq_to_nits;
use crate::rpu;

/// Base-layer peak assumed when MaxCLL is absent or implausible.
pub const DEFAULT_BASE_PEAK_NITS: u32 = 1000;

/// MaxCLL values below this are treated as untagged.
pub const MIN_PLAUSIBLE_PEAK_NITS: u32 = 100;

/// Headroom above the base-layer peak before expansion counts as active.
pub const PEAK_MARGIN_NITS: u32 = 50;

/// Files shorter than this get a single probe at t=0.
pub const SHORT_DURATION_MS: u64 = 10_000;

/// Result of the complexity probe.
#[derive(Debug, Clone)]
pub struct FelAssessment {
    pub el_type: ELType,
    pub reason: String,
    pub base_peak_nits: u32,
    pub default_peak_used: bool,
    pub probes_total: usize,
    pub probes_parsed: usize,
}

/// What one probe sample yielded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleOutcome {
    /// The RPU dump carried a MEL marker; the whole file is MEL.
    Mel,
    /// Peak Level-1 PQ code observed in the sample.
    MaxPq(u16),
    /// Extraction or parsing failed, or the dump carried no luminance data.
    NoData,
}

/// Resolve the base-layer peak from MaxCLL, falling back to the default.
/// Returns the peak and whether the default was used.
pub fn base_peak_nits(max_cll: Option<u32>) -> (u32, bool) {
    match max_cll {
        Some(nits) if nits >= MIN_PLAUSIBLE_PEAK_NITS => (nits, false),
        _ => (DEFAULT_BASE_PEAK_NITS, true),
    }
}

/// Probe timestamps in milliseconds: t=0 for short files, otherwise the
/// 5%, 15%, ..., 95% marks of the duration.
pub fn probe_timestamps_ms(duration_ms: u64) -> Vec<u64> {
    if duration_ms < SHORT_DURATION_MS {
        return vec![0];
    }
    (0..10).map(|i| duration_ms * (5 + 10 * i) / 100).collect()
}

/// Run the complexity probe against a Profile 7 file with a FEL.
pub async fn assess_fel(
    tools: &ToolRegistry,
    path: &Path,
    temp_dir: &Path,
    duration_ms: u64,
    max_cll: Option<u32>,
) -> Result<FelAssessment> {
    let (base_peak, default_used) = base_peak_nits(max_cll);
    let threshold = base_peak + PEAK_MARGIN_NITS;
    let timestamps = probe_timestamps_ms(duration_ms);
    let total = timestamps.len();

    let assessment = |el_type: ELType, reason: String, parsed: usize| FelAssessment {
        el_type,
        reason,
        base_peak_nits: base_peak,
        default_peak_used: default_used,
        probes_total: total,
        probes_parsed: parsed,
    };

    let mut parsed = 0usize;
    for (index, t_ms) in timestamps.iter().enumerate() {
        let outcome = probe_sample(tools, path, temp_dir, *t_ms).await;
        tracing::debug!(
            "FEL probe {}/{} at {}ms: {:?}",
            index + 1,
            total,
            t_ms,
            outcome
        );

        match outcome {
            SampleOutcome::Mel => {
                return Ok(assessment(
                    ELType::Mel,
                    "RPU reports MEL".to_string(),
                    parsed + 1,
                ));
            }
            SampleOutcome::MaxPq(code) => {
                parsed += 1;
                let nits = pq_to_nits(code);
                if nits > threshold {
                    return Ok(assessment(
                        ELType::FelComplex,
                        format!(
                            "L1 peak {nits} nits exceeds threshold {threshold} nits \
                             at {}ms",
                            t_ms
                        ),
                        parsed,
                    ));
                }
            }
            SampleOutcome::NoData => {}
        }
    }

    let verdict = decide_from_counts(total, parsed, threshold);
    Ok(assessment(verdict.0, verdict.1, parsed))
}

/// Final decision once every probe has run without an over-threshold hit.
fn decide_from_counts(total: usize, parsed: usize, threshold: u32) -> (ELType, String) {
    if parsed == 0 {
        return (
            ELType::FelComplex,
            "extraction failed for every probe".to_string(),
        );
    }
    let required = std::cmp::max(1, total / 2);
    if parsed < required {
        return (
            ELType::FelComplex,
            format!("insufficient data: {parsed}/{total} probes parsed"),
        );
    }
    (
        ELType::FelSimple,
        format!("no expansion above {threshold} nits across {parsed} probes"),
    )
}

/// Sample one second of the bitstream at `t_ms` and inspect its RPU.
/// Failures are folded into [`SampleOutcome::NoData`]; the caller's
/// aggregate counting handles them.
async fn probe_sample(
    tools: &ToolRegistry,
    path: &Path,
    temp_dir: &Path,
    t_ms: u64,
) -> SampleOutcome {
    let sample = ScratchSet::new(temp_dir);

    let start = t_ms as f64 / 1000.0;
    if extract_annexb_window(tools, path, Some(start), Some(1.0), &sample.hevc)
        .await
        .is_err()
    {
        return SampleOutcome::NoData;
    }

    if rpu::extract_rpu(tools, &sample.hevc, &sample.rpu)
        .await
        .is_err()
    {
        return SampleOutcome::NoData;
    }

    // Fast path: parse the blob natively before paying for a JSON export.
    if let Ok(blob) = std::fs::read(&sample.rpu) {
        if rpu::peek_el_type(&blob) == Some(ELType::Mel) {
            return SampleOutcome::Mel;
        }
    }

    if rpu::export_rpu_json(tools, &sample.rpu, &sample.json)
        .await
        .is_err()
    {
        return SampleOutcome::NoData;
    }

    if let Ok(text) = std::fs::read_to_string(&sample.json) {
        if rpu::scan_el_type_marker(&text) == Some(ELType::Mel) {
            return SampleOutcome::Mel;
        }
    }

    match rpu::max_level1_pq(&sample.json) {
        Ok(Some(code)) => SampleOutcome::MaxPq(code),
        _ => SampleOutcome::NoData,
    }
}

/// The three scratch files of one probe iteration, unlinked on drop.
struct ScratchSet {
    hevc: PathBuf,
    rpu: PathBuf,
    json: PathBuf,
}

impl ScratchSet {
    fn new(temp_dir: &Path) -> Self {
        Self {
            hevc: scratch_file(temp_dir, "probe_", "hevc"),
            rpu: scratch_file(temp_dir, "probe_", "rpu.bin"),
            json: scratch_file(temp_dir, "probe_", "json"),
        }
    }
}

impl Drop for ScratchSet {
    fn drop(&mut self) {
        for path in [&self.hevc, &self.rpu, &self.json] {
            let _ = std::fs::remove_file(path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_files_probe_once_at_zero() {
        assert_eq!(probe_timestamps_ms(0), vec![0]);
        assert_eq!(probe_timestamps_ms(9_999), vec![0]);
    }

    #[test]
    fn long_files_probe_ten_marks() {
        let stamps = probe_timestamps_ms(100_000);
        assert_eq!(
            stamps,
            vec![5_000, 15_000, 25_000, 35_000, 45_000, 55_000, 65_000, 75_000, 85_000, 95_000]
        );
    }

    #[test]
    fn two_hour_film_marks() {
        let stamps = probe_timestamps_ms(7_200_000);
        assert_eq!(stamps.len(), 10);
        assert_eq!(stamps[0], 360_000);
        assert_eq!(stamps[9], 6_840_000);
    }

    #[test]
    fn base_peak_defaults() {
        assert_eq!(base_peak_nits(Some(1200)), (1200, false));
        assert_eq!(base_peak_nits(Some(100)), (100, false));
        assert_eq!(base_peak_nits(Some(99)), (DEFAULT_BASE_PEAK_NITS, true));
        assert_eq!(base_peak_nits(Some(0)), (DEFAULT_BASE_PEAK_NITS, true));
        assert_eq!(base_peak_nits(None), (DEFAULT_BASE_PEAK_NITS, true));
    }

    #[test]
    fn all_probes_failing_is_complex() {
        let (el, reason) = decide_from_counts(10, 0, 1050);
        assert_eq!(el, ELType::FelComplex);
        assert!(reason.contains("extraction failed"));
    }

    #[test]
    fn under_half_parsed_is_complex() {
        let (el, reason) = decide_from_counts(10, 4, 1050);
        assert_eq!(el, ELType::FelComplex);
        assert!(reason.contains("insufficient data"));
    }

    #[test]
    fn half_or_more_parsed_is_simple() {
        let (el, _) = decide_from_counts(10, 5, 1050);
        assert_eq!(el, ELType::FelSimple);
    }

    #[test]
    fn single_probe_set_requires_one() {
        // max(1, 1/2) == 1: the lone short-file probe must parse.
        let (el, _) = decide_from_counts(1, 1, 1050);
        assert_eq!(el, ELType::FelSimple);
        let (el, _) = decide_from_counts(1, 0, 1050);
        assert_eq!(el, ELType::FelComplex);
    }
}
