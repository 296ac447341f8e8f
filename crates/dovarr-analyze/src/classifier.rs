//! The staged classifier.
//!
//! Stage A reads container metadata (cheap, answers most files). Stage B
//! confirms a hinted-but-untagged Dolby Vision profile from a bitstream
//! sample. Stage C classifies a Profile 7 file's enhancement layer, first by
//! its RPU marker and then, for FELs, by the luminance-expansion probe.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dovarr_core::{DoViProfile, ELType, Error, FileVerdict, HdrFormat, Result};
use dovarr_av::extract::extract_annexb_window;
use dovarr_av::probe::mediainfo::probe_media;
use dovarr_av::tools::ToolRegistry;
use dovarr_av::workspace::scratch_file;
use dovarr_av::ToolCommand;

use crate::fel;
use crate::rpu;

/// Length of the bitstream sample Stage B inspects.
const PROFILE_CONFIRM_WINDOW_SECS: f64 = 10.0;

/// Windows tried by the EL-type probe: the start of the file, then a longer
/// stretch when the first window carries no marker.
const EL_PROBE_WINDOWS_SECS: &[f64] = &[5.0, 30.0];

/// Classifies files into their HDR/DoVi verdicts.
///
/// `classify` is idempotent and read-only on the source; scratch output goes
/// to the configured temp directory.
pub struct Classifier {
    tools: Arc<ToolRegistry>,
    temp_dir: PathBuf,
}

impl Classifier {
    pub fn new(tools: Arc<ToolRegistry>, temp_dir: impl Into<PathBuf>) -> Self {
        Self {
            tools,
            temp_dir: temp_dir.into(),
        }
    }

    /// Classify one file.
    ///
    /// # Errors
    ///
    /// [`Error::Input`] when the file is missing; [`Error::Probe`] when
    /// Stage A or B tooling fails. Stage C failures never error: they
    /// degrade to the safer verdict instead.
    pub async fn classify(&self, path: &Path) -> Result<FileVerdict> {
        let metadata = std::fs::metadata(path)
            .map_err(|e| Error::Input(format!("{}: {e}", path.display())))?;
        let file_size = metadata.len();
        let is_mkv = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("mkv"))
            .unwrap_or(false);

        let media = probe_media(&self.tools, path)
            .await
            .map_err(|e| Error::Probe(e.to_string()))?;

        let mut verdict = FileVerdict {
            path: path.to_path_buf(),
            has_dovi: false,
            profile: None,
            el_type: None,
            video_codec: media.video_codec.clone(),
            hdr_format: hdr_family(&media.hdr_tag),
            file_size,
            is_mkv,
            default_peak_used: false,
        };

        // Stage A: the container tag answers most files outright.
        match stage_a(&media.hdr_tag) {
            StageA::Profile(DoViProfile::Profile7) => {}
            StageA::Profile(profile) => {
                verdict.has_dovi = true;
                verdict.profile = Some(profile);
                return Ok(verdict);
            }
            StageA::DoViHinted => {
                let confirmed = self.stage_b(path).await?;
                verdict.has_dovi = true;
                verdict.profile = Some(confirmed);
                if confirmed != DoViProfile::Profile7 {
                    return Ok(verdict);
                }
            }
            StageA::NoDovi => {
                return Ok(verdict);
            }
        }

        // Stage C: Profile 7 confirmed; classify the enhancement layer.
        verdict.has_dovi = true;
        verdict.profile = Some(DoViProfile::Profile7);

        let el = self.stage_c_el_type(path).await;
        match el {
            Some(ELType::Mel) => {
                verdict.el_type = Some(ELType::Mel);
            }
            Some(_) => {
                // A FEL (or an unreadable marker): run the complexity probe.
                let duration_ms = media.duration_ms.unwrap_or(0);
                match fel::assess_fel(
                    &self.tools,
                    path,
                    &self.temp_dir,
                    duration_ms,
                    media.max_cll_nits,
                )
                .await
                {
                    Ok(assessment) => {
                        tracing::info!(
                            "FEL assessment for {}: {} ({})",
                            path.display(),
                            assessment.el_type,
                            assessment.reason
                        );
                        verdict.el_type = Some(assessment.el_type);
                        verdict.default_peak_used = assessment.default_peak_used;
                    }
                    Err(e) => {
                        tracing::warn!(
                            "FEL probe failed for {}; treating as complex: {e}",
                            path.display()
                        );
                        verdict.el_type = Some(ELType::FelComplex);
                    }
                }
            }
            None => {
                // No marker in either window: inconclusive, handled as
                // complex by candidate selection.
                verdict.el_type = Some(ELType::Unknown);
            }
        }

        Ok(verdict)
    }

    /// Stage B: confirm the profile of a file whose container only hints at
    /// Dolby Vision, by sampling the bitstream and asking dovi_tool.
    async fn stage_b(&self, path: &Path) -> Result<DoViProfile> {
        let sample = scratch_file(&self.temp_dir, "inspect_", "hevc");
        let result = self.stage_b_inner(path, &sample).await;
        let _ = std::fs::remove_file(&sample);
        result
    }

    async fn stage_b_inner(&self, path: &Path, sample: &Path) -> Result<DoViProfile> {
        extract_annexb_window(
            &self.tools,
            path,
            None,
            Some(PROFILE_CONFIRM_WINDOW_SECS),
            sample,
        )
        .await
        .map_err(|e| Error::Probe(e.to_string()))?;

        let output = ToolCommand::new(&self.tools.dovi_tool)
            .arg("info")
            .arg("-i")
            .arg_path(sample)
            .arg("--summary")
            .timeout(dovarr_av::command::PROBE_TIMEOUT)
            .run()
            .await
            .map_err(|e| Error::Probe(e.to_string()))?;

        let text = format!("{}\n{}", output.stdout, output.stderr);
        Ok(parse_profile_marker(&text))
    }

    /// Stage C.1: determine the EL type from a short RPU sample, widening
    /// the window once before giving up.
    async fn stage_c_el_type(&self, path: &Path) -> Option<ELType> {
        for window in EL_PROBE_WINDOWS_SECS {
            if let Some(el) = self.el_probe_window(path, *window).await {
                return Some(el);
            }
        }
        None
    }

    async fn el_probe_window(&self, path: &Path, window_secs: f64) -> Option<ELType> {
        let hevc = scratch_file(&self.temp_dir, "probe_", "hevc");
        let rpu_bin = scratch_file(&self.temp_dir, "probe_", "rpu.bin");
        let json = scratch_file(&self.temp_dir, "probe_", "json");

        let result = self
            .el_probe_window_inner(path, window_secs, &hevc, &rpu_bin, &json)
            .await;

        for scratch in [&hevc, &rpu_bin, &json] {
            let _ = std::fs::remove_file(scratch);
        }
        result
    }

    async fn el_probe_window_inner(
        &self,
        path: &Path,
        window_secs: f64,
        hevc: &Path,
        rpu_bin: &Path,
        json: &Path,
    ) -> Option<ELType> {
        extract_annexb_window(&self.tools, path, None, Some(window_secs), hevc)
            .await
            .ok()?;
        rpu::extract_rpu(&self.tools, hevc, rpu_bin).await.ok()?;

        if let Ok(blob) = std::fs::read(rpu_bin) {
            if let Some(el) = rpu::peek_el_type(&blob) {
                return Some(el);
            }
        }

        rpu::export_rpu_json(&self.tools, rpu_bin, json).await.ok()?;
        let text = std::fs::read_to_string(json).ok()?;
        rpu::scan_el_type_marker(&text)
    }
}

enum StageA {
    Profile(DoViProfile),
    DoViHinted,
    NoDovi,
}

/// Map the container's HDR tag string to a Stage A outcome.
fn stage_a(tag: &str) -> StageA {
    if tag.contains("dvhe.05") || tag.contains("Profile 5") {
        return StageA::Profile(DoViProfile::Profile5);
    }
    if tag.contains("dvhe.08") || tag.contains("Profile 8") {
        return StageA::Profile(DoViProfile::Profile8);
    }
    if tag.contains("dvhe.07") || tag.contains("Profile 7") {
        return StageA::Profile(DoViProfile::Profile7);
    }
    if tag.contains("Dolby Vision") {
        return StageA::DoViHinted;
    }
    StageA::NoDovi
}

/// HDR family for the scanned record when no Dolby Vision is present.
fn hdr_family(tag: &str) -> HdrFormat {
    if tag.contains("Dolby Vision") || tag.contains("dvhe.") {
        HdrFormat::DolbyVision
    } else if tag.contains("2094") {
        HdrFormat::Hdr10Plus
    } else if tag.contains("HLG") {
        HdrFormat::Hlg
    } else if tag.contains("2086") || tag.contains("HDR10") {
        HdrFormat::Hdr10
    } else {
        HdrFormat::Sdr
    }
}

/// Parse dovi_tool's info summary for a profile marker.
fn parse_profile_marker(text: &str) -> DoViProfile {
    let lower = text.to_lowercase();
    if lower.contains("profile 7") || lower.contains("profile: 7") {
        DoViProfile::Profile7
    } else if lower.contains("profile 8") || lower.contains("profile: 8") {
        DoViProfile::Profile8
    } else if lower.contains("profile 5") || lower.contains("profile: 5") {
        DoViProfile::Profile5
    } else {
        DoViProfile::Unknown
    }
}

/// Convenience used by scans: a one-line human summary of a verdict.
pub fn describe_verdict(verdict: &FileVerdict) -> String {
    match (verdict.has_dovi, verdict.profile, verdict.el_type) {
        (true, Some(DoViProfile::Profile7), Some(el)) => {
            format!("Dolby Vision Profile 7 ({el})")
        }
        (true, Some(profile), _) => format!("Dolby Vision {profile}"),
        (true, None, _) => "Dolby Vision (unknown profile)".to_string(),
        (false, ..) => match verdict.hdr_format {
            HdrFormat::Hdr10Plus => "HDR10+".to_string(),
            HdrFormat::Hdr10 => "HDR10".to_string(),
            HdrFormat::Hlg => "HLG".to_string(),
            HdrFormat::Sdr => "SDR".to_string(),
            HdrFormat::DolbyVision => "Dolby Vision".to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_a_profile_tags() {
        assert!(matches!(
            stage_a("Dolby Vision / dvhe.05.06 / BL+RPU"),
            StageA::Profile(DoViProfile::Profile5)
        ));
        assert!(matches!(
            stage_a("Dolby Vision, Version 1.0, Profile 8.1"),
            StageA::Profile(DoViProfile::Profile8)
        ));
        assert!(matches!(
            stage_a("Dolby Vision / dvhe.07.06 / BL+EL+RPU"),
            StageA::Profile(DoViProfile::Profile7)
        ));
    }

    #[test]
    fn stage_a_hint_and_absence() {
        assert!(matches!(
            stage_a("Dolby Vision, Version 1.0"),
            StageA::DoViHinted
        ));
        assert!(matches!(stage_a("SMPTE ST 2086 / HDR10"), StageA::NoDovi));
        assert!(matches!(stage_a(""), StageA::NoDovi));
    }

    #[test]
    fn hdr_family_mapping() {
        assert_eq!(hdr_family("SMPTE ST 2094 App 4"), HdrFormat::Hdr10Plus);
        assert_eq!(hdr_family("SMPTE ST 2086 / HDR10"), HdrFormat::Hdr10);
        assert_eq!(hdr_family("HLG / BT.2020"), HdrFormat::Hlg);
        assert_eq!(hdr_family("V_MPEGH/ISO/HEVC"), HdrFormat::Sdr);
        assert_eq!(
            hdr_family("Dolby Vision / dvhe.07.06"),
            HdrFormat::DolbyVision
        );
    }

    #[test]
    fn profile_marker_parsing() {
        assert_eq!(
            parse_profile_marker("Dolby Vision Profile 7 (BL+EL+RPU)"),
            DoViProfile::Profile7
        );
        assert_eq!(
            parse_profile_marker("Summary:\n  Profile: 8 (HDR10 compatible)"),
            DoViProfile::Profile8
        );
        assert_eq!(parse_profile_marker("no dovi here"), DoViProfile::Unknown);
    }

    #[test]
    fn verdict_description() {
        let verdict = FileVerdict {
            path: "/m/a.mkv".into(),
            has_dovi: true,
            profile: Some(DoViProfile::Profile7),
            el_type: Some(ELType::FelSimple),
            video_codec: Some("HEVC".into()),
            hdr_format: HdrFormat::DolbyVision,
            file_size: 1,
            is_mkv: true,
            default_peak_used: true,
        };
        assert_eq!(
            describe_verdict(&verdict),
            "Dolby Vision Profile 7 (FEL_SIMPLE)"
        );
    }
}
