//! The conversion state machine.
//!
//! validate -> probe container -> turbo (or safe) -> mux -> verify -> swap.
//! The source file is only ever renamed at the final step, after both the
//! mux and the verification have succeeded; every failure path before that
//! leaves it untouched and removes all scratch output.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dovarr_core::{DoViProfile, Error, FileVerdict, Result};
use dovarr_av::command::{PipeCommand, ToolCommand, CONVERT_STEP_TIMEOUT, TURBO_TIMEOUT};
use dovarr_av::extract::{annexb_to_stdout_command, extract_annexb};
use dovarr_av::tools::ToolRegistry;
use dovarr_av::workspace::ConvertWorkspace;

use crate::failure::{classify_stderr, FailureKind};
use crate::mux::run_mux;
use crate::options::ConvertOptions;
use crate::verify::verify_output;

/// Suffix of the backup sibling left next to a converted file.
pub const BACKUP_SUFFIX: &str = ".dovarr.bak";

/// Suffix of the in-progress output next to the destination.
pub const PARTIAL_SUFFIX: &str = ".partial";

/// Free scratch space required, as a multiple of the source size.
const SPACE_MULTIPLIER: f64 = 1.5;

/// Result of a successful conversion.
#[derive(Debug, Clone)]
pub struct ConvertOutcome {
    /// Where the converted file landed.
    pub output: PathBuf,
    /// The retained backup, when the policy kept one.
    pub backup: Option<PathBuf>,
    /// Verified frame count of the output.
    pub frame_count: u64,
    /// The turbo path failed and the disk-extraction fallback ran.
    pub used_safe_path: bool,
    /// Verification needed the stream-level source count.
    pub via_authoritative: bool,
}

/// Drives Profile 7 to Profile 8.1 conversions.
pub struct Converter {
    tools: Arc<ToolRegistry>,
    temp_root: PathBuf,
}

impl Converter {
    pub fn new(tools: Arc<ToolRegistry>, temp_root: impl Into<PathBuf>) -> Self {
        Self {
            tools,
            temp_root: temp_root.into(),
        }
    }

    /// Convert a classified Profile 7 file to Profile 8.1.
    ///
    /// `backup_enabled` is the daemon-level setting as of the swap, combined
    /// with the per-call options by [`ConvertOptions::keep_backup`].
    pub async fn convert_to_p8(
        &self,
        verdict: &FileVerdict,
        opts: &ConvertOptions,
        backup_enabled: bool,
    ) -> Result<ConvertOutcome> {
        let path = verdict.path.as_path();

        if !path.exists() {
            return Err(Error::Input(format!("file not found: {}", path.display())));
        }
        if !verdict.is_mkv {
            return Err(Error::Input(format!(
                "not a Matroska file: {}",
                path.display()
            )));
        }
        if !verdict.needs_conversion() {
            return Err(Error::NotApplicable(not_applicable_reason(verdict)));
        }
        if !verdict.safe_to_auto_convert() && !opts.force {
            return Err(Error::Validation(format!(
                "{} has a {} enhancement layer; pass force to convert anyway \
                 (quality loss is possible)",
                path.display(),
                verdict
                    .el_type
                    .map(|el| el.label())
                    .unwrap_or("unclassified"),
            )));
        }

        let temp_root = opts
            .temp_dir
            .clone()
            .unwrap_or_else(|| self.temp_root.clone());

        let required = (verdict.file_size as f64 * SPACE_MULTIPLIER) as u64;
        if let Some(available) = free_space(&temp_root) {
            if available < required {
                return Err(Error::DiskSpace {
                    required,
                    available,
                });
            }
        }

        let in_place = opts.output_dir.is_none();
        let keep_backup = opts.keep_backup(backup_enabled);
        // The swap always renames through the backup name, so an existing
        // backup aborts the conversion before anything is modified.
        let backup_path = sibling_with_suffix(path, BACKUP_SUFFIX);
        if in_place && backup_path.exists() {
            return Err(Error::Input(format!(
                "backup already exists, refusing to overwrite: {}",
                backup_path.display()
            )));
        }

        let video = dovarr_av::probe::probe_container(&self.tools, path)
            .await
            .map_err(|e| Error::Probe(e.to_string()))?;

        let workspace = ConvertWorkspace::create(&temp_root)?;
        let p8_hevc = workspace.file("video_p8.hevc");

        let mut used_safe_path = opts.safe;
        if opts.safe {
            self.safe_convert(path, &workspace, &p8_hevc, opts.hdr10)
                .await?;
        } else {
            match self.turbo_convert(path, &p8_hevc, opts.hdr10).await {
                Ok(()) => {}
                Err(Error::Stream(reason)) => {
                    tracing::warn!(
                        "turbo path failed for {} ({reason}); retrying via safe path",
                        path.display()
                    );
                    let _ = std::fs::remove_file(&p8_hevc);
                    used_safe_path = true;
                    self.safe_convert(path, &workspace, &p8_hevc, opts.hdr10)
                        .await?;
                }
                Err(e) => return Err(e),
            }
        }

        let destination = match &opts.output_dir {
            Some(dir) => dir.join(path.file_name().ok_or_else(|| {
                Error::Input(format!("invalid file name: {}", path.display()))
            })?),
            None => path.to_path_buf(),
        };
        let partial = sibling_with_suffix(&destination, PARTIAL_SUFFIX);

        if let Err(e) = run_mux(&self.tools, &video, &p8_hevc, path, &partial).await {
            let _ = std::fs::remove_file(&partial);
            return Err(e);
        }

        let verification = match verify_output(&self.tools, path, &partial).await {
            Ok(v) => v,
            Err(e) => {
                let _ = std::fs::remove_file(&partial);
                return Err(e);
            }
        };

        let backup = if in_place {
            swap_into_place(path, &partial, &backup_path, keep_backup)?
        } else {
            std::fs::rename(&partial, &destination).map_err(|e| {
                let _ = std::fs::remove_file(&partial);
                Error::CriticalIo(format!(
                    "failed to move output to {}: {e}",
                    destination.display()
                ))
            })?;
            None
        };

        tracing::info!(
            "converted {} ({} frames{})",
            destination.display(),
            verification.frame_count,
            if used_safe_path { ", safe path" } else { "" }
        );

        Ok(ConvertOutcome {
            output: destination,
            backup,
            frame_count: verification.frame_count,
            used_safe_path,
            via_authoritative: verification.via_authoritative,
        })
    }

    /// Pipe-assembled fast path: demux straight into dovi_tool, no
    /// intermediate video file on disk.
    async fn turbo_convert(&self, source: &Path, p8_hevc: &Path, hdr10: bool) -> Result<()> {
        let demux = annexb_to_stdout_command(&self.tools, source);
        let convert = ToolCommand::new(&self.tools.dovi_tool).args(dovi_args("-", p8_hevc, hdr10));

        let result = PipeCommand::new(demux, convert)
            .timeout(TURBO_TIMEOUT)
            .execute()
            .await;

        match result {
            Ok(output) if output.success() => Ok(()),
            Ok(output) => {
                let stderr = output.combined_stderr();
                match classify_stderr(&stderr) {
                    FailureKind::Critical => {
                        Err(Error::CriticalIo(first_lines(&stderr, 5)))
                    }
                    // A failing demuxer usually means seamless branching
                    // produced timestamps the pipe cannot survive; anything
                    // non-critical gets the disk-extraction retry.
                    _ => Err(Error::Stream(first_lines(&stderr, 5))),
                }
            }
            Err(Error::Timeout { .. }) => {
                Err(Error::Stream("turbo pipeline timed out".to_string()))
            }
            Err(e) => Err(e),
        }
    }

    /// Disk-extraction fallback: demux the video track to scratch, then run
    /// dovi_tool against the file.
    async fn safe_convert(
        &self,
        source: &Path,
        workspace: &ConvertWorkspace,
        p8_hevc: &Path,
        hdr10: bool,
    ) -> Result<()> {
        let bl_hevc = workspace.file("video.hevc");

        extract_annexb(
            &self.tools,
            source,
            None,
            None,
            &bl_hevc,
            CONVERT_STEP_TIMEOUT,
        )
        .await
        .map_err(map_step_error)?;

        ToolCommand::new(&self.tools.dovi_tool)
            .args(dovi_args(&bl_hevc.to_string_lossy(), p8_hevc, hdr10))
            .timeout(CONVERT_STEP_TIMEOUT)
            .execute()
            .await
            .map_err(map_step_error)?;

        // The extracted base layer can be as large as the source; release
        // it before muxing doubles the scratch footprint.
        let _ = std::fs::remove_file(&bl_hevc);
        Ok(())
    }
}

/// Map a raw tool failure from a safe-path step onto the converter's error
/// taxonomy. Timeouts outside the turbo pipe are terminal.
fn map_step_error(e: Error) -> Error {
    match e {
        Error::Tool { tool, message } => match classify_stderr(&message) {
            FailureKind::Critical => Error::CriticalIo(format!("{tool}: {message}")),
            FailureKind::Stream => Error::Stream(format!("{tool}: {message}")),
            FailureKind::Unknown => Error::Tool { tool, message },
        },
        Error::Timeout { tool, secs } => {
            Error::CriticalIo(format!("{tool} timed out after {secs}s"))
        }
        other => other,
    }
}

/// dovi_tool arguments for the metadata rewrite. Mode 2 converts Profile 7
/// to 8.1; `--discard` drops the enhancement layer. `remove` strips the RPU
/// outright for plain HDR10 output.
fn dovi_args(input: &str, output: &Path, hdr10: bool) -> Vec<String> {
    let out = output.to_string_lossy().into_owned();
    if hdr10 {
        vec!["remove".into(), input.into(), "-o".into(), out]
    } else {
        vec![
            "-m".into(),
            "2".into(),
            "convert".into(),
            "--discard".into(),
            input.into(),
            "-o".into(),
            out,
        ]
    }
}

fn not_applicable_reason(verdict: &FileVerdict) -> String {
    match verdict.profile {
        Some(DoViProfile::Profile8) => "already Profile 8".to_string(),
        Some(profile) if verdict.has_dovi => {
            format!("{profile} does not need conversion")
        }
        _ => "no Dolby Vision content".to_string(),
    }
}

/// Swap the verified partial into place behind a backup rename.
///
/// The original is absent only between the two renames. On a failed second
/// rename the backup is restored and the partial removed, so the original
/// survives every outcome.
fn swap_into_place(
    path: &Path,
    partial: &Path,
    backup_path: &Path,
    keep_backup: bool,
) -> Result<Option<PathBuf>> {
    std::fs::rename(path, backup_path).map_err(|e| {
        let _ = std::fs::remove_file(partial);
        Error::CriticalIo(format!("failed to back up original: {e}"))
    })?;

    if let Err(e) = std::fs::rename(partial, path) {
        let _ = std::fs::rename(backup_path, path);
        let _ = std::fs::remove_file(partial);
        return Err(Error::CriticalIo(format!(
            "failed to move converted file into place: {e}"
        )));
    }

    if keep_backup {
        Ok(Some(backup_path.to_path_buf()))
    } else {
        let _ = std::fs::remove_file(backup_path);
        Ok(None)
    }
}

/// Append a suffix to a path's file name: `a.mkv` -> `a.mkv<suffix>`.
fn sibling_with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    name.push_str(suffix);
    path.with_file_name(name)
}

fn first_lines(text: &str, n: usize) -> String {
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .take(n)
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(unix)]
fn free_space(path: &Path) -> Option<u64> {
    nix::sys::statvfs::statvfs(path)
        .ok()
        .map(|stat| stat.blocks_available() as u64 * stat.fragment_size() as u64)
}

#[cfg(not(unix))]
fn free_space(_path: &Path) -> Option<u64> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use dovarr_core::{ELType, HdrFormat};

    fn verdict_for(path: &Path, profile: DoViProfile, el: Option<ELType>) -> FileVerdict {
        FileVerdict {
            path: path.to_path_buf(),
            has_dovi: true,
            profile: Some(profile),
            el_type: el,
            video_codec: Some("HEVC".into()),
            hdr_format: HdrFormat::DolbyVision,
            file_size: 64,
            is_mkv: true,
            default_peak_used: false,
        }
    }

    fn converter(temp: &Path) -> Converter {
        Converter::new(Arc::new(ToolRegistry::discover()), temp)
    }

    #[tokio::test]
    async fn profile8_is_not_applicable_and_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("done.mkv");
        std::fs::write(&file, b"matroska").unwrap();

        let verdict = verdict_for(&file, DoViProfile::Profile8, None);
        let result = converter(dir.path())
            .convert_to_p8(&verdict, &ConvertOptions::default(), true)
            .await;

        assert!(matches!(result, Err(Error::NotApplicable(_))));
        assert_eq!(std::fs::read(&file).unwrap(), b"matroska");
        assert!(!sibling_with_suffix(&file, BACKUP_SUFFIX).exists());
        assert!(!sibling_with_suffix(&file, PARTIAL_SUFFIX).exists());
    }

    #[tokio::test]
    async fn missing_file_is_input_error() {
        let dir = tempfile::tempdir().unwrap();
        let verdict = verdict_for(
            &dir.path().join("gone.mkv"),
            DoViProfile::Profile7,
            Some(ELType::Mel),
        );
        let result = converter(dir.path())
            .convert_to_p8(&verdict, &ConvertOptions::default(), true)
            .await;
        assert!(matches!(result, Err(Error::Input(_))));
    }

    #[tokio::test]
    async fn complex_fel_requires_force() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("complex.mkv");
        std::fs::write(&file, b"matroska").unwrap();

        let verdict = verdict_for(&file, DoViProfile::Profile7, Some(ELType::FelComplex));
        let result = converter(dir.path())
            .convert_to_p8(&verdict, &ConvertOptions::default(), true)
            .await;
        assert!(matches!(result, Err(Error::Validation(_))));

        // Inconclusive EL classification is treated the same way.
        let verdict = verdict_for(&file, DoViProfile::Profile7, Some(ELType::Unknown));
        let result = converter(dir.path())
            .convert_to_p8(&verdict, &ConvertOptions::default(), true)
            .await;
        assert!(matches!(result, Err(Error::Validation(_))));
    }

    #[test]
    fn suffix_naming() {
        let backup = sibling_with_suffix(Path::new("/movies/Film.mkv"), BACKUP_SUFFIX);
        assert_eq!(backup, PathBuf::from("/movies/Film.mkv.dovarr.bak"));

        let partial = sibling_with_suffix(Path::new("/movies/Film.mkv"), PARTIAL_SUFFIX);
        assert_eq!(partial, PathBuf::from("/movies/Film.mkv.partial"));
    }

    #[test]
    fn swap_keeps_backup() {
        let dir = tempfile::tempdir().unwrap();
        let original = dir.path().join("film.mkv");
        let partial = dir.path().join("film.mkv.partial");
        let backup = dir.path().join("film.mkv.dovarr.bak");
        std::fs::write(&original, b"old").unwrap();
        std::fs::write(&partial, b"new").unwrap();

        let kept = swap_into_place(&original, &partial, &backup, true).unwrap();
        assert_eq!(kept.as_deref(), Some(backup.as_path()));
        assert_eq!(std::fs::read(&original).unwrap(), b"new");
        assert_eq!(std::fs::read(&backup).unwrap(), b"old");
        assert!(!partial.exists());
    }

    #[test]
    fn swap_discards_backup_when_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let original = dir.path().join("film.mkv");
        let partial = dir.path().join("film.mkv.partial");
        let backup = dir.path().join("film.mkv.dovarr.bak");
        std::fs::write(&original, b"old").unwrap();
        std::fs::write(&partial, b"new").unwrap();

        let kept = swap_into_place(&original, &partial, &backup, false).unwrap();
        assert!(kept.is_none());
        assert_eq!(std::fs::read(&original).unwrap(), b"new");
        assert!(!backup.exists());
    }

    #[test]
    fn dovi_argument_shapes() {
        let args = dovi_args("-", Path::new("/tmp/out.hevc"), false);
        assert_eq!(args, vec!["-m", "2", "convert", "--discard", "-", "-o", "/tmp/out.hevc"]);

        let args = dovi_args("/tmp/in.hevc", Path::new("/tmp/out.hevc"), true);
        assert_eq!(args, vec!["remove", "/tmp/in.hevc", "-o", "/tmp/out.hevc"]);
    }

    #[test]
    fn stderr_summary_is_bounded() {
        let noisy = "one\n\ntwo\nthree\nfour\nfive\nsix\nseven\n";
        let summary = first_lines(noisy, 5);
        assert_eq!(summary, "one; two; three; four; five");
    }
}
