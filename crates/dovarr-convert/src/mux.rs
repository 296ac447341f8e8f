//! Remuxing the converted HEVC stream back into the source container.
//!
//! The new stream becomes the single video track, carrying the source's
//! frame rate, language, name, and delay; every non-video track is copied
//! from the source via `--no-video`.

use std::path::Path;

use dovarr_core::{Error, Result, VideoTrackInfo};
use dovarr_av::command::{ToolCommand, CONVERT_STEP_TIMEOUT};
use dovarr_av::tools::ToolRegistry;

use crate::failure::{classify_stderr, FailureKind};

/// Build the mkvmerge argument list for the remux step.
pub fn mux_args(
    video: &VideoTrackInfo,
    new_hevc: &Path,
    source: &Path,
    output: &Path,
) -> Vec<String> {
    let mut args: Vec<String> = vec!["-o".into(), output.to_string_lossy().into_owned()];

    // mkvmerge takes --sync in milliseconds; the container probe reports
    // the delay in nanoseconds.
    let delay_ms = video.delay_ns / 1_000_000;
    if delay_ms != 0 {
        args.push("--sync".into());
        args.push(format!("0:{delay_ms}"));
    }

    args.push("--default-duration".into());
    args.push(format!("0:{}fps", video.fps));
    args.push("--language".into());
    args.push(format!("0:{}", video.language));

    if !video.track_name.is_empty() {
        args.push("--track-name".into());
        args.push(format!("0:{}", video.track_name));
    }

    args.push(new_hevc.to_string_lossy().into_owned());
    args.push("--no-video".into());
    args.push(source.to_string_lossy().into_owned());
    args
}

/// Run the remux, producing the partial output file.
///
/// mkvmerge exits 0 on success and 1 on warnings; both are accepted.
pub async fn run_mux(
    tools: &ToolRegistry,
    video: &VideoTrackInfo,
    new_hevc: &Path,
    source: &Path,
    output: &Path,
) -> Result<()> {
    let output_result = ToolCommand::new(&tools.mkvmerge)
        .args(mux_args(video, new_hevc, source, output))
        .timeout(CONVERT_STEP_TIMEOUT)
        .run()
        .await?;

    if output_result.status.success() || output_result.status.code() == Some(1) {
        return Ok(());
    }

    let stderr = format!("{}\n{}", output_result.stdout, output_result.stderr);
    match classify_stderr(&stderr) {
        FailureKind::Critical => Err(Error::CriticalIo(format!("mkvmerge: {}", stderr.trim()))),
        _ => Err(Error::tool("mkvmerge", stderr.trim().to_string())),
    }
}
