//! Annex-B HEVC extraction via ffmpeg.
//!
//! Both the classifier (short windowed samples) and the converter (full
//! track, piped or to disk) extract through the same argument builder so the
//! copy-remux flags stay in one place.

use std::path::Path;
use std::time::Duration;

use dovarr_core::Result;

use crate::command::{ToolCommand, PROBE_TIMEOUT};
use crate::tools::ToolRegistry;

/// Build ffmpeg arguments that copy-remux the first video track to an
/// Annex-B HEVC byte stream.
///
/// `start` seeks before the input (fast seek); `window` bounds the output
/// duration. `output` is a filesystem path or `-` for stdout.
pub fn annexb_args(
    input: &Path,
    start: Option<f64>,
    window: Option<f64>,
    output: &str,
) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "-hide_banner".into(),
        "-loglevel".into(),
        "error".into(),
        "-y".into(),
    ];

    if let Some(start) = start {
        args.push("-ss".into());
        args.push(format_secs(start));
    }

    args.push("-i".into());
    args.push(input.to_string_lossy().into_owned());

    if let Some(window) = window {
        args.push("-t".into());
        args.push(format_secs(window));
    }

    args.extend(
        [
            "-map", "0:v:0", "-c:v", "copy", "-bsf:v", "hevc_mp4toannexb", "-an", "-sn", "-f",
            "hevc",
        ]
        .map(String::from),
    );
    args.push(output.into());
    args
}

fn format_secs(secs: f64) -> String {
    if secs.fract() == 0.0 {
        format!("{}", secs as u64)
    } else {
        format!("{secs:.3}")
    }
}

/// Extract a windowed Annex-B HEVC sample to a file.
pub async fn extract_annexb_window(
    tools: &ToolRegistry,
    input: &Path,
    start: Option<f64>,
    window: Option<f64>,
    output: &Path,
) -> Result<()> {
    extract_annexb(tools, input, start, window, output, PROBE_TIMEOUT).await
}

/// Extract Annex-B HEVC to a file with an explicit timeout. `start`/`window`
/// of `None` extract the whole track (the safe conversion path).
pub async fn extract_annexb(
    tools: &ToolRegistry,
    input: &Path,
    start: Option<f64>,
    window: Option<f64>,
    output: &Path,
    timeout: Duration,
) -> Result<()> {
    let args = annexb_args(input, start, window, &output.to_string_lossy());
    ToolCommand::new(&tools.ffmpeg)
        .args(args)
        .timeout(timeout)
        .execute()
        .await?;
    Ok(())
}

/// The ffmpeg side of the turbo pipeline: whole-track extraction to stdout.
pub fn annexb_to_stdout_command(tools: &ToolRegistry, input: &Path) -> ToolCommand {
    ToolCommand::new(&tools.ffmpeg).args(annexb_args(input, None, None, "-"))
}
