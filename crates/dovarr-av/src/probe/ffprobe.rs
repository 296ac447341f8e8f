//! Stream-level packet counting via ffprobe.
//!
//! Container metadata lies on some discs; counting video packets at the
//! stream level is slow but exact, and serves as the secondary
//! source-of-truth during conversion verification.

use std::path::Path;

use dovarr_core::{Error, Result};

use crate::command::{ToolCommand, CONVERT_STEP_TIMEOUT};
use crate::tools::ToolRegistry;

/// Count the video packets of the first video stream. Authoritative but
/// reads the whole file.
pub async fn authoritative_frame_count(tools: &ToolRegistry, path: &Path) -> Result<u64> {
    let output = ToolCommand::new(&tools.ffprobe)
        .args([
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-count_packets",
            "-show_entries",
            "stream=nb_read_packets",
            "-of",
            "default=noprint_wrappers=1:nokey=1",
        ])
        .arg_path(path)
        .timeout(CONVERT_STEP_TIMEOUT)
        .execute()
        .await?;

    parse_packet_count(&output.stdout)
}

fn parse_packet_count(stdout: &str) -> Result<u64> {
    stdout
        .lines()
        .find_map(|line| line.trim().parse::<u64>().ok())
        .ok_or_else(|| Error::parse("ffprobe", format!("no packet count in output: {stdout:?}")))
}
