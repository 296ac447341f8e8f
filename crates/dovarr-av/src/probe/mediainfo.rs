//! MediaInfo-based media probing.
//!
//! MediaInfo is the cheap first stage of classification: its HDR fields are
//! the most reliable source for Dolby Vision profile tags and the only one
//! for MaxCLL.

use std::path::Path;

use serde::Deserialize;

use dovarr_core::{Error, Result};

use crate::command::{ToolCommand, PROBE_TIMEOUT};
use crate::tools::ToolRegistry;

#[derive(Debug, Deserialize)]
struct MediaInfoOutput {
    media: MediaInfoMedia,
}

#[derive(Debug, Deserialize)]
struct MediaInfoMedia {
    #[serde(default)]
    track: Vec<MediaInfoTrack>,
}

#[derive(Debug, Default, Deserialize)]
struct MediaInfoTrack {
    #[serde(rename = "@type", default)]
    track_type: String,
    #[serde(rename = "Format")]
    format: Option<String>,
    #[serde(rename = "CodecID")]
    codec_id: Option<String>,
    #[serde(rename = "Duration")]
    duration: Option<String>,
    #[serde(rename = "FrameCount")]
    frame_count: Option<String>,
    #[serde(rename = "FrameRate")]
    frame_rate: Option<String>,
    #[serde(rename = "HDR_Format")]
    hdr_format: Option<String>,
    #[serde(rename = "HDR_Format_Profile")]
    hdr_format_profile: Option<String>,
    #[serde(rename = "HDR_Format_AdditionalFeatures")]
    hdr_format_additional: Option<String>,
    #[serde(rename = "HDR_Format_Commercial_Name")]
    hdr_format_commercial: Option<String>,
    #[serde(rename = "MaxCLL")]
    max_cll: Option<String>,
}

/// High-level media metadata for one file, distilled from mediainfo's video
/// and general tracks.
#[derive(Debug, Clone, Default)]
pub struct MediaProbeInfo {
    /// All HDR descriptor fields joined into one searchable tag string,
    /// e.g. `Dolby Vision / dvhe.07.06 / BL+EL+RPU / HDR10`.
    pub hdr_tag: String,
    /// Video codec family (`HEVC`, `AVC`, ...).
    pub video_codec: Option<String>,
    /// MaxCLL in nits, when tagged.
    pub max_cll_nits: Option<u32>,
    /// Video duration in milliseconds.
    pub duration_ms: Option<u64>,
    /// Container-advertised frame count.
    pub frame_count: Option<u64>,
    /// Frame rate as reported, e.g. `23.976`.
    pub frame_rate: Option<String>,
}

/// Probe a media file using mediainfo.
pub async fn probe_media(tools: &ToolRegistry, path: &Path) -> Result<MediaProbeInfo> {
    let output = ToolCommand::new(&tools.mediainfo)
        .arg("--Output=JSON")
        .arg_path(path)
        .timeout(PROBE_TIMEOUT)
        .execute()
        .await?;

    parse_media_probe(&output.stdout)
}

/// The container's advertised frame count, used by conversion verification
/// for both the source and the partial output.
pub async fn container_frame_count(tools: &ToolRegistry, path: &Path) -> Result<Option<u64>> {
    Ok(probe_media(tools, path).await?.frame_count)
}

fn parse_media_probe(json_str: &str) -> Result<MediaProbeInfo> {
    let output: MediaInfoOutput = serde_json::from_str(json_str)
        .map_err(|e| Error::parse("mediainfo", e.to_string()))?;

    let mut info = MediaProbeInfo::default();

    for track in output.media.track {
        match track.track_type.as_str() {
            "General" => {
                if info.duration_ms.is_none() {
                    info.duration_ms = parse_duration_ms(track.duration.as_deref());
                }
            }
            "Video" => {
                let mut tag_parts: Vec<String> = Vec::new();
                for part in [
                    track.hdr_format,
                    track.hdr_format_profile,
                    track.hdr_format_additional,
                    track.hdr_format_commercial,
                    track.codec_id,
                ]
                .into_iter()
                .flatten()
                {
                    if !part.is_empty() {
                        tag_parts.push(part);
                    }
                }
                info.hdr_tag = tag_parts.join(" / ");
                info.video_codec = track.format;
                info.max_cll_nits = track.max_cll.as_deref().and_then(parse_max_cll);
                info.frame_count = track.frame_count.and_then(|s| s.parse().ok());
                info.frame_rate = track.frame_rate;
                // The video track's duration wins over the general track's.
                if let Some(ms) = parse_duration_ms(track.duration.as_deref()) {
                    info.duration_ms = Some(ms);
                }
            }
            _ => {}
        }
    }

    Ok(info)
}

/// MediaInfo reports durations as fractional seconds.
fn parse_duration_ms(s: Option<&str>) -> Option<u64> {
    s.and_then(|s| s.trim().parse::<f64>().ok())
        .filter(|secs| *secs >= 0.0)
        .map(|secs| (secs * 1000.0).round() as u64)
}

/// MaxCLL appears either bare (`1000`) or with a unit (`1000 cd/m2`).
fn parse_max_cll(s: &str) -> Option<u32> {
    s.split_whitespace().next().and_then(|n| n.parse().ok())
}
