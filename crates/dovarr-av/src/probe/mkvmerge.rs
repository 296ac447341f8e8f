//! Matroska container probing via `mkvmerge -J`.
//!
//! Produces the [`VideoTrackInfo`] the remux step needs to reproduce the
//! source's video-track metadata (id, delay, language, name, frame rate).

use std::path::Path;

use serde::Deserialize;

use dovarr_core::{Error, Result, VideoTrackInfo};

use crate::command::{ToolCommand, PROBE_TIMEOUT};
use crate::tools::ToolRegistry;

#[derive(Debug, Deserialize)]
struct MergeIdentify {
    #[serde(default)]
    tracks: Vec<MergeTrack>,
}

#[derive(Debug, Deserialize)]
struct MergeTrack {
    id: u32,
    #[serde(rename = "type")]
    track_type: String,
    #[serde(default)]
    properties: MergeTrackProperties,
}

#[derive(Debug, Default, Deserialize)]
struct MergeTrackProperties {
    language: Option<String>,
    track_name: Option<String>,
    /// Frame duration in nanoseconds.
    default_duration: Option<u64>,
    /// Earliest timestamp of the track in nanoseconds.
    minimum_timestamp: Option<i64>,
    /// Frame count from container statistics tags; string or number
    /// depending on the mkvmerge version.
    tag_num_frames: Option<serde_json::Value>,
}

/// Probe the container and return the video track's metadata.
///
/// # Errors
///
/// Fails when mkvmerge cannot identify the file or it has no video track.
pub async fn probe_container(tools: &ToolRegistry, path: &Path) -> Result<VideoTrackInfo> {
    let output = ToolCommand::new(&tools.mkvmerge)
        .arg("-J")
        .arg_path(path)
        .timeout(PROBE_TIMEOUT)
        .execute()
        .await?;

    parse_identify(&output.stdout)
}

fn parse_identify(json_str: &str) -> Result<VideoTrackInfo> {
    let identify: MergeIdentify =
        serde_json::from_str(json_str).map_err(|e| Error::parse("mkvmerge", e.to_string()))?;

    let video = identify
        .tracks
        .into_iter()
        .find(|t| t.track_type == "video")
        .ok_or_else(|| Error::parse("mkvmerge", "no video track in container"))?;

    let fps = video
        .properties
        .default_duration
        .map(format_fps)
        .ok_or_else(|| Error::parse("mkvmerge", "video track has no default duration"))?;

    Ok(VideoTrackInfo {
        track_id: video.id,
        delay_ns: video.properties.minimum_timestamp.unwrap_or(0),
        language: video
            .properties
            .language
            .filter(|l| !l.is_empty())
            .unwrap_or_else(|| "und".to_string()),
        track_name: video.properties.track_name.unwrap_or_default(),
        fps,
        frame_count_container: video
            .properties
            .tag_num_frames
            .as_ref()
            .and_then(value_as_u64)
            .unwrap_or(0),
    })
}

fn value_as_u64(value: &serde_json::Value) -> Option<u64> {
    match value {
        serde_json::Value::Number(n) => n.as_u64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Render a frame rate from a per-frame duration in nanoseconds, in the
/// literal decimal form mkvmerge's `--default-duration` accepts.
fn format_fps(default_duration_ns: u64) -> String {
    let fps = 1_000_000_000f64 / default_duration_ns as f64;
    let rounded = (fps * 1000.0).round() / 1000.0;
    let mut s = format!("{rounded:.3}");
    while s.ends_with('0') {
        s.pop();
    }
    if s.ends_with('.') {
        s.pop();
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    const IDENTIFY_SAMPLE: &str = r#"{
        "container": {"type": "Matroska", "recognized": true, "supported": true},
        "tracks": [
            {
                "codec": "HEVC/H.265/MPEG-H",
                "id": 0,
                "type": "video",
                "properties": {
                    "codec_id": "V_MPEGH/ISO/HEVC",
                    "default_duration": 41708333,
                    "language": "eng",
                    "track_name": "Feature 4K DV",
                    "minimum_timestamp": 8000000,
                    "tag_num_frames": "195827"
                }
            },
            {
                "codec": "TrueHD Atmos",
                "id": 1,
                "type": "audio",
                "properties": {"language": "eng"}
            },
            {
                "codec": "HDMV PGS",
                "id": 2,
                "type": "subtitles",
                "properties": {"language": "eng"}
            }
        ]
    }"#;

    #[test]
    fn parses_video_track() {
        let info = parse_identify(IDENTIFY_SAMPLE).unwrap();
        assert_eq!(info.track_id, 0);
        assert_eq!(info.delay_ns, 8_000_000);
        assert_eq!(info.language, "eng");
        assert_eq!(info.track_name, "Feature 4K DV");
        assert_eq!(info.fps, "23.976");
        assert_eq!(info.frame_count_container, 195_827);
    }

    #[test]
    fn missing_optional_properties_default() {
        let json = r#"{
            "tracks": [
                {"id": 3, "type": "video", "properties": {"default_duration": 40000000}}
            ]
        }"#;
        let info = parse_identify(json).unwrap();
        assert_eq!(info.track_id, 3);
        assert_eq!(info.delay_ns, 0);
        assert_eq!(info.language, "und");
        assert_eq!(info.track_name, "");
        assert_eq!(info.fps, "25");
        assert_eq!(info.frame_count_container, 0);
    }

    #[test]
    fn no_video_track_is_an_error() {
        let json = r#"{"tracks": [{"id": 0, "type": "audio", "properties": {}}]}"#;
        assert!(matches!(parse_identify(json), Err(Error::Parse { .. })));
    }

    #[test]
    fn fps_formatting() {
        assert_eq!(format_fps(41_708_333), "23.976");
        assert_eq!(format_fps(40_000_000), "25");
        assert_eq!(format_fps(41_666_666), "24");
        assert_eq!(format_fps(16_683_333), "59.94");
        assert_eq!(format_fps(33_366_666), "29.97");
    }

    #[test]
    fn numeric_tag_num_frames() {
        let json = r#"{
            "tracks": [
                {"id": 0, "type": "video",
                 "properties": {"default_duration": 41708333, "tag_num_frames": 172800}}
            ]
        }"#;
        let info = parse_identify(json).unwrap();
        assert_eq!(info.frame_count_container, 172_800);
    }
}
