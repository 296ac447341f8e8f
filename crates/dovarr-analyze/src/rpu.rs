//! RPU extraction and inspection.
//!
//! RPU blobs are produced by dovi_tool's `extract-rpu` and inspected two
//! ways: a native parse of the first RPU NAL for the enhancement-layer type
//! (cheap, no second tool invocation), and a JSON export scanned for the
//! `el_type` marker and Level-1 `max_pq` values. The JSON scan is the
//! fallback and the only source for luminance data.

use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::OnceLock;

use dolby_vision::rpu::dovi_rpu::DoviRpu;
use regex::Regex;

use dovarr_core::{ELType, Error, Result};
use dovarr_av::command::{ToolCommand, PROBE_TIMEOUT};
use dovarr_av::tools::ToolRegistry;

/// Extract the RPU stream from an Annex-B HEVC sample.
pub async fn extract_rpu(tools: &ToolRegistry, hevc: &Path, rpu_out: &Path) -> Result<()> {
    ToolCommand::new(&tools.dovi_tool)
        .arg("extract-rpu")
        .arg_path(hevc)
        .arg("-o")
        .arg_path(rpu_out)
        .timeout(PROBE_TIMEOUT)
        .execute()
        .await?;
    Ok(())
}

/// Export an RPU blob to a full JSON dump.
pub async fn export_rpu_json(tools: &ToolRegistry, rpu: &Path, json_out: &Path) -> Result<()> {
    ToolCommand::new(&tools.dovi_tool)
        .arg("export")
        .arg("-i")
        .arg_path(rpu)
        .arg("-d")
        .arg(format!("all={}", json_out.to_string_lossy()))
        .timeout(PROBE_TIMEOUT)
        .execute()
        .await?;
    Ok(())
}

/// Parse the first RPU NAL of an extracted blob and read its EL type
/// without a JSON export round-trip.
///
/// The blob is a start-code-delimited NAL stream; the label spelled by the
/// parsed type matches the marker the JSON dump carries, so both paths feed
/// [`el_type_from_label`].
pub fn peek_el_type(rpu_blob: &[u8]) -> Option<ELType> {
    for nalu in StartCodeNals::new(rpu_blob) {
        let Ok(rpu) = DoviRpu::parse_unspec62_nalu(nalu) else {
            continue;
        };
        let label = rpu.el_type.map(|el| format!("{el:?}"))?;
        return el_type_from_label(&label);
    }
    None
}

/// Map a `MEL`/`FEL` marker to the EL classes the classifier distinguishes.
/// A bare `FEL` marker is not yet simple or complex; the luminance probe
/// settles that, so it maps to `Unknown` here.
pub fn el_type_from_label(label: &str) -> Option<ELType> {
    match label {
        "MEL" => Some(ELType::Mel),
        "FEL" => Some(ELType::Unknown),
        _ => None,
    }
}

/// Scan a JSON dump for the `el_type` marker.
pub fn scan_el_type_marker(json_text: &str) -> Option<ELType> {
    static MARKER: OnceLock<Regex> = OnceLock::new();
    let re = MARKER.get_or_init(|| Regex::new(r#""el_type"\s*:\s*"(MEL|FEL)""#).unwrap());
    re.captures(json_text)
        .and_then(|caps| el_type_from_label(&caps[1]))
}

/// Find the maximum Level-1 `max_pq` value in a JSON dump.
///
/// A streaming line-scan rather than a parsed traversal: dumps for a
/// one-second sample already run to megabytes, and `max_pq` keys only occur
/// inside Level-1 blocks.
pub fn max_level1_pq(json_path: &Path) -> Result<Option<u16>> {
    static MAX_PQ: OnceLock<Regex> = OnceLock::new();
    let re = MAX_PQ.get_or_init(|| Regex::new(r#""max_pq"\s*:\s*(\d+)"#).unwrap());

    let file = std::fs::File::open(json_path).map_err(Error::Io)?;
    let reader = BufReader::new(file);

    let mut max: Option<u16> = None;
    for line in reader.lines() {
        let line = line.map_err(Error::Io)?;
        for caps in re.captures_iter(&line) {
            if let Ok(value) = caps[1].parse::<u16>() {
                max = Some(max.map_or(value, |m| m.max(value)));
            }
        }
    }

    Ok(max)
}

/// Iterator over Annex-B NAL units (3- or 4-byte start codes).
struct StartCodeNals<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> StartCodeNals<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn find_start_code(&self, from: usize) -> Option<(usize, usize)> {
        let data = self.data;
        let mut i = from;
        while i + 3 <= data.len() {
            if data[i] == 0 && data[i + 1] == 0 {
                if data[i + 2] == 1 {
                    return Some((i, 3));
                }
                if i + 4 <= data.len() && data[i + 2] == 0 && data[i + 3] == 1 {
                    return Some((i, 4));
                }
            }
            i += 1;
        }
        None
    }
}

impl<'a> Iterator for StartCodeNals<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<&'a [u8]> {
        let (start, code_len) = self.find_start_code(self.pos)?;
        let payload_start = start + code_len;
        let end = self
            .find_start_code(payload_start)
            .map(|(next, _)| next)
            .unwrap_or(self.data.len());
        self.pos = end;
        if payload_start >= end {
            return None;
        }
        Some(&self.data[payload_start..end])
    }
}
