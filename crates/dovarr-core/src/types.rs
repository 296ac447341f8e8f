//! Shared domain types: Dolby Vision profiles, enhancement-layer classes,
//! classifier verdicts, and container track metadata.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Dolby Vision profile as detected on a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DoViProfile {
    Profile5,
    Profile7,
    Profile8,
    Unknown,
}

impl DoViProfile {
    /// Short label stored in the catalog (`dovi_profile` column).
    pub fn label(&self) -> &'static str {
        match self {
            DoViProfile::Profile5 => "5",
            DoViProfile::Profile7 => "7",
            DoViProfile::Profile8 => "8",
            DoViProfile::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for DoViProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DoViProfile::Unknown => write!(f, "DoVi (unknown profile)"),
            p => write!(f, "Profile {}", p.label()),
        }
    }
}

/// Enhancement-layer class of a Profile 7 file.
///
/// `Unknown` means classification was attempted but inconclusive; the
/// scheduler treats it as [`ELType::FelComplex`] when selecting candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ELType {
    Mel,
    FelSimple,
    FelComplex,
    Unknown,
}

impl ELType {
    /// Catalog label, also matched against dovi_tool's RPU dump markers.
    pub fn label(&self) -> &'static str {
        match self {
            ELType::Mel => "MEL",
            ELType::FelSimple => "FEL_SIMPLE",
            ELType::FelComplex => "FEL_COMPLEX",
            ELType::Unknown => "UNKNOWN",
        }
    }

    /// Parse a catalog label back into the enum.
    pub fn from_label(label: &str) -> Self {
        match label {
            "MEL" => ELType::Mel,
            "FEL_SIMPLE" => ELType::FelSimple,
            "FEL_COMPLEX" => ELType::FelComplex,
            _ => ELType::Unknown,
        }
    }

    /// Whether automatic conversion is lossless-safe for this EL class.
    ///
    /// Unknown is deliberately unsafe: an inconclusive probe is handled like
    /// a complex FEL.
    pub fn safe_for_auto(&self) -> bool {
        matches!(self, ELType::Mel | ELType::FelSimple)
    }
}

impl std::fmt::Display for ELType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// HDR format family for files without Dolby Vision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HdrFormat {
    DolbyVision,
    Hdr10Plus,
    Hdr10,
    Hlg,
    Sdr,
}

/// Result of classifying one media file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileVerdict {
    pub path: PathBuf,
    pub has_dovi: bool,
    pub profile: Option<DoViProfile>,
    pub el_type: Option<ELType>,
    pub video_codec: Option<String>,
    pub hdr_format: HdrFormat,
    pub file_size: u64,
    pub is_mkv: bool,
    /// The FEL probe fell back to the 1000-nit default because MaxCLL was
    /// absent or implausibly low.
    pub default_peak_used: bool,
}

impl FileVerdict {
    /// A file needs conversion iff it carries dual-layer Profile 7.
    pub fn needs_conversion(&self) -> bool {
        self.has_dovi && self.profile == Some(DoViProfile::Profile7)
    }

    /// Safe for unattended conversion: Profile 7 with a MEL or simple FEL.
    pub fn safe_to_auto_convert(&self) -> bool {
        self.needs_conversion()
            && self.el_type.map(|el| el.safe_for_auto()).unwrap_or(false)
    }

    /// Profile label stored in the scanned table, if any.
    pub fn profile_label(&self) -> Option<&'static str> {
        self.profile.map(|p| p.label())
    }

    /// EL label stored in the scanned/discovered tables, if any.
    pub fn el_type_label(&self) -> Option<&'static str> {
        self.el_type.map(|el| el.label())
    }
}

/// Video-track metadata read from the Matroska container.
///
/// Produced once per conversion by the container probe and handed unchanged
/// to the remux step so the output reproduces the source's track metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoTrackInfo {
    /// mkvmerge track id of the video track.
    pub track_id: u32,
    /// Minimum timestamp of the track in nanoseconds; non-zero on discs with
    /// delayed video starts.
    pub delay_ns: i64,
    /// BCP-47/ISO language tag, `und` when the container carries none.
    pub language: String,
    /// Track name, empty when the container carries none.
    pub track_name: String,
    /// Frame rate in the literal form mkvmerge accepts, e.g. `23.976`.
    pub fps: String,
    /// Frame count advertised by container statistics tags; 0 when absent.
    pub frame_count_container: u64,
}

/// Operating mode for the scheduler, persisted as the `auto_process_mode`
/// setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoProcessMode {
    Off,
    All,
    Movies,
    Shows,
}

impl AutoProcessMode {
    pub fn parse(value: &str) -> Self {
        match value {
            "all" => AutoProcessMode::All,
            "movies" => AutoProcessMode::Movies,
            "shows" => AutoProcessMode::Shows,
            _ => AutoProcessMode::Off,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AutoProcessMode::Off => "off",
            AutoProcessMode::All => "all",
            AutoProcessMode::Movies => "movies",
            AutoProcessMode::Shows => "shows",
        }
    }
}

/// A recently imported file reported by an external media manager.
#[derive(Debug, Clone)]
pub struct RecentImport {
    pub path: PathBuf,
    pub title: String,
    pub imported_at: DateTime<Utc>,
    pub external_id: i64,
}
