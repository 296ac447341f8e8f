//! Discovery of the external tools the pipelines drive.

use std::path::PathBuf;
use std::process::Command;

use dovarr_core::{Error, Result};

/// Every binary dovarr shells out to, paired with the flag that makes it
/// print a version banner (mediainfo and mkvmerge spell it differently
/// from the ffmpeg family).
const REQUIRED_TOOLS: &[(&str, &str)] = &[
    ("mediainfo", "--Version"),
    ("ffmpeg", "-version"),
    ("ffprobe", "-version"),
    ("mkvmerge", "--version"),
    ("dovi_tool", "--version"),
];

/// Probe result for one external binary.
#[derive(Debug, Clone)]
pub struct ToolInfo {
    /// Command name as invoked.
    pub name: String,
    /// The binary exists and answered its version probe.
    pub available: bool,
    /// First line of the version banner, when one was printed.
    pub version: Option<String>,
    /// Resolved location on PATH.
    pub path: Option<PathBuf>,
}

/// Probe one tool by asking it for its version.
///
/// A missing binary, a spawn failure, and a non-zero exit all come back as
/// unavailable; this never errors.
pub fn check_tool(name: &str, version_arg: &str) -> ToolInfo {
    let mut info = ToolInfo {
        name: name.to_string(),
        available: false,
        version: None,
        path: None,
    };

    let Ok(output) = Command::new(name).arg(version_arg).output() else {
        return info;
    };
    if !output.status.success() {
        return info;
    }

    info.available = true;
    info.version = banner_line(&output.stdout);
    info.path = which::which(name).ok();
    info
}

/// The first non-empty line of a version banner.
fn banner_line(stdout: &[u8]) -> Option<String> {
    String::from_utf8_lossy(stdout)
        .lines()
        .find(|line| !line.trim().is_empty())
        .map(str::to_string)
}

/// Resolved paths to the external tools the pipelines invoke.
#[derive(Debug, Clone)]
pub struct ToolRegistry {
    pub mediainfo: PathBuf,
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
    pub mkvmerge: PathBuf,
    pub dovi_tool: PathBuf,
}

impl ToolRegistry {
    /// Discover tools on PATH. Unresolvable names fall back to the bare
    /// command so a later invocation reports the missing tool itself.
    pub fn discover() -> Self {
        let find = |name: &str| which::which(name).unwrap_or_else(|_| PathBuf::from(name));
        Self {
            mediainfo: find("mediainfo"),
            ffmpeg: find("ffmpeg"),
            ffprobe: find("ffprobe"),
            mkvmerge: find("mkvmerge"),
            dovi_tool: find("dovi_tool"),
        }
    }

    /// Check all required tools, reporting versions where available.
    pub fn check_all(&self) -> Vec<ToolInfo> {
        REQUIRED_TOOLS
            .iter()
            .map(|(name, arg)| check_tool(name, arg))
            .collect()
    }

    /// Require that every tool is present.
    ///
    /// # Errors
    ///
    /// Returns a validation error naming all missing tools.
    pub fn require_all(&self) -> Result<()> {
        let missing: Vec<&str> = REQUIRED_TOOLS
            .iter()
            .map(|(name, _)| *name)
            .filter(|name| which::which(name).is_err())
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(Error::Validation(format!(
                "missing required tools: {}",
                missing.join(", ")
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_tool_reports_unavailable() {
        let info = check_tool("dovarr_nonexistent_tool_12345", "--version");
        assert_eq!(info.name, "dovarr_nonexistent_tool_12345");
        assert!(!info.available);
        assert!(info.version.is_none());
        assert!(info.path.is_none());
    }

    #[test]
    fn banner_line_skips_leading_blanks() {
        assert_eq!(
            banner_line(b"\n  \nmkvmerge v80.0 ('Roundabout')\nmore\n"),
            Some("mkvmerge v80.0 ('Roundabout')".to_string())
        );
        assert_eq!(banner_line(b""), None);
        assert_eq!(banner_line(b"\n\n"), None);
    }

    #[test]
    fn discover_falls_back_to_bare_names() {
        let registry = ToolRegistry::discover();
        // Whether or not the tools are installed, the registry always holds
        // an invocable path or name.
        assert!(!registry.dovi_tool.as_os_str().is_empty());
        assert!(!registry.mkvmerge.as_os_str().is_empty());
    }
}
