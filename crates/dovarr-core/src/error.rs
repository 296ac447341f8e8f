//! Unified error type for the dovarr application.
//!
//! All crates funnel their failures into [`Error`]. The converter-facing
//! variants mirror the failure taxonomy the scheduler acts on: stream errors
//! are retried through the safe path, critical I/O errors are terminal, and
//! `NotApplicable` is recorded without marking the file failed.

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type covering all failure modes in dovarr.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A required external tool is not on PATH.
    #[error("tool not found: {tool}")]
    ToolNotFound { tool: String },

    /// An external tool exited unsuccessfully.
    #[error("tool error [{tool}]: {message}")]
    Tool { tool: String, message: String },

    /// A child process exceeded its per-call ceiling.
    #[error("tool timed out [{tool}] after {secs}s")]
    Timeout { tool: String, secs: u64 },

    /// Failed to parse tool output.
    #[error("failed to parse {tool} output: {message}")]
    Parse { tool: String, message: String },

    /// An I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A database operation failed.
    #[error("database error: {0}")]
    Database(String),

    /// Configuration or request data failed validation.
    #[error("validation error: {0}")]
    Validation(String),

    /// The file is not a Profile 7 conversion candidate (including
    /// already-converted Profile 8 files). Recorded as scanned, never as
    /// failed.
    #[error("not applicable: {0}")]
    NotApplicable(String),

    /// The input file is missing, unreadable, or not an MKV.
    #[error("input error: {0}")]
    Input(String),

    /// A sub-tool failed during classification.
    #[error("probe error: {0}")]
    Probe(String),

    /// Disk full, permission denied, or read-only filesystem during
    /// conversion. Non-retryable; operator intervention required.
    #[error("critical I/O failure: {0}")]
    CriticalIo(String),

    /// Bitstream or timestamp trouble in the turbo pipeline. Retried via the
    /// safe path.
    #[error("stream error: {0}")]
    Stream(String),

    /// Frame-count verification against the authoritative source failed.
    #[error("verification failed: {0}")]
    Verification(String),

    /// Not enough free space in the scratch directory to start a conversion.
    #[error("insufficient disk space: {required} bytes required, {available} available")]
    DiskSpace { required: u64, available: u64 },

    /// Scratch workspace management failure.
    #[error("workspace error: {0}")]
    Workspace(String),
}

impl Error {
    /// Convenience constructor for [`Error::ToolNotFound`].
    pub fn tool_not_found(tool: impl Into<String>) -> Self {
        Self::ToolNotFound { tool: tool.into() }
    }

    /// Convenience constructor for [`Error::Tool`].
    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Tool {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Convenience constructor for [`Error::Parse`].
    pub fn parse(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Parse {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Convenience constructor for [`Error::Database`].
    pub fn database(message: impl Into<String>) -> Self {
        Self::Database(message.into())
    }

    /// Whether the scheduler should record this failure in the failed table.
    ///
    /// `NotApplicable` files are recorded as scanned instead so they are not
    /// rescanned every cycle.
    pub fn is_recordable_failure(&self) -> bool {
        !matches!(self, Error::NotApplicable(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_display() {
        let err = Error::tool("mkvmerge", "exit code 2");
        assert_eq!(err.to_string(), "tool error [mkvmerge]: exit code 2");
    }

    #[test]
    fn timeout_display() {
        let err = Error::Timeout {
            tool: "dovi_tool".into(),
            secs: 7200,
        };
        assert_eq!(err.to_string(), "tool timed out [dovi_tool] after 7200s");
    }

    #[test]
    fn not_applicable_is_not_a_failure() {
        assert!(!Error::NotApplicable("already Profile 8".into()).is_recordable_failure());
        assert!(Error::Stream("pipe broke".into()).is_recordable_failure());
    }

    #[test]
    fn io_from_std() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err = Error::from(io_err);
        assert!(matches!(err, Error::Io(_)));
    }
}
