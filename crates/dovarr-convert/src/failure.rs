//! Tool-failure classification from captured stderr.
//!
//! The tool runner reports raw exit codes and stderr; this module decides
//! whether a failure is a disk/permission problem (terminal), a
//! bitstream/timestamp problem (retryable via the safe path), or something
//! else.

/// How a tool failure should be handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Disk full, permission denied, read-only filesystem. Not retryable.
    Critical,
    /// Bitstream, timestamp, or NAL trouble. The turbo path retries these
    /// through the safe path.
    Stream,
    /// Anything else.
    Unknown,
}

const CRITICAL_MARKERS: &[&str] = &[
    "No space left",
    "Permission denied",
    "Read-only file system",
];

const STREAM_MARKERS: &[&str] = &[
    "Invalid NAL",
    "Invalid data found",
    "non monotonically increasing",
    "non-monotonic",
    "timestamp",
    "Error while decoding",
    "corrupt",
];

/// Classify a failure from its stderr text.
pub fn classify_stderr(stderr: &str) -> FailureKind {
    if CRITICAL_MARKERS.iter().any(|m| stderr.contains(m)) {
        return FailureKind::Critical;
    }
    if STREAM_MARKERS
        .iter()
        .any(|m| stderr.to_lowercase().contains(&m.to_lowercase()))
    {
        return FailureKind::Stream;
    }
    FailureKind::Unknown
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disk_full_is_critical() {
        assert_eq!(
            classify_stderr("av_interleaved_write_frame(): No space left on device"),
            FailureKind::Critical
        );
    }

    #[test]
    fn permission_and_readonly_are_critical() {
        assert_eq!(
            classify_stderr("/temp/out.hevc: Permission denied"),
            FailureKind::Critical
        );
        assert_eq!(
            classify_stderr("cannot create: Read-only file system"),
            FailureKind::Critical
        );
    }

    #[test]
    fn seamless_branching_timestamps_are_stream() {
        assert_eq!(
            classify_stderr(
                "Application provided invalid, non monotonically increasing dts to muxer"
            ),
            FailureKind::Stream
        );
        assert_eq!(
            classify_stderr("Invalid NAL unit size in bitstream"),
            FailureKind::Stream
        );
    }

    #[test]
    fn critical_wins_over_stream() {
        assert_eq!(
            classify_stderr("Invalid NAL unit; also No space left on device"),
            FailureKind::Critical
        );
    }

    #[test]
    fn unrecognized_is_unknown() {
        assert_eq!(classify_stderr("something exploded"), FailureKind::Unknown);
        assert_eq!(classify_stderr(""), FailureKind::Unknown);
    }
}
