//! Conversion options.

use std::path::PathBuf;

/// Per-conversion options. Every field defaults independently; the daemon
/// uses the defaults and manual CLI invocations override what they need.
#[derive(Debug, Clone, Default)]
pub struct ConvertOptions {
    /// Skip the piped turbo path and extract the video track to disk first.
    /// Slower, but survives discs whose irregular timestamps break the pipe.
    /// The turbo path falls back to this automatically on stream errors.
    pub safe: bool,

    /// Convert even a complex-FEL file. Forced conversions always retain
    /// the backup no matter what `delete_backup` or the daemon's
    /// `backup_enabled` setting say.
    pub force: bool,

    /// Strip the RPU entirely, producing plain HDR10 instead of
    /// Profile 8.1. For players with no Dolby Vision support at all.
    pub hdr10: bool,

    /// Remove the backup after a successful swap. Ignored when `force` is
    /// set.
    pub delete_backup: bool,

    /// Write the converted file here instead of swapping it into place.
    /// The original is left untouched and no backup is made.
    pub output_dir: Option<PathBuf>,

    /// Override the scratch root for this conversion.
    pub temp_dir: Option<PathBuf>,
}

impl ConvertOptions {
    /// Whether a backup must survive the swap, given the daemon-level
    /// `backup_enabled` setting in force at swap time.
    pub fn keep_backup(&self, backup_enabled: bool) -> bool {
        self.force || (backup_enabled && !self.delete_backup)
    }
}
