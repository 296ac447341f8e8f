//! Scratch-space management for conversions and probes.
//!
//! Every conversion gets its own directory under the configured temp root,
//! named with a recognizable prefix plus the process id and a monotonic
//! sequence number so concurrent runs never collide and orphans from
//! crashed runs can be detected on startup.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use dovarr_core::{Error, Result};

/// Prefix for per-conversion scratch directories.
pub const SCRATCH_DIR_PREFIX: &str = "convert_";

/// Prefixes for loose probe scratch files cleaned up on startup.
const ORPHAN_FILE_PREFIXES: &[&str] = &["probe_", "inspect_"];

static SEQUENCE: AtomicU64 = AtomicU64::new(0);

fn next_sequence() -> u64 {
    SEQUENCE.fetch_add(1, Ordering::Relaxed)
}

/// A per-conversion scratch directory, removed on drop (success and failure
/// paths alike).
#[derive(Debug)]
pub struct ConvertWorkspace {
    dir: PathBuf,
}

impl ConvertWorkspace {
    /// Create a fresh scratch directory under the temp root.
    pub fn create(temp_root: &Path) -> Result<Self> {
        let dir = temp_root.join(format!(
            "{SCRATCH_DIR_PREFIX}{}_{}",
            std::process::id(),
            next_sequence()
        ));
        std::fs::create_dir_all(&dir)
            .map_err(|e| Error::Workspace(format!("failed to create {}: {e}", dir.display())))?;
        Ok(Self { dir })
    }

    /// The scratch directory path.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// A file path inside the scratch directory.
    pub fn file(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }
}

impl Drop for ConvertWorkspace {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_dir_all(&self.dir) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!("failed to remove scratch dir {}: {e}", self.dir.display());
            }
        }
    }
}

/// A uniquely named loose scratch file path under the temp root, e.g. for a
/// probe sample. The caller owns removal.
pub fn scratch_file(temp_root: &Path, prefix: &str, extension: &str) -> PathBuf {
    temp_root.join(format!(
        "{prefix}{}_{}.{extension}",
        std::process::id(),
        next_sequence()
    ))
}

/// Remove orphaned scratch directories and probe files left behind by a
/// crashed run. Returns the number of entries removed.
pub fn clean_orphans(temp_root: &Path) -> usize {
    let entries = match std::fs::read_dir(temp_root) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!("cannot access temp dir for cleanup: {e}");
            return 0;
        }
    };

    let mut count = 0;
    for entry in entries.flatten() {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        let path = entry.path();

        if path.is_dir() && name.starts_with(SCRATCH_DIR_PREFIX) {
            tracing::info!("cleaning up orphaned work directory: {}", path.display());
            if std::fs::remove_dir_all(&path).is_ok() {
                count += 1;
            }
        } else if path.is_file() && ORPHAN_FILE_PREFIXES.iter().any(|p| name.starts_with(p)) {
            if std::fs::remove_file(&path).is_ok() {
                count += 1;
            }
        }
    }

    count
}
