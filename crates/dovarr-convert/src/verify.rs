//! Frame-count verification of the muxed output.
//!
//! Container metadata is compared first; on a mismatch the source is
//! recounted at the stream level, which is slow but exact. Some discs ship
//! wrong statistics tags, so a container-level mismatch alone does not
//! condemn the output.

use std::path::Path;

use dovarr_core::{Error, Result};
use dovarr_av::probe::{authoritative_frame_count, container_frame_count};
use dovarr_av::tools::ToolRegistry;

/// Outcome of a successful verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verification {
    /// Frame count of the new file (container-reported).
    pub frame_count: u64,
    /// The container counts disagreed and the stream-level source count was
    /// needed to accept the output.
    pub via_authoritative: bool,
}

/// Verify the partial output against the source.
///
/// # Errors
///
/// [`Error::Verification`] when the counts cannot be reconciled; the caller
/// deletes the partial.
pub async fn verify_output(
    tools: &ToolRegistry,
    source: &Path,
    partial: &Path,
) -> Result<Verification> {
    let new_count = container_frame_count(tools, partial)
        .await?
        .ok_or_else(|| {
            Error::Verification("converted file reports no frame count".to_string())
        })?;

    let source_count = container_frame_count(tools, source).await?;

    if source_count == Some(new_count) {
        return Ok(Verification {
            frame_count: new_count,
            via_authoritative: false,
        });
    }

    tracing::info!(
        "container frame counts differ (source {:?}, new {}); \
         counting source packets",
        source_count,
        new_count
    );

    let exact = authoritative_frame_count(tools, source).await?;
    if exact == new_count {
        tracing::warn!(
            "source container metadata was wrong: tagged {:?} frames, \
             stream has {exact}",
            source_count
        );
        return Ok(Verification {
            frame_count: new_count,
            via_authoritative: true,
        });
    }

    Err(Error::Verification(format!(
        "frame count mismatch: source has {exact} frames, converted file has {new_count}"
    )))
}
