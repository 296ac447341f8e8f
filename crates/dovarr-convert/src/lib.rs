//! dovarr-convert: the conversion pipeline.
//!
//! A multi-stage orchestration of external tools that strips the
//! enhancement layer, rewrites the dynamic metadata to Profile 8.1, remuxes
//! against the original container, verifies frame-count integrity, and swaps
//! the converted file into place behind a backup.

pub mod convert;
pub mod failure;
pub mod mux;
pub mod options;
pub mod verify;

pub use convert::{ConvertOutcome, Converter, BACKUP_SUFFIX, PARTIAL_SUFFIX};
pub use failure::{classify_stderr, FailureKind};
pub use options::ConvertOptions;
