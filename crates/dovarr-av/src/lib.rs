//! dovarr-av: external-tool plumbing.
//!
//! Command execution with timeouts and two-process pipelines, tool
//! discovery, scratch-workspace management, Annex-B extraction helpers, and
//! the container/media/stream probes built on top of them.

pub mod command;
pub mod extract;
pub mod probe;
pub mod tools;
pub mod workspace;

pub use command::{PipeCommand, PipeOutput, ToolCommand, ToolOutput};
pub use tools::{check_tool, ToolInfo, ToolRegistry};
pub use workspace::{clean_orphans, scratch_file, ConvertWorkspace, SCRATCH_DIR_PREFIX};
