//! Media, container, and stream probes.

pub mod ffprobe;
pub mod mediainfo;
pub mod mkvmerge;

pub use ffprobe::authoritative_frame_count;
pub use mediainfo::{container_frame_count, probe_media, MediaProbeInfo};
pub use mkvmerge::probe_container;
