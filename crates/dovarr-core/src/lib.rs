//! dovarr-core: shared types, the unified error, and process configuration.
//!
//! Everything in this crate is plain data or pure logic; no I/O beyond the
//! environment reads in [`config`].

pub mod config;
pub mod error;
pub mod types;

pub use config::{ArrInstance, Config};
pub use error::{Error, Result};
pub use types::{
    AutoProcessMode, DoViProfile, ELType, FileVerdict, HdrFormat, RecentImport, VideoTrackInfo,
};
