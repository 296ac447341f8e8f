//! Query modules, one per catalog entity.

pub mod admin;
pub mod current;
pub mod discovered;
pub mod failed;
pub mod processed;
pub mod scanned;
pub mod settings;
