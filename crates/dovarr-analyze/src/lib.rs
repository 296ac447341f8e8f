//! dovarr-analyze: the analysis pipeline.
//!
//! Classifies a file into {non-DV, DV P5, DV P7/MEL, DV P7/FEL-Simple,
//! DV P7/FEL-Complex, DV P8} via staged, increasingly expensive probing:
//! container metadata first, then sampled bitstream inspection, then the
//! enhancement-layer luminance heuristic.

pub mod classifier;
pub mod fel;
pub mod pq;
pub mod rpu;

pub use classifier::{describe_verdict, Classifier};
pub use pq::pq_to_nits;
