//! Perceptual-hash duplicate detection and merge planning
//!
//! Thumbnails are reduced to 64-bit average hashes; candidate pairs are
//! ranked by Hamming distance. The engine supports a local scan that
//! pages through the catalog and a server-side scan that defers to the
//! host's native duplicate finder.

pub mod ahash;
mod engine;
mod merge;

pub use engine::{CandidatePair, DuplicateEngine};
pub use merge::{plan_merge, MergePlan, MergeRequest};
