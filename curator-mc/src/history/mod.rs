//! Automation run history
//!
//! Bounded newest-first log of automation runs with derived statistics.
//! The in-memory list is authoritative; persistence is deferred to
//! spawned tasks so recording never blocks a run's finalizer.

mod entry;
mod stats;
mod store;

pub use entry::{HistoryEntry, MetadataSummary, RunSummary};
pub use stats::Statistics;
pub use store::HistoryStore;
