//! Provider status detection
//!
//! Determines whether each configured metadata provider has already
//! scraped an entity, using a cascade of tagged strategies evaluated in
//! descending confidence order. Protocol-backed strategies run first;
//! DOM-based strategies through the `UiAdapter` serve as fallback when
//! the protocol layer is unavailable.

mod detector;
mod strategies;
pub mod tracker;

pub use detector::StatusDetector;
pub use strategies::{Detection, Strategy, StrategySpec, default_strategies};
pub use tracker::{CompletionReport, ProviderStatus, StatusAspect, StatusSnapshot, StatusTracker};
