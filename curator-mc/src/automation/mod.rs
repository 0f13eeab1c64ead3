//! Automation run orchestration
//!
//! Drives a full metadata run for one entity: open the edit context,
//! check provider status, scrape each unsatisfied provider, create
//! missing referenced entities, apply, save, optionally organize, then
//! finalize. Cancellation and skip-current-provider are cooperative and
//! honored at every suspension point.

mod orchestrator;
mod outcome;
mod session;
mod thumbnail;

pub use orchestrator::{AutomationOrchestrator, RunError, RunReport};
pub use outcome::{is_negative_signal, ScrapeOutcome};
pub use session::{AutomationSession, RescrapeOptions, RunState};
