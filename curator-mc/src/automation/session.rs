//! Automation session state machine
//!
//! # State Progression
//! Idle → OpeningEditContext → CheckingStatus → per-provider
//! (Scraping → CreatingEntities → Applying) → Saving → (Organizing →
//! Saving)? → Finalizing → Completed | Cancelled | Failed

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::ui_adapter::FieldSummary;

/// Automation run state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunState {
    Idle,
    OpeningEditContext,
    CheckingStatus,
    Scraping,
    CreatingEntities,
    Applying,
    Saving,
    Organizing,
    Finalizing,
    Completed,
    Cancelled,
    Failed,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Completed | RunState::Cancelled | RunState::Failed)
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RunState::Idle => "IDLE",
            RunState::OpeningEditContext => "OPENING_EDIT_CONTEXT",
            RunState::CheckingStatus => "CHECKING_STATUS",
            RunState::Scraping => "SCRAPING",
            RunState::CreatingEntities => "CREATING_ENTITIES",
            RunState::Applying => "APPLYING",
            RunState::Saving => "SAVING",
            RunState::Organizing => "ORGANIZING",
            RunState::Finalizing => "FINALIZING",
            RunState::Completed => "COMPLETED",
            RunState::Cancelled => "CANCELLED",
            RunState::Failed => "FAILED",
        };
        write!(f, "{}", name)
    }
}

/// Per-run force-rescrape options
#[derive(Debug, Clone, Default)]
pub struct RescrapeOptions {
    /// Scrape every provider even when already satisfied
    pub force_rescrape: bool,
    /// Provider ids to scrape even when satisfied
    pub per_provider_force: Vec<String>,
}

impl RescrapeOptions {
    /// Whether `provider_id` must be scraped despite a satisfied status
    pub fn forces(&self, provider_id: &str) -> bool {
        self.force_rescrape || self.per_provider_force.iter().any(|id| id == provider_id)
    }
}

/// One automation run's live state
#[derive(Debug, Clone, Serialize)]
pub struct AutomationSession {
    pub run_id: Uuid,
    pub entity_id: String,
    /// Entity title at the time of the run, when known
    pub entity_name: Option<String>,
    pub state: RunState,
    /// Provider currently being processed, if any
    pub current_provider: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    /// How many earlier runs were recorded for the same entity
    pub retry_count: u32,
    /// Provider ids whose metadata was applied
    pub sources_used: Vec<String>,
    pub errors: Vec<String>,
    /// Whether the entity ended the run organized
    pub organized: bool,
    /// Fields of the last applied provider, for the run summary
    pub applied_summary: Option<FieldSummary>,
    /// Human-readable outcome per processed provider
    pub provider_outcomes: BTreeMap<String, String>,
    /// Milliseconds spent per state, keyed by state name
    pub timings_ms: BTreeMap<String, u64>,
    #[serde(skip)]
    state_entered: DateTime<Utc>,
}

impl AutomationSession {
    pub fn new(entity_id: &str) -> Self {
        let now = Utc::now();
        Self {
            run_id: Uuid::new_v4(),
            entity_id: entity_id.to_string(),
            entity_name: None,
            state: RunState::Idle,
            current_provider: None,
            started_at: now,
            ended_at: None,
            retry_count: 0,
            sources_used: Vec::new(),
            errors: Vec::new(),
            organized: false,
            applied_summary: None,
            provider_outcomes: BTreeMap::new(),
            timings_ms: BTreeMap::new(),
            state_entered: now,
        }
    }

    /// Move to `state`, accumulating time spent in the previous state
    pub fn transition_to(&mut self, state: RunState) {
        let now = Utc::now();
        let spent = (now - self.state_entered).num_milliseconds().max(0) as u64;
        *self
            .timings_ms
            .entry(self.state.to_string())
            .or_default() += spent;

        info!(
            run_id = %self.run_id,
            from = %self.state,
            to = %state,
            "Automation state transition"
        );
        self.state = state;
        self.state_entered = now;
        if state.is_terminal() {
            self.ended_at = Some(now);
        }
    }

    pub fn duration_ms(&self) -> u64 {
        let end = self.ended_at.unwrap_or_else(Utc::now);
        (end - self.started_at).num_milliseconds().max(0) as u64
    }

    pub fn record_error(&mut self, error: impl Into<String>) {
        self.errors.push(error.into());
    }

    pub fn record_source(&mut self, provider_id: &str) {
        if !self.sources_used.iter().any(|s| s == provider_id) {
            self.sources_used.push(provider_id.to_string());
        }
    }

    /// Note how a provider's pass ended; later notes replace earlier ones
    pub fn record_outcome(&mut self, provider_id: &str, reason: impl Into<String>) {
        self.provider_outcomes
            .insert(provider_id.to_string(), reason.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_accumulates_timings_and_terminal_sets_end() {
        let mut session = AutomationSession::new("e1");
        session.transition_to(RunState::OpeningEditContext);
        session.transition_to(RunState::Completed);

        assert!(session.timings_ms.contains_key("IDLE"));
        assert!(session.timings_ms.contains_key("OPENING_EDIT_CONTEXT"));
        assert!(session.ended_at.is_some());
        assert!(session.state.is_terminal());
    }

    #[test]
    fn test_rescrape_forces() {
        let options = RescrapeOptions {
            force_rescrape: false,
            per_provider_force: vec!["metadata-two".to_string()],
        };
        assert!(!options.forces("metadata-one"));
        assert!(options.forces("metadata-two"));

        let all = RescrapeOptions { force_rescrape: true, ..RescrapeOptions::default() };
        assert!(all.forces("metadata-one"));
    }

    #[test]
    fn test_sources_deduped() {
        let mut session = AutomationSession::new("e1");
        session.record_source("a");
        session.record_source("a");
        assert_eq!(session.sources_used, vec!["a"]);
    }
}
