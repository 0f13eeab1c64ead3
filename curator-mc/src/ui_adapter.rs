//! UI adapter contract
//!
//! The orchestrator never touches markup directly: every simulated UI
//! interaction goes through this trait so the vocabulary of positive and
//! negative outcome signals is swappable per host UI version. Production
//! builds wire in a browser-bridge implementation; tests use mocks.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// UI adapter errors
#[derive(Debug, Error)]
pub enum UiError {
    /// No element matched any selector within the deadline
    #[error("Timed out waiting for element: {0}")]
    Timeout(String),

    /// The adapter's backing surface is gone or rejected the action
    #[error("UI unavailable: {0}")]
    Unavailable(String),
}

/// Opaque handle to a UI element resolved by the adapter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UiElement(pub String);

/// State of the organized toggle as observed in the edit context
#[derive(Debug, Clone)]
pub struct OrganizeToggle {
    pub checked: bool,
    pub element: UiElement,
}

/// Outcome signal observed after triggering a scrape
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiOutcome {
    /// Positive signal: scrape result modal / edit context became visible
    Positive,
    /// Negative signal: failure/no-match indicator text appeared
    Negative { text: String },
    /// Neither signal appeared before the deadline
    Timeout,
}

/// Summary of scraped fields presented for apply confirmation
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct FieldSummary {
    pub title: Option<String>,
    pub performers: Vec<String>,
    pub tags: Vec<String>,
    pub studio: Option<String>,
    pub date: Option<String>,
    pub has_details: bool,
    pub thumbnail_url: Option<String>,
}

/// User's choice when asked to confirm applying scraped data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyChoice {
    /// Apply this provider's reconciled fields
    Apply,
    /// Skip this provider, continue with the next
    SkipProvider,
    /// Cancel the entire run
    CancelAll,
}

/// Capabilities the orchestrator drives through
///
/// Implementations must not block the event loop; every wait is bounded.
#[async_trait]
pub trait UiAdapter: Send + Sync {
    /// Entity id the UI is currently showing, None when navigated away
    async fn current_entity_id(&self) -> Option<String>;

    /// Whether the edit context (edit panel/tab) is open
    async fn is_edit_context_open(&self) -> bool;

    /// Open the edit context; returns false when it could not be opened
    async fn open_edit_context(&self) -> Result<bool, UiError>;

    /// Wait until one of `selectors` matches, bounded by `timeout`
    async fn wait_for_element(
        &self,
        selectors: &[String],
        timeout: Duration,
    ) -> Result<UiElement, UiError>;

    /// Scroll into view, focus and click
    async fn click_element(&self, element: &UiElement) -> Result<(), UiError>;

    /// Trigger the provider-specific scrape action
    async fn trigger_scrape(&self, provider_id: &str) -> Result<(), UiError>;

    /// Observe the scrape outcome signal, bounded by `timeout`
    async fn detect_outcome(&self, timeout: Duration) -> UiOutcome;

    /// All currently visible create-missing-entity affordances
    /// (unmatched performers/studios/tags)
    async fn find_creation_affordances(&self) -> Vec<UiElement>;

    /// The apply-scraped-data affordance, if visible
    async fn find_apply_affordance(&self) -> Option<UiElement>;

    /// The save affordance of the edit context, if visible
    async fn find_save_affordance(&self) -> Option<UiElement>;

    /// Read the scraped-field panel into a summary for confirmation
    async fn scraped_summary(&self) -> FieldSummary;

    /// Select or deselect the scraped thumbnail in the result panel
    async fn set_thumbnail_selected(&self, selected: bool) -> Result<(), UiError>;

    /// The organized toggle in the edit context
    async fn find_organize_toggle(&self) -> Result<OrganizeToggle, UiError>;

    /// Ask the interactive user to confirm applying `summary`
    async fn confirm_apply(&self, provider_id: &str, summary: &FieldSummary) -> ApplyChoice;

    /// Enable or disable automation-owned controls (restored on finalize)
    async fn set_controls_enabled(&self, enabled: bool);
}

/// Adapter for headless deployments with no UI attached
///
/// Every wait resolves immediately to its negative/absent form, so an
/// automation run started against it fails fast at the navigation check
/// instead of hanging.
pub struct NullUiAdapter;

#[async_trait]
impl UiAdapter for NullUiAdapter {
    async fn current_entity_id(&self) -> Option<String> {
        None
    }

    async fn is_edit_context_open(&self) -> bool {
        false
    }

    async fn open_edit_context(&self) -> Result<bool, UiError> {
        Ok(false)
    }

    async fn wait_for_element(
        &self,
        selectors: &[String],
        _timeout: Duration,
    ) -> Result<UiElement, UiError> {
        Err(UiError::Timeout(selectors.join(", ")))
    }

    async fn click_element(&self, _element: &UiElement) -> Result<(), UiError> {
        Err(UiError::Unavailable("no UI attached".to_string()))
    }

    async fn trigger_scrape(&self, _provider_id: &str) -> Result<(), UiError> {
        Err(UiError::Unavailable("no UI attached".to_string()))
    }

    async fn detect_outcome(&self, _timeout: Duration) -> UiOutcome {
        UiOutcome::Timeout
    }

    async fn find_creation_affordances(&self) -> Vec<UiElement> {
        Vec::new()
    }

    async fn find_apply_affordance(&self) -> Option<UiElement> {
        None
    }

    async fn find_save_affordance(&self) -> Option<UiElement> {
        None
    }

    async fn scraped_summary(&self) -> FieldSummary {
        FieldSummary::default()
    }

    async fn set_thumbnail_selected(&self, _selected: bool) -> Result<(), UiError> {
        Err(UiError::Unavailable("no UI attached".to_string()))
    }

    async fn find_organize_toggle(&self) -> Result<OrganizeToggle, UiError> {
        Err(UiError::Unavailable("no UI attached".to_string()))
    }

    async fn confirm_apply(&self, _provider_id: &str, _summary: &FieldSummary) -> ApplyChoice {
        ApplyChoice::SkipProvider
    }

    async fn set_controls_enabled(&self, _enabled: bool) {}
}
