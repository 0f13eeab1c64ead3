//! Scrape outcome classification
//!
//! Negative UI signals carry free text; classification matches a fixed
//! vocabulary case-insensitively. An ambiguous timeout counts as
//! not-found so the run keeps moving instead of failing.

use serde::Serialize;

use crate::ui_adapter::UiOutcome;

/// Substrings that mark a result text as a no-match signal
const NEGATIVE_SIGNALS: &[&str] = &[
    "no results",
    "not found",
    "failed",
    "error",
    "empty",
    "no matches",
    "unable to",
    "timeout",
];

/// Whether lowercased indicator text matches the negative vocabulary
pub fn is_negative_signal(lowered_text: &str) -> bool {
    NEGATIVE_SIGNALS.iter().any(|signal| lowered_text.contains(signal))
}

/// Classified outcome of one provider scrape attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ScrapeOutcome {
    /// Scrape produced data to apply
    Found,
    /// Provider has no match for this entity
    NotFound { reason: String },
    /// Provider skipped without attempting (already satisfied, user choice)
    Skipped { reason: String },
}

impl ScrapeOutcome {
    /// Classify a raw UI outcome signal
    pub fn classify(outcome: &UiOutcome) -> Self {
        match outcome {
            UiOutcome::Positive => ScrapeOutcome::Found,
            UiOutcome::Negative { text } => {
                let lowered = text.to_lowercase();
                if is_negative_signal(&lowered) {
                    ScrapeOutcome::NotFound { reason: lowered }
                } else {
                    // Indicator text outside the vocabulary is ambiguous,
                    // treated conservatively as not found
                    ScrapeOutcome::NotFound {
                        reason: format!("ambiguous signal: {}", lowered),
                    }
                }
            }
            UiOutcome::Timeout => ScrapeOutcome::NotFound {
                reason: "no outcome signal before timeout".to_string(),
            },
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, ScrapeOutcome::Found)
    }
}
