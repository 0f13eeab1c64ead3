//! History entry shape and sanitization bounds

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ui_adapter::FieldSummary;

/// At most this many error strings are kept per entry
const MAX_ERRORS: usize = 10;
/// Each kept error string is truncated to this many characters
const MAX_ERROR_LEN: usize = 200;
/// At most this many distinct sources are kept per entry
const MAX_SOURCES: usize = 5;
/// Bound on free-text identifier fields
const MAX_TEXT_LEN: usize = 128;
/// At most this many per-provider outcome notes are kept per entry
const MAX_OUTCOMES: usize = 10;

/// Bounded digest of the metadata a run applied
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetadataSummary {
    pub title: Option<String>,
    pub performer_count: usize,
    pub tag_count: usize,
    pub studio: Option<String>,
    pub date: Option<String>,
    pub has_details: bool,
}

impl From<&FieldSummary> for MetadataSummary {
    fn from(fields: &FieldSummary) -> Self {
        Self {
            title: fields.title.clone(),
            performer_count: fields.performers.len(),
            tag_count: fields.tags.len(),
            studio: fields.studio.clone(),
            date: fields.date.clone(),
            has_details: fields.has_details,
        }
    }
}

/// Outcome summary handed to the store when a run finishes
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub success: bool,
    pub cancelled: bool,
    /// Entity title at the time of the run, when known
    pub entity_name: Option<String>,
    /// How many earlier runs were recorded for the same entity
    pub retry_count: u32,
    pub duration_ms: u64,
    /// Provider ids that contributed applied metadata
    pub sources_used: Vec<String>,
    pub errors: Vec<String>,
    pub organized: bool,
    /// Digest of the last applied provider's fields
    pub metadata: Option<MetadataSummary>,
    /// Milliseconds spent per run state, keyed by state name
    pub timings_ms: BTreeMap<String, u64>,
    /// Human-readable outcome per processed provider
    pub provider_outcomes: BTreeMap<String, String>,
}

/// One recorded automation run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: Uuid,
    pub entity_id: String,
    #[serde(default)]
    pub entity_name: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub success: bool,
    #[serde(default)]
    pub cancelled: bool,
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default)]
    pub sources_used: Vec<String>,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub organized: bool,
    #[serde(default)]
    pub metadata: Option<MetadataSummary>,
    #[serde(default)]
    pub timings_ms: BTreeMap<String, u64>,
    #[serde(default)]
    pub provider_outcomes: BTreeMap<String, String>,
}

impl HistoryEntry {
    /// Build a bounded entry from a raw run summary
    pub fn from_summary(entity_id: &str, summary: RunSummary) -> Self {
        let mut sources: Vec<String> = Vec::new();
        for source in summary.sources_used {
            let source = truncate(&source, MAX_TEXT_LEN);
            if !sources.contains(&source) {
                sources.push(source);
            }
            if sources.len() == MAX_SOURCES {
                break;
            }
        }

        let errors = summary
            .errors
            .into_iter()
            .take(MAX_ERRORS)
            .map(|e| truncate(&e, MAX_ERROR_LEN))
            .collect();

        Self {
            id: Uuid::new_v4(),
            entity_id: truncate(entity_id, MAX_TEXT_LEN),
            entity_name: summary.entity_name.map(|n| truncate(&n, MAX_TEXT_LEN)),
            timestamp: Utc::now(),
            success: summary.success,
            cancelled: summary.cancelled,
            retry_count: summary.retry_count,
            duration_ms: summary.duration_ms,
            sources_used: sources,
            errors,
            organized: summary.organized,
            metadata: summary.metadata.map(bound_metadata),
            timings_ms: summary.timings_ms,
            provider_outcomes: bound_outcomes(summary.provider_outcomes),
        }
    }

    /// Re-apply bounds to an entry arriving from import
    pub fn rebound(mut self) -> Self {
        self.entity_id = truncate(&self.entity_id, MAX_TEXT_LEN);
        self.entity_name = self.entity_name.map(|n| truncate(&n, MAX_TEXT_LEN));
        self.sources_used.truncate(MAX_SOURCES);
        self.sources_used = self
            .sources_used
            .iter()
            .map(|s| truncate(s, MAX_TEXT_LEN))
            .collect();
        self.errors.truncate(MAX_ERRORS);
        self.errors = self
            .errors
            .iter()
            .map(|e| truncate(e, MAX_ERROR_LEN))
            .collect();
        self.metadata = self.metadata.map(bound_metadata);
        self.provider_outcomes = bound_outcomes(std::mem::take(&mut self.provider_outcomes));
        self
    }
}

fn bound_metadata(mut metadata: MetadataSummary) -> MetadataSummary {
    metadata.title = metadata.title.map(|t| truncate(&t, MAX_TEXT_LEN));
    metadata.studio = metadata.studio.map(|s| truncate(&s, MAX_TEXT_LEN));
    metadata.date = metadata.date.map(|d| truncate(&d, MAX_TEXT_LEN));
    metadata
}

fn bound_outcomes(outcomes: BTreeMap<String, String>) -> BTreeMap<String, String> {
    outcomes
        .into_iter()
        .take(MAX_OUTCOMES)
        .map(|(provider, reason)| {
            (truncate(&provider, MAX_TEXT_LEN), truncate(&reason, MAX_ERROR_LEN))
        })
        .collect()
}

fn truncate(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_errors_are_bounded() {
        let summary = RunSummary {
            errors: (0..20).map(|i| format!("{i}-{}", "x".repeat(500))).collect(),
            ..RunSummary::default()
        };
        let entry = HistoryEntry::from_summary("e1", summary);
        assert_eq!(entry.errors.len(), 10);
        assert!(entry.errors.iter().all(|e| e.chars().count() <= 200));
    }

    #[test]
    fn test_outcome_and_metadata_fields_are_bounded() {
        let summary = RunSummary {
            entity_name: Some("n".repeat(500)),
            retry_count: 3,
            metadata: Some(MetadataSummary {
                title: Some("t".repeat(500)),
                ..MetadataSummary::default()
            }),
            timings_ms: BTreeMap::from([("SCRAPING".to_string(), 1200)]),
            provider_outcomes: (0..20)
                .map(|i| (format!("provider-{i:02}"), "r".repeat(500)))
                .collect(),
            ..RunSummary::default()
        };
        let entry = HistoryEntry::from_summary("e1", summary);

        assert_eq!(entry.entity_name.as_ref().unwrap().chars().count(), 128);
        assert_eq!(entry.retry_count, 3);
        assert_eq!(entry.metadata.unwrap().title.unwrap().chars().count(), 128);
        assert_eq!(entry.timings_ms["SCRAPING"], 1200);
        assert_eq!(entry.provider_outcomes.len(), 10);
        assert!(entry
            .provider_outcomes
            .values()
            .all(|r| r.chars().count() <= 200));
    }

    #[test]
    fn test_sources_are_deduped_and_bounded() {
        let summary = RunSummary {
            sources_used: vec![
                "a".into(),
                "a".into(),
                "b".into(),
                "c".into(),
                "d".into(),
                "e".into(),
                "f".into(),
            ],
            ..RunSummary::default()
        };
        let entry = HistoryEntry::from_summary("e1", summary);
        assert_eq!(entry.sources_used, vec!["a", "b", "c", "d", "e"]);
    }
}
