//! Derived history statistics

use std::collections::HashMap;

use chrono::{Duration, Timelike, Utc};
use serde::Serialize;

use crate::history::entry::HistoryEntry;

/// How many distinct error messages the top-errors list keeps
const TOP_ERRORS: usize = 5;
/// Error messages are grouped on this many leading characters
const ERROR_GROUP_LEN: usize = 80;

/// Success rate over a window of runs
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct SuccessRate {
    pub total: usize,
    pub successes: usize,
    /// 0.0 when the window is empty
    pub rate: f64,
}

/// Per-provider usage aggregate
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProviderStats {
    pub runs: usize,
    pub successes: usize,
    pub avg_duration_ms: u64,
}

/// One grouped error message with its occurrence count
#[derive(Debug, Clone, Serialize)]
pub struct ErrorCount {
    pub message: String,
    pub count: usize,
}

/// Success/total counts for one hour of the day
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct HourBucket {
    pub total: usize,
    pub successes: usize,
}

/// Aggregate statistics over the history list
#[derive(Debug, Clone, Serialize)]
pub struct Statistics {
    pub overall: SuccessRate,
    pub last_20: SuccessRate,
    pub last_7_days: SuccessRate,
    pub last_30_days: SuccessRate,
    /// Keyed by provider id
    pub providers: HashMap<String, ProviderStats>,
    pub top_errors: Vec<ErrorCount>,
    /// Index 0 = midnight UTC
    pub hourly: Vec<HourBucket>,
}

impl Statistics {
    /// Compute statistics over `entries` (assumed newest-first)
    pub fn compute(entries: &[HistoryEntry]) -> Self {
        let now = Utc::now();
        let week_ago = now - Duration::days(7);
        let month_ago = now - Duration::days(30);

        let overall = rate(entries.iter());
        let last_20 = rate(entries.iter().take(20));
        let last_7_days = rate(entries.iter().filter(|e| e.timestamp >= week_ago));
        let last_30_days = rate(entries.iter().filter(|e| e.timestamp >= month_ago));

        let mut providers: HashMap<String, ProviderStats> = HashMap::new();
        let mut durations: HashMap<String, u64> = HashMap::new();
        for entry in entries {
            for source in &entry.sources_used {
                let stats = providers.entry(source.clone()).or_default();
                stats.runs += 1;
                if entry.success {
                    stats.successes += 1;
                }
                *durations.entry(source.clone()).or_default() += entry.duration_ms;
            }
        }
        for (id, stats) in providers.iter_mut() {
            if stats.runs > 0 {
                stats.avg_duration_ms = durations.get(id).copied().unwrap_or(0) / stats.runs as u64;
            }
        }

        let mut error_groups: HashMap<String, usize> = HashMap::new();
        for entry in entries {
            for error in &entry.errors {
                let key: String = error.to_lowercase().chars().take(ERROR_GROUP_LEN).collect();
                *error_groups.entry(key).or_default() += 1;
            }
        }
        let mut top_errors: Vec<ErrorCount> = error_groups
            .into_iter()
            .map(|(message, count)| ErrorCount { message, count })
            .collect();
        top_errors.sort_by(|a, b| b.count.cmp(&a.count).then(a.message.cmp(&b.message)));
        top_errors.truncate(TOP_ERRORS);

        let mut hourly = vec![HourBucket::default(); 24];
        for entry in entries {
            let bucket = &mut hourly[entry.timestamp.hour() as usize];
            bucket.total += 1;
            if entry.success {
                bucket.successes += 1;
            }
        }

        Self {
            overall,
            last_20,
            last_7_days,
            last_30_days,
            providers,
            top_errors,
            hourly,
        }
    }
}

fn rate<'a, I: Iterator<Item = &'a HistoryEntry>>(entries: I) -> SuccessRate {
    let mut total = 0usize;
    let mut successes = 0usize;
    for entry in entries {
        total += 1;
        if entry.success {
            successes += 1;
        }
    }
    let rate = if total == 0 {
        0.0
    } else {
        successes as f64 / total as f64
    };
    SuccessRate {
        total,
        successes,
        rate,
    }
}
