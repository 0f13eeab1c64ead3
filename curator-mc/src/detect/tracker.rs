//! Status tracker
//!
//! Holds the most recent per-entity status snapshot and keeps subscribers
//! informed. One entity fetch feeds all per-provider detections so a
//! refresh costs a single host round-trip.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use curator_common::events::{CuratorEvent, EventBus};

use crate::client::HostClient;
use crate::detect::detector::StatusDetector;
use crate::providers::ProviderConfig;
use crate::Result;

/// Per-provider scrape status within a snapshot
#[derive(Debug, Clone, Serialize)]
pub struct ProviderStatus {
    pub scraped: bool,
    pub confidence: u8,
    pub strategy: String,
    pub timestamp: DateTime<Utc>,
}

/// Aggregated status of one entity
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub entity_id: String,
    pub url: Option<String>,
    pub organized: bool,
    /// Keyed by provider id
    pub providers: HashMap<String, ProviderStatus>,
    pub last_automation: Option<DateTime<Utc>>,
    pub last_update: DateTime<Utc>,
}

/// Single-aspect status update applied without a host round-trip
#[derive(Debug, Clone)]
pub enum StatusAspect {
    Organized(bool),
    LastAutomation(DateTime<Utc>),
    Provider { id: String, status: ProviderStatus },
}

/// Completion summary derived from the current snapshot
#[derive(Debug, Clone, Serialize)]
pub struct CompletionReport {
    pub percentage: u8,
    pub recommendations: Vec<String>,
}

/// How long a fetched snapshot may serve repeated refreshes
const ENTITY_SNAPSHOT_TTL: std::time::Duration = std::time::Duration::from_secs(5);

type StatusCallback = Box<dyn Fn(&StatusSnapshot) + Send + Sync>;

/// Tracks the current entity's metadata status
pub struct StatusTracker {
    client: HostClient,
    detector: Arc<StatusDetector>,
    event_bus: EventBus,
    providers: Mutex<Vec<ProviderConfig>>,
    snapshot: Mutex<Option<StatusSnapshot>>,
    callbacks: Mutex<HashMap<u64, StatusCallback>>,
    next_handle: AtomicU64,
}

impl StatusTracker {
    pub fn new(
        client: HostClient,
        detector: Arc<StatusDetector>,
        event_bus: EventBus,
        providers: Vec<ProviderConfig>,
    ) -> Self {
        Self {
            client,
            detector,
            event_bus,
            providers: Mutex::new(providers),
            snapshot: Mutex::new(None),
            callbacks: Mutex::new(HashMap::new()),
            next_handle: AtomicU64::new(1),
        }
    }

    /// Replace the configured provider list
    pub fn set_providers(&self, providers: Vec<ProviderConfig>) {
        if let Ok(mut guard) = self.providers.lock() {
            *guard = providers;
        }
    }

    pub fn providers(&self) -> Vec<ProviderConfig> {
        self.providers
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    /// Drop cached detection verdicts for an entity so the next refresh
    /// re-derives them
    pub fn invalidate(&self, entity_id: &str) {
        self.detector.invalidate_entity(entity_id);
    }

    /// Current snapshot, if any refresh has happened
    pub fn snapshot(&self) -> Option<StatusSnapshot> {
        self.snapshot.lock().ok().and_then(|guard| guard.clone())
    }

    /// Run a full status detection for `entity_id`
    ///
    /// Fetches the entity once and derives every provider verdict plus
    /// the organized flag from that snapshot. Replaces the stored
    /// snapshot, notifies subscribers and emits `StatusRefreshed`.
    pub async fn detect_current_status(&self, entity_id: &str) -> Result<StatusSnapshot> {
        // Coalesced fetch: concurrent refreshes share one request
        let entity = self
            .client
            .entity_cached(entity_id, ENTITY_SNAPSHOT_TTL)
            .await
            .map_err(|e| curator_common::Error::Internal(e.to_string()))?;

        let now = Utc::now();
        let mut providers = HashMap::new();
        for provider in self.providers() {
            let detection = self
                .detector
                .detect_provider(entity_id, &provider, Some(&entity))
                .await;
            providers.insert(
                provider.id.clone(),
                ProviderStatus {
                    scraped: detection.found,
                    confidence: detection.confidence,
                    strategy: detection.strategy.to_string(),
                    timestamp: now,
                },
            );
        }

        let last_automation = self
            .snapshot()
            .filter(|s| s.entity_id == entity_id)
            .and_then(|s| s.last_automation);

        let snapshot = StatusSnapshot {
            entity_id: entity_id.to_string(),
            url: entity.url.clone(),
            organized: StatusDetector::detect_organized(&entity).found,
            providers,
            last_automation,
            last_update: now,
        };

        self.replace_and_notify(snapshot.clone());

        let completion = self.completion();
        self.event_bus.emit_lossy(CuratorEvent::StatusRefreshed {
            entity_id: entity_id.to_string(),
            completion_percentage: completion.map(|c| c.percentage).unwrap_or(0),
            timestamp: now,
        });

        Ok(snapshot)
    }

    /// Merge a single aspect into the stored snapshot in place
    ///
    /// Returns false when no snapshot exists yet.
    pub fn update_status(&self, aspect: StatusAspect) -> bool {
        let updated = {
            let mut guard = match self.snapshot.lock() {
                Ok(guard) => guard,
                Err(_) => return false,
            };
            let Some(snapshot) = guard.as_mut() else {
                return false;
            };
            match aspect {
                StatusAspect::Organized(organized) => snapshot.organized = organized,
                StatusAspect::LastAutomation(ts) => snapshot.last_automation = Some(ts),
                StatusAspect::Provider { id, status } => {
                    snapshot.providers.insert(id, status);
                }
            }
            snapshot.last_update = Utc::now();
            snapshot.clone()
        };
        self.notify(&updated);
        true
    }

    /// Completion percentage plus next-step recommendations
    ///
    /// Aspects counted: one per configured provider, plus the organized
    /// flag. Returns None before the first refresh.
    pub fn completion(&self) -> Option<CompletionReport> {
        let snapshot = self.snapshot()?;
        let providers = self.providers();
        let total = providers.len() + 1;
        let mut satisfied = 0usize;
        let mut recommendations = Vec::new();

        for provider in &providers {
            let scraped = snapshot
                .providers
                .get(&provider.id)
                .map(|s| s.scraped)
                .unwrap_or(false);
            if scraped {
                satisfied += 1;
            } else {
                recommendations.push(format!("Scrape metadata from {}", provider.name));
            }
        }
        if snapshot.organized {
            satisfied += 1;
        } else {
            recommendations.push("Mark the entity as organized".to_string());
        }

        let percentage = ((satisfied as f64 / total as f64) * 100.0).round() as u8;
        Some(CompletionReport {
            percentage,
            recommendations,
        })
    }

    /// Subscribe to snapshot updates; returns a handle for removal
    pub fn on_status_update<F>(&self, callback: F) -> u64
    where
        F: Fn(&StatusSnapshot) + Send + Sync + 'static,
    {
        let handle = self.next_handle.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut callbacks) = self.callbacks.lock() {
            callbacks.insert(handle, Box::new(callback));
        }
        handle
    }

    /// Remove a previously registered callback
    pub fn remove_status_update_callback(&self, handle: u64) -> bool {
        self.callbacks
            .lock()
            .map(|mut callbacks| callbacks.remove(&handle).is_some())
            .unwrap_or(false)
    }

    fn replace_and_notify(&self, snapshot: StatusSnapshot) {
        if let Ok(mut guard) = self.snapshot.lock() {
            *guard = Some(snapshot.clone());
        }
        self.notify(&snapshot);
    }

    /// Each callback is isolated: a panic in one must not stop the rest
    fn notify(&self, snapshot: &StatusSnapshot) {
        let Ok(callbacks) = self.callbacks.lock() else {
            return;
        };
        for (handle, callback) in callbacks.iter() {
            let result = std::panic::catch_unwind(AssertUnwindSafe(|| callback(snapshot)));
            if result.is_err() {
                warn!(handle = handle, "Status callback panicked, continuing");
            } else {
                debug!(handle = handle, "Status callback notified");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::default_providers;
    use crate::ui_adapter::NullUiAdapter;
    use std::sync::atomic::AtomicUsize;

    fn tracker() -> StatusTracker {
        let bus = EventBus::new(16);
        let client =
            HostClient::new("http://127.0.0.1:1/graphql".to_string(), None, bus.clone())
                .expect("client");
        let detector = Arc::new(StatusDetector::new(client.clone(), Arc::new(NullUiAdapter)));
        StatusTracker::new(client, detector, bus, default_providers())
    }

    fn provider_status(scraped: bool) -> ProviderStatus {
        ProviderStatus {
            scraped,
            confidence: 100,
            strategy: "cached-snapshot".to_string(),
            timestamp: Utc::now(),
        }
    }

    fn seeded_snapshot() -> StatusSnapshot {
        StatusSnapshot {
            entity_id: "42".to_string(),
            url: None,
            organized: false,
            providers: HashMap::new(),
            last_automation: None,
            last_update: Utc::now(),
        }
    }

    #[test]
    fn test_update_status_without_snapshot_is_rejected() {
        let tracker = tracker();
        assert!(!tracker.update_status(StatusAspect::Organized(true)));
    }

    #[test]
    fn test_update_status_merges_single_aspect() {
        let tracker = tracker();
        *tracker.snapshot.lock().unwrap() = Some(seeded_snapshot());

        assert!(tracker.update_status(StatusAspect::Organized(true)));
        assert!(tracker.update_status(StatusAspect::Provider {
            id: "metadata-one".to_string(),
            status: provider_status(true),
        }));

        let snapshot = tracker.snapshot().unwrap();
        assert!(snapshot.organized);
        assert!(snapshot.providers["metadata-one"].scraped);
        // Untouched aspects survive the merge
        assert_eq!(snapshot.entity_id, "42");
    }

    #[test]
    fn test_completion_counts_providers_and_organized() {
        let tracker = tracker();
        let mut snapshot = seeded_snapshot();
        snapshot
            .providers
            .insert("metadata-one".to_string(), provider_status(true));
        snapshot
            .providers
            .insert("metadata-two".to_string(), provider_status(false));
        *tracker.snapshot.lock().unwrap() = Some(snapshot);

        let report = tracker.completion().unwrap();
        // 1 of 3 aspects satisfied
        assert_eq!(report.percentage, 33);
        assert_eq!(report.recommendations.len(), 2);
    }

    #[test]
    fn test_panicking_callback_does_not_stop_others() {
        let tracker = tracker();
        *tracker.snapshot.lock().unwrap() = Some(seeded_snapshot());

        let reached = Arc::new(AtomicUsize::new(0));
        let reached_clone = reached.clone();

        tracker.on_status_update(|_| panic!("boom"));
        tracker.on_status_update(move |_| {
            reached_clone.fetch_add(1, Ordering::SeqCst);
        });

        tracker.update_status(StatusAspect::Organized(true));
        assert_eq!(reached.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_callback_removal() {
        let tracker = tracker();
        let handle = tracker.on_status_update(|_| {});
        assert!(tracker.remove_status_update_callback(handle));
        assert!(!tracker.remove_status_update_callback(handle));
    }
}
