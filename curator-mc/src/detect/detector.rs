//! Strategy cascade runner
//!
//! One generic loop evaluates strategies in descending confidence order
//! and stops at the first positive match. A pre-fetched entity snapshot
//! short-circuits the whole cascade at full confidence.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;
use tracing::debug;

use crate::client::{Entity, HostClient};
use crate::detect::strategies::{default_strategies, Detection, Strategy, StrategySpec};
use crate::providers::ProviderConfig;
use crate::ui_adapter::UiAdapter;

/// How long a DOM probe waits for a selector before falling through
const DOM_PROBE_TIMEOUT: Duration = Duration::from_millis(1500);

/// Cascading provider status detector
pub struct StatusDetector {
    client: HostClient,
    ui: Arc<dyn UiAdapter>,
    strategies: Vec<StrategySpec>,
    /// Protocol verdicts per (entity id, provider id), valid for the session.
    /// DOM verdicts are never cached.
    protocol_cache: Mutex<HashMap<(String, String), Detection>>,
}

impl StatusDetector {
    pub fn new(client: HostClient, ui: Arc<dyn UiAdapter>) -> Self {
        let mut strategies = default_strategies();
        strategies.sort_by(|a, b| b.confidence.cmp(&a.confidence));
        Self {
            client,
            ui,
            strategies,
            protocol_cache: Mutex::new(HashMap::new()),
        }
    }

    /// Detect whether `provider` has already scraped the entity
    ///
    /// With a pre-fetched snapshot the verdict derives purely from its
    /// identifier list at confidence 100 and no strategies run. Without
    /// one the cascade runs top-down; a protocol failure falls through
    /// to the DOM strategies.
    pub async fn detect_provider(
        &self,
        entity_id: &str,
        provider: &ProviderConfig,
        cached_entity: Option<&Entity>,
    ) -> Detection {
        if let Some(entity) = cached_entity {
            return Self::snapshot_verdict(entity, provider);
        }

        for spec in &self.strategies {
            match &spec.kind {
                Strategy::Protocol => {
                    if let Some(verdict) = self.protocol_verdict(entity_id, provider, spec).await {
                        if verdict.found {
                            return verdict;
                        }
                    }
                }
                Strategy::Dom { selectors } => {
                    match self.ui.wait_for_element(selectors, DOM_PROBE_TIMEOUT).await {
                        Ok(element) => {
                            return Detection {
                                found: true,
                                confidence: spec.confidence,
                                data: Some(json!({ "element": element.0 })),
                                strategy: spec.name,
                            };
                        }
                        Err(e) => {
                            debug!(
                                provider_id = %provider.id,
                                strategy = spec.name,
                                "DOM probe negative: {}", e
                            );
                        }
                    }
                }
            }
        }

        Detection::not_found()
    }

    /// Organized flag read straight off a snapshot
    pub fn detect_organized(entity: &Entity) -> Detection {
        Detection {
            found: entity.organized,
            confidence: 100,
            data: None,
            strategy: "cached-snapshot",
        }
    }

    /// Drop cached protocol verdicts for one entity
    pub fn invalidate_entity(&self, entity_id: &str) {
        if let Ok(mut cache) = self.protocol_cache.lock() {
            cache.retain(|(eid, _), _| eid != entity_id);
        }
    }

    fn snapshot_verdict(entity: &Entity, provider: &ProviderConfig) -> Detection {
        let found = entity.has_identifier_for(&provider.id);
        let data = found.then(|| {
            let ids: Vec<&str> = entity
                .identifiers
                .iter()
                .filter(|sid| {
                    sid.endpoint
                        .to_lowercase()
                        .contains(&provider.id.to_lowercase())
                })
                .map(|sid| sid.external_id.as_str())
                .collect();
            json!({ "external_ids": ids })
        });
        Detection {
            found,
            confidence: 100,
            data,
            strategy: "cached-snapshot",
        }
    }

    /// Protocol strategy: fetch the entity and inspect its identifier
    /// list. Returns None on host failure so the cascade degrades to DOM.
    async fn protocol_verdict(
        &self,
        entity_id: &str,
        provider: &ProviderConfig,
        spec: &StrategySpec,
    ) -> Option<Detection> {
        let key = (entity_id.to_string(), provider.id.clone());
        if let Ok(cache) = self.protocol_cache.lock() {
            if let Some(cached) = cache.get(&key) {
                return Some(cached.clone());
            }
        }

        match self.client.find_entity(entity_id).await {
            Ok(entity) => {
                let mut verdict = Self::snapshot_verdict(&entity, provider);
                verdict.confidence = spec.confidence;
                verdict.strategy = spec.name;
                if let Ok(mut cache) = self.protocol_cache.lock() {
                    cache.insert(key, verdict.clone());
                }
                Some(verdict)
            }
            Err(e) => {
                debug!(
                    entity_id = %entity_id,
                    provider_id = %provider.id,
                    "Protocol strategy unavailable, degrading to DOM: {}", e
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::EntityIdentifier;
    use crate::ui_adapter::{
        ApplyChoice, FieldSummary, OrganizeToggle, UiElement, UiError, UiOutcome,
    };
    use async_trait::async_trait;
    use curator_common::events::EventBus;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// UI mock that answers DOM probes for one selector
    struct ProbeUi {
        matching_selector: Option<String>,
        probes: AtomicUsize,
    }

    #[async_trait]
    impl UiAdapter for ProbeUi {
        async fn current_entity_id(&self) -> Option<String> {
            Some("1".to_string())
        }
        async fn is_edit_context_open(&self) -> bool {
            true
        }
        async fn open_edit_context(&self) -> Result<bool, UiError> {
            Ok(true)
        }
        async fn wait_for_element(
            &self,
            selectors: &[String],
            _timeout: Duration,
        ) -> Result<UiElement, UiError> {
            self.probes.fetch_add(1, Ordering::SeqCst);
            match &self.matching_selector {
                Some(sel) if selectors.iter().any(|s| s == sel) => Ok(UiElement(sel.clone())),
                _ => Err(UiError::Timeout(selectors.join(", "))),
            }
        }
        async fn click_element(&self, _element: &UiElement) -> Result<(), UiError> {
            Ok(())
        }
        async fn trigger_scrape(&self, _provider_id: &str) -> Result<(), UiError> {
            Ok(())
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
            Ok(())
        }
        async fn find_organize_toggle(&self) -> Result<OrganizeToggle, UiError> {
            Err(UiError::Unavailable("mock".to_string()))
        }
        async fn confirm_apply(&self, _provider_id: &str, _summary: &FieldSummary) -> ApplyChoice {
            ApplyChoice::Apply
        }
        async fn set_controls_enabled(&self, _enabled: bool) {}
    }

    fn provider() -> ProviderConfig {
        ProviderConfig {
            id: "metadata-one".to_string(),
            name: "Metadata One".to_string(),
            auto_scrape: true,
        }
    }

    fn unreachable_client() -> HostClient {
        // Port 1 refuses connections, forcing the protocol strategy to fail
        HostClient::new("http://127.0.0.1:1/graphql".to_string(), None, EventBus::new(16))
            .expect("client")
    }

    #[tokio::test]
    async fn test_cached_snapshot_short_circuits_cascade() {
        let ui = Arc::new(ProbeUi {
            matching_selector: Some(".scraped-badge".to_string()),
            probes: AtomicUsize::new(0),
        });
        let detector = StatusDetector::new(unreachable_client(), ui.clone());

        let entity = Entity {
            id: "1".to_string(),
            identifiers: vec![EntityIdentifier {
                endpoint: "https://metadata-one.example".to_string(),
                external_id: "abc".to_string(),
            }],
            ..Entity::default()
        };

        let detection = detector.detect_provider("1", &provider(), Some(&entity)).await;
        assert!(detection.found);
        assert_eq!(detection.confidence, 100);
        assert_eq!(detection.strategy, "cached-snapshot");
        // No strategy ran at all
        assert_eq!(ui.probes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_protocol_failure_degrades_to_dom() {
        let ui = Arc::new(ProbeUi {
            matching_selector: Some(".scraped-badge".to_string()),
            probes: AtomicUsize::new(0),
        });
        let detector = StatusDetector::new(unreachable_client(), ui.clone());

        let detection = detector.detect_provider("1", &provider(), None).await;
        assert!(detection.found);
        assert_eq!(detection.strategy, "dom-scraped-badge");
        assert_eq!(detection.confidence, 70);
    }

    #[tokio::test]
    async fn test_all_strategies_negative_reports_not_found() {
        let ui = Arc::new(ProbeUi {
            matching_selector: None,
            probes: AtomicUsize::new(0),
        });
        let detector = StatusDetector::new(unreachable_client(), ui.clone());

        let detection = detector.detect_provider("1", &provider(), None).await;
        assert!(!detection.found);
        assert_eq!(detection.confidence, 0);
        // Both DOM strategies were probed
        assert_eq!(ui.probes.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_detect_organized_reads_snapshot() {
        let mut entity = Entity::default();
        assert!(!StatusDetector::detect_organized(&entity).found);
        entity.organized = true;
        let detection = StatusDetector::detect_organized(&entity);
        assert!(detection.found);
        assert_eq!(detection.confidence, 100);
    }
}
