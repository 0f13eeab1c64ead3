//! Metadata provider configuration
//!
//! Providers are external metadata sources the orchestrator can scrape.
//! The configured list is ordered; automation processes providers
//! strictly in this order.

use serde::{Deserialize, Serialize};

/// One configured metadata provider
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProviderConfig {
    /// Stable identifier, also matched against entity identifier endpoints
    pub id: String,
    /// Display name
    pub name: String,
    /// Whether automation scrapes this provider without being asked
    #[serde(default = "default_auto_scrape")]
    pub auto_scrape: bool,
}

fn default_auto_scrape() -> bool {
    true
}

/// Default two-provider configuration
pub fn default_providers() -> Vec<ProviderConfig> {
    vec![
        ProviderConfig {
            id: "metadata-one".to_string(),
            name: "Metadata One".to_string(),
            auto_scrape: true,
        },
        ProviderConfig {
            id: "metadata-two".to_string(),
            name: "Metadata Two".to_string(),
            auto_scrape: true,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_providers_are_ordered() {
        let providers = default_providers();
        assert_eq!(providers.len(), 2);
        assert_eq!(providers[0].id, "metadata-one");
        assert_eq!(providers[1].id, "metadata-two");
    }

    #[test]
    fn test_auto_scrape_defaults_true_on_deserialize() {
        let provider: ProviderConfig =
            serde_json::from_str(r#"{ "id": "x", "name": "X" }"#).unwrap();
        assert!(provider.auto_scrape);
    }
}
