//! Detection strategy vocabulary
//!
//! Each strategy is tagged with a confidence score and a kind. The
//! cascade runner in `detector.rs` is generic over this list: ordering
//! and short-circuiting live there, not in per-strategy code.

use serde::Serialize;
use serde_json::Value;

/// How a strategy gathers its evidence
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Strategy {
    /// Validate against the host's query protocol (identifier lists)
    Protocol,
    /// Probe the host UI for any of these selectors
    Dom { selectors: Vec<String> },
}

/// A tagged strategy: name, confidence score, evidence kind
#[derive(Debug, Clone)]
pub struct StrategySpec {
    pub name: &'static str,
    /// 0-100; cascade runs in descending order of this score
    pub confidence: u8,
    pub kind: Strategy,
}

/// Result of one detection pass
#[derive(Debug, Clone, Serialize)]
pub struct Detection {
    pub found: bool,
    /// Confidence of the strategy that produced the verdict
    pub confidence: u8,
    /// Strategy-specific evidence (identifier payload, matched selector)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Name of the deciding strategy
    pub strategy: &'static str,
}

impl Detection {
    pub fn not_found() -> Self {
        Detection {
            found: false,
            confidence: 0,
            data: None,
            strategy: "none",
        }
    }
}

/// Built-in strategy cascade for provider detection
///
/// Protocol validation outranks every DOM probe; among DOM probes the
/// scraped-badge marker outranks the weaker link heuristic.
pub fn default_strategies() -> Vec<StrategySpec> {
    vec![
        StrategySpec {
            name: "protocol-identifier",
            confidence: 100,
            kind: Strategy::Protocol,
        },
        StrategySpec {
            name: "dom-scraped-badge",
            confidence: 70,
            kind: Strategy::Dom {
                selectors: vec![
                    ".scraped-badge".to_string(),
                    "[data-scraped=\"true\"]".to_string(),
                ],
            },
        },
        StrategySpec {
            name: "dom-provider-link",
            confidence: 40,
            kind: Strategy::Dom {
                selectors: vec![".external-link".to_string()],
            },
        },
    ]
}
