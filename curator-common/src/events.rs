//! Event types for the Curator event system
//!
//! Every subsystem that needs to react to host traffic or automation
//! progress subscribes to the broadcast [`EventBus`] instead of polling.
//! The `ReadPerformed` / `MutationPerformed` signals are emitted by the
//! host API client after every request (success or failure) so consumers
//! such as cache invalidation and save settle-waits can synchronize.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Curator event types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CuratorEvent {
    /// A read (non-mutating) host request completed
    ReadPerformed {
        operation: String,
        success: bool,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A mutating host request completed
    MutationPerformed {
        operation: String,
        success: bool,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Automation run started for an entity
    AutomationStarted {
        run_id: Uuid,
        entity_id: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Automation run progress update
    AutomationProgress {
        run_id: Uuid,
        state: String,
        provider: Option<String>,
        current: usize,
        total: usize,
        message: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Automation run completed successfully
    AutomationCompleted {
        run_id: Uuid,
        entity_id: String,
        sources_used: Vec<String>,
        duration_ms: u64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Automation run failed
    AutomationFailed {
        run_id: Uuid,
        entity_id: String,
        error_message: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Automation run cancelled by the user
    AutomationCancelled {
        run_id: Uuid,
        entity_id: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Status tracker produced a fresh snapshot for an entity
    StatusRefreshed {
        entity_id: String,
        completion_percentage: u8,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Duplicate scan progress (local scan pages through the catalog)
    DuplicateScanProgress {
        scanned: usize,
        total: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Duplicate scan completed
    DuplicateScanCompleted {
        candidates: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl CuratorEvent {
    /// Short event name used for SSE event types
    pub fn name(&self) -> &'static str {
        match self {
            CuratorEvent::ReadPerformed { .. } => "ReadPerformed",
            CuratorEvent::MutationPerformed { .. } => "MutationPerformed",
            CuratorEvent::AutomationStarted { .. } => "AutomationStarted",
            CuratorEvent::AutomationProgress { .. } => "AutomationProgress",
            CuratorEvent::AutomationCompleted { .. } => "AutomationCompleted",
            CuratorEvent::AutomationFailed { .. } => "AutomationFailed",
            CuratorEvent::AutomationCancelled { .. } => "AutomationCancelled",
            CuratorEvent::StatusRefreshed { .. } => "StatusRefreshed",
            CuratorEvent::DuplicateScanProgress { .. } => "DuplicateScanProgress",
            CuratorEvent::DuplicateScanCompleted { .. } => "DuplicateScanCompleted",
        }
    }
}

/// Broadcast event bus shared across subsystems
///
/// Thin wrapper around `tokio::sync::broadcast`; cloning is cheap and all
/// clones share the same channel.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<CuratorEvent>,
    capacity: usize,
}

impl EventBus {
    /// Create a new EventBus with the given channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<CuratorEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` or an error when no subscriber is
    /// listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: CuratorEvent,
    ) -> std::result::Result<usize, broadcast::error::SendError<CuratorEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring the case where nobody is listening
    pub fn emit_lossy(&self, event: CuratorEvent) {
        let _ = self.tx.send(event);
    }

    /// Channel capacity this bus was created with
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_emit_and_receive() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.emit_lossy(CuratorEvent::ReadPerformed {
            operation: "findEntity".to_string(),
            success: true,
            timestamp: chrono::Utc::now(),
        });

        let event = rx.recv().await.unwrap();
        assert_eq!(event.name(), "ReadPerformed");
    }

    #[tokio::test]
    async fn test_emit_lossy_without_subscribers() {
        let bus = EventBus::new(16);
        // Must not panic or error when no receiver exists
        bus.emit_lossy(CuratorEvent::DuplicateScanCompleted {
            candidates: 0,
            timestamp: chrono::Utc::now(),
        });
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_all_clones_share_channel() {
        let bus = EventBus::new(16);
        let clone = bus.clone();
        let mut rx = clone.subscribe();

        bus.emit_lossy(CuratorEvent::MutationPerformed {
            operation: "entityUpdate".to_string(),
            success: true,
            timestamp: chrono::Utc::now(),
        });

        let event = rx.recv().await.unwrap();
        assert_eq!(event.name(), "MutationPerformed");
    }
}
