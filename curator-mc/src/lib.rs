//! curator-mc library interface for testing
//!
//! Exposes public APIs for integration testing

pub mod api;
pub mod automation;
pub mod client;
pub mod config;
pub mod db;
pub mod detect;
pub mod duplicates;
pub mod error;
pub mod history;
pub mod providers;
pub mod ui_adapter;

pub use crate::error::{ApiError, ApiResult};
pub use curator_common::Result;

use axum::Router;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::sync::RwLock;

use curator_common::events::EventBus;

use crate::automation::AutomationOrchestrator;
use crate::client::HostClient;
use crate::detect::StatusTracker;
use crate::duplicates::DuplicateEngine;
use crate::history::HistoryStore;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    /// Event bus for SSE broadcasting
    pub event_bus: EventBus,
    /// Host catalog client
    pub client: HostClient,
    /// Status tracker
    pub tracker: Arc<StatusTracker>,
    /// Automation run history
    pub history: Arc<HistoryStore>,
    /// Automation orchestrator
    pub orchestrator: Arc<AutomationOrchestrator>,
    /// Duplicate detection engine
    pub duplicates: Arc<DuplicateEngine>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Last error for diagnostic purposes
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db: SqlitePool,
        event_bus: EventBus,
        client: HostClient,
        tracker: Arc<StatusTracker>,
        history: Arc<HistoryStore>,
        orchestrator: Arc<AutomationOrchestrator>,
        duplicates: Arc<DuplicateEngine>,
    ) -> Self {
        Self {
            db,
            event_bus,
            client,
            tracker,
            history,
            orchestrator,
            duplicates,
            startup_time: Utc::now(),
            last_error: Arc::new(RwLock::new(None)),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::automation_routes())
        .merge(api::status_routes())
        .merge(api::history_routes())
        .merge(api::duplicate_routes())
        .merge(api::settings_routes())
        .merge(api::health_routes())
        .merge(api::sse_routes())
        .with_state(state)
}
