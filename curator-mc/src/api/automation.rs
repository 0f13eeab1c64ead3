//! Automation control endpoints

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{error, info};

use crate::automation::RescrapeOptions;
use crate::{ApiError, ApiResult, AppState};

/// Request payload for starting a run
#[derive(Debug, Deserialize)]
pub struct StartRequest {
    pub entity_id: String,
    /// Scrape every provider even when already satisfied
    #[serde(default)]
    pub force_rescrape: bool,
    /// Provider ids to scrape even when satisfied
    #[serde(default)]
    pub per_provider_force: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct StartResponse {
    pub started: bool,
    pub entity_id: String,
}

/// POST /api/automation/start
///
/// Kicks off a run in the background; progress flows over `/events`.
/// Refused with 409 while another run is in progress.
pub async fn start_automation(
    State(state): State<AppState>,
    Json(payload): Json<StartRequest>,
) -> ApiResult<Json<StartResponse>> {
    if payload.entity_id.trim().is_empty() {
        return Err(ApiError::BadRequest("entity_id must not be empty".to_string()));
    }
    if state.orchestrator.is_in_progress() {
        return Err(ApiError::Conflict(
            "An automation run is already in progress".to_string(),
        ));
    }

    let options = RescrapeOptions {
        force_rescrape: payload.force_rescrape,
        per_provider_force: payload.per_provider_force,
    };
    let orchestrator = state.orchestrator.clone();
    let entity_id = payload.entity_id.clone();
    let last_error = state.last_error.clone();
    tokio::spawn(async move {
        match orchestrator.run(&entity_id, options).await {
            Ok(report) if !report.success => {
                if let Some(message) = report.session.errors.last() {
                    *last_error.write().await = Some(message.clone());
                }
            }
            Ok(_) => {}
            Err(e) => {
                error!("Automation run refused: {}", e);
                *last_error.write().await = Some(e.to_string());
            }
        }
    });

    info!(entity_id = %payload.entity_id, "Automation run accepted");
    Ok(Json(StartResponse {
        started: true,
        entity_id: payload.entity_id,
    }))
}

/// POST /api/automation/cancel
pub async fn cancel_automation(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    if !state.orchestrator.cancel() {
        return Err(ApiError::NotFound("No automation run in progress".to_string()));
    }
    Ok(Json(json!({ "cancelled": true })))
}

/// POST /api/automation/skip
///
/// Skips only the provider currently being processed; the run continues.
pub async fn skip_current_provider(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    if !state.orchestrator.skip_current_provider() {
        return Err(ApiError::NotFound("No provider currently processing".to_string()));
    }
    Ok(Json(json!({ "skipped": true })))
}

/// GET /api/automation/status
pub async fn automation_status(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "in_progress": state.orchestrator.is_in_progress(),
        "session": state.orchestrator.last_session(),
    }))
}

/// Build automation control routes
pub fn automation_routes() -> Router<AppState> {
    Router::new()
        .route("/api/automation/start", post(start_automation))
        .route("/api/automation/cancel", post(cancel_automation))
        .route("/api/automation/skip", post(skip_current_provider))
        .route("/api/automation/status", get(automation_status))
}
