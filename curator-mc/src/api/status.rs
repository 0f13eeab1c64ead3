//! Status detection endpoints

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{ApiError, ApiResult, AppState};

#[derive(Debug, Deserialize)]
pub struct DetectRequest {
    pub entity_id: String,
}

/// POST /api/status/detect
///
/// Runs a full status detection for the entity and returns the fresh
/// snapshot.
pub async fn detect_status(
    State(state): State<AppState>,
    Json(payload): Json<DetectRequest>,
) -> ApiResult<Json<Value>> {
    if payload.entity_id.trim().is_empty() {
        return Err(ApiError::BadRequest("entity_id must not be empty".to_string()));
    }
    let snapshot = state
        .tracker
        .detect_current_status(&payload.entity_id)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(Json(json!(snapshot)))
}

/// GET /api/status — most recent snapshot
pub async fn current_status(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    match state.tracker.snapshot() {
        Some(snapshot) => Ok(Json(json!(snapshot))),
        None => Err(ApiError::NotFound("No status detected yet".to_string())),
    }
}

/// GET /api/status/completion
pub async fn completion(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    match state.tracker.completion() {
        Some(report) => Ok(Json(json!(report))),
        None => Err(ApiError::NotFound("No status detected yet".to_string())),
    }
}

#[derive(Debug, Deserialize)]
pub struct OrganizedRequest {
    pub entity_id: String,
    pub organized: bool,
}

/// PUT /api/status/organized
///
/// Sets the organized flag through the host protocol and merges the
/// change into the tracked snapshot without a full re-detect.
pub async fn set_organized(
    State(state): State<AppState>,
    Json(payload): Json<OrganizedRequest>,
) -> ApiResult<Json<Value>> {
    state
        .client
        .set_organized(&payload.entity_id, payload.organized)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    state
        .tracker
        .update_status(crate::detect::StatusAspect::Organized(payload.organized));
    Ok(Json(json!({ "organized": payload.organized })))
}

/// Build status routes
pub fn status_routes() -> Router<AppState> {
    Router::new()
        .route("/api/status", get(current_status))
        .route("/api/status/detect", post(detect_status))
        .route("/api/status/completion", get(completion))
        .route("/api/status/organized", axum::routing::put(set_organized))
}
