//! History endpoints

use axum::{
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{ApiResult, AppState};

#[derive(Debug, Deserialize)]
pub struct ListParams {
    /// Maximum entries to return (default 100)
    pub limit: Option<usize>,
}

/// GET /api/history
pub async fn list_history(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Json<Value> {
    let limit = params.limit.unwrap_or(100);
    Json(json!({ "history": state.history.list(limit), "total": state.history.len() }))
}

/// GET /api/history/stats
pub async fn history_statistics(State(state): State<AppState>) -> Json<Value> {
    Json(json!(state.history.statistics()))
}

/// GET /api/history/export
pub async fn export_history(State(state): State<AppState>) -> Json<Value> {
    Json(state.history.export())
}

/// POST /api/history/import
///
/// Accepts an export bundle or a bare entry array; invalid entries are
/// dropped, duplicates skipped.
pub async fn import_history(
    State(state): State<AppState>,
    Json(payload): Json<Value>,
) -> ApiResult<Json<Value>> {
    let imported = state.history.import(&payload);
    Ok(Json(json!({ "imported": imported, "total": state.history.len() })))
}

#[derive(Debug, Deserialize)]
pub struct ClearOldParams {
    /// Age threshold in days (default 30)
    pub days: Option<i64>,
}

/// POST /api/history/clear-old
pub async fn clear_old_history(
    State(state): State<AppState>,
    Json(params): Json<ClearOldParams>,
) -> Json<Value> {
    let days = params.days.unwrap_or(30);
    let removed = state.history.clear_older_than_days(days);
    Json(json!({ "removed": removed, "total": state.history.len() }))
}

/// Build history routes
pub fn history_routes() -> Router<AppState> {
    Router::new()
        .route("/api/history", get(list_history))
        .route("/api/history/stats", get(history_statistics))
        .route("/api/history/export", get(export_history))
        .route("/api/history/import", post(import_history))
        .route("/api/history/clear-old", post(clear_old_history))
}
