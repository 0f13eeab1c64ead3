//! Duplicate detection endpoints

use axum::{
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::duplicates::MergeRequest;
use crate::{ApiError, ApiResult, AppState};

#[derive(Debug, Deserialize)]
pub struct LocalScanParams {
    /// Max entities to visit this pass; absent scans the whole catalog
    pub limit: Option<usize>,
}

/// POST /api/duplicates/scan/local
///
/// Pages through the catalog hashing thumbnails; long-running, progress
/// flows over `/events`. `?limit=` caps the slice scanned in one call.
pub async fn local_scan(
    State(state): State<AppState>,
    Query(params): Query<LocalScanParams>,
) -> ApiResult<Json<Value>> {
    let candidates = state
        .duplicates
        .local_scan(params.limit)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(Json(json!({ "candidates": candidates })))
}

#[derive(Debug, Deserialize)]
pub struct ServerScanRequest {
    /// Host-side hash accuracy parameter
    pub accuracy: Option<i32>,
    /// Duration tolerance in seconds
    pub duration_tolerance: Option<f64>,
}

/// POST /api/duplicates/scan/server
pub async fn server_scan(
    State(state): State<AppState>,
    Json(payload): Json<ServerScanRequest>,
) -> ApiResult<Json<Value>> {
    let groups = state
        .duplicates
        .server_scan(
            payload.accuracy.unwrap_or(0),
            payload.duration_tolerance.unwrap_or(0.0),
        )
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(Json(json!({ "groups": groups })))
}

#[derive(Debug, Deserialize)]
pub struct CandidateParams {
    /// Hamming distance ceiling; configured default when absent
    pub threshold: Option<u32>,
}

/// GET /api/duplicates/candidates
pub async fn candidates(
    State(state): State<AppState>,
    Query(params): Query<CandidateParams>,
) -> ApiResult<Json<Value>> {
    let candidates = state
        .duplicates
        .find_candidates(params.threshold)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(Json(json!({ "candidates": candidates })))
}

#[derive(Debug, Deserialize)]
pub struct IgnoreRequest {
    pub entity_a: String,
    pub entity_b: String,
}

/// POST /api/duplicates/ignore
pub async fn ignore_pair(
    State(state): State<AppState>,
    Json(payload): Json<IgnoreRequest>,
) -> ApiResult<Json<Value>> {
    if payload.entity_a == payload.entity_b {
        return Err(ApiError::BadRequest(
            "Cannot ignore an entity paired with itself".to_string(),
        ));
    }
    state
        .duplicates
        .ignore_pair(&payload.entity_a, &payload.entity_b)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(Json(json!({ "ignored": true })))
}

#[derive(Debug, Deserialize)]
pub struct IgnoreGroupRequest {
    pub entity_ids: Vec<String>,
}

/// POST /api/duplicates/ignore-group
///
/// Suppresses an entire server-scan group at once.
pub async fn ignore_group(
    State(state): State<AppState>,
    Json(payload): Json<IgnoreGroupRequest>,
) -> ApiResult<Json<Value>> {
    let mut distinct = payload.entity_ids.clone();
    distinct.sort();
    distinct.dedup();
    if distinct.len() < 2 {
        return Err(ApiError::BadRequest(
            "A group needs at least two distinct entities".to_string(),
        ));
    }
    state
        .duplicates
        .ignore_group(&payload.entity_ids)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(Json(json!({ "ignored": true })))
}

/// POST /api/duplicates/merge
///
/// Source deletion requires both `delete_sources` and `delete_confirmed`.
pub async fn merge(
    State(state): State<AppState>,
    Json(payload): Json<MergeRequest>,
) -> ApiResult<Json<Value>> {
    let plan = state
        .duplicates
        .merge(&payload)
        .await
        .map_err(ApiError::Common)?;
    Ok(Json(json!({ "merged": true, "plan": plan })))
}

/// Build duplicate detection routes
pub fn duplicate_routes() -> Router<AppState> {
    Router::new()
        .route("/api/duplicates/scan/local", post(local_scan))
        .route("/api/duplicates/scan/server", post(server_scan))
        .route("/api/duplicates/candidates", get(candidates))
        .route("/api/duplicates/ignore", post(ignore_pair))
        .route("/api/duplicates/ignore-group", post(ignore_group))
        .route("/api/duplicates/merge", post(merge))
}
