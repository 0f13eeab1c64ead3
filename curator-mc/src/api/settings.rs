//! Settings, profile and backup endpoints

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use crate::config::is_valid_value;
use crate::db::{profiles, settings};
use crate::providers::ProviderConfig;
use crate::{ApiError, ApiResult, AppState};

/// GET /api/settings
pub async fn get_settings(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let db = &state.db;
    Ok(Json(json!({
        "host_endpoint": settings::host_endpoint(db).await.map_err(ApiError::Common)?,
        "has_api_key": settings::host_api_key(db).await.map_err(ApiError::Common)?.is_some(),
        "providers": settings::providers(db).await,
        "auto_apply": settings::auto_apply(db).await,
        "auto_organize": settings::auto_organize(db).await,
        "scrape_outcome_timeout_ms": settings::scrape_outcome_timeout_ms(db).await,
        "save_settle_timeout_ms": settings::save_settle_timeout_ms(db).await,
        "settle_delay_ms": settings::settle_delay_ms(db).await,
        "duplicate_distance_threshold": settings::duplicate_distance_threshold(db).await,
    })))
}

/// Partial settings update; absent fields stay unchanged
#[derive(Debug, Deserialize)]
pub struct UpdateSettingsRequest {
    pub host_endpoint: Option<String>,
    pub host_api_key: Option<String>,
    pub providers: Option<Vec<ProviderConfig>>,
    pub auto_apply: Option<bool>,
    pub auto_organize: Option<bool>,
    pub scrape_outcome_timeout_ms: Option<u64>,
    pub save_settle_timeout_ms: Option<u64>,
    pub settle_delay_ms: Option<u64>,
    pub duplicate_distance_threshold: Option<u32>,
}

/// PUT /api/settings
pub async fn update_settings(
    State(state): State<AppState>,
    Json(payload): Json<UpdateSettingsRequest>,
) -> ApiResult<Json<Value>> {
    let db = &state.db;

    if let Some(endpoint) = payload.host_endpoint {
        if !is_valid_value(&endpoint) {
            return Err(ApiError::BadRequest("host_endpoint must not be empty".to_string()));
        }
        settings::set_host_endpoint(db, &endpoint).await.map_err(ApiError::Common)?;
    }
    if let Some(api_key) = payload.host_api_key {
        if !is_valid_value(&api_key) {
            return Err(ApiError::BadRequest("host_api_key must not be empty".to_string()));
        }
        settings::set_host_api_key(db, &api_key).await.map_err(ApiError::Common)?;
    }
    if let Some(providers) = payload.providers {
        if providers.is_empty() {
            return Err(ApiError::BadRequest("providers must not be empty".to_string()));
        }
        settings::set_providers(db, &providers).await.map_err(ApiError::Common)?;
        state.tracker.set_providers(providers);
    }
    if let Some(value) = payload.auto_apply {
        settings::set_auto_apply(db, value).await.map_err(ApiError::Common)?;
    }
    if let Some(value) = payload.auto_organize {
        settings::set_auto_organize(db, value).await.map_err(ApiError::Common)?;
    }
    if let Some(value) = payload.scrape_outcome_timeout_ms {
        settings::set_scrape_outcome_timeout_ms(db, value).await.map_err(ApiError::Common)?;
    }
    if let Some(value) = payload.save_settle_timeout_ms {
        settings::set_save_settle_timeout_ms(db, value).await.map_err(ApiError::Common)?;
    }
    if let Some(value) = payload.settle_delay_ms {
        settings::set_settle_delay_ms(db, value).await.map_err(ApiError::Common)?;
    }
    if let Some(value) = payload.duplicate_distance_threshold {
        settings::set_duplicate_distance_threshold(db, value).await.map_err(ApiError::Common)?;
    }

    info!("Settings updated via API");
    Ok(Json(json!({ "updated": true })))
}

/// GET /api/settings/profiles
pub async fn list_profiles(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let names = profiles::list_profiles(&state.db).await.map_err(ApiError::Common)?;
    Ok(Json(json!({ "profiles": names })))
}

/// POST /api/settings/profiles/:name
pub async fn save_profile(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<Value>> {
    if !is_valid_value(&name) {
        return Err(ApiError::BadRequest("Profile name must not be empty".to_string()));
    }
    profiles::save_profile(&state.db, &name).await.map_err(ApiError::Common)?;
    Ok(Json(json!({ "saved": name })))
}

/// POST /api/settings/profiles/:name/apply
pub async fn apply_profile(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<Value>> {
    profiles::apply_profile(&state.db, &name).await.map_err(ApiError::Common)?;
    // Provider list may have changed with the profile
    state.tracker.set_providers(settings::providers(&state.db).await);
    Ok(Json(json!({ "applied": name })))
}

/// DELETE /api/settings/profiles/:name
pub async fn delete_profile(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<Value>> {
    if !profiles::delete_profile(&state.db, &name).await.map_err(ApiError::Common)? {
        return Err(ApiError::NotFound(format!("profile '{}'", name)));
    }
    Ok(Json(json!({ "deleted": name })))
}

/// GET /api/settings/backup
pub async fn export_backup(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let bundle = profiles::export_backup(&state.db, &state.history)
        .await
        .map_err(ApiError::Common)?;
    Ok(Json(bundle))
}

/// POST /api/settings/backup
pub async fn import_backup(
    State(state): State<AppState>,
    Json(payload): Json<Value>,
) -> ApiResult<Json<Value>> {
    profiles::import_backup(&state.db, &state.history, &payload)
        .await
        .map_err(ApiError::Common)?;
    state.tracker.set_providers(settings::providers(&state.db).await);
    Ok(Json(json!({ "imported": true })))
}

/// Build settings routes
pub fn settings_routes() -> Router<AppState> {
    Router::new()
        .route("/api/settings", get(get_settings).put(update_settings))
        .route("/api/settings/profiles", get(list_profiles))
        .route(
            "/api/settings/profiles/:name",
            post(save_profile).delete(delete_profile),
        )
        .route("/api/settings/profiles/:name/apply", post(apply_profile))
        .route("/api/settings/backup", get(export_backup).post(import_backup))
}
