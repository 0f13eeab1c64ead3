//! Configuration resolution for curator-mc
//!
//! Multi-tier resolution with Database → ENV → TOML priority. The
//! database is authoritative; values found only in a lower tier are
//! written back to the database so later lookups hit tier 1.

use sqlx::{Pool, Sqlite};
use tracing::{info, warn};

use curator_common::config::TomlConfig;
use curator_common::Result;

use crate::db::settings;

/// Resolve the host endpoint from 3-tier configuration
///
/// **Priority:** Database → ENV (`CURATOR_HOST_ENDPOINT`) → TOML
pub async fn resolve_host_endpoint(
    db: &Pool<Sqlite>,
    toml_config: &TomlConfig,
) -> Result<Option<String>> {
    resolve_value(
        db,
        "host_endpoint",
        settings::host_endpoint(db).await?,
        std::env::var("CURATOR_HOST_ENDPOINT").ok(),
        toml_config.host_endpoint.clone(),
    )
    .await
}

/// Resolve the host API key from 3-tier configuration
///
/// **Priority:** Database → ENV (`CURATOR_HOST_API_KEY`) → TOML
pub async fn resolve_host_api_key(
    db: &Pool<Sqlite>,
    toml_config: &TomlConfig,
) -> Result<Option<String>> {
    resolve_value(
        db,
        "host_api_key",
        settings::host_api_key(db).await?,
        std::env::var("CURATOR_HOST_API_KEY").ok(),
        toml_config.host_api_key.clone(),
    )
    .await
}

/// Validate a configuration value (non-empty, non-whitespace)
pub fn is_valid_value(value: &str) -> bool {
    !value.trim().is_empty()
}

/// Resolve one value across the tiers; `key` doubles as the settings
/// table key for write-back
async fn resolve_value(
    db: &Pool<Sqlite>,
    key: &str,
    db_value: Option<String>,
    env_value: Option<String>,
    toml_value: Option<String>,
) -> Result<Option<String>> {
    let mut sources = Vec::new();
    if db_value.as_deref().is_some_and(is_valid_value) {
        sources.push("database");
    }
    if env_value.as_deref().is_some_and(is_valid_value) {
        sources.push("environment");
    }
    if toml_value.as_deref().is_some_and(is_valid_value) {
        sources.push("TOML");
    }
    if sources.len() > 1 {
        warn!(
            "{} found in multiple sources: {}. Using database (highest priority).",
            key,
            sources.join(", ")
        );
    }

    if let Some(value) = db_value.filter(|v| is_valid_value(v)) {
        info!("{} loaded from database", key);
        return Ok(Some(value));
    }

    // Lower tiers write back so the database becomes authoritative
    if let Some(value) = env_value.filter(|v| is_valid_value(v)) {
        info!("{} loaded from environment variable, persisting", key);
        curator_common::db::set_setting(db, key, &value).await?;
        return Ok(Some(value));
    }

    if let Some(value) = toml_value.filter(|v| is_valid_value(v)) {
        info!("{} loaded from TOML config, persisting", key);
        curator_common::db::set_setting(db, key, &value).await?;
        return Ok(Some(value));
    }

    Ok(None)
}
