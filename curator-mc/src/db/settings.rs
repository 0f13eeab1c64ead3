//! Typed settings accessors with defaults
//!
//! All scalar configuration lives in the shared `settings` table.
//! Malformed persisted values fall back to the default instead of
//! failing the caller.

use sqlx::SqlitePool;
use tracing::warn;

use curator_common::db::{get_setting, set_setting};

use crate::providers::{default_providers, ProviderConfig};
use crate::Result;

pub const DEFAULT_SCRAPE_OUTCOME_TIMEOUT_MS: u64 = 8000;
pub const DEFAULT_SAVE_SETTLE_TIMEOUT_MS: u64 = 5000;
pub const DEFAULT_SETTLE_DELAY_MS: u64 = 1000;
pub const DEFAULT_DUPLICATE_DISTANCE_THRESHOLD: u32 = 10;

async fn get_or_default<T>(db: &SqlitePool, key: &str, default: T) -> T
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match get_setting::<T>(db, key).await {
        Ok(Some(value)) => value,
        Ok(None) => default,
        Err(e) => {
            warn!(key = key, "Malformed setting, using default: {}", e);
            default
        }
    }
}

pub async fn host_endpoint(db: &SqlitePool) -> Result<Option<String>> {
    get_setting(db, "host_endpoint").await
}

pub async fn set_host_endpoint(db: &SqlitePool, endpoint: &str) -> Result<()> {
    set_setting(db, "host_endpoint", &endpoint.to_string()).await
}

pub async fn host_api_key(db: &SqlitePool) -> Result<Option<String>> {
    get_setting(db, "host_api_key").await
}

pub async fn set_host_api_key(db: &SqlitePool, api_key: &str) -> Result<()> {
    set_setting(db, "host_api_key", &api_key.to_string()).await
}

/// Configured provider list, stored as JSON
pub async fn providers(db: &SqlitePool) -> Vec<ProviderConfig> {
    match get_setting::<String>(db, "providers").await {
        Ok(Some(raw)) => match serde_json::from_str(&raw) {
            Ok(list) => list,
            Err(e) => {
                warn!("Malformed provider list, using defaults: {}", e);
                default_providers()
            }
        },
        Ok(None) => default_providers(),
        Err(e) => {
            warn!("Failed to read provider list, using defaults: {}", e);
            default_providers()
        }
    }
}

pub async fn set_providers(db: &SqlitePool, list: &[ProviderConfig]) -> Result<()> {
    let raw = serde_json::to_string(list)
        .map_err(|e| curator_common::Error::Config(format!("Serialize providers: {}", e)))?;
    set_setting(db, "providers", &raw).await
}

/// Apply scraped fields without asking for confirmation
pub async fn auto_apply(db: &SqlitePool) -> bool {
    get_or_default(db, "auto_apply", false).await
}

pub async fn set_auto_apply(db: &SqlitePool, value: bool) -> Result<()> {
    set_setting(db, "auto_apply", &value).await
}

/// Mark entities organized once every provider is satisfied
pub async fn auto_organize(db: &SqlitePool) -> bool {
    get_or_default(db, "auto_organize", true).await
}

pub async fn set_auto_organize(db: &SqlitePool, value: bool) -> Result<()> {
    set_setting(db, "auto_organize", &value).await
}

/// How long to wait for a scrape outcome signal before treating the
/// attempt as not-found
pub async fn scrape_outcome_timeout_ms(db: &SqlitePool) -> u64 {
    get_or_default(db, "scrape_outcome_timeout_ms", DEFAULT_SCRAPE_OUTCOME_TIMEOUT_MS).await
}

pub async fn set_scrape_outcome_timeout_ms(db: &SqlitePool, value: u64) -> Result<()> {
    set_setting(db, "scrape_outcome_timeout_ms", &value).await
}

/// Bounded fallback wait for the save mutation signal
pub async fn save_settle_timeout_ms(db: &SqlitePool) -> u64 {
    get_or_default(db, "save_settle_timeout_ms", DEFAULT_SAVE_SETTLE_TIMEOUT_MS).await
}

pub async fn set_save_settle_timeout_ms(db: &SqlitePool, value: u64) -> Result<()> {
    set_setting(db, "save_settle_timeout_ms", &value).await
}

/// Pause between UI interactions so the host UI can settle
pub async fn settle_delay_ms(db: &SqlitePool) -> u64 {
    get_or_default(db, "settle_delay_ms", DEFAULT_SETTLE_DELAY_MS).await
}

pub async fn set_settle_delay_ms(db: &SqlitePool, value: u64) -> Result<()> {
    set_setting(db, "settle_delay_ms", &value).await
}

/// Hamming distance at or below which two hashes are duplicate candidates
pub async fn duplicate_distance_threshold(db: &SqlitePool) -> u32 {
    get_or_default(
        db,
        "duplicate_distance_threshold",
        DEFAULT_DUPLICATE_DISTANCE_THRESHOLD,
    )
    .await
}

pub async fn set_duplicate_distance_threshold(db: &SqlitePool, value: u32) -> Result<()> {
    set_setting(db, "duplicate_distance_threshold", &value).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_database_pool;
    use tempfile::TempDir;

    async fn pool() -> (TempDir, SqlitePool) {
        let dir = TempDir::new().unwrap();
        let pool = init_database_pool(&dir.path().join("test.db")).await.unwrap();
        (dir, pool)
    }

    #[tokio::test]
    async fn test_defaults_without_rows() {
        let (_dir, db) = pool().await;
        assert!(host_endpoint(&db).await.unwrap().is_none());
        assert!(!auto_apply(&db).await);
        assert!(auto_organize(&db).await);
        assert_eq!(scrape_outcome_timeout_ms(&db).await, 8000);
        assert_eq!(duplicate_distance_threshold(&db).await, 10);
        assert_eq!(providers(&db).await.len(), 2);
    }

    #[tokio::test]
    async fn test_round_trip() {
        let (_dir, db) = pool().await;
        set_host_endpoint(&db, "http://host.local/graphql").await.unwrap();
        set_auto_apply(&db, true).await.unwrap();
        set_scrape_outcome_timeout_ms(&db, 12000).await.unwrap();

        assert_eq!(
            host_endpoint(&db).await.unwrap().as_deref(),
            Some("http://host.local/graphql")
        );
        assert!(auto_apply(&db).await);
        assert_eq!(scrape_outcome_timeout_ms(&db).await, 12000);
    }

    #[tokio::test]
    async fn test_malformed_value_falls_back_to_default() {
        let (_dir, db) = pool().await;
        curator_common::db::set_setting(&db, "scrape_outcome_timeout_ms", &"garbage".to_string())
            .await
            .unwrap();
        assert_eq!(scrape_outcome_timeout_ms(&db).await, 8000);

        curator_common::db::set_setting(&db, "providers", &"{not json".to_string())
            .await
            .unwrap();
        assert_eq!(providers(&db).await, default_providers());
    }
}
