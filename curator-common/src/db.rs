//! Settings key-value table and typed accessors
//!
//! Every persisted scalar configuration value lives in one `settings`
//! table following the key-value pattern; services layer typed getters
//! with defaults on top of the generic accessors here.

use crate::{Error, Result};
use sqlx::{Pool, Sqlite};

/// Create the settings table if missing
pub async fn create_settings_table(db: &Pool<Sqlite>) -> Result<()> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )",
    )
    .execute(db)
    .await
    .map_err(Error::Database)?;
    Ok(())
}

/// Generic setting getter
pub async fn get_setting<T>(db: &Pool<Sqlite>, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let row: Option<(String,)> = sqlx::query_as("SELECT value FROM settings WHERE key = ?")
        .bind(key)
        .fetch_optional(db)
        .await
        .map_err(Error::Database)?;

    match row {
        Some((value,)) => {
            let parsed = value
                .parse::<T>()
                .map_err(|e| Error::Config(format!("Parse setting '{}' failed: {}", key, e)))?;
            Ok(Some(parsed))
        }
        None => Ok(None),
    }
}

/// Generic setting setter (UPSERT)
pub async fn set_setting<T>(db: &Pool<Sqlite>, key: &str, value: T) -> Result<()>
where
    T: std::fmt::Display,
{
    sqlx::query(
        "INSERT INTO settings (key, value) VALUES (?, ?)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
    )
    .bind(key)
    .bind(value.to_string())
    .execute(db)
    .await
    .map_err(Error::Database)?;

    Ok(())
}

/// Delete a setting (no-op if absent)
pub async fn delete_setting(db: &Pool<Sqlite>, key: &str) -> Result<()> {
    sqlx::query("DELETE FROM settings WHERE key = ?")
        .bind(key)
        .execute(db)
        .await
        .map_err(Error::Database)?;
    Ok(())
}

/// Load all settings as (key, value) pairs, used for profile capture and backups
pub async fn all_settings(db: &Pool<Sqlite>) -> Result<Vec<(String, String)>> {
    let rows: Vec<(String, String)> =
        sqlx::query_as("SELECT key, value FROM settings ORDER BY key")
            .fetch_all(db)
            .await
            .map_err(Error::Database)?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::SqlitePool;

    async fn setup_test_db() -> SqlitePool {
        let pool = SqlitePool::connect(":memory:").await.unwrap();
        create_settings_table(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn test_get_missing_setting_is_none() {
        let pool = setup_test_db().await;
        let value: Option<String> = get_setting(&pool, "nope").await.unwrap();
        assert_eq!(value, None);
    }

    #[tokio::test]
    async fn test_set_and_get_typed() {
        let pool = setup_test_db().await;

        set_setting(&pool, "outcome_timeout_ms", 8000u64).await.unwrap();
        let value: Option<u64> = get_setting(&pool, "outcome_timeout_ms").await.unwrap();
        assert_eq!(value, Some(8000));
    }

    #[tokio::test]
    async fn test_upsert_replaces_value() {
        let pool = setup_test_db().await;

        set_setting(&pool, "host_endpoint", "http://a").await.unwrap();
        set_setting(&pool, "host_endpoint", "http://b").await.unwrap();

        let value: Option<String> = get_setting(&pool, "host_endpoint").await.unwrap();
        assert_eq!(value, Some("http://b".to_string()));

        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM settings WHERE key = 'host_endpoint'")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_delete_setting() {
        let pool = setup_test_db().await;
        set_setting(&pool, "k", "v").await.unwrap();
        delete_setting(&pool, "k").await.unwrap();
        let value: Option<String> = get_setting(&pool, "k").await.unwrap();
        assert_eq!(value, None);
    }
}
