//! Database access for curator-mc
//!
//! One SQLite file under the data directory holds settings, automation
//! history, duplicate-detection state and configuration profiles.

pub mod duplicates;
pub mod profiles;
pub mod settings;

use sqlx::SqlitePool;
use std::path::Path;

use crate::Result;

/// Initialize the database connection pool
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    // Ensure parent directory exists
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Use proper SQLite URI with mode=rwc (read, write, create)
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    tracing::debug!("Connecting to database: {}", db_url);

    let pool = SqlitePool::connect(&db_url).await?;
    init_tables(&pool).await?;

    Ok(pool)
}

/// Create curator-mc tables if they don't exist
async fn init_tables(pool: &SqlitePool) -> Result<()> {
    curator_common::db::create_settings_table(pool).await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS automation_history (
            id TEXT PRIMARY KEY,
            entity_id TEXT NOT NULL,
            timestamp TEXT NOT NULL,
            success INTEGER NOT NULL,
            data TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS duplicate_hashes (
            entity_id TEXT PRIMARY KEY,
            hash TEXT NOT NULL,
            computed_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS duplicate_ignores (
            key TEXT PRIMARY KEY,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS config_profiles (
            name TEXT PRIMARY KEY,
            data TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    tracing::info!(
        "Database tables initialized (settings, automation_history, duplicate_hashes, \
         duplicate_ignores, config_profiles)"
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_init_creates_tables() {
        let dir = TempDir::new().unwrap();
        let pool = init_database_pool(&dir.path().join("curator.db")).await.unwrap();

        // Re-init is a no-op
        init_tables(&pool).await.unwrap();

        let tables: Vec<(String,)> =
            sqlx::query_as("SELECT name FROM sqlite_master WHERE type = 'table'")
                .fetch_all(&pool)
                .await
                .unwrap();
        let names: Vec<&str> = tables.iter().map(|(n,)| n.as_str()).collect();
        for expected in [
            "settings",
            "automation_history",
            "duplicate_hashes",
            "duplicate_ignores",
            "config_profiles",
        ] {
            assert!(names.contains(&expected), "missing table {expected}");
        }
    }
}
