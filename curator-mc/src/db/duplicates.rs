//! Persistence for duplicate detection state
//!
//! Perceptual hashes are expensive to recompute, so they are cached per
//! entity id. Ignored pairs and groups are keyed by their sorted member
//! ids so the key is order-independent.

use chrono::Utc;
use sqlx::SqlitePool;

use crate::Result;

/// Cached hash for an entity, if one was computed before
pub async fn get_hash(db: &SqlitePool, entity_id: &str) -> Result<Option<String>> {
    let row: Option<(String,)> =
        sqlx::query_as("SELECT hash FROM duplicate_hashes WHERE entity_id = ?")
            .bind(entity_id)
            .fetch_optional(db)
            .await?;
    Ok(row.map(|(hash,)| hash))
}

pub async fn put_hash(db: &SqlitePool, entity_id: &str, hash: &str) -> Result<()> {
    sqlx::query(
        "INSERT OR REPLACE INTO duplicate_hashes (entity_id, hash, computed_at) VALUES (?, ?, ?)",
    )
    .bind(entity_id)
    .bind(hash)
    .bind(Utc::now().to_rfc3339())
    .execute(db)
    .await?;
    Ok(())
}

/// All cached hashes as (entity_id, hash) pairs
pub async fn all_hashes(db: &SqlitePool) -> Result<Vec<(String, String)>> {
    let rows: Vec<(String, String)> =
        sqlx::query_as("SELECT entity_id, hash FROM duplicate_hashes")
            .fetch_all(db)
            .await?;
    Ok(rows)
}

/// Order-independent key for a pair of entity ids
pub fn pair_key(a: &str, b: &str) -> String {
    group_key(&[a, b])
}

/// Order-independent key for a whole candidate group
pub fn group_key(ids: &[&str]) -> String {
    let mut ids = ids.to_vec();
    ids.sort_unstable();
    ids.join(":")
}

pub async fn ignore_pair(db: &SqlitePool, a: &str, b: &str) -> Result<()> {
    ignore_key(db, &pair_key(a, b)).await
}

/// Suppress a whole candidate group, keyed by its sorted member ids
pub async fn ignore_group(db: &SqlitePool, ids: &[&str]) -> Result<()> {
    ignore_key(db, &group_key(ids)).await
}

async fn ignore_key(db: &SqlitePool, key: &str) -> Result<()> {
    sqlx::query("INSERT OR REPLACE INTO duplicate_ignores (key, created_at) VALUES (?, ?)")
        .bind(key)
        .bind(Utc::now().to_rfc3339())
        .execute(db)
        .await?;
    Ok(())
}

pub async fn ignored_keys(db: &SqlitePool) -> Result<Vec<String>> {
    let rows: Vec<(String,)> = sqlx::query_as("SELECT key FROM duplicate_ignores")
        .fetch_all(db)
        .await?;
    Ok(rows.into_iter().map(|(key,)| key).collect())
}
