//! Configuration profiles and full backup bundles
//!
//! A profile is a named snapshot of the settings table. The backup
//! bundle wraps config, profiles, history and duplicate state in one
//! JSON document; import tolerates missing sub-keys so partial bundles
//! restore what they carry and leave the rest alone.

use std::collections::BTreeMap;

use chrono::Utc;
use serde_json::{json, Value};
use sqlx::SqlitePool;
use tracing::{info, warn};

use curator_common::db::{all_settings, set_setting};

use crate::history::HistoryStore;
use crate::Result;

/// Backup bundle format version
const BACKUP_VERSION: u32 = 1;

/// Capture the current settings table under `name`
pub async fn save_profile(db: &SqlitePool, name: &str) -> Result<()> {
    let snapshot: BTreeMap<String, String> = all_settings(db).await?.into_iter().collect();
    let data = serde_json::to_string(&snapshot)
        .map_err(|e| curator_common::Error::Config(format!("Serialize profile: {}", e)))?;

    sqlx::query("INSERT OR REPLACE INTO config_profiles (name, data) VALUES (?, ?)")
        .bind(name)
        .bind(data)
        .execute(db)
        .await?;
    info!(profile = name, "Saved configuration profile");
    Ok(())
}

/// Write a stored profile's keys back into the settings table
pub async fn apply_profile(db: &SqlitePool, name: &str) -> Result<()> {
    let row: Option<(String,)> = sqlx::query_as("SELECT data FROM config_profiles WHERE name = ?")
        .bind(name)
        .fetch_optional(db)
        .await?;
    let Some((data,)) = row else {
        return Err(curator_common::Error::NotFound(format!("profile '{}'", name)));
    };

    let snapshot: BTreeMap<String, String> = serde_json::from_str(&data)
        .map_err(|e| curator_common::Error::Config(format!("Corrupt profile '{}': {}", name, e)))?;
    for (key, value) in snapshot {
        set_setting(db, &key, value).await?;
    }
    info!(profile = name, "Applied configuration profile");
    Ok(())
}

pub async fn list_profiles(db: &SqlitePool) -> Result<Vec<String>> {
    let rows: Vec<(String,)> = sqlx::query_as("SELECT name FROM config_profiles ORDER BY name")
        .fetch_all(db)
        .await?;
    Ok(rows.into_iter().map(|(name,)| name).collect())
}

/// Delete a profile; true when one existed
pub async fn delete_profile(db: &SqlitePool, name: &str) -> Result<bool> {
    let result = sqlx::query("DELETE FROM config_profiles WHERE name = ?")
        .bind(name)
        .execute(db)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Export everything into one backup bundle
pub async fn export_backup(db: &SqlitePool, history: &HistoryStore) -> Result<Value> {
    let config: BTreeMap<String, String> = all_settings(db).await?.into_iter().collect();

    let mut profiles = serde_json::Map::new();
    for name in list_profiles(db).await? {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT data FROM config_profiles WHERE name = ?")
                .bind(&name)
                .fetch_optional(db)
                .await?;
        if let Some((data,)) = row {
            match serde_json::from_str::<Value>(&data) {
                Ok(parsed) => {
                    profiles.insert(name, parsed);
                }
                Err(e) => warn!(profile = %name, "Skipping corrupt profile in backup: {}", e),
            }
        }
    }

    let hashes: Vec<(String, String)> = crate::db::duplicates::all_hashes(db).await?;
    let ignores = crate::db::duplicates::ignored_keys(db).await?;

    Ok(json!({
        "version": BACKUP_VERSION,
        "createdAt": Utc::now(),
        "data": {
            "config": config,
            "profiles": Value::Object(profiles),
            "history": history.export(),
            "duplicates": {
                "hashes": hashes.into_iter().collect::<BTreeMap<String, String>>(),
                "ignores": ignores,
            },
        },
    }))
}

/// Restore from a backup bundle
///
/// Every section is optional, `data` itself included; absent sections
/// are untouched. Never fails on a partial payload, only on database
/// errors.
pub async fn import_backup(
    db: &SqlitePool,
    history: &HistoryStore,
    bundle: &Value,
) -> Result<()> {
    let Some(data) = bundle.get("data").and_then(Value::as_object) else {
        warn!("Backup bundle has no data section, nothing to import");
        return Ok(());
    };

    if let Some(config) = data.get("config").and_then(Value::as_object) {
        for (key, value) in config {
            if let Some(value) = value.as_str() {
                set_setting(db, key, value.to_string()).await?;
            }
        }
    }

    if let Some(profiles) = data.get("profiles").and_then(Value::as_object) {
        for (name, snapshot) in profiles {
            if !snapshot.is_object() {
                warn!(profile = %name, "Skipping non-object profile in backup");
                continue;
            }
            let data = serde_json::to_string(snapshot).map_err(|e| {
                curator_common::Error::Config(format!("Serialize profile '{}': {}", name, e))
            })?;
            sqlx::query("INSERT OR REPLACE INTO config_profiles (name, data) VALUES (?, ?)")
                .bind(name)
                .bind(data)
                .execute(db)
                .await?;
        }
    }

    if let Some(history_bundle) = data.get("history") {
        let added = history.import(history_bundle);
        info!(added = added, "Imported history entries from backup");
    }

    if let Some(duplicates) = data.get("duplicates").and_then(Value::as_object) {
        if let Some(hashes) = duplicates.get("hashes").and_then(Value::as_object) {
            for (entity_id, hash) in hashes {
                if let Some(hash) = hash.as_str() {
                    crate::db::duplicates::put_hash(db, entity_id, hash).await?;
                }
            }
        }
        if let Some(ignores) = duplicates.get("ignores").and_then(Value::as_array) {
            for key in ignores.iter().filter_map(Value::as_str) {
                sqlx::query(
                    "INSERT OR REPLACE INTO duplicate_ignores (key, created_at) VALUES (?, ?)",
                )
                .bind(key)
                .bind(Utc::now().to_rfc3339())
                .execute(db)
                .await?;
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_database_pool;
    use tempfile::TempDir;

    async fn setup() -> (TempDir, SqlitePool, HistoryStore) {
        let dir = TempDir::new().unwrap();
        let pool = init_database_pool(&dir.path().join("test.db")).await.unwrap();
        let history = HistoryStore::load(pool.clone()).await.unwrap();
        (dir, pool, history)
    }

    #[tokio::test]
    async fn test_profile_round_trip() {
        let (_dir, db, _history) = setup().await;
        crate::db::settings::set_auto_apply(&db, true).await.unwrap();
        save_profile(&db, "aggressive").await.unwrap();

        crate::db::settings::set_auto_apply(&db, false).await.unwrap();
        assert!(!crate::db::settings::auto_apply(&db).await);

        apply_profile(&db, "aggressive").await.unwrap();
        assert!(crate::db::settings::auto_apply(&db).await);

        assert_eq!(list_profiles(&db).await.unwrap(), vec!["aggressive"]);
        assert!(delete_profile(&db, "aggressive").await.unwrap());
        assert!(!delete_profile(&db, "aggressive").await.unwrap());
    }

    #[tokio::test]
    async fn test_apply_missing_profile_errors() {
        let (_dir, db, _history) = setup().await;
        assert!(apply_profile(&db, "nope").await.is_err());
    }

    #[tokio::test]
    async fn test_backup_round_trip() {
        let (_dir, db, history) = setup().await;
        crate::db::settings::set_host_endpoint(&db, "http://a.local").await.unwrap();
        save_profile(&db, "base").await.unwrap();
        crate::db::duplicates::put_hash(&db, "e1", "0011").await.unwrap();
        crate::db::duplicates::ignore_pair(&db, "e1", "e2").await.unwrap();

        let bundle = export_backup(&db, &history).await.unwrap();
        assert_eq!(bundle["version"], 1);

        let (_dir2, db2, history2) = setup().await;
        import_backup(&db2, &history2, &bundle).await.unwrap();

        assert_eq!(
            crate::db::settings::host_endpoint(&db2).await.unwrap().as_deref(),
            Some("http://a.local")
        );
        assert_eq!(list_profiles(&db2).await.unwrap(), vec!["base"]);
        assert_eq!(
            crate::db::duplicates::get_hash(&db2, "e1").await.unwrap().as_deref(),
            Some("0011")
        );
        assert_eq!(
            crate::db::duplicates::ignored_keys(&db2).await.unwrap(),
            vec!["e1:e2".to_string()]
        );
    }

    #[tokio::test]
    async fn test_import_tolerates_missing_sections() {
        let (_dir, db, history) = setup().await;
        let bundle = json!({ "version": 1, "data": { "config": { "auto_apply": "true" } } });
        import_backup(&db, &history, &bundle).await.unwrap();
        assert!(crate::db::settings::auto_apply(&db).await);

        // Even a bundle without a data section imports cleanly as a no-op
        import_backup(&db, &history, &json!({ "version": 1 })).await.unwrap();
        assert!(list_profiles(&db).await.unwrap().is_empty());
    }
}
