//! Bounded history store with deferred persistence

use std::sync::Mutex;

use chrono::{Duration, Utc};
use serde_json::{json, Value};
use sqlx::SqlitePool;
use tracing::{debug, warn};

use crate::history::entry::{HistoryEntry, RunSummary};
use crate::history::stats::Statistics;
use crate::Result;

/// The in-memory list never grows past this many entries
const MAX_ENTRIES: usize = 1000;
/// Export format version
const EXPORT_VERSION: u32 = 1;

/// Newest-first automation run log
///
/// The in-memory list is authoritative; every write is mirrored to the
/// database from a spawned task so callers never wait on the disk.
pub struct HistoryStore {
    db: SqlitePool,
    entries: Mutex<Vec<HistoryEntry>>,
}

impl HistoryStore {
    /// Load persisted history, dropping rows that fail to parse
    pub async fn load(db: SqlitePool) -> Result<Self> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT data FROM automation_history ORDER BY timestamp DESC LIMIT ?",
        )
        .bind(MAX_ENTRIES as i64)
        .fetch_all(&db)
        .await?;

        let mut entries = Vec::with_capacity(rows.len());
        for (data,) in rows {
            match serde_json::from_str::<HistoryEntry>(&data) {
                Ok(entry) => entries.push(entry.rebound()),
                Err(e) => warn!("Dropping unreadable history row: {}", e),
            }
        }
        debug!(count = entries.len(), "Loaded automation history");

        Ok(Self {
            db,
            entries: Mutex::new(entries),
        })
    }

    /// Record a finished run
    ///
    /// Sanitizes the summary, prepends the entry and persists it from a
    /// spawned task.
    pub fn record(&self, entity_id: &str, summary: RunSummary) -> HistoryEntry {
        let entry = HistoryEntry::from_summary(entity_id, summary);
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(0, entry.clone());
            entries.truncate(MAX_ENTRIES);
        }
        self.persist(entry.clone());
        entry
    }

    /// Most recent entries, newest first
    pub fn list(&self, limit: usize) -> Vec<HistoryEntry> {
        self.entries
            .lock()
            .map(|entries| entries.iter().take(limit).cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    /// How many runs were already recorded for `entity_id`
    pub fn attempts_for(&self, entity_id: &str) -> usize {
        self.entries
            .lock()
            .map(|entries| entries.iter().filter(|e| e.entity_id == entity_id).count())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Aggregate statistics over the current list
    pub fn statistics(&self) -> Statistics {
        self.entries
            .lock()
            .map(|entries| Statistics::compute(&entries))
            .unwrap_or_else(|_| Statistics::compute(&[]))
    }

    /// Export the full list with statistics
    pub fn export(&self) -> Value {
        let entries = self.list(MAX_ENTRIES);
        json!({
            "exportDate": Utc::now(),
            "version": EXPORT_VERSION,
            "statistics": self.statistics(),
            "history": entries,
        })
    }

    /// Import entries from an export bundle or a bare entry array
    ///
    /// Shape-invalid entries are dropped, duplicates on
    /// (entity id, timestamp) are skipped, the merged list is re-sorted
    /// newest-first and re-bounded. Returns how many entries were added.
    pub fn import(&self, payload: &Value) -> usize {
        let raw = match payload {
            Value::Array(items) => items.as_slice(),
            Value::Object(map) => match map.get("history").and_then(Value::as_array) {
                Some(items) => items.as_slice(),
                None => return 0,
            },
            _ => return 0,
        };

        let mut imported = Vec::new();
        for item in raw {
            match serde_json::from_value::<HistoryEntry>(item.clone()) {
                Ok(entry) => imported.push(entry.rebound()),
                Err(e) => debug!("Skipping shape-invalid history entry: {}", e),
            }
        }

        let mut added = 0usize;
        let new_entries = {
            let Ok(mut entries) = self.entries.lock() else {
                return 0;
            };
            let mut new_entries = Vec::new();
            for entry in imported {
                let duplicate = entries
                    .iter()
                    .any(|e| e.entity_id == entry.entity_id && e.timestamp == entry.timestamp);
                if !duplicate {
                    entries.push(entry.clone());
                    new_entries.push(entry);
                    added += 1;
                }
            }
            entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
            entries.truncate(MAX_ENTRIES);
            new_entries
        };

        for entry in new_entries {
            self.persist(entry);
        }
        added
    }

    /// Evict entries older than `days`; returns how many were removed
    pub fn clear_older_than_days(&self, days: i64) -> usize {
        let cutoff = Utc::now() - Duration::days(days);
        let removed = {
            let Ok(mut entries) = self.entries.lock() else {
                return 0;
            };
            let before = entries.len();
            entries.retain(|e| e.timestamp >= cutoff);
            before - entries.len()
        };

        let db = self.db.clone();
        tokio::spawn(async move {
            let result = sqlx::query("DELETE FROM automation_history WHERE timestamp < ?")
                .bind(cutoff.to_rfc3339())
                .execute(&db)
                .await;
            if let Err(e) = result {
                warn!("Failed to evict old history rows: {}", e);
            }
        });

        removed
    }

    fn persist(&self, entry: HistoryEntry) {
        let db = self.db.clone();
        tokio::spawn(async move {
            let data = match serde_json::to_string(&entry) {
                Ok(data) => data,
                Err(e) => {
                    warn!("Failed to serialize history entry: {}", e);
                    return;
                }
            };
            let result = sqlx::query(
                "INSERT OR REPLACE INTO automation_history \
                 (id, entity_id, timestamp, success, data) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(entry.id.to_string())
            .bind(&entry.entity_id)
            .bind(entry.timestamp.to_rfc3339())
            .bind(entry.success)
            .bind(data)
            .execute(&db)
            .await;
            if let Err(e) = result {
                warn!(entry_id = %entry.id, "Failed to persist history entry: {}", e);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_database_pool;
    use tempfile::TempDir;

    async fn store() -> (TempDir, HistoryStore) {
        let dir = TempDir::new().unwrap();
        let pool = init_database_pool(&dir.path().join("test.db")).await.unwrap();
        let store = HistoryStore::load(pool).await.unwrap();
        (dir, store)
    }

    fn summary(success: bool) -> RunSummary {
        RunSummary {
            success,
            duration_ms: 500,
            sources_used: vec!["metadata-one".to_string()],
            ..RunSummary::default()
        }
    }

    #[tokio::test]
    async fn test_record_prepends_newest_first() {
        let (_dir, store) = store().await;
        store.record("first", summary(true));
        store.record("second", summary(false));

        let entries = store.list(10);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].entity_id, "second");
    }

    #[tokio::test]
    async fn test_list_is_bounded() {
        let (_dir, store) = store().await;
        for i in 0..1010 {
            store.record(&format!("e{i}"), summary(true));
        }
        assert_eq!(store.len(), 1000);
        // Oldest entries fell off the end
        assert_eq!(store.list(1)[0].entity_id, "e1009");
    }

    #[tokio::test]
    async fn test_import_dedupes_and_drops_invalid() {
        let (_dir, store) = store().await;
        let recorded = store.record("e1", summary(true));

        let payload = json!({
            "history": [
                // Duplicate of the recorded entry
                recorded,
                // Shape-invalid: no timestamp
                { "id": "00000000-0000-0000-0000-000000000001", "entity_id": "bad", "success": true },
                {
                    "id": "00000000-0000-0000-0000-000000000002",
                    "entity_id": "e2",
                    "timestamp": "2026-01-01T00:00:00Z",
                    "success": false
                },
            ]
        });

        assert_eq!(store.import(&payload), 1);
        assert_eq!(store.len(), 2);
        // Re-sorted newest-first
        assert_eq!(store.list(10)[0].entity_id, "e1");
    }

    #[tokio::test]
    async fn test_import_rejects_non_history_payloads() {
        let (_dir, store) = store().await;
        assert_eq!(store.import(&json!("not history")), 0);
        assert_eq!(store.import(&json!({ "config": {} })), 0);
    }

    #[tokio::test]
    async fn test_export_bundle_shape() {
        let (_dir, store) = store().await;
        store.record("e1", summary(true));

        let bundle = store.export();
        assert_eq!(bundle["version"], 1);
        assert!(bundle["exportDate"].is_string());
        assert_eq!(bundle["history"].as_array().unwrap().len(), 1);
        assert_eq!(bundle["statistics"]["overall"]["total"], 1);
    }

    #[tokio::test]
    async fn test_clear_older_than_days() {
        let (_dir, store) = store().await;
        store.record("fresh", summary(true));
        {
            let mut entries = store.entries.lock().unwrap();
            let mut old = HistoryEntry::from_summary("stale", summary(true));
            old.timestamp = Utc::now() - Duration::days(45);
            entries.push(old);
        }

        assert_eq!(store.clear_older_than_days(30), 1);
        assert_eq!(store.len(), 1);
        assert_eq!(store.list(1)[0].entity_id, "fresh");
    }
}
