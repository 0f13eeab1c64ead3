//! Duplicate detection engine

use chrono::Utc;
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::{debug, info, warn};

use curator_common::events::{CuratorEvent, EventBus};

use crate::client::{HostClient, HostDuplicateGroup};
use crate::db::{duplicates as dup_db, settings};
use crate::duplicates::ahash;
use crate::duplicates::merge::{plan_merge, MergePlan, MergeRequest};
use crate::Result;

/// Page size for the local catalog scan
const SCAN_PAGE_SIZE: usize = 100;

/// A candidate duplicate pair, ranked by distance
#[derive(Debug, Clone, Serialize)]
pub struct CandidatePair {
    pub entity_a: String,
    pub entity_b: String,
    pub distance: u32,
    /// 100 = identical hashes
    pub similarity: u8,
}

pub struct DuplicateEngine {
    client: HostClient,
    db: SqlitePool,
    event_bus: EventBus,
    http: reqwest::Client,
}

impl DuplicateEngine {
    pub fn new(client: HostClient, db: SqlitePool, event_bus: EventBus) -> Self {
        Self {
            client,
            db,
            event_bus,
            http: reqwest::Client::new(),
        }
    }

    /// Page through the catalog, hashing thumbnails that are not cached
    /// yet, then rank candidate pairs
    ///
    /// `limit` caps how many entities are visited, so a huge catalog can
    /// be scanned in slices; `None` walks everything. Entities without a
    /// thumbnail, and thumbnails that fail to fetch or decode, are
    /// skipped rather than failing the scan.
    pub async fn local_scan(&self, limit: Option<usize>) -> Result<Vec<CandidatePair>> {
        let mut page = 1usize;
        let mut scanned = 0usize;
        let mut total = 0usize;

        'pages: loop {
            let result = self
                .client
                .find_entities(page, SCAN_PAGE_SIZE)
                .await
                .map_err(|e| curator_common::Error::Internal(e.to_string()))?;
            total = match limit {
                Some(limit) => result.count.min(limit),
                None => result.count,
            };
            if result.entities.is_empty() {
                break;
            }

            for entity in &result.entities {
                if limit.is_some_and(|limit| scanned >= limit) {
                    break 'pages;
                }
                scanned += 1;
                let Some(thumbnail) = entity.thumbnail_path.as_deref() else {
                    continue;
                };
                if dup_db::get_hash(&self.db, &entity.id).await?.is_some() {
                    continue;
                }
                match self.hash_thumbnail(thumbnail).await {
                    Some(hash) => dup_db::put_hash(&self.db, &entity.id, &hash).await?,
                    None => debug!(entity_id = %entity.id, "Thumbnail not hashable, skipping"),
                }
            }

            self.event_bus.emit_lossy(CuratorEvent::DuplicateScanProgress {
                scanned,
                total,
                timestamp: Utc::now(),
            });

            if scanned >= total {
                break;
            }
            page += 1;
        }

        let candidates = self.find_candidates(None).await?;
        info!(
            scanned = scanned,
            candidates = candidates.len(),
            "Local duplicate scan finished"
        );
        self.event_bus.emit_lossy(CuratorEvent::DuplicateScanCompleted {
            candidates: candidates.len(),
            timestamp: Utc::now(),
        });
        Ok(candidates)
    }

    /// Defer to the host's native duplicate finder
    ///
    /// Groups previously marked not-a-duplicate are filtered out before
    /// the results are returned.
    pub async fn server_scan(
        &self,
        accuracy: i32,
        duration_tolerance: f64,
    ) -> Result<Vec<HostDuplicateGroup>> {
        let groups = self
            .client
            .find_duplicate_candidates(accuracy, duration_tolerance)
            .await
            .map_err(|e| curator_common::Error::Internal(e.to_string()))?;

        let ignored = dup_db::ignored_keys(&self.db).await?;
        let groups: Vec<HostDuplicateGroup> = groups
            .into_iter()
            .filter(|group| {
                let ids: Vec<&str> = group.entities.iter().map(|e| e.id.as_str()).collect();
                !ignored.contains(&dup_db::group_key(&ids))
            })
            .collect();

        self.event_bus.emit_lossy(CuratorEvent::DuplicateScanCompleted {
            candidates: groups.len(),
            timestamp: Utc::now(),
        });
        Ok(groups)
    }

    /// Rank all cached-hash pairs at or below the distance threshold,
    /// ascending by distance, minus ignored pairs
    pub async fn find_candidates(&self, threshold: Option<u32>) -> Result<Vec<CandidatePair>> {
        let threshold = match threshold {
            Some(t) => t,
            None => settings::duplicate_distance_threshold(&self.db).await,
        };
        let hashes = dup_db::all_hashes(&self.db).await?;
        let ignored = dup_db::ignored_keys(&self.db).await?;

        let mut candidates = Vec::new();
        for (i, (id_a, hash_a)) in hashes.iter().enumerate() {
            for (id_b, hash_b) in hashes.iter().skip(i + 1) {
                let Some(distance) = ahash::hamming(hash_a, hash_b) else {
                    continue;
                };
                if distance > threshold {
                    continue;
                }
                if ignored.contains(&dup_db::pair_key(id_a, id_b)) {
                    continue;
                }
                candidates.push(CandidatePair {
                    entity_a: id_a.clone(),
                    entity_b: id_b.clone(),
                    distance,
                    similarity: ahash::similarity_score(distance),
                });
            }
        }
        candidates.sort_by(|a, b| {
            a.distance
                .cmp(&b.distance)
                .then_with(|| a.entity_a.cmp(&b.entity_a))
        });
        Ok(candidates)
    }

    /// Mark a pair as not-a-duplicate; it never reappears in candidates
    pub async fn ignore_pair(&self, a: &str, b: &str) -> Result<()> {
        dup_db::ignore_pair(&self.db, a, b).await
    }

    /// Mark a whole server-scan group as not-a-duplicate
    pub async fn ignore_group(&self, ids: &[String]) -> Result<()> {
        let ids: Vec<&str> = ids.iter().map(String::as_str).collect();
        dup_db::ignore_group(&self.db, &ids).await
    }

    /// Resolve and execute a merge request
    ///
    /// Source deletion needs both `delete_sources` and `delete_confirmed`;
    /// anything less leaves the sources in place.
    pub async fn merge(&self, request: &MergeRequest) -> Result<MergePlan> {
        let mut entities = Vec::with_capacity(request.entity_ids.len());
        for id in &request.entity_ids {
            let entity = self
                .client
                .find_entity(id)
                .await
                .map_err(|e| curator_common::Error::Internal(e.to_string()))?;
            entities.push(entity);
        }

        let plan = plan_merge(&entities, request.destination_id.as_deref()).ok_or_else(|| {
            curator_common::Error::InvalidInput(
                "merge needs at least two distinct entities".to_string(),
            )
        })?;

        self.client
            .merge_entities(&plan.destination_id, &plan.source_ids, plan.overrides.as_ref())
            .await
            .map_err(|e| curator_common::Error::Internal(e.to_string()))?;
        info!(
            destination = %plan.destination_id,
            sources = plan.source_ids.len(),
            "Merged duplicate entities"
        );

        if request.delete_sources && request.delete_confirmed {
            for id in &plan.source_ids {
                if let Err(e) = self.client.destroy_entity(id).await {
                    warn!(entity_id = %id, "Failed to delete merged source: {}", e);
                }
            }
        }

        Ok(plan)
    }

    async fn hash_thumbnail(&self, url: &str) -> Option<String> {
        let response = self.http.get(url).send().await.ok()?;
        if !response.status().is_success() {
            return None;
        }
        let bytes = response.bytes().await.ok()?;
        let image = image::load_from_memory(&bytes).ok()?;
        Some(ahash::average_hash(&image))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_database_pool;
    use axum::{
        extract::State,
        routing::{get, post},
        Json, Router,
    };
    use serde_json::{json, Value};
    use tempfile::TempDir;

    async fn engine() -> (TempDir, DuplicateEngine) {
        engine_with("http://127.0.0.1:1/graphql".to_string()).await
    }

    async fn engine_with(endpoint: String) -> (TempDir, DuplicateEngine) {
        let dir = TempDir::new().unwrap();
        let db = init_database_pool(&dir.path().join("test.db")).await.unwrap();
        let bus = EventBus::new(16);
        let client = HostClient::new(endpoint, None, bus.clone()).expect("client");
        (dir, DuplicateEngine::new(client, db, bus))
    }

    fn png_bytes() -> Vec<u8> {
        let img = image::RgbImage::from_pixel(8, 8, image::Rgb([128, 128, 128]));
        let mut buf = std::io::Cursor::new(Vec::new());
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut buf, image::ImageFormat::Png)
            .unwrap();
        buf.into_inner()
    }

    #[derive(Clone)]
    struct FakeCatalog {
        count: usize,
        base: String,
        groups: Value,
    }

    async fn catalog_handler(
        State(catalog): State<FakeCatalog>,
        Json(body): Json<Value>,
    ) -> Json<Value> {
        let query = body["query"].as_str().unwrap_or_default();
        if query.contains("findEntities") {
            let page = body["variables"]["page"].as_u64().unwrap_or(1) as usize;
            let per_page = body["variables"]["per_page"].as_u64().unwrap_or(100) as usize;
            let start = (page - 1) * per_page;
            let entities: Vec<Value> = (start..catalog.count.min(start + per_page))
                .map(|i| {
                    json!({
                        "id": format!("e{i}"),
                        "thumbnail_path": format!("{}/thumb/{i}", catalog.base),
                    })
                })
                .collect();
            Json(json!({
                "data": { "findEntities": { "count": catalog.count, "entities": entities } }
            }))
        } else if query.contains("findDuplicateEntities") {
            Json(json!({ "data": { "findDuplicateEntities": catalog.groups } }))
        } else {
            Json(json!({ "data": {} }))
        }
    }

    async fn spawn_catalog(count: usize, groups: Value) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let app = Router::new()
            .route("/graphql", post(catalog_handler))
            .route("/thumb/:id", get(|| async { png_bytes() }))
            .with_state(FakeCatalog {
                count,
                base: base.clone(),
                groups,
            });
        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });
        format!("{base}/graphql")
    }

    fn bits(ones: usize) -> String {
        "1".repeat(ones) + &"0".repeat(64 - ones)
    }

    #[tokio::test]
    async fn test_candidates_ranked_ascending_by_distance() {
        let (_dir, engine) = engine().await;
        dup_db::put_hash(&engine.db, "a", &bits(0)).await.unwrap();
        dup_db::put_hash(&engine.db, "b", &bits(2)).await.unwrap();
        dup_db::put_hash(&engine.db, "c", &bits(9)).await.unwrap();

        let candidates = engine.find_candidates(Some(10)).await.unwrap();
        // a-b: 2, b-c: 7, a-c: 9
        assert_eq!(candidates.len(), 3);
        assert_eq!(candidates[0].distance, 2);
        assert_eq!(candidates[1].distance, 7);
        assert_eq!(candidates[2].distance, 9);
        assert_eq!(candidates[0].similarity, ahash::similarity_score(2));
    }

    #[tokio::test]
    async fn test_threshold_excludes_distant_pairs() {
        let (_dir, engine) = engine().await;
        dup_db::put_hash(&engine.db, "a", &bits(0)).await.unwrap();
        dup_db::put_hash(&engine.db, "b", &bits(30)).await.unwrap();

        assert!(engine.find_candidates(Some(10)).await.unwrap().is_empty());
        assert_eq!(engine.find_candidates(Some(30)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_ignored_pairs_are_excluded() {
        let (_dir, engine) = engine().await;
        dup_db::put_hash(&engine.db, "a", &bits(0)).await.unwrap();
        dup_db::put_hash(&engine.db, "b", &bits(1)).await.unwrap();

        assert_eq!(engine.find_candidates(Some(10)).await.unwrap().len(), 1);
        engine.ignore_pair("b", "a").await.unwrap();
        assert!(engine.find_candidates(Some(10)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_local_scan_limit_bounds_visited_entities() {
        let endpoint = spawn_catalog(5, json!([])).await;
        let (_dir, engine) = engine_with(endpoint).await;

        engine.local_scan(Some(2)).await.unwrap();
        assert_eq!(dup_db::all_hashes(&engine.db).await.unwrap().len(), 2);

        // A full pass picks up the rest
        engine.local_scan(None).await.unwrap();
        assert_eq!(dup_db::all_hashes(&engine.db).await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_server_scan_excludes_ignored_groups() {
        let groups = json!([
            { "entities": [{ "id": "a" }, { "id": "b" }, { "id": "c" }] },
            { "entities": [{ "id": "d" }, { "id": "e" }] },
        ]);
        let endpoint = spawn_catalog(0, groups).await;
        let (_dir, engine) = engine_with(endpoint).await;

        assert_eq!(engine.server_scan(0, 0.0).await.unwrap().len(), 2);

        // Member order must not matter for the suppression key
        engine
            .ignore_group(&["c".to_string(), "a".to_string(), "b".to_string()])
            .await
            .unwrap();
        let remaining = engine.server_scan(0, 0.0).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].entities[0].id, "d");
    }

    #[tokio::test]
    async fn test_foreign_hash_lengths_are_skipped() {
        let (_dir, engine) = engine().await;
        dup_db::put_hash(&engine.db, "a", &bits(0)).await.unwrap();
        dup_db::put_hash(&engine.db, "b", "0101").await.unwrap();

        assert!(engine.find_candidates(Some(64)).await.unwrap().is_empty());
    }
}
