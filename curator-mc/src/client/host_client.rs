//! Host query endpoint client
//!
//! Owns response caching, in-flight request coalescing and timeout
//! enforcement. Emits `ReadPerformed` / `MutationPerformed` on the event
//! bus after every request (success or failure) so other subsystems can
//! synchronize on host traffic without polling; a spawned listener clears
//! the caches after every mutation so no call site has to remember to
//! invalidate.

use crate::client::types::{
    Entity, EntityUpdate, FindEntitiesResult, HostDuplicateGroup, MergeOverrides,
};
use curator_common::events::{CuratorEvent, EventBus};
use futures::future::{BoxFuture, FutureExt, Shared};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Default per-request deadline
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
/// Default TTL for cached read responses
const DEFAULT_QUERY_CACHE_TTL: Duration = Duration::from_secs(30);

const FIND_ENTITY_QUERY: &str = r#"query FindEntity($id: ID!) { findEntity(id: $id) {
    id title url date details organized thumbnail_path
    identifiers { endpoint external_id }
    tags { id name } performers { id name } studio { id name }
    files { size width height duration }
} }"#;

const FIND_ENTITIES_QUERY: &str = r#"query FindEntities($page: Int!, $per_page: Int!) {
    findEntities(filter: { page: $page, per_page: $per_page }) {
        count
        entities { id title organized thumbnail_path files { size width height duration } }
    }
}"#;

const FIND_DUPLICATES_QUERY: &str = r#"query FindDuplicateEntities($distance: Int!, $duration_diff: Float!) {
    findDuplicateEntities(distance: $distance, duration_diff: $duration_diff) {
        entities { id title organized thumbnail_path
            tags { id name } performers { id name } studio { id name }
            files { size width height duration } }
    }
}"#;

const ENTITY_UPDATE_MUTATION: &str =
    r#"mutation EntityUpdate($input: EntityUpdateInput!) { entityUpdate(input: $input) { id } }"#;

const ENTITY_MERGE_MUTATION: &str = r#"mutation EntityMerge($destination: ID!, $source: [ID!]!, $values: EntityUpdateInput) {
    entityMerge(input: { destination: $destination, source: $source, values: $values }) { id }
}"#;

const ENTITY_DESTROY_MUTATION: &str =
    r#"mutation EntityDestroy($id: ID!) { entityDestroy(input: { id: $id }) }"#;

/// Host client errors
///
/// All variants are string-backed so coalesced callers can share a clone
/// of the first fetch's result.
#[derive(Debug, Clone, Error)]
pub enum HostError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Host returned errors: {0}")]
    Protocol(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

type SharedFetch = Shared<BoxFuture<'static, Result<Entity, HostError>>>;

struct ClientInner {
    http: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    event_bus: EventBus,
    request_timeout: Duration,
    query_cache_ttl: Duration,
    /// (query text, serialized variables) -> cached read response
    query_cache: Mutex<HashMap<String, (Instant, Value)>>,
    /// entity id -> (fetched at, ttl, entity)
    entity_cache: Mutex<HashMap<String, (Instant, Duration, Entity)>>,
    /// entity id -> in-flight shared fetch
    in_flight: Mutex<HashMap<String, SharedFetch>>,
}

/// Typed client for the host catalog's query endpoint
///
/// Cheaply cloneable; all clones share caches and coalescing state.
#[derive(Clone)]
pub struct HostClient {
    inner: Arc<ClientInner>,
}

impl HostClient {
    pub fn new(
        endpoint: String,
        api_key: Option<String>,
        event_bus: EventBus,
    ) -> Result<Self, HostError> {
        let http = reqwest::Client::builder()
            .timeout(DEFAULT_REQUEST_TIMEOUT)
            .build()
            .map_err(|e| HostError::Network(e.to_string()))?;

        Ok(Self {
            inner: Arc::new(ClientInner {
                http,
                endpoint,
                api_key,
                event_bus,
                request_timeout: DEFAULT_REQUEST_TIMEOUT,
                query_cache_ttl: DEFAULT_QUERY_CACHE_TTL,
                query_cache: Mutex::new(HashMap::new()),
                entity_cache: Mutex::new(HashMap::new()),
                in_flight: Mutex::new(HashMap::new()),
            }),
        })
    }

    /// Spawn the central cache-invalidation hook: every mutation signal
    /// observed on the bus drops all cached reads.
    pub fn spawn_invalidation_listener(&self) {
        let client = self.clone();
        let mut rx = self.inner.event_bus.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(CuratorEvent::MutationPerformed { .. }) => {
                        tracing::debug!("Mutation observed, clearing host client caches");
                        client.clear();
                    }
                    Ok(_) => {}
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {
                        // Missed events may include a mutation; clear to be safe
                        client.clear();
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }

    /// Send a request to the host endpoint
    ///
    /// Reads are cached for a short TTL keyed by (query text, serialized
    /// variables); mutations are never cached. Top-level `errors[]` in the
    /// response fail the call with the joined messages.
    pub async fn query(&self, query: &str, variables: Value) -> Result<Value, HostError> {
        let mutation = is_mutation(query);
        let operation = operation_name(query);

        if !mutation {
            let key = cache_key(query, &variables);
            if let Some(hit) = self.cached_query_response(&key) {
                tracing::debug!(operation = %operation, "Query cache hit");
                return Ok(hit);
            }
        }

        let result = self.send_request(query, &variables).await;

        // Signal after every request, success or failure
        let event = if mutation {
            CuratorEvent::MutationPerformed {
                operation: operation.clone(),
                success: result.is_ok(),
                timestamp: chrono::Utc::now(),
            }
        } else {
            CuratorEvent::ReadPerformed {
                operation: operation.clone(),
                success: result.is_ok(),
                timestamp: chrono::Utc::now(),
            }
        };
        self.inner.event_bus.emit_lossy(event);

        let data = result?;

        if !mutation {
            let key = cache_key(query, &variables);
            self.inner
                .query_cache
                .lock()
                .unwrap()
                .insert(key, (Instant::now(), data.clone()));
        }

        Ok(data)
    }

    async fn send_request(&self, query: &str, variables: &Value) -> Result<Value, HostError> {
        let mut request = self
            .inner
            .http
            .post(&self.inner.endpoint)
            .timeout(self.inner.request_timeout)
            .json(&json!({ "query": query, "variables": variables }));

        if let Some(key) = &self.inner.api_key {
            request = request.header("ApiKey", key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                HostError::Timeout
            } else {
                HostError::Network(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(HostError::Protocol(format!("HTTP {}: {}", status, body)));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| HostError::Parse(e.to_string()))?;

        if let Some(errors) = body.get("errors").and_then(|e| e.as_array()) {
            if !errors.is_empty() {
                let joined = errors
                    .iter()
                    .map(|e| {
                        e.get("message")
                            .and_then(|m| m.as_str())
                            .unwrap_or("unknown error")
                            .to_string()
                    })
                    .collect::<Vec<_>>()
                    .join("; ");
                return Err(HostError::Protocol(joined));
            }
        }

        body.get("data")
            .cloned()
            .ok_or_else(|| HostError::Parse("response missing data".to_string()))
    }

    /// Fetch an entity with in-flight coalescing and an id-keyed TTL cache
    ///
    /// Concurrent callers for the same id before the first fetch resolves
    /// share the same underlying request.
    pub async fn entity_cached(&self, id: &str, ttl: Duration) -> Result<Entity, HostError> {
        if let Some(entity) = self.cached_entity(id) {
            return Ok(entity);
        }

        let fetch = {
            let mut in_flight = self.inner.in_flight.lock().unwrap();
            if let Some(existing) = in_flight.get(id) {
                existing.clone()
            } else {
                let client = self.clone();
                let id_owned = id.to_string();
                let fetch: SharedFetch = async move {
                    let result = client.find_entity(&id_owned).await;
                    if let Ok(entity) = &result {
                        client.inner.entity_cache.lock().unwrap().insert(
                            id_owned.clone(),
                            (Instant::now(), ttl, entity.clone()),
                        );
                    }
                    client.inner.in_flight.lock().unwrap().remove(&id_owned);
                    result
                }
                .boxed()
                .shared();
                in_flight.insert(id.to_string(), fetch.clone());
                fetch
            }
        };

        fetch.await
    }

    /// Drop all cached entries and in-flight coalescing state
    pub fn clear(&self) {
        self.inner.query_cache.lock().unwrap().clear();
        self.inner.entity_cache.lock().unwrap().clear();
        self.inner.in_flight.lock().unwrap().clear();
    }

    fn cached_query_response(&self, key: &str) -> Option<Value> {
        let cache = self.inner.query_cache.lock().unwrap();
        cache.get(key).and_then(|(at, value)| {
            (at.elapsed() < self.inner.query_cache_ttl).then(|| value.clone())
        })
    }

    fn cached_entity(&self, id: &str) -> Option<Entity> {
        let cache = self.inner.entity_cache.lock().unwrap();
        cache
            .get(id)
            .and_then(|(at, ttl, entity)| (at.elapsed() < *ttl).then(|| entity.clone()))
    }

    // ------------------------------------------------------------------
    // Typed operations
    // ------------------------------------------------------------------

    /// Fetch one entity by id (uncached path; see `entity_cached`)
    pub async fn find_entity(&self, id: &str) -> Result<Entity, HostError> {
        let data = self.query(FIND_ENTITY_QUERY, json!({ "id": id })).await?;
        let node = data
            .get("findEntity")
            .filter(|v| !v.is_null())
            .ok_or_else(|| HostError::Protocol(format!("entity {} not found", id)))?;
        serde_json::from_value(node.clone()).map_err(|e| HostError::Parse(e.to_string()))
    }

    /// Page through the catalog
    pub async fn find_entities(
        &self,
        page: usize,
        per_page: usize,
    ) -> Result<FindEntitiesResult, HostError> {
        let data = self
            .query(
                FIND_ENTITIES_QUERY,
                json!({ "page": page, "per_page": per_page }),
            )
            .await?;
        let node = data
            .get("findEntities")
            .ok_or_else(|| HostError::Parse("missing findEntities".to_string()))?;
        serde_json::from_value(node.clone()).map_err(|e| HostError::Parse(e.to_string()))
    }

    /// Delegate similarity search to the host's native duplicate finder
    pub async fn find_duplicate_candidates(
        &self,
        accuracy: i32,
        duration_tolerance: f64,
    ) -> Result<Vec<HostDuplicateGroup>, HostError> {
        let data = self
            .query(
                FIND_DUPLICATES_QUERY,
                json!({ "distance": accuracy, "duration_diff": duration_tolerance }),
            )
            .await?;
        let node = data
            .get("findDuplicateEntities")
            .ok_or_else(|| HostError::Parse("missing findDuplicateEntities".to_string()))?;
        serde_json::from_value(node.clone()).map_err(|e| HostError::Parse(e.to_string()))
    }

    /// Persist entity field changes
    pub async fn update_entity(&self, update: &EntityUpdate) -> Result<(), HostError> {
        let input = serde_json::to_value(update).map_err(|e| HostError::Parse(e.to_string()))?;
        self.query(ENTITY_UPDATE_MUTATION, json!({ "input": input }))
            .await?;
        Ok(())
    }

    /// Set the organized flag
    pub async fn set_organized(&self, id: &str, organized: bool) -> Result<(), HostError> {
        let update = EntityUpdate {
            id: id.to_string(),
            organized: Some(organized),
            ..EntityUpdate::default()
        };
        self.update_entity(&update).await
    }

    /// Merge source entities into a destination, with optional explicit
    /// override values
    pub async fn merge_entities(
        &self,
        destination: &str,
        sources: &[String],
        values: Option<&MergeOverrides>,
    ) -> Result<(), HostError> {
        let values = match values {
            Some(v) if !v.is_empty() => {
                serde_json::to_value(v).map_err(|e| HostError::Parse(e.to_string()))?
            }
            _ => Value::Null,
        };
        self.query(
            ENTITY_MERGE_MUTATION,
            json!({ "destination": destination, "source": sources, "values": values }),
        )
        .await?;
        Ok(())
    }

    /// Destroy an entity (destructive; callers gate behind confirmation)
    pub async fn destroy_entity(&self, id: &str) -> Result<(), HostError> {
        self.query(ENTITY_DESTROY_MUTATION, json!({ "id": id }))
            .await?;
        Ok(())
    }
}

/// Whether the request text is a mutating operation
fn is_mutation(query: &str) -> bool {
    query.trim_start().starts_with("mutation")
}

/// Human-readable operation label for signals and logs
fn operation_name(query: &str) -> String {
    let trimmed = query.trim_start();
    let after_kind = trimmed
        .strip_prefix("mutation")
        .or_else(|| trimmed.strip_prefix("query"))
        .unwrap_or(trimmed);
    after_kind
        .trim_start()
        .chars()
        .take_while(|c| c.is_alphanumeric() || *c == '_')
        .collect::<String>()
}

fn cache_key(query: &str, variables: &Value) -> String {
    format!("{}|{}", query, variables)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::post;
    use axum::{Json, Router};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_is_mutation() {
        assert!(is_mutation("mutation EntityUpdate { x }"));
        assert!(is_mutation("  mutation X { y }"));
        assert!(!is_mutation("query FindEntity { x }"));
    }

    #[test]
    fn test_operation_name() {
        assert_eq!(operation_name(FIND_ENTITY_QUERY), "FindEntity");
        assert_eq!(operation_name(ENTITY_MERGE_MUTATION), "EntityMerge");
    }

    /// Serve canned JSON from an in-process endpoint, counting requests
    async fn spawn_fake_host(response: Value) -> (String, Arc<AtomicUsize>) {
        let hits = Arc::new(AtomicUsize::new(0));
        let hits_clone = hits.clone();
        let app = Router::new().route(
            "/graphql",
            post(move |_body: Json<Value>| {
                let hits = hits_clone.clone();
                let response = response.clone();
                async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    Json(response)
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{}/graphql", addr), hits)
    }

    fn entity_json(id: &str) -> Value {
        json!({
            "id": id,
            "title": "Example",
            "organized": false,
            "identifiers": [],
            "tags": [], "performers": [], "files": []
        })
    }

    #[tokio::test]
    async fn test_read_is_cached_and_signalled() {
        let (endpoint, hits) =
            spawn_fake_host(json!({ "data": { "findEntity": entity_json("1") } })).await;
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        let client = HostClient::new(endpoint, None, bus).unwrap();

        let first = client.find_entity("1").await.unwrap();
        let second = client.find_entity("1").await.unwrap();
        assert_eq!(first.id, second.id);
        // Second call served from the query cache
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        let event = rx.recv().await.unwrap();
        assert_eq!(event.name(), "ReadPerformed");
    }

    #[tokio::test]
    async fn test_protocol_errors_are_joined() {
        let (endpoint, _hits) = spawn_fake_host(json!({
            "data": null,
            "errors": [ { "message": "first" }, { "message": "second" } ]
        }))
        .await;
        let client = HostClient::new(endpoint, None, EventBus::new(16)).unwrap();

        let err = client.find_entity("1").await.unwrap_err();
        match err {
            HostError::Protocol(msg) => assert_eq!(msg, "first; second"),
            other => panic!("Expected Protocol, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_mutation_emits_mutation_signal() {
        let (endpoint, _hits) =
            spawn_fake_host(json!({ "data": { "entityUpdate": { "id": "1" } } })).await;
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        let client = HostClient::new(endpoint, None, bus).unwrap();

        client.set_organized("1", true).await.unwrap();

        let event = rx.recv().await.unwrap();
        assert_eq!(event.name(), "MutationPerformed");
    }

    #[tokio::test]
    async fn test_entity_cached_coalesces_concurrent_fetches() {
        let (endpoint, hits) =
            spawn_fake_host(json!({ "data": { "findEntity": entity_json("7") } })).await;
        let client = HostClient::new(endpoint, None, EventBus::new(16)).unwrap();

        let a = client.clone();
        let b = client.clone();
        let (ra, rb) = tokio::join!(
            a.entity_cached("7", Duration::from_secs(60)),
            b.entity_cached("7", Duration::from_secs(60)),
        );
        assert_eq!(ra.unwrap().id, "7");
        assert_eq!(rb.unwrap().id, "7");
        // Coalescing (or the query cache for a late second start) keeps
        // this at a single upstream request
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_clear_drops_caches() {
        let (endpoint, hits) =
            spawn_fake_host(json!({ "data": { "findEntity": entity_json("1") } })).await;
        let client = HostClient::new(endpoint, None, EventBus::new(16)).unwrap();

        client.entity_cached("1", Duration::from_secs(60)).await.unwrap();
        client.clear();
        client.entity_cached("1", Duration::from_secs(60)).await.unwrap();

        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }
}
