//! Vector store abstraction and the Qdrant REST implementation.
//!
//! [`VectorStore`] is the seam between the query handler and the vector
//! database. [`QdrantStore`] speaks the Qdrant HTTP API directly:
//!
//! | Operation | Endpoint |
//! |-----------|----------|
//! | [`search`](VectorStore::search) | `POST /collections/{name}/points/search` |
//! | [`list_collections`](VectorStore::list_collections) | `GET /collections` |
//! | [`collection_info`](VectorStore::collection_info) | `GET /collections/{name}` |
//! | [`sample_points`](VectorStore::sample_points) | `POST /collections/{name}/points/scroll` |
//!
//! Results are returned in backend order; nothing is re-sorted locally.

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;

use crate::config::QdrantConfig;

/// Payload key the type filter matches against.
pub const TYPE_FILTER_KEY: &str = "metadata.type";

/// One ranked search hit.
///
/// `payload` is kept untyped: ingestion writes both flat and nested
/// (`metadata.*`) shapes. Every other field the backend returns (`id`,
/// `version`, ...) is preserved in `extra` so the hit serializes back
/// unmodified.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoredPoint {
    pub score: f64,
    #[serde(default)]
    pub payload: Option<Map<String, Value>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ScoredPoint {
    pub fn new(score: f64, payload: Value) -> Self {
        Self {
            score,
            payload: match payload {
                Value::Object(map) => Some(map),
                _ => None,
            },
            extra: Map::new(),
        }
    }
}

/// Summary of one collection. `None` fields render as `Unknown`.
#[derive(Debug, Clone, Serialize, PartialEq, Default)]
pub struct CollectionDescriptor {
    pub name: String,
    pub vector_size: Option<u64>,
    pub distance: Option<String>,
    pub points_count: Option<u64>,
}

impl CollectionDescriptor {
    /// Build a descriptor from the `result` object of `GET /collections/{name}`.
    pub fn from_response(name: &str, result: &Value) -> Self {
        let vectors = result.pointer("/config/params/vectors");
        let vector_size = vectors
            .and_then(|v| v.get("size"))
            .and_then(Value::as_u64)
            .filter(|size| *size > 0);
        let distance = vectors
            .and_then(|v| v.get("distance"))
            .and_then(Value::as_str)
            .filter(|d| !d.is_empty())
            .map(str::to_string);
        let points_count = result
            .get("vectors_count")
            .and_then(Value::as_u64)
            .or_else(|| result.get("points_count").and_then(Value::as_u64));

        Self {
            name: name.to_string(),
            vector_size,
            distance,
            points_count,
        }
    }
}

impl fmt::Display for CollectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn or_unknown<T: fmt::Display>(value: &Option<T>) -> String {
            value
                .as_ref()
                .map(|v| v.to_string())
                .unwrap_or_else(|| "Unknown".to_string())
        }
        write!(
            f,
            "Collection {} Info:\nVector size: {}\nDistance: {}\nVectors count: {}",
            self.name,
            or_unknown(&self.vector_size),
            or_unknown(&self.distance),
            or_unknown(&self.points_count)
        )
    }
}

/// Backend operations the query handler depends on.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Nearest neighbours of `vector` in `collection`, best first.
    ///
    /// When `type_filter` is set, only points whose `metadata.type`
    /// equals it exactly are considered.
    async fn search(
        &self,
        collection: &str,
        vector: Vec<f32>,
        limit: u64,
        type_filter: Option<&str>,
    ) -> Result<Vec<ScoredPoint>>;

    /// Names of all collections.
    async fn list_collections(&self) -> Result<Vec<String>>;

    /// Describe one collection.
    async fn collection_info(&self, name: &str) -> Result<CollectionDescriptor>;

    /// Up to `limit` raw points with payloads and without vectors.
    async fn sample_points(&self, collection: &str, limit: u64) -> Result<Vec<Value>>;
}

/// Filter clause restricting a search to one `metadata.type` value.
pub fn type_filter(value: &str) -> Value {
    json!({
        "must": [
            { "key": TYPE_FILTER_KEY, "match": { "value": value } }
        ]
    })
}

/// Request body for `POST /collections/{name}/points/search`.
pub fn search_body(vector: Vec<f32>, limit: u64, filter_value: Option<&str>) -> Value {
    let mut body = json!({
        "vector": vector,
        "limit": limit,
        "with_payload": true,
    });
    if let Some(value) = filter_value {
        body["filter"] = type_filter(value);
    }
    body
}

#[derive(Deserialize)]
struct Envelope<T> {
    result: T,
}

#[derive(Deserialize)]
struct CollectionsResult {
    collections: Vec<CollectionName>,
}

#[derive(Deserialize)]
struct CollectionName {
    name: String,
}

#[derive(Deserialize)]
struct ScrollResult {
    points: Vec<Value>,
}

// ============ Qdrant REST client ============

/// [`VectorStore`] over the Qdrant REST API.
pub struct QdrantStore {
    base: Url,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl QdrantStore {
    pub fn new(config: &QdrantConfig) -> Result<Self> {
        let base_url = config.base_url();
        let base = Url::parse(&base_url)
            .map_err(|e| anyhow!("Invalid Qdrant URL '{}': {}", base_url, e))?;
        if base.cannot_be_a_base() {
            bail!("Invalid Qdrant URL '{}': not a base URL", base_url);
        }

        Ok(Self {
            base,
            api_key: config.api_key.clone(),
            client: reqwest::Client::new(),
        })
    }

    /// Base address requests are sent to.
    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn request(&self, method: reqwest::Method, url: Url) -> reqwest::RequestBuilder {
        let builder = self.client.request(method, url);
        match &self.api_key {
            Some(key) => builder.header("api-key", key),
            None => builder,
        }
    }

    async fn send<T: serde::de::DeserializeOwned>(
        &self,
        builder: reqwest::RequestBuilder,
    ) -> Result<T> {
        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("Qdrant error {}: {}", status, body_text);
        }
        let envelope: Envelope<T> = response.json().await?;
        Ok(envelope.result)
    }
}

#[async_trait]
impl VectorStore for QdrantStore {
    async fn search(
        &self,
        collection: &str,
        vector: Vec<f32>,
        limit: u64,
        type_filter: Option<&str>,
    ) -> Result<Vec<ScoredPoint>> {
        let url = self.endpoint(&["collections", collection, "points", "search"]);
        let body = search_body(vector, limit, type_filter);
        self.send(self.request(reqwest::Method::POST, url).json(&body))
            .await
    }

    async fn list_collections(&self) -> Result<Vec<String>> {
        let url = self.endpoint(&["collections"]);
        let result: CollectionsResult = self.send(self.request(reqwest::Method::GET, url)).await?;
        Ok(result.collections.into_iter().map(|c| c.name).collect())
    }

    async fn collection_info(&self, name: &str) -> Result<CollectionDescriptor> {
        let url = self.endpoint(&["collections", name]);
        let result: Value = self.send(self.request(reqwest::Method::GET, url)).await?;
        Ok(CollectionDescriptor::from_response(name, &result))
    }

    async fn sample_points(&self, collection: &str, limit: u64) -> Result<Vec<Value>> {
        let url = self.endpoint(&["collections", collection, "points", "scroll"]);
        let body = json!({
            "limit": limit,
            "with_payload": true,
            "with_vector": false,
        });
        let result: ScrollResult = self
            .send(self.request(reqwest::Method::POST, url).json(&body))
            .await?;
        Ok(result.points)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_body_without_filter() {
        let body = search_body(vec![0.1, 0.2], 5, None);
        assert_eq!(body["limit"], 5);
        assert_eq!(body["with_payload"], true);
        assert!(body.get("filter").is_none());
    }

    #[test]
    fn test_search_body_with_filter() {
        let body = search_body(vec![0.1], 3, Some("api"));
        assert_eq!(body["filter"]["must"][0]["key"], "metadata.type");
        assert_eq!(body["filter"]["must"][0]["match"]["value"], "api");
    }

    #[test]
    fn test_scored_point_keeps_extra_fields() {
        let raw = json!({
            "id": 42,
            "version": 7,
            "score": 0.91,
            "payload": { "title": "Claims" }
        });
        let point: ScoredPoint = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(point.score, 0.91);
        assert_eq!(point.extra.get("id"), Some(&json!(42)));
        assert_eq!(serde_json::to_value(&point).unwrap(), raw);
    }

    #[test]
    fn test_scored_point_null_payload() {
        let point: ScoredPoint =
            serde_json::from_value(json!({ "id": "a", "score": 0.5, "payload": null })).unwrap();
        assert!(point.payload.is_none());
    }

    #[test]
    fn test_descriptor_from_full_response() {
        let result = json!({
            "status": "green",
            "vectors_count": 1200,
            "points_count": 1200,
            "config": { "params": { "vectors": { "size": 1536, "distance": "Cosine" } } }
        });
        let info = CollectionDescriptor::from_response("docs", &result);
        assert_eq!(info.vector_size, Some(1536));
        assert_eq!(info.distance.as_deref(), Some("Cosine"));
        assert_eq!(info.points_count, Some(1200));
        assert_eq!(
            info.to_string(),
            "Collection docs Info:\nVector size: 1536\nDistance: Cosine\nVectors count: 1200"
        );
    }

    #[test]
    fn test_descriptor_fields_default_independently() {
        let result = json!({
            "points_count": 12,
            "config": { "params": { "vectors": { "distance": "Dot" } } }
        });
        let info = CollectionDescriptor::from_response("named", &result);
        assert_eq!(info.vector_size, None);
        assert_eq!(info.distance.as_deref(), Some("Dot"));
        assert_eq!(info.points_count, Some(12));
        assert!(info.to_string().contains("Vector size: Unknown"));
    }

    #[test]
    fn test_descriptor_empty_response() {
        let info = CollectionDescriptor::from_response("x", &json!({}));
        assert_eq!(
            info.to_string(),
            "Collection x Info:\nVector size: Unknown\nDistance: Unknown\nVectors count: Unknown"
        );
    }

    #[test]
    fn test_endpoint_segments() {
        let config = QdrantConfig {
            url: Some("http://localhost:6333/".to_string()),
            ..QdrantConfig::default()
        };
        let store = QdrantStore::new(&config).unwrap();
        let url = store.endpoint(&["collections", "my docs", "points", "search"]);
        assert_eq!(
            url.as_str(),
            "http://localhost:6333/collections/my%20docs/points/search"
        );
    }

    #[test]
    fn test_invalid_url_rejected() {
        let config = QdrantConfig {
            url: Some("not a url".to_string()),
            ..QdrantConfig::default()
        };
        assert!(QdrantStore::new(&config).is_err());
    }
}
