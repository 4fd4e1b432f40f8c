//! Query handler shared by the MCP and HTTP bindings.
//!
//! Every operation is a single pass: decode parameters, call the embedding
//! provider and/or vector store once, format, respond. Adapter failures are
//! converted into error-flagged [`ToolResponse`]s here; only undecodable
//! parameters escape as `Err`.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info};

use crate::config::Config;
use crate::embedding::{EmbeddingProvider, OpenAIProvider};
use crate::format;
use crate::qdrant::{QdrantStore, ScoredPoint, VectorStore};

pub const QUERY_TOOL: &str = "query_vector_store";
pub const LIST_COLLECTIONS_TOOL: &str = "list_collections";
pub const COLLECTION_INFO_TOOL: &str = "collection_info";

/// A single text content block.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TextContent {
    #[serde(rename = "type")]
    pub kind: String,
    pub text: String,
}

impl TextContent {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            kind: "text".to_string(),
            text: text.into(),
        }
    }
}

/// Structured search results carried next to the display text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchData {
    pub results: Vec<ScoredPoint>,
}

/// Response shape shared by both bindings.
///
/// Serializes as `{"content": [...], "data"?: {...}, "isError"?: true}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolResponse {
    pub content: Vec<TextContent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<SearchData>,
    #[serde(
        rename = "isError",
        default,
        skip_serializing_if = "std::ops::Not::not"
    )]
    pub is_error: bool,
}

impl ToolResponse {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![TextContent::new(text)],
            data: None,
            is_error: false,
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            is_error: true,
            ..Self::text(text)
        }
    }

    /// First content block's text, or `""`.
    pub fn first_text(&self) -> &str {
        self.content.first().map(|c| c.text.as_str()).unwrap_or("")
    }
}

/// Parameters of `query_vector_store`.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct QueryParams {
    pub query: String,
    #[serde(default, deserialize_with = "whole_number")]
    pub limit: Option<u64>,
    #[serde(default)]
    pub filter_type: Option<String>,
}

/// `limit` as an integer or a whole float (`2.0`).
fn whole_number<'de, D>(deserializer: D) -> std::result::Result<Option<u64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error;

    let Some(value) = Option::<serde_json::Number>::deserialize(deserializer)? else {
        return Ok(None);
    };
    if let Some(n) = value.as_u64() {
        return Ok(Some(n));
    }
    match value.as_f64() {
        Some(f) if f >= 0.0 && f.fract() == 0.0 && f <= u64::MAX as f64 => Ok(Some(f as u64)),
        _ => Err(D::Error::custom(format!(
            "invalid limit {}, expected a non-negative integer",
            value
        ))),
    }
}

/// Parameters of `collection_info` over HTTP.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CollectionInfoParams {
    #[serde(default)]
    pub collection_name: Option<String>,
}

/// Stateless orchestrator over an embedding provider and a vector store.
pub struct QueryHandler {
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    collection: String,
    default_limit: u64,
    corpus_label: String,
}

impl QueryHandler {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
        config: &Config,
    ) -> Self {
        Self {
            embedder,
            store,
            collection: config.qdrant.collection.clone(),
            default_limit: config.search.default_limit,
            corpus_label: config.search.corpus_label.clone(),
        }
    }

    /// Build the OpenAI + Qdrant adapters from configuration.
    pub fn from_config(config: &Config) -> Result<Self> {
        let embedder = OpenAIProvider::new(&config.embedding)?;
        let store = QdrantStore::new(&config.qdrant)?;
        info!(
            collection = %config.qdrant.collection,
            qdrant = %store.base_url(),
            model = embedder.model_name(),
            "query handler ready"
        );
        Ok(Self::new(Arc::new(embedder), Arc::new(store), config))
    }

    /// Dispatch a tool call by name.
    ///
    /// Unknown names yield an error-flagged response, not an `Err`.
    ///
    /// # Errors
    ///
    /// Returns an error when `params` cannot be decoded for the named tool.
    pub async fn call(&self, tool_name: &str, params: Value) -> Result<ToolResponse> {
        match tool_name {
            QUERY_TOOL => {
                let params: QueryParams = serde_json::from_value(params)
                    .with_context(|| format!("invalid params for {}", QUERY_TOOL))?;
                Ok(self.query_vector_store(params).await)
            }
            LIST_COLLECTIONS_TOOL => Ok(self.list_collections().await),
            COLLECTION_INFO_TOOL => {
                let params: CollectionInfoParams = if params.is_null() {
                    CollectionInfoParams::default()
                } else {
                    serde_json::from_value(params)
                        .with_context(|| format!("invalid params for {}", COLLECTION_INFO_TOOL))?
                };
                let name = params
                    .collection_name
                    .unwrap_or_else(|| self.collection.clone());
                Ok(self.collection_info(&name).await)
            }
            other => Ok(ToolResponse::error(format!("Unsupported tool: {}", other))),
        }
    }

    /// Embed the query, search the configured collection and format the hits.
    pub async fn query_vector_store(&self, params: QueryParams) -> ToolResponse {
        info!(
            collection = %self.collection,
            query = %params.query,
            "querying vector store"
        );
        match self.search(&params).await {
            Ok(matches) => {
                info!(count = matches.len(), "search complete");
                let formatted = format::format_matches(matches, &self.corpus_label);
                let data = if formatted.results.is_empty() {
                    None
                } else {
                    Some(SearchData {
                        results: formatted.results,
                    })
                };
                ToolResponse {
                    data,
                    ..ToolResponse::text(formatted.text)
                }
            }
            Err(e) => {
                error!(error = %e, "error querying vector store");
                ToolResponse::error(format!("Error querying {}: {}", self.corpus_label, e))
            }
        }
    }

    /// The raw embed-then-search step, without formatting.
    pub async fn search(&self, params: &QueryParams) -> Result<Vec<ScoredPoint>> {
        let limit = params.limit.unwrap_or(self.default_limit);
        let filter = params.filter_type.as_deref().filter(|t| !t.is_empty());
        info!(limit, filter = ?filter, "searching");

        let vector = self.embedder.embed(&params.query).await?;
        self.store
            .search(&self.collection, vector, limit, filter)
            .await
    }

    pub async fn list_collections(&self) -> ToolResponse {
        match self.store.list_collections().await {
            Ok(names) => ToolResponse::text(format::collections_text(&names)),
            Err(e) => {
                error!(error = %e, "error listing collections");
                ToolResponse::error(format!("Error listing collections: {}", e))
            }
        }
    }

    pub async fn collection_info(&self, name: &str) -> ToolResponse {
        match self.store.collection_info(name).await {
            Ok(info) => ToolResponse::text(format::collection_info_text(&info)),
            Err(e) => {
                error!(collection = name, error = %e, "error getting collection info");
                ToolResponse::error(format!("Error getting collection info: {}", e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qdrant::CollectionDescriptor;
    use anyhow::bail;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    struct FixedEmbedder {
        fail: bool,
    }

    #[async_trait]
    impl EmbeddingProvider for FixedEmbedder {
        fn model_name(&self) -> &str {
            "fixed"
        }

        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            if self.fail {
                bail!("OpenAI API error 401 Unauthorized: invalid key");
            }
            Ok(vec![0.1, 0.2, 0.3])
        }
    }

    #[derive(Default)]
    struct FakeStore {
        points: Vec<ScoredPoint>,
        collections: Vec<String>,
        fail: bool,
        seen: Mutex<Vec<(String, u64, Option<String>)>>,
    }

    #[async_trait]
    impl VectorStore for FakeStore {
        async fn search(
            &self,
            collection: &str,
            _vector: Vec<f32>,
            limit: u64,
            type_filter: Option<&str>,
        ) -> Result<Vec<ScoredPoint>> {
            if self.fail {
                bail!("connection refused");
            }
            self.seen.lock().unwrap().push((
                collection.to_string(),
                limit,
                type_filter.map(str::to_string),
            ));
            Ok(self.points.iter().take(limit as usize).cloned().collect())
        }

        async fn list_collections(&self) -> Result<Vec<String>> {
            if self.fail {
                bail!("connection refused");
            }
            Ok(self.collections.clone())
        }

        async fn collection_info(&self, name: &str) -> Result<CollectionDescriptor> {
            if self.fail {
                bail!("Qdrant error 404 Not Found: missing");
            }
            Ok(CollectionDescriptor {
                name: name.to_string(),
                vector_size: Some(1536),
                distance: None,
                points_count: Some(3),
            })
        }

        async fn sample_points(&self, _collection: &str, _limit: u64) -> Result<Vec<Value>> {
            Ok(vec![])
        }
    }

    fn handler(store: FakeStore, embed_fails: bool) -> (QueryHandler, Arc<FakeStore>) {
        let store = Arc::new(store);
        let handler = QueryHandler::new(
            Arc::new(FixedEmbedder { fail: embed_fails }),
            store.clone(),
            &Config::default(),
        );
        (handler, store)
    }

    fn two_points() -> Vec<ScoredPoint> {
        vec![
            ScoredPoint::new(0.91, json!({ "title": "Appointments", "type": "manual", "text": "Open the schedule." })),
            ScoredPoint::new(0.77, json!({ "metadata": { "title": "appointment table", "type": "database" }, "content": "Columns..." })),
        ]
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let (h, _) = handler(FakeStore::default(), false);
        let resp = h.call("foo", json!({})).await.unwrap();
        assert!(resp.is_error);
        assert_eq!(resp.first_text(), "Unsupported tool: foo");
    }

    #[tokio::test]
    async fn test_query_pipeline() {
        let (h, store) = handler(
            FakeStore {
                points: two_points(),
                ..Default::default()
            },
            false,
        );
        let resp = h
            .call(QUERY_TOOL, json!({ "query": "appointments", "limit": 2 }))
            .await
            .unwrap();

        assert!(!resp.is_error);
        assert_eq!(resp.data.as_ref().unwrap().results.len(), 2);
        let text = resp.first_text();
        assert_eq!(text.matches("## ").count(), 2);
        assert!(text.contains("## 2. appointment table (database, Score: 0.77)"));

        let seen = store.seen.lock().unwrap();
        assert_eq!(seen[0], ("open_dental_docs".to_string(), 2, None));
    }

    #[tokio::test]
    async fn test_default_limit_and_filter() {
        let (h, store) = handler(FakeStore::default(), false);
        h.call(QUERY_TOOL, json!({ "query": "tables", "filter_type": "database" }))
            .await
            .unwrap();
        h.call(QUERY_TOOL, json!({ "query": "tables", "filter_type": "" }))
            .await
            .unwrap();

        let seen = store.seen.lock().unwrap();
        assert_eq!(seen[0].1, 5);
        assert_eq!(seen[0].2.as_deref(), Some("database"));
        assert_eq!(seen[1].2, None);
    }

    #[tokio::test]
    async fn test_empty_results_have_no_data() {
        let (h, _) = handler(FakeStore::default(), false);
        let resp = h
            .call(QUERY_TOOL, json!({ "query": "nothing" }))
            .await
            .unwrap();
        assert!(!resp.is_error);
        assert!(resp.data.is_none());
        assert!(resp.first_text().contains("couldn't find any relevant information"));
    }

    #[tokio::test]
    async fn test_embedding_failure_is_flagged() {
        let (h, store) = handler(
            FakeStore {
                points: two_points(),
                ..Default::default()
            },
            true,
        );
        let resp = h
            .call(QUERY_TOOL, json!({ "query": "claims" }))
            .await
            .unwrap();
        assert!(resp.is_error);
        assert_eq!(
            resp.first_text(),
            "Error querying OpenDental documentation: OpenAI API error 401 Unauthorized: invalid key"
        );
        assert!(store.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_search_failure_is_flagged() {
        let (h, _) = handler(
            FakeStore {
                fail: true,
                ..Default::default()
            },
            false,
        );
        let resp = h
            .query_vector_store(QueryParams {
                query: "claims".to_string(),
                limit: None,
                filter_type: None,
            })
            .await;
        assert!(resp.is_error);
        assert!(resp.first_text().ends_with("connection refused"));
    }

    #[tokio::test]
    async fn test_missing_query_is_err() {
        let (h, _) = handler(FakeStore::default(), false);
        assert!(h.call(QUERY_TOOL, json!({ "limit": 2 })).await.is_err());
        assert!(h.call(QUERY_TOOL, Value::Null).await.is_err());
    }

    #[test]
    fn test_limit_accepts_whole_floats() {
        let params: QueryParams =
            serde_json::from_value(json!({ "query": "x", "limit": 2.0 })).unwrap();
        assert_eq!(params.limit, Some(2));

        let params: QueryParams = serde_json::from_value(json!({ "query": "x", "limit": null })).unwrap();
        assert_eq!(params.limit, None);

        assert!(serde_json::from_value::<QueryParams>(json!({ "query": "x", "limit": 2.5 })).is_err());
        assert!(serde_json::from_value::<QueryParams>(json!({ "query": "x", "limit": -1 })).is_err());
    }

    #[tokio::test]
    async fn test_list_collections() {
        let (h, _) = handler(FakeStore::default(), false);
        let resp = h.call(LIST_COLLECTIONS_TOOL, Value::Null).await.unwrap();
        assert_eq!(resp.first_text(), "Available Qdrant Collections:\nNone found.");

        let (h, _) = handler(
            FakeStore {
                collections: vec!["a".to_string(), "b".to_string()],
                ..Default::default()
            },
            false,
        );
        let resp = h.list_collections().await;
        assert_eq!(resp.first_text(), "Available Qdrant Collections:\n- a\n- b");
    }

    #[tokio::test]
    async fn test_list_collections_failure() {
        let (h, _) = handler(
            FakeStore {
                fail: true,
                ..Default::default()
            },
            false,
        );
        let resp = h.list_collections().await;
        assert!(resp.is_error);
        assert_eq!(resp.first_text(), "Error listing collections: connection refused");
    }

    #[tokio::test]
    async fn test_collection_info_defaults_to_configured() {
        let (h, _) = handler(FakeStore::default(), false);
        let resp = h.call(COLLECTION_INFO_TOOL, json!({})).await.unwrap();
        assert_eq!(
            resp.first_text(),
            "Collection open_dental_docs Info:\nVector size: 1536\nDistance: Unknown\nVectors count: 3"
        );

        let resp = h
            .call(COLLECTION_INFO_TOOL, json!({ "collection_name": "other" }))
            .await
            .unwrap();
        assert!(resp.first_text().starts_with("Collection other Info:"));
    }

    #[test]
    fn test_response_serialization() {
        let ok = serde_json::to_value(ToolResponse::text("hi")).unwrap();
        assert_eq!(ok, json!({ "content": [{ "type": "text", "text": "hi" }] }));

        let err = serde_json::to_value(ToolResponse::error("bad")).unwrap();
        assert_eq!(
            err,
            json!({ "content": [{ "type": "text", "text": "bad" }], "isError": true })
        );
    }
}
