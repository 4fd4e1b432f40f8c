//! Embedding provider abstraction and the OpenAI implementation.
//!
//! A query is embedded exactly once per request. Provider failures
//! (authentication, quota, network) are surfaced unchanged: there is no
//! retry and no backoff at this layer.
//!
//! # Provider Selection
//!
//! [`OpenAIProvider::new`] reads `OPENAI_API_KEY` from the environment and
//! fails if it is missing, so a misconfigured process stops at startup
//! rather than on the first query.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::time::Duration;

use crate::config::EmbeddingConfig;

/// Turns text into a fixed-length vector.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Returns the model identifier (e.g. `"text-embedding-ada-002"`).
    fn model_name(&self) -> &str;

    /// Embed a single text. Empty text is passed through to the provider.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

// ============ OpenAI Provider ============

/// Embedding provider using the OpenAI API.
///
/// Calls `POST {api_base}/embeddings` with the configured model.
pub struct OpenAIProvider {
    model: String,
    endpoint: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAIProvider {
    /// Create a provider using `OPENAI_API_KEY` from the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if `OPENAI_API_KEY` is not set or the HTTP client
    /// cannot be built.
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let api_key = match std::env::var("OPENAI_API_KEY") {
            Ok(key) if !key.is_empty() => key,
            _ => bail!("OPENAI_API_KEY environment variable is not set"),
        };
        Self::with_api_key(config, api_key)
    }

    /// Create a provider with an explicit API key.
    pub fn with_api_key(config: &EmbeddingConfig, api_key: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            model: config.model.clone(),
            endpoint: format!("{}/embeddings", config.api_base.trim_end_matches('/')),
            api_key: api_key.into(),
            client,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": text,
        });

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("OpenAI API error {}: {}", status, body_text);
        }

        let json: serde_json::Value = response.json().await?;
        parse_openai_response(&json)?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("Empty embedding response"))
    }
}

/// Parse the OpenAI embeddings API response JSON.
///
/// Extracts the `data[].embedding` arrays in response order.
fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing data array"))?;

    let mut embeddings = Vec::with_capacity(data.len());

    for item in data {
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing embedding"))?;

        let vec: Vec<f32> = embedding
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();

        embeddings.push(vec);
    }

    Ok(embeddings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_response() {
        let body = json!({
            "object": "list",
            "data": [{ "object": "embedding", "index": 0, "embedding": [0.5, -1.0, 0.25] }],
            "model": "text-embedding-ada-002"
        });
        let parsed = parse_openai_response(&body).unwrap();
        assert_eq!(parsed, vec![vec![0.5f32, -1.0, 0.25]]);
    }

    #[test]
    fn test_parse_missing_data() {
        let err = parse_openai_response(&json!({ "error": "nope" })).unwrap_err();
        assert!(err.to_string().contains("missing data array"));
    }

    #[test]
    fn test_parse_missing_embedding() {
        let err = parse_openai_response(&json!({ "data": [{ "index": 0 }] })).unwrap_err();
        assert!(err.to_string().contains("missing embedding"));
    }

    #[test]
    fn test_endpoint_joins_base() {
        let config = EmbeddingConfig {
            api_base: "http://localhost:9000/v1/".to_string(),
            ..EmbeddingConfig::default()
        };
        let provider = OpenAIProvider::with_api_key(&config, "sk-test").unwrap();
        assert_eq!(provider.endpoint, "http://localhost:9000/v1/embeddings");
        assert_eq!(provider.model_name(), "text-embedding-ada-002");
    }
}
