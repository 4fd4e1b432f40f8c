use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub qdrant: QdrantConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct QdrantConfig {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_collection")]
    pub collection: String,
    #[serde(default)]
    pub api_key: Option<String>,
}

impl Default for QdrantConfig {
    fn default() -> Self {
        Self {
            url: None,
            host: default_host(),
            port: default_port(),
            collection: default_collection(),
            api_key: None,
        }
    }
}

fn default_host() -> String {
    "localhost".to_string()
}
fn default_port() -> u16 {
    6333
}
fn default_collection() -> String {
    "open_dental_docs".to_string()
}

impl QdrantConfig {
    /// Base address of the Qdrant REST API: `url` when set, otherwise
    /// assembled from `host` and `port`.
    pub fn base_url(&self) -> String {
        match &self.url {
            Some(url) if !url.is_empty() => url.clone(),
            _ => format!("http://{}:{}", self.host, self.port),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            api_base: default_api_base(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_model() -> String {
    "text-embedding-ada-002".to_string()
}
fn default_api_base() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    #[serde(default = "default_limit")]
    pub default_limit: u64,
    #[serde(default = "default_corpus_label")]
    pub corpus_label: String,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            corpus_label: default_corpus_label(),
        }
    }
}

fn default_limit() -> u64 {
    5
}
fn default_corpus_label() -> String {
    "OpenDental documentation".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:3000".to_string()
}

/// Load configuration from an optional TOML file, then apply the
/// `QDRANT_*` environment overrides.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let mut config = match path {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            toml::from_str(&content).with_context(|| "Failed to parse config file")?
        }
        None => Config::default(),
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
    validate(&config)?;

    Ok(config)
}

/// Apply environment overrides through `lookup` so resolution can be
/// exercised without touching the process environment.
pub fn apply_env_overrides<F>(config: &mut Config, lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(url) = lookup("QDRANT_URL") {
        config.qdrant.url = Some(url);
    }
    if let Some(host) = lookup("QDRANT_HOST") {
        config.qdrant.host = host;
    }
    if let Some(port) = lookup("QDRANT_PORT") {
        config.qdrant.port = port
            .parse()
            .with_context(|| format!("QDRANT_PORT must be a port number, got '{}'", port))?;
    }
    if let Some(collection) = lookup("QDRANT_COLLECTION") {
        config.qdrant.collection = collection;
    }
    if let Some(api_key) = lookup("QDRANT_API_KEY") {
        config.qdrant.api_key = Some(api_key);
    }
    Ok(())
}

fn validate(config: &Config) -> Result<()> {
    if config.qdrant.collection.trim().is_empty() {
        bail!("qdrant.collection must not be empty");
    }
    if config.search.default_limit < 1 {
        bail!("search.default_limit must be >= 1");
    }
    if config.embedding.timeout_secs == 0 {
        bail!("embedding.timeout_secs must be > 0");
    }
    Ok(())
}
