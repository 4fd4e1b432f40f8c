//! Collection readiness check (`qdrant-search inspect`).
//!
//! Verifies that the configured collection exists and holds points, and
//! prints one sampled payload so the field layout the formatter will see
//! can be checked by eye. Ingestion happens elsewhere; when the collection
//! is missing this only prints how to create it.

use anyhow::Result;

use crate::config::Config;
use crate::qdrant::{CollectionDescriptor, QdrantStore, VectorStore};

/// Dimensionality of `text-embedding-ada-002` vectors.
pub const SUGGESTED_VECTOR_SIZE: u64 = 1536;

/// Outcome of a readiness check.
#[derive(Debug, PartialEq)]
pub enum Readiness {
    Missing,
    Empty(CollectionDescriptor),
    Ready {
        info: CollectionDescriptor,
        sample: Option<serde_json::Value>,
    },
}

pub async fn run_inspect(config: &Config) -> Result<()> {
    let store = QdrantStore::new(&config.qdrant)?;
    let collection = &config.qdrant.collection;

    println!("Checking if collection \"{}\" exists...", collection);
    let readiness = check_collection(&store, collection).await?;
    print!("{}", render_report(collection, &config.qdrant.base_url(), &readiness));
    Ok(())
}

/// Classify `collection` and fetch a sample payload when it has points.
pub async fn check_collection(store: &dyn VectorStore, collection: &str) -> Result<Readiness> {
    let names = store.list_collections().await?;
    if !names.iter().any(|n| n == collection) {
        return Ok(Readiness::Missing);
    }

    let info = store.collection_info(collection).await?;
    if info.points_count.unwrap_or(0) == 0 {
        return Ok(Readiness::Empty(info));
    }

    let sample = store
        .sample_points(collection, 2)
        .await?
        .into_iter()
        .next()
        .and_then(|point| point.get("payload").cloned());

    Ok(Readiness::Ready { info, sample })
}

pub fn render_report(collection: &str, qdrant_url: &str, readiness: &Readiness) -> String {
    let mut out = String::new();
    match readiness {
        Readiness::Missing => {
            out.push_str(&format!("Collection \"{}\" does not exist!\n", collection));
            out.push_str(
                "Please create the collection and load your data before using the server.\n\n",
            );
            out.push_str(&format!(
                "To create it with vector size {} (for OpenAI embeddings):\n\n",
                SUGGESTED_VECTOR_SIZE
            ));
            out.push_str(&format!(
                "curl -X PUT {}/collections/{} \\\n  -H 'Content-Type: application/json' \\\n  -d '{{\"vectors\": {{\"size\": {}, \"distance\": \"Cosine\"}}}}'\n",
                qdrant_url.trim_end_matches('/'),
                collection,
                SUGGESTED_VECTOR_SIZE
            ));
        }
        Readiness::Empty(info) => {
            out.push_str(&format!("Collection \"{}\" already exists.\n", collection));
            push_info(&mut out, info);
            out.push_str("\nWarning: Collection exists but has no vectors!\n");
            out.push_str("Please make sure your data is loaded before using the server.\n");
        }
        Readiness::Ready { info, sample } => {
            out.push_str(&format!("Collection \"{}\" already exists.\n", collection));
            push_info(&mut out, info);
            out.push_str("\nCollection is ready to use.\n");
            out.push_str("\nSampling a few points to verify structure:\n");
            match sample {
                Some(payload) => {
                    out.push_str("Payload structure example:\n");
                    out.push_str(
                        &serde_json::to_string_pretty(payload).unwrap_or_else(|_| payload.to_string()),
                    );
                    out.push('\n');
                }
                None => out.push_str("No points found to sample.\n"),
            }
        }
    }
    out
}

fn push_info(out: &mut String, info: &CollectionDescriptor) {
    let unknown = || "Unknown".to_string();
    out.push_str("Collection info:\n");
    out.push_str(&format!(
        "- Vector size: {}\n",
        info.vector_size.map(|v| v.to_string()).unwrap_or_else(unknown)
    ));
    out.push_str(&format!(
        "- Distance: {}\n",
        info.distance.clone().unwrap_or_else(unknown)
    ));
    out.push_str(&format!(
        "- Vectors count: {}\n",
        info.points_count.unwrap_or(0)
    ));
}
