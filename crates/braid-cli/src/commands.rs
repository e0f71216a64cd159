//! Command implementations.
//!
//! Each command builds the engine once, runs one operation against it, and
//! prints through [`crate::output`]. Collection-management commands skip
//! model loading; only indexing, search, and status need the encoders.

use crate::output;
use anyhow::{anyhow, bail, Context, Result};
use braid_core::config::Settings;
use braid_core::scheduler::{EncoderScheduler, ModelLoadConfig};
use braid_core::search::{Document, HybridSearchEngine, SearchMode, SearchRequest};
use braid_core::store::{MetadataFilter, QdrantStore};
use serde::Deserialize;
use std::io::Read;
use std::path::Path;
use std::time::Instant;
use tracing::info;

type Engine = HybridSearchEngine<EncoderScheduler, QdrantStore>;

/// Builds the engine, optionally loading both models.
async fn build_engine(settings: Settings, load_models: bool) -> Result<Engine> {
    let scheduler = EncoderScheduler::spawn().context("failed to start encoder scheduler")?;

    if load_models {
        info!("Loading embedding models...");
        scheduler
            .load_models(ModelLoadConfig {
                dense_dir: settings.dense_model_dir.clone(),
                sparse_dir: settings.sparse_model_dir.clone(),
                batch_size: settings.encode_batch_size,
            })
            .await
            .context("failed to load embedding models")?;
        info!("Models loaded");
    }

    let store = QdrantStore::connect(&settings.store_url, settings.store_timeout())
        .context("failed to connect to vector store")?;

    Ok(HybridSearchEngine::new(scheduler, store, settings))
}

/// Accepts either a bare JSON array of documents or an object wrapping one.
#[derive(Deserialize)]
struct DocumentBatch {
    documents: Vec<Document>,
}

fn parse_documents(raw: &str) -> Result<Vec<Document>> {
    if let Ok(documents) = serde_json::from_str::<Vec<Document>>(raw) {
        return Ok(documents);
    }
    serde_json::from_str::<DocumentBatch>(raw)
        .map(|batch| batch.documents)
        .map_err(|e| anyhow!("input is neither a document array nor a document batch: {}", e))
}

fn read_input(file: Option<&Path>) -> Result<String> {
    match file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display())),
        None => {
            let mut buffer = String::new();
            std::io::stdin()
                .read_to_string(&mut buffer)
                .context("failed to read stdin")?;
            Ok(buffer)
        }
    }
}

pub async fn index(
    settings: Settings,
    file: Option<&Path>,
    collection: Option<&str>,
) -> Result<()> {
    let documents = parse_documents(&read_input(file)?)?;
    if documents.is_empty() {
        bail!("no documents to index");
    }

    let engine = build_engine(settings, true).await?;

    let started = Instant::now();
    let outcome = engine.index(documents, collection).await;
    let elapsed_ms = started.elapsed().as_millis();

    println!("{}", output::format_index(&outcome, elapsed_ms));

    if !outcome.is_complete() {
        bail!("{} of {} documents failed to index", outcome.failed(), outcome.total);
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub async fn search(
    settings: Settings,
    query: &str,
    mode: &str,
    limit: usize,
    filters: &[String],
    collection: Option<&str>,
    json: bool,
) -> Result<()> {
    let mode: SearchMode = mode.parse().map_err(|e: String| anyhow!(e))?;
    let request = SearchRequest {
        query: query.to_string(),
        mode,
        limit,
        filter: parse_filters(filters)?,
        collection: collection.map(str::to_string),
    };

    let engine = build_engine(settings, true).await?;

    let started = Instant::now();
    let results = engine.search(&request).await?;
    let elapsed_ms = started.elapsed().as_millis();

    let rendered = if json {
        output::format_json(query, mode, &results, elapsed_ms)
    } else {
        output::format_human(query, &results, elapsed_ms)
    };
    println!("{}", rendered);
    Ok(())
}

pub async fn collections(settings: Settings) -> Result<()> {
    let engine = build_engine(settings, false).await?;
    let names = engine.list_collections().await?;

    if names.is_empty() {
        println!("No collections");
    } else {
        for name in names {
            println!("{}", name);
        }
    }
    Ok(())
}

pub async fn info(settings: Settings, name: Option<&str>) -> Result<()> {
    let engine = build_engine(settings, false).await?;
    let summary = engine.collection_info(name).await?;
    println!("{}", output::format_info(&summary));
    Ok(())
}

pub async fn delete(settings: Settings, name: &str) -> Result<()> {
    let engine = build_engine(settings, false).await?;
    let existed = engine.delete_collection(name).await?;

    if existed {
        println!("Collection '{}' deleted", name);
    } else {
        println!("Collection '{}' does not exist", name);
    }
    Ok(())
}

pub async fn status(settings: Settings) -> Result<()> {
    let scheduler = EncoderScheduler::spawn().context("failed to start encoder scheduler")?;
    let models_ok = scheduler
        .load_models(ModelLoadConfig {
            dense_dir: settings.dense_model_dir.clone(),
            sparse_dir: settings.sparse_model_dir.clone(),
            batch_size: settings.encode_batch_size,
        })
        .await;

    let store = QdrantStore::connect(&settings.store_url, settings.store_timeout())?;
    let engine = HybridSearchEngine::new(scheduler, store, settings);

    let store_ok = engine.list_collections().await;
    let stats = engine.encoder().stats();

    println!(
        "{}",
        output::format_status(
            &stats,
            models_ok.as_ref().err().map(|e| e.to_string()),
            store_ok.as_ref().err().map(|e| e.to_string()),
        )
    );

    if models_ok.is_err() || store_ok.is_err() {
        bail!("degraded");
    }
    Ok(())
}

fn parse_filters(raw: &[String]) -> Result<Option<MetadataFilter>> {
    if raw.is_empty() {
        return Ok(None);
    }

    let mut filter = MetadataFilter::new();
    for item in raw {
        let (key, value) = item
            .split_once('=')
            .ok_or_else(|| anyhow!("filter '{}' is not KEY=VALUE", item))?;
        // Bare words become strings; numbers and booleans parse as JSON.
        let value = serde_json::from_str(value).unwrap_or_else(|_| serde_json::json!(value));
        filter = filter.with(key, value);
    }
    Ok(Some(filter))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_documents_accepts_bare_array() {
        let docs = parse_documents(r#"[{"text": "a"}, {"id": "x", "text": "b"}]"#).unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[1].id.as_deref(), Some("x"));
    }

    #[test]
    fn parse_documents_accepts_batch_object() {
        let docs = parse_documents(r#"{"documents": [{"text": "a"}]}"#).unwrap();
        assert_eq!(docs.len(), 1);
    }

    #[test]
    fn parse_documents_rejects_garbage() {
        assert!(parse_documents("not json").is_err());
        assert!(parse_documents(r#"{"other": 1}"#).is_err());
    }

    #[test]
    fn filters_parse_typed_values() {
        let filter = parse_filters(&[
            "lang=en".to_string(),
            "year=2024".to_string(),
            "draft=false".to_string(),
        ])
        .unwrap()
        .unwrap();

        let pairs: Vec<_> = filter.iter().collect();
        assert_eq!(pairs.len(), 3);
        assert!(filter
            .iter()
            .any(|(k, v)| k == "lang" && *v == json!("en")));
        assert!(filter
            .iter()
            .any(|(k, v)| k == "year" && *v == json!(2024)));
        assert!(filter
            .iter()
            .any(|(k, v)| k == "draft" && *v == json!(false)));
    }

    #[test]
    fn malformed_filters_are_rejected() {
        assert!(parse_filters(&["nokey".to_string()]).is_err());
        assert!(parse_filters(&[]).unwrap().is_none());
    }
}
