//! Hybrid search engine: indexing pipeline + fusion retriever.
//!
//! Orchestrates the encoders and the vector store. Construct one engine at
//! process start and share it by reference; it is never rebuilt per request.

use super::fusion::{reciprocal_rank_fusion, RRF_K};
use super::types::{Document, FusedResult, IndexOutcome, SearchMode, SearchRequest};
use crate::config::{Settings, DENSE_DIM, PREFETCH_FACTOR, UPSERT_BATCH_SIZE};
use crate::embedding::{TextContext, TextEncoder};
use crate::error::{EngineError, SearchError, StoreError};
use crate::scheduler::Priority;
use crate::store::{md5_uuid, CollectionSummary, PointRecord, ScoredPoint, VectorStore};
use std::collections::HashMap;
use tracing::{debug, info, instrument, warn};

/// Hybrid search engine.
///
/// Generic over the encoding service and the store so the pipeline can run
/// against the production scheduler + Qdrant or against deterministic test
/// doubles without changing any of its logic.
pub struct HybridSearchEngine<E, S> {
    encoder: E,
    store: S,
    settings: Settings,
}

impl<E: TextEncoder, S: VectorStore> HybridSearchEngine<E, S> {
    /// Creates an engine.
    pub fn new(encoder: E, store: S, settings: Settings) -> Self {
        Self {
            encoder,
            store,
            settings,
        }
    }

    /// Whether the encoders finished initialization.
    pub fn is_ready(&self) -> bool {
        self.encoder.is_ready()
    }

    /// Returns the runtime settings.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Returns the encoding service.
    pub fn encoder(&self) -> &E {
        &self.encoder
    }

    fn resolve<'a>(&'a self, collection: Option<&'a str>) -> &'a str {
        collection.unwrap_or(&self.settings.default_collection)
    }

    /// Creates a collection with the hybrid schema if it does not exist.
    ///
    /// Returns `true` if the collection was created.
    pub async fn create_collection(&self, collection: Option<&str>) -> Result<bool, StoreError> {
        let collection = self.resolve(collection);
        self.store.ensure_collection(collection, DENSE_DIM).await
    }

    /// Indexes documents into a collection.
    ///
    /// Encodes every document once (dense + sparse), assigns content-hash
    /// ids to documents that lack one, and upserts in fixed-size batches.
    /// The first failure aborts the remaining batches; everything already
    /// committed stays committed and the outcome reports both the committed
    /// count and the failure. This method itself never fails — partial
    /// success is the report, not an error.
    #[instrument(skip(self, documents), fields(count = documents.len()))]
    pub async fn index(&self, documents: Vec<Document>, collection: Option<&str>) -> IndexOutcome {
        let collection = self.resolve(collection);
        let mut outcome = IndexOutcome::new(documents.len());
        if documents.is_empty() {
            return outcome;
        }

        if let Err(error) = self
            .index_documents(&documents, collection, &mut outcome)
            .await
        {
            warn!(collection, %error, indexed = outcome.indexed, "indexing aborted");
            outcome.errors.push(error);
        } else {
            info!(collection, indexed = outcome.indexed, "indexing complete");
        }
        outcome
    }

    async fn index_documents(
        &self,
        documents: &[Document],
        collection: &str,
        outcome: &mut IndexOutcome,
    ) -> Result<(), String> {
        self.store
            .ensure_collection(collection, DENSE_DIM)
            .await
            .map_err(|e| e.to_string())?;

        let texts: Vec<String> = documents.iter().map(|d| d.text.clone()).collect();
        info!(count = texts.len(), "encoding documents");

        let dense = self
            .encoder
            .encode_dense(&texts, TextContext::Passage, Priority::Background)
            .await
            .map_err(|e| e.to_string())?;
        let sparse = self
            .encoder
            .encode_sparse(&texts, Priority::Background)
            .await
            .map_err(|e| e.to_string())?;

        if dense.len() != documents.len() || sparse.len() != documents.len() {
            return Err(format!(
                "encoder returned {} dense / {} sparse vectors for {} documents",
                dense.len(),
                sparse.len(),
                documents.len()
            ));
        }

        let points: Vec<PointRecord> = documents
            .iter()
            .zip(dense.into_iter().zip(sparse))
            .map(|(doc, (dense, sparse))| PointRecord {
                id: doc
                    .id
                    .clone()
                    .unwrap_or_else(|| md5_uuid(&doc.text)),
                dense,
                sparse,
                text: doc.text.clone(),
                metadata: doc.metadata.clone(),
            })
            .collect();

        for batch in points.chunks(UPSERT_BATCH_SIZE) {
            self.store
                .upsert(collection, batch.to_vec())
                .await
                .map_err(|e| format!("batch after {} committed points: {}", outcome.indexed, e))?;
            outcome.indexed += batch.len();
            debug!(
                indexed = outcome.indexed,
                total = outcome.total,
                "committed batch"
            );
        }

        Ok(())
    }

    /// Runs a search.
    ///
    /// The query is encoded once with the query-context variants, then
    /// dispatched by mode. Any encoder or store failure aborts the whole
    /// search; there are no partial hybrid results.
    #[instrument(skip(self, request), fields(mode = %request.mode, limit = request.limit))]
    pub async fn search(&self, request: &SearchRequest) -> Result<Vec<FusedResult>, SearchError> {
        if request.limit == 0 {
            return Err(SearchError::InvalidQuery(
                "limit must be positive".to_string(),
            ));
        }
        if request.limit > self.settings.max_limit {
            return Err(SearchError::InvalidQuery(format!(
                "limit {} exceeds maximum of {}",
                request.limit, self.settings.max_limit
            )));
        }

        let collection = self.resolve(request.collection.as_deref());
        let filter = request.filter.as_ref();
        let query_texts = std::slice::from_ref(&request.query);

        let dense_query = self
            .encoder
            .encode_dense(query_texts, TextContext::Query, Priority::Interactive)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| {
                SearchError::Unavailable("dense encoder returned no vector".to_string())
            })?;
        let sparse_query = self
            .encoder
            .encode_sparse(query_texts, Priority::Interactive)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| {
                SearchError::Unavailable("sparse encoder returned no vector".to_string())
            })?;

        let results = match request.mode {
            SearchMode::Dense => self
                .store
                .query_dense(collection, &dense_query, request.limit, filter)
                .await?
                .into_iter()
                .map(leg_result)
                .collect(),
            SearchMode::Sparse => self
                .store
                .query_sparse(collection, &sparse_query, request.limit, filter)
                .await?
                .into_iter()
                .map(leg_result)
                .collect(),
            SearchMode::Hybrid => {
                // Over-fetch both legs: fusion reorders ranks, and fetching
                // either leg with a tighter limit would bias the merged list.
                let fetch = request.limit * PREFETCH_FACTOR;
                let (dense_leg, sparse_leg) = tokio::try_join!(
                    self.store
                        .query_dense(collection, &dense_query, fetch, filter),
                    self.store
                        .query_sparse(collection, &sparse_query, fetch, filter),
                )?;
                debug!(
                    dense_hits = dense_leg.len(),
                    sparse_hits = sparse_leg.len(),
                    "fusing retrieval legs"
                );
                fuse_legs(dense_leg, sparse_leg, request.limit)
            }
        };

        info!(collection, results = results.len(), "search complete");
        Ok(results)
    }

    /// Collection statistics.
    pub async fn collection_info(
        &self,
        collection: Option<&str>,
    ) -> Result<CollectionSummary, StoreError> {
        self.store.collection_info(self.resolve(collection)).await
    }

    /// Names of all collections.
    pub async fn list_collections(&self) -> Result<Vec<String>, StoreError> {
        self.store.list_collections().await
    }

    /// Deletes a collection.
    ///
    /// The configured default collection is reserved and cannot be deleted.
    /// Returns `true` if the collection existed.
    pub async fn delete_collection(&self, collection: &str) -> Result<bool, EngineError> {
        if collection == self.settings.default_collection {
            return Err(EngineError::ReservedCollection(collection.to_string()));
        }
        Ok(self.store.delete_collection(collection).await?)
    }
}

fn leg_result(point: ScoredPoint) -> FusedResult {
    FusedResult {
        id: point.id,
        score: point.score,
        text: point.text,
        metadata: point.metadata,
    }
}

/// Merges the two retrieval legs with RRF and truncates to `limit`.
fn fuse_legs(
    dense: Vec<ScoredPoint>,
    sparse: Vec<ScoredPoint>,
    limit: usize,
) -> Vec<FusedResult> {
    let dense_ranked: Vec<(String, f32)> =
        dense.iter().map(|p| (p.id.clone(), p.score)).collect();
    let sparse_ranked: Vec<(String, f32)> =
        sparse.iter().map(|p| (p.id.clone(), p.score)).collect();

    let fused = reciprocal_rank_fusion(&dense_ranked, &sparse_ranked, RRF_K);

    // Payload can come from either leg; the dense leg wins on overlap.
    let mut payloads: HashMap<&str, &ScoredPoint> = HashMap::new();
    for point in dense.iter().chain(sparse.iter()) {
        payloads.entry(point.id.as_str()).or_insert(point);
    }

    fused
        .into_iter()
        .take(limit)
        .filter_map(|(id, score)| {
            payloads.get(id.as_str()).map(|point| FusedResult {
                id: id.clone(),
                score,
                text: point.text.clone(),
                metadata: point.metadata.clone(),
            })
        })
        .collect()
}
