//! In-memory vector store.
//!
//! Test double with exact scoring: brute-force cosine similarity on the
//! dense field and term-weight dot product on the sparse field. Upsert
//! failures can be injected to exercise the pipeline's partial-failure
//! accounting.

use super::{CollectionSummary, JsonMap, MetadataFilter, PointRecord, QueryLeg, ScoredPoint,
            VectorStore};
use crate::embedding::SparseVector;
use crate::error::StoreError;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Mutex;
use tokio::sync::RwLock;

struct StoredPoint {
    dense: Vec<f32>,
    sparse: SparseVector,
    text: String,
    metadata: JsonMap,
}

struct Collection {
    dense_dim: usize,
    points: BTreeMap<String, StoredPoint>,
}

/// Exact-scoring in-memory store.
#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<BTreeMap<String, Collection>>,
    remaining_upserts: Mutex<Option<usize>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allows `n` more upsert calls to succeed, then fails the rest.
    pub fn fail_upserts_after(&self, n: usize) {
        if let Ok(mut remaining) = self.remaining_upserts.lock() {
            *remaining = Some(n);
        }
    }

    fn consume_upsert_budget(&self) -> Result<(), StoreError> {
        let mut remaining = self
            .remaining_upserts
            .lock()
            .map_err(|_| StoreError::Unavailable("store lock poisoned".to_string()))?;
        match remaining.as_mut() {
            None => Ok(()),
            Some(0) => Err(StoreError::Unavailable(
                "injected upsert failure".to_string(),
            )),
            Some(budget) => {
                *budget -= 1;
                Ok(())
            }
        }
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

fn top_k(mut hits: Vec<ScoredPoint>, limit: usize) -> Vec<ScoredPoint> {
    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });
    hits.truncate(limit);
    hits
}

#[async_trait]
impl VectorStore for MemoryStore {
    async fn ensure_collection(
        &self,
        collection: &str,
        dense_dim: usize,
    ) -> Result<bool, StoreError> {
        let mut collections = self.collections.write().await;
        if collections.contains_key(collection) {
            return Ok(false);
        }
        collections.insert(
            collection.to_string(),
            Collection {
                dense_dim,
                points: BTreeMap::new(),
            },
        );
        Ok(true)
    }

    async fn upsert(&self, collection: &str, points: Vec<PointRecord>) -> Result<(), StoreError> {
        self.consume_upsert_budget()?;

        let mut collections = self.collections.write().await;
        let target = collections
            .get_mut(collection)
            .ok_or_else(|| StoreError::CollectionNotFound(collection.to_string()))?;

        for point in &points {
            if point.dense.len() != target.dense_dim {
                return Err(StoreError::InvalidPoint(format!(
                    "dense vector has {} dimensions, collection expects {}",
                    point.dense.len(),
                    target.dense_dim
                )));
            }
        }

        for point in points {
            target.points.insert(
                point.id.clone(),
                StoredPoint {
                    dense: point.dense,
                    sparse: point.sparse,
                    text: point.text,
                    metadata: point.metadata,
                },
            );
        }
        Ok(())
    }

    async fn query_dense(
        &self,
        collection: &str,
        query: &[f32],
        limit: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<ScoredPoint>, StoreError> {
        let collections = self.collections.read().await;
        let source = collections
            .get(collection)
            .ok_or_else(|| StoreError::CollectionNotFound(collection.to_string()))?;

        let hits = source
            .points
            .iter()
            .filter(|(_, point)| filter.map_or(true, |f| f.matches(&point.metadata)))
            .map(|(id, point)| ScoredPoint {
                id: id.clone(),
                score: cosine_similarity(query, &point.dense),
                text: point.text.clone(),
                metadata: point.metadata.clone(),
                source: QueryLeg::Dense,
            })
            .collect();

        Ok(top_k(hits, limit))
    }

    async fn query_sparse(
        &self,
        collection: &str,
        query: &SparseVector,
        limit: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<ScoredPoint>, StoreError> {
        let collections = self.collections.read().await;
        let source = collections
            .get(collection)
            .ok_or_else(|| StoreError::CollectionNotFound(collection.to_string()))?;

        // Only points sharing at least one term with the query can match.
        let hits = source
            .points
            .iter()
            .filter(|(_, point)| filter.map_or(true, |f| f.matches(&point.metadata)))
            .filter_map(|(id, point)| {
                let score = query.dot(&point.sparse);
                (score > 0.0).then(|| ScoredPoint {
                    id: id.clone(),
                    score,
                    text: point.text.clone(),
                    metadata: point.metadata.clone(),
                    source: QueryLeg::Sparse,
                })
            })
            .collect();

        Ok(top_k(hits, limit))
    }

    async fn collection_info(&self, collection: &str) -> Result<CollectionSummary, StoreError> {
        let collections = self.collections.read().await;
        let source = collections
            .get(collection)
            .ok_or_else(|| StoreError::CollectionNotFound(collection.to_string()))?;

        Ok(CollectionSummary {
            name: collection.to_string(),
            points_count: source.points.len() as u64,
            dense_dim: source.dense_dim as u64,
            distance: "Cosine".to_string(),
        })
    }

    async fn list_collections(&self) -> Result<Vec<String>, StoreError> {
        let collections = self.collections.read().await;
        Ok(collections.keys().cloned().collect())
    }

    async fn delete_collection(&self, collection: &str) -> Result<bool, StoreError> {
        let mut collections = self.collections.write().await;
        Ok(collections.remove(collection).is_some())
    }
}
