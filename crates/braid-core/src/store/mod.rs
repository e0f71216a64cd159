//! Vector store abstraction.
//!
//! The pipeline never talks to a concrete store directly: everything goes
//! through [`VectorStore`], which models the minimal contract the pipeline
//! needs — idempotent collection creation with one named dense and one named
//! sparse field, point upsert carrying both vectors plus payload, per-field
//! top-k queries with optional metadata filters, and collection
//! introspection/deletion.
//!
//! # Implementations
//!
//! - [`QdrantStore`] - Qdrant over gRPC (production)
//! - [`MemoryStore`] - exact-scoring in-memory double (tests)

mod memory;
mod qdrant;

pub use memory::MemoryStore;
pub use qdrant::QdrantStore;

use crate::embedding::SparseVector;
use crate::error::StoreError;
use async_trait::async_trait;
use std::collections::BTreeMap;

/// Payload metadata map.
pub type JsonMap = serde_json::Map<String, serde_json::Value>;

/// Deterministic UUID-shaped identifier derived from arbitrary input.
///
/// The MD5 digest of the input is exactly UUID-sized, so any string maps to
/// a stable id the store accepts. Used both to assign ids to documents that
/// arrive without one (same text, same id, so re-indexing identical content
/// is idempotent) and to map caller-supplied string ids into the store's
/// point-id space.
pub fn md5_uuid(input: &str) -> String {
    use md5::{Digest, Md5};
    let digest: [u8; 16] = Md5::digest(input.as_bytes()).into();
    uuid::Uuid::from_bytes(digest).to_string()
}

/// One point submitted for upsert: both vector fields plus payload.
///
/// Dense and sparse vectors are committed together in a single write; a
/// point is never visible with only one of its two fields.
#[derive(Debug, Clone)]
pub struct PointRecord {
    /// Caller-facing point identifier
    pub id: String,
    /// L2-normalized dense embedding
    pub dense: Vec<f32>,
    /// Sparse term weights (may be empty)
    pub sparse: SparseVector,
    /// Source text, stored as payload
    pub text: String,
    /// Caller metadata, stored as payload
    pub metadata: JsonMap,
}

/// Which retrieval leg produced a scored point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryLeg {
    Dense,
    Sparse,
}

/// Result from a single retrieval leg, before fusion.
///
/// `score` is leg-native: cosine similarity for the dense leg, term-weight
/// dot product for the sparse leg. Scores are not comparable across legs.
#[derive(Debug, Clone)]
pub struct ScoredPoint {
    /// Point identifier
    pub id: String,
    /// Leg-native relevance score
    pub score: f32,
    /// Stored text
    pub text: String,
    /// Stored metadata
    pub metadata: JsonMap,
    /// Leg that produced this point
    pub source: QueryLeg,
}

/// Collection statistics and schema summary.
#[derive(Debug, Clone)]
pub struct CollectionSummary {
    /// Collection name
    pub name: String,
    /// Stored point count
    pub points_count: u64,
    /// Dense field dimensionality
    pub dense_dim: u64,
    /// Dense field distance function
    pub distance: String,
}

/// Equality predicates on payload metadata.
///
/// Applied identically to both retrieval legs so fusion never reconciles
/// mismatched filtered sets. Values are limited to strings, integers, and
/// booleans; anything else is rejected by the store as `InvalidFilter`.
#[derive(Debug, Clone, Default)]
pub struct MetadataFilter {
    equals: BTreeMap<String, serde_json::Value>,
}

impl MetadataFilter {
    /// Creates an empty filter (matches everything).
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an equality predicate.
    pub fn with(mut self, field: impl Into<String>, value: serde_json::Value) -> Self {
        self.equals.insert(field.into(), value);
        self
    }

    /// Returns true if no predicates are set.
    pub fn is_empty(&self) -> bool {
        self.equals.is_empty()
    }

    /// Iterates `(field, value)` predicates.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &serde_json::Value)> {
        self.equals.iter()
    }

    /// Evaluates the filter against a metadata map.
    pub fn matches(&self, metadata: &JsonMap) -> bool {
        self.equals
            .iter()
            .all(|(field, value)| metadata.get(field) == Some(value))
    }
}

/// External vector store collaborator.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Creates the collection if it does not exist.
    ///
    /// Schema is fixed: one named dense field (`dense_dim` dimensions,
    /// cosine distance) and one named sparse field. Returns `true` if the
    /// collection was created, `false` if it already existed.
    async fn ensure_collection(&self, collection: &str, dense_dim: usize)
        -> Result<bool, StoreError>;

    /// Upserts points keyed by id; re-upserting an id overwrites its
    /// vectors and payload.
    async fn upsert(&self, collection: &str, points: Vec<PointRecord>) -> Result<(), StoreError>;

    /// Top-k nearest neighbors on the dense field, descending cosine
    /// similarity.
    async fn query_dense(
        &self,
        collection: &str,
        query: &[f32],
        limit: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<ScoredPoint>, StoreError>;

    /// Top-k matches on the sparse field, descending dot product of
    /// matching term weights. An empty query matches nothing.
    async fn query_sparse(
        &self,
        collection: &str,
        query: &SparseVector,
        limit: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<ScoredPoint>, StoreError>;

    /// Collection statistics; `CollectionNotFound` if it does not exist.
    async fn collection_info(&self, collection: &str) -> Result<CollectionSummary, StoreError>;

    /// Names of all collections.
    async fn list_collections(&self) -> Result<Vec<String>, StoreError>;

    /// Deletes a collection. Returns `true` if it existed.
    async fn delete_collection(&self, collection: &str) -> Result<bool, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn metadata(pairs: &[(&str, serde_json::Value)]) -> JsonMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn md5_uuid_is_deterministic_and_uuid_shaped() {
        let a = md5_uuid("the same text");
        let b = md5_uuid("the same text");
        let c = md5_uuid("different text");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(uuid::Uuid::parse_str(&a).is_ok());
    }

    #[test]
    fn empty_filter_matches_everything() {
        let filter = MetadataFilter::new();
        assert!(filter.is_empty());
        assert!(filter.matches(&metadata(&[("lang", json!("en"))])));
        assert!(filter.matches(&JsonMap::new()));
    }

    #[test]
    fn filter_requires_all_predicates() {
        let filter = MetadataFilter::new()
            .with("lang", json!("en"))
            .with("year", json!(2024));

        assert!(filter.matches(&metadata(&[("lang", json!("en")), ("year", json!(2024))])));
        assert!(!filter.matches(&metadata(&[("lang", json!("en"))])));
        assert!(!filter.matches(&metadata(&[("lang", json!("de")), ("year", json!(2024))])));
    }
}
