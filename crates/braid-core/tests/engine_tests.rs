//! End-to-end tests for the indexing pipeline and fusion retriever.
//!
//! The engine is exercised against the in-memory store and a deterministic
//! stub encoder, so every ranking below is fully controlled: dense scores
//! are exact cosine similarities and sparse scores exact dot products.
//! Model-backed encoding is covered separately and needs checkpoint files;
//! nothing here touches a device.

use braid_core::config::{Settings, DENSE_DIM};
use braid_core::embedding::{SparseVector, TextContext, TextEncoder};
use braid_core::error::{EncodeError, EngineError, SearchError};
use braid_core::scheduler::Priority;
use braid_core::search::{Document, HybridSearchEngine, SearchMode, SearchRequest};
use braid_core::store::{MemoryStore, MetadataFilter};
use async_trait::async_trait;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Mutex;

// ============================================================================
// Test doubles
// ============================================================================

/// Deterministic encoder: texts map to pre-registered vectors, anything
/// unregistered gets a stable fallback derived from its length.
#[derive(Default)]
struct StubEncoder {
    offline: bool,
    dense: Mutex<HashMap<String, Vec<f32>>>,
    sparse: Mutex<HashMap<String, SparseVector>>,
}

impl StubEncoder {
    fn new() -> Self {
        Self::default()
    }

    fn offline() -> Self {
        Self {
            offline: true,
            ..Self::default()
        }
    }

    fn set_dense(&self, text: &str, vector: Vec<f32>) {
        self.dense
            .lock()
            .unwrap()
            .insert(text.to_string(), vector);
    }

    fn set_sparse(&self, text: &str, vector: SparseVector) {
        self.sparse
            .lock()
            .unwrap()
            .insert(text.to_string(), vector);
    }
}

#[async_trait]
impl TextEncoder for StubEncoder {
    fn is_ready(&self) -> bool {
        !self.offline
    }

    async fn encode_dense(
        &self,
        texts: &[String],
        _context: TextContext,
        _priority: Priority,
    ) -> Result<Vec<Vec<f32>>, EncodeError> {
        if self.offline {
            return Err(EncodeError::ModelNotLoaded);
        }
        let registered = self.dense.lock().unwrap();
        Ok(texts
            .iter()
            .map(|t| {
                registered
                    .get(t)
                    .cloned()
                    .unwrap_or_else(|| axis(t.len() % DENSE_DIM))
            })
            .collect())
    }

    async fn encode_sparse(
        &self,
        texts: &[String],
        _priority: Priority,
    ) -> Result<Vec<SparseVector>, EncodeError> {
        if self.offline {
            return Err(EncodeError::ModelNotLoaded);
        }
        let registered = self.sparse.lock().unwrap();
        Ok(texts
            .iter()
            .map(|t| {
                registered
                    .get(t)
                    .cloned()
                    .unwrap_or_else(|| SparseVector::from_pairs(vec![(t.len() as u32, 1.0)]))
            })
            .collect())
    }
}

/// Unit vector along one axis, at the collection's dense dimensionality.
fn axis(index: usize) -> Vec<f32> {
    let mut v = vec![0.0; DENSE_DIM];
    v[index] = 1.0;
    v
}

/// Unit vector with cosine similarity `cos` to `axis(0)`.
fn at_angle(cos: f32) -> Vec<f32> {
    let mut v = vec![0.0; DENSE_DIM];
    v[0] = cos;
    v[1] = (1.0 - cos * cos).sqrt();
    v
}

fn engine(encoder: StubEncoder) -> HybridSearchEngine<StubEncoder, MemoryStore> {
    HybridSearchEngine::new(encoder, MemoryStore::new(), Settings::default())
}

fn engine_with_store(
    encoder: StubEncoder,
    store: MemoryStore,
) -> HybridSearchEngine<StubEncoder, MemoryStore> {
    HybridSearchEngine::new(encoder, store, Settings::default())
}

fn doc(id: &str, text: &str) -> Document {
    Document::with_id(id, text)
}

// ============================================================================
// Indexing
// ============================================================================

#[tokio::test]
async fn index_reports_all_documents_committed() {
    let engine = engine(StubEncoder::new());
    let docs = vec![doc("a", "first"), doc("b", "second"), doc("c", "third")];

    let outcome = engine.index(docs, None).await;
    assert_eq!(outcome.total, 3);
    assert_eq!(outcome.indexed, 3);
    assert!(outcome.is_complete());
    assert!(outcome.errors.is_empty());

    let info = engine.collection_info(None).await.unwrap();
    assert_eq!(info.points_count, 3);
}

#[tokio::test]
async fn index_of_nothing_is_a_complete_noop() {
    let engine = engine(StubEncoder::new());
    let outcome = engine.index(Vec::new(), None).await;
    assert_eq!(outcome.total, 0);
    assert!(outcome.is_complete());
}

#[tokio::test]
async fn reindexing_same_id_overwrites_instead_of_duplicating() {
    let encoder = StubEncoder::new();
    encoder.set_dense("old text", axis(1));
    encoder.set_dense("new text", axis(2));
    encoder.set_dense("probe", axis(1));
    let engine = engine(encoder);

    engine.index(vec![doc("x", "old text")], None).await;
    engine.index(vec![doc("x", "new text")], None).await;

    let info = engine.collection_info(None).await.unwrap();
    assert_eq!(info.points_count, 1);

    // A query aimed at the old vector no longer finds the point at full
    // similarity; the stored text is the new one.
    let mut request = SearchRequest::new("probe");
    request.mode = SearchMode::Dense;
    request.limit = 1;
    let results = engine.search(&request).await.unwrap();
    assert_eq!(results[0].id, "x");
    assert_eq!(results[0].text, "new text");
    assert!(results[0].score < 0.5);
}

#[tokio::test]
async fn documents_without_id_get_stable_content_ids() {
    let engine = engine(StubEncoder::new());

    engine.index(vec![Document::new("same text")], None).await;
    engine.index(vec![Document::new("same text")], None).await;

    // Identical content hashes to the identical id, so the second run is an
    // overwrite rather than a duplicate.
    let info = engine.collection_info(None).await.unwrap();
    assert_eq!(info.points_count, 1);
}

#[tokio::test]
async fn upsert_failure_reports_committed_prefix() {
    let store = MemoryStore::new();
    // Batches are 100 points; let exactly one batch through.
    store.fail_upserts_after(1);
    let engine = engine_with_store(StubEncoder::new(), store);

    let docs: Vec<Document> = (0..250)
        .map(|i| doc(&format!("doc-{i}"), &format!("text number {i}")))
        .collect();

    let outcome = engine.index(docs, None).await;
    assert_eq!(outcome.total, 250);
    assert_eq!(outcome.indexed, 100);
    assert_eq!(outcome.failed(), 150);
    assert_eq!(outcome.errors.len(), 1);
    assert!(!outcome.errors[0].is_empty());
}

#[tokio::test]
async fn indexing_before_models_load_fails_into_the_report() {
    let engine = engine(StubEncoder::offline());

    let outcome = engine.index(vec![doc("a", "text")], None).await;
    assert_eq!(outcome.indexed, 0);
    assert_eq!(outcome.failed(), 1);
    assert!(outcome.errors[0].contains("model not loaded"));
}

// ============================================================================
// Search: single-leg modes
// ============================================================================

#[tokio::test]
async fn dense_mode_ranks_by_cosine_similarity() {
    let encoder = StubEncoder::new();
    encoder.set_dense("near", at_angle(0.95));
    encoder.set_dense("far", at_angle(0.2));
    encoder.set_dense("where is it", axis(0));
    let engine = engine(encoder);

    engine
        .index(vec![doc("near", "near"), doc("far", "far")], None)
        .await;

    let mut request = SearchRequest::new("where is it");
    request.mode = SearchMode::Dense;
    request.limit = 2;
    let results = engine.search(&request).await.unwrap();

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].id, "near");
    assert!((results[0].score - 0.95).abs() < 1e-5);
    assert_eq!(results[1].id, "far");
}

#[tokio::test]
async fn sparse_mode_scores_by_term_overlap() {
    let encoder = StubEncoder::new();
    encoder.set_sparse("rust systems", SparseVector::from_pairs(vec![(5, 2.0), (9, 1.0)]));
    encoder.set_sparse("cooking pasta", SparseVector::from_pairs(vec![(40, 3.0)]));
    encoder.set_sparse("rust", SparseVector::from_pairs(vec![(5, 1.5)]));
    let engine = engine(encoder);

    engine
        .index(
            vec![doc("code", "rust systems"), doc("food", "cooking pasta")],
            None,
        )
        .await;

    let mut request = SearchRequest::new("rust");
    request.mode = SearchMode::Sparse;
    request.limit = 10;
    let results = engine.search(&request).await.unwrap();

    // Only the document sharing term 5 matches; score is the dot product.
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].id, "code");
    assert!((results[0].score - 3.0).abs() < 1e-6);
}

// ============================================================================
// Search: hybrid fusion
// ============================================================================

/// Dense ranking [a, c, b], sparse ranking [b]: with k=60 the fused scores
/// are a = 1/61 and b = 1/61 + 1/63, so b must win despite ranking last on
/// the dense leg.
#[tokio::test]
async fn hybrid_fusion_rewards_presence_in_both_legs() {
    let encoder = StubEncoder::new();
    encoder.set_dense("text a", at_angle(0.99));
    encoder.set_dense("text c", at_angle(0.9));
    encoder.set_dense("text b", at_angle(0.8));
    encoder.set_dense("the query", axis(0));
    encoder.set_sparse("text b", SparseVector::from_pairs(vec![(7, 1.0)]));
    encoder.set_sparse("text a", SparseVector::from_pairs(vec![(21, 1.0)]));
    encoder.set_sparse("text c", SparseVector::from_pairs(vec![(22, 1.0)]));
    encoder.set_sparse("the query", SparseVector::from_pairs(vec![(7, 1.0)]));
    let engine = engine(encoder);

    engine
        .index(
            vec![doc("a", "text a"), doc("b", "text b"), doc("c", "text c")],
            None,
        )
        .await;

    let mut request = SearchRequest::new("the query");
    request.limit = 3;
    let results = engine.search(&request).await.unwrap();

    assert_eq!(results[0].id, "b");
    assert!((results[0].score - (1.0 / 61.0 + 1.0 / 63.0)).abs() < 1e-6);

    let a = results.iter().find(|r| r.id == "a").unwrap();
    assert!((a.score - 1.0 / 61.0).abs() < 1e-6);
    assert!(results[0].score > a.score);
}

#[tokio::test]
async fn hybrid_respects_limit_and_returns_leg_candidates_only() {
    let encoder = StubEncoder::new();
    for i in 0..10 {
        let text = format!("document {i}");
        encoder.set_dense(&text, at_angle(0.9 - 0.05 * i as f32));
        encoder.set_sparse(&text, SparseVector::from_pairs(vec![(i, 1.0)]));
    }
    encoder.set_dense("q", axis(0));
    encoder.set_sparse("q", SparseVector::from_pairs(vec![(3, 1.0)]));
    let engine = engine(encoder);

    let docs: Vec<Document> = (0..10)
        .map(|i| doc(&format!("d{i}"), &format!("document {i}")))
        .collect();
    engine.index(docs, None).await;

    let mut request = SearchRequest::new("q");
    request.limit = 2;
    let results = engine.search(&request).await.unwrap();

    assert!(results.len() <= 2);
    for result in &results {
        assert!(result.id.starts_with('d'));
    }
}

#[tokio::test]
async fn hybrid_with_one_empty_leg_falls_back_to_the_other() {
    let encoder = StubEncoder::new();
    encoder.set_dense("only dense", at_angle(0.9));
    encoder.set_dense("q", axis(0));
    // Query shares no sparse terms with anything stored.
    encoder.set_sparse("q", SparseVector::from_pairs(vec![(999, 1.0)]));
    encoder.set_sparse("only dense", SparseVector::from_pairs(vec![(1, 1.0)]));
    let engine = engine(encoder);

    engine.index(vec![doc("a", "only dense")], None).await;

    let mut request = SearchRequest::new("q");
    request.limit = 5;
    let results = engine.search(&request).await.unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].id, "a");
    assert!((results[0].score - 1.0 / 61.0).abs() < 1e-6);
}

#[tokio::test]
async fn filters_are_pushed_into_both_legs() {
    let encoder = StubEncoder::new();
    encoder.set_dense("q", axis(0));
    encoder.set_sparse("q", SparseVector::from_pairs(vec![(1, 1.0)]));
    for text in ["english doc", "german doc"] {
        encoder.set_dense(text, at_angle(0.9));
        encoder.set_sparse(text, SparseVector::from_pairs(vec![(1, 1.0)]));
    }
    let engine = engine(encoder);

    let mut en = doc("en", "english doc");
    en.metadata.insert("lang".to_string(), json!("en"));
    let mut de = doc("de", "german doc");
    de.metadata.insert("lang".to_string(), json!("de"));
    engine.index(vec![en, de], None).await;

    let mut request = SearchRequest::new("q");
    request.limit = 10;
    request.filter = Some(MetadataFilter::new().with("lang", json!("en")));
    let results = engine.search(&request).await.unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].id, "en");
    assert_eq!(results[0].metadata.get("lang"), Some(&json!("en")));
}

// ============================================================================
// Search: failure modes
// ============================================================================

#[tokio::test]
async fn search_on_missing_collection_reports_collection_not_found() {
    let engine = engine(StubEncoder::new());

    let mut request = SearchRequest::new("anything");
    request.collection = Some("never-created".to_string());
    let result = engine.search(&request).await;

    assert!(matches!(
        result,
        Err(SearchError::CollectionNotFound(name)) if name == "never-created"
    ));
}

#[tokio::test]
async fn search_before_models_load_is_unavailable() {
    let engine = engine(StubEncoder::offline());
    assert!(!engine.is_ready());

    let result = engine.search(&SearchRequest::new("q")).await;
    assert!(matches!(result, Err(SearchError::Unavailable(_))));
}

#[tokio::test]
async fn zero_and_oversized_limits_are_rejected() {
    let engine = engine(StubEncoder::new());

    let mut request = SearchRequest::new("q");
    request.limit = 0;
    assert!(matches!(
        engine.search(&request).await,
        Err(SearchError::InvalidQuery(_))
    ));

    request.limit = engine.settings().max_limit + 1;
    assert!(matches!(
        engine.search(&request).await,
        Err(SearchError::InvalidQuery(_))
    ));
}

// ============================================================================
// Collection management
// ============================================================================

#[tokio::test]
async fn create_collection_is_idempotent() {
    let engine = engine(StubEncoder::new());
    assert!(engine.create_collection(Some("docs")).await.unwrap());
    assert!(!engine.create_collection(Some("docs")).await.unwrap());
}

#[tokio::test]
async fn default_collection_cannot_be_deleted() {
    let engine = engine(StubEncoder::new());
    let reserved = engine.settings().default_collection.clone();
    engine.create_collection(None).await.unwrap();

    let result = engine.delete_collection(&reserved).await;
    assert!(matches!(result, Err(EngineError::ReservedCollection(_))));
    assert!(engine.collection_info(None).await.is_ok());
}

#[tokio::test]
async fn deleting_other_collections_removes_them() {
    let engine = engine(StubEncoder::new());
    engine.create_collection(Some("scratch")).await.unwrap();

    assert!(engine.delete_collection("scratch").await.unwrap());
    assert!(engine.collection_info(Some("scratch")).await.is_err());
    assert!(!engine.delete_collection("scratch").await.unwrap());
}

#[tokio::test]
async fn list_collections_sees_engine_created_collections() {
    let engine = engine(StubEncoder::new());
    engine.create_collection(Some("alpha")).await.unwrap();
    engine.create_collection(Some("beta")).await.unwrap();

    let names = engine.list_collections().await.unwrap();
    assert!(names.contains(&"alpha".to_string()));
    assert!(names.contains(&"beta".to_string()));
}
