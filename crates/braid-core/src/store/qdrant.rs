//! Qdrant vector store implementation.
//!
//! Talks to Qdrant over gRPC. Collections are created with two named vector
//! fields — a cosine-distance dense field and a sparse field — and every
//! upsert writes both fields plus the payload in one call, so a point is
//! never visible half-written. All calls run under a deadline and surface
//! `StoreError::Timeout` on expiry.

use super::{
    md5_uuid, CollectionSummary, JsonMap, MetadataFilter, PointRecord, QueryLeg, ScoredPoint,
    VectorStore,
};
use crate::config::{DENSE_VECTOR_NAME, SPARSE_VECTOR_NAME};
use crate::embedding::SparseVector;
use crate::error::StoreError;
use async_trait::async_trait;
use qdrant_client::qdrant::{
    vectors_config, Condition, CreateCollectionBuilder, Distance, Filter, NamedVectors,
    PointStruct, Query, QueryPointsBuilder, SparseVectorParamsBuilder, SparseVectorsConfigBuilder,
    UpsertPointsBuilder, Vector, VectorParamsBuilder, VectorsConfigBuilder,
};
use qdrant_client::{Payload, Qdrant};
use serde_json::json;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info};

/// Qdrant-backed store.
///
/// Point ids are derived deterministically from the caller's string id via
/// [`md5_uuid`], so re-upserting the same id always overwrites the same
/// point. The original string id is kept in the payload and restored on
/// read.
pub struct QdrantStore {
    client: Qdrant,
    timeout: Duration,
}

impl QdrantStore {
    /// Connects to a Qdrant instance.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Unavailable` if the client cannot be built
    /// (e.g. malformed URL). Connection problems surface on first use.
    pub fn connect(url: &str, timeout: Duration) -> Result<Self, StoreError> {
        let client = Qdrant::from_url(url)
            .timeout(timeout)
            .build()
            .map_err(|e| StoreError::Unavailable(format!("failed to build client: {}", e)))?;

        info!("Connected to vector store at {}", url);
        Ok(Self { client, timeout })
    }

    /// Runs a store call under the configured deadline.
    async fn bounded<T, F>(&self, call: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, qdrant_client::QdrantError>>,
    {
        match tokio::time::timeout(self.timeout, call).await {
            Err(_) => Err(StoreError::Timeout(self.timeout)),
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(StoreError::Unavailable(e.to_string())),
        }
    }

    async fn require_collection(&self, collection: &str) -> Result<(), StoreError> {
        let exists = self
            .bounded(self.client.collection_exists(collection))
            .await?;
        if exists {
            Ok(())
        } else {
            Err(StoreError::CollectionNotFound(collection.to_string()))
        }
    }

    async fn run_query(
        &self,
        collection: &str,
        query: Query,
        field: &str,
        leg: QueryLeg,
        limit: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<ScoredPoint>, StoreError> {
        self.require_collection(collection).await?;

        let mut builder = QueryPointsBuilder::new(collection)
            .query(query)
            .using(field)
            .limit(limit as u64)
            .with_payload(true);
        if let Some(filter) = filter {
            builder = builder.filter(to_qdrant_filter(filter)?);
        }

        let response = self.bounded(self.client.query(builder)).await?;
        debug!(
            collection,
            field,
            hits = response.result.len(),
            "store query completed"
        );

        Ok(response
            .result
            .into_iter()
            .map(|point| scored_point_from(point, leg))
            .collect())
    }
}

#[async_trait]
impl VectorStore for QdrantStore {
    async fn ensure_collection(
        &self,
        collection: &str,
        dense_dim: usize,
    ) -> Result<bool, StoreError> {
        let exists = self
            .bounded(self.client.collection_exists(collection))
            .await?;
        if exists {
            debug!(collection, "collection already exists");
            return Ok(false);
        }

        let mut dense_config = VectorsConfigBuilder::default();
        dense_config.add_named_vector_params(
            DENSE_VECTOR_NAME,
            VectorParamsBuilder::new(dense_dim as u64, Distance::Cosine),
        );

        let mut sparse_config = SparseVectorsConfigBuilder::default();
        sparse_config
            .add_named_vector_params(SPARSE_VECTOR_NAME, SparseVectorParamsBuilder::default());

        self.bounded(
            self.client.create_collection(
                CreateCollectionBuilder::new(collection)
                    .vectors_config(dense_config)
                    .sparse_vectors_config(sparse_config),
            ),
        )
        .await?;

        info!(collection, dense_dim, "created collection");
        Ok(true)
    }

    async fn upsert(&self, collection: &str, points: Vec<PointRecord>) -> Result<(), StoreError> {
        if points.is_empty() {
            return Ok(());
        }

        let points: Vec<PointStruct> = points
            .into_iter()
            .map(|record| {
                let payload: Payload = json!({
                    "id": record.id,
                    "text": record.text,
                    "metadata": record.metadata,
                })
                .try_into()
                .map_err(|e| StoreError::InvalidPoint(format!("payload: {}", e)))?;

                let vectors = NamedVectors::default()
                    .add_vector(DENSE_VECTOR_NAME, Vector::new_dense(record.dense))
                    .add_vector(
                        SPARSE_VECTOR_NAME,
                        Vector::new_sparse(record.sparse.indices, record.sparse.values),
                    );

                Ok(PointStruct::new(md5_uuid(&record.id), vectors, payload))
            })
            .collect::<Result<_, StoreError>>()?;

        let count = points.len();
        self.bounded(
            self.client
                .upsert_points(UpsertPointsBuilder::new(collection, points)),
        )
        .await?;

        debug!(collection, count, "upserted points");
        Ok(())
    }

    async fn query_dense(
        &self,
        collection: &str,
        query: &[f32],
        limit: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<ScoredPoint>, StoreError> {
        self.run_query(
            collection,
            Query::new_nearest(query.to_vec()),
            DENSE_VECTOR_NAME,
            QueryLeg::Dense,
            limit,
            filter,
        )
        .await
    }

    async fn query_sparse(
        &self,
        collection: &str,
        query: &SparseVector,
        limit: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<ScoredPoint>, StoreError> {
        // No query terms means nothing can score above zero.
        if query.is_empty() {
            return Ok(Vec::new());
        }

        let pairs: Vec<(u32, f32)> = query.iter().collect();
        self.run_query(
            collection,
            Query::new_nearest(pairs.as_slice()),
            SPARSE_VECTOR_NAME,
            QueryLeg::Sparse,
            limit,
            filter,
        )
        .await
    }

    async fn collection_info(&self, collection: &str) -> Result<CollectionSummary, StoreError> {
        self.require_collection(collection).await?;

        let response = self.bounded(self.client.collection_info(collection)).await?;
        let info = response
            .result
            .ok_or_else(|| StoreError::Unavailable("empty collection info response".to_string()))?;

        let (dense_dim, distance) = dense_field_params(&info);
        Ok(CollectionSummary {
            name: collection.to_string(),
            points_count: info.points_count.unwrap_or(0),
            dense_dim,
            distance,
        })
    }

    async fn list_collections(&self) -> Result<Vec<String>, StoreError> {
        let response = self.bounded(self.client.list_collections()).await?;
        Ok(response
            .collections
            .into_iter()
            .map(|collection| collection.name)
            .collect())
    }

    async fn delete_collection(&self, collection: &str) -> Result<bool, StoreError> {
        let exists = self
            .bounded(self.client.collection_exists(collection))
            .await?;
        if !exists {
            return Ok(false);
        }

        let response = self
            .bounded(self.client.delete_collection(collection))
            .await?;
        info!(collection, "deleted collection");
        Ok(response.result)
    }
}

/// Translates metadata predicates into a Qdrant filter.
///
/// Predicates apply to fields nested under the `metadata` payload key.
fn to_qdrant_filter(filter: &MetadataFilter) -> Result<Filter, StoreError> {
    let mut conditions = Vec::new();
    for (field, value) in filter.iter() {
        let key = format!("metadata.{}", field);
        let condition = match value {
            serde_json::Value::String(s) => Condition::matches(key, s.clone()),
            serde_json::Value::Bool(b) => Condition::matches(key, *b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Condition::matches(key, i),
                None => {
                    return Err(StoreError::InvalidFilter(format!(
                        "field '{}': non-integer numbers are not supported",
                        field
                    )))
                }
            },
            other => {
                return Err(StoreError::InvalidFilter(format!(
                    "field '{}': unsupported value {}",
                    field, other
                )))
            }
        };
        conditions.push(condition);
    }
    Ok(Filter::must(conditions))
}

/// Rebuilds a [`ScoredPoint`] from a Qdrant result row.
fn scored_point_from(point: qdrant_client::qdrant::ScoredPoint, leg: QueryLeg) -> ScoredPoint {
    let mut payload = point.payload;

    let id = payload
        .get("id")
        .and_then(|v| v.as_str().map(|s| s.to_string()))
        .unwrap_or_else(|| point_id_string(point.id.as_ref()));

    let text = payload
        .get("text")
        .and_then(|v| v.as_str().map(|s| s.to_string()))
        .unwrap_or_default();

    let metadata: JsonMap = payload
        .remove("metadata")
        .map(|v| v.into_json())
        .and_then(|v| match v {
            serde_json::Value::Object(map) => Some(map),
            _ => None,
        })
        .unwrap_or_default();

    ScoredPoint {
        id,
        score: point.score,
        text,
        metadata,
        source: leg,
    }
}

/// Extracts the dense field's dimensionality and distance from the schema.
fn dense_field_params(info: &qdrant_client::qdrant::CollectionInfo) -> (u64, String) {
    let config = info
        .config
        .as_ref()
        .and_then(|c| c.params.as_ref())
        .and_then(|p| p.vectors_config.as_ref())
        .and_then(|v| v.config.as_ref());

    match config {
        Some(vectors_config::Config::ParamsMap(map)) => map
            .map
            .get(DENSE_VECTOR_NAME)
            .map(|params| (params.size, distance_name(params.distance)))
            .unwrap_or((0, "unknown".to_string())),
        Some(vectors_config::Config::Params(params)) => {
            (params.size, distance_name(params.distance))
        }
        None => (0, "unknown".to_string()),
    }
}

fn distance_name(raw: i32) -> String {
    Distance::try_from(raw)
        .map(|distance| format!("{:?}", distance))
        .unwrap_or_else(|_| "unknown".to_string())
}

fn point_id_string(id: Option<&qdrant_client::qdrant::PointId>) -> String {
    use qdrant_client::qdrant::point_id::PointIdOptions;
    match id.and_then(|id| id.point_id_options.as_ref()) {
        Some(PointIdOptions::Uuid(uuid)) => uuid.clone(),
        Some(PointIdOptions::Num(num)) => num.to_string(),
        None => String::new(),
    }
}
