//! Pipeline constants and runtime settings.
//!
//! Constants in this module pin down the parts of the pipeline that must not
//! drift between the indexing and query paths: vector dimensionality, text
//! prefixes, the sparse token-length buckets, and batch sizes. [`Settings`]
//! carries the deployment-specific knobs (store URL, model directories,
//! limits) and can be loaded from `BRAID_*` environment variables.

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

// =============================================================================
// Dense Encoder Configuration
// =============================================================================

/// Dense embedding dimension.
///
/// Fixed by the dense model (e5-large family). Collections are created with
/// this dimensionality and the store rejects points that deviate from it, so
/// the value must stay constant for the lifetime of a collection.
pub const DENSE_DIM: usize = 1024;

/// Prefix prepended to texts when indexing.
///
/// The e5 model family is trained with asymmetric prefixes: stored passages
/// and search queries get different markers. Swapping them does not fail,
/// it silently degrades relevance, which is why the prefixes are constants
/// rather than configuration.
pub const DENSE_PASSAGE_PREFIX: &str = "passage: ";

/// Prefix prepended to search queries. See [`DENSE_PASSAGE_PREFIX`].
pub const DENSE_QUERY_PREFIX: &str = "query: ";

// =============================================================================
// Sparse Encoder Configuration
// =============================================================================

/// Maximum token length for short (query-like) texts.
pub const SPARSE_QUERY_MAX_TOKENS: usize = 24;

/// Maximum token length for long (document-like) texts.
pub const SPARSE_DOCUMENT_MAX_TOKENS: usize = 128;

/// Character-count threshold that separates the two sparse length buckets.
///
/// Texts shorter than this encode at [`SPARSE_QUERY_MAX_TOKENS`], everything
/// else at [`SPARSE_DOCUMENT_MAX_TOKENS`]. Queries are mostly short, so
/// padding them to document length wastes a forward pass worth of compute.
/// The same rule runs on both the indexing and query paths; scores are only
/// comparable when both sides went through the same bucket selection.
pub const SPARSE_SHORT_TEXT_THRESHOLD: usize = 100;

// =============================================================================
// Store / Retrieval Configuration
// =============================================================================

/// Name of the dense vector field in the store schema.
pub const DENSE_VECTOR_NAME: &str = "dense";

/// Name of the sparse vector field in the store schema.
pub const SPARSE_VECTOR_NAME: &str = "sparse";

/// Points per upsert request.
///
/// Bounds request size to the store; each batch commits independently, so a
/// failure only loses the current and subsequent batches.
pub const UPSERT_BATCH_SIZE: usize = 100;

/// Over-fetch factor for hybrid retrieval legs.
///
/// Each leg requests `limit * PREFETCH_FACTOR` candidates because fusion can
/// reorder ranks; fetching either leg with a tighter limit biases the fused
/// list toward the other leg.
pub const PREFETCH_FACTOR: usize = 2;

/// Runtime settings.
///
/// Defaults match a local single-node deployment. Every field can be
/// overridden via environment variables (`BRAID_STORE_URL`,
/// `BRAID_STORE_TIMEOUT_SECS`, `BRAID_COLLECTION`, `BRAID_DENSE_MODEL_DIR`,
/// `BRAID_SPARSE_MODEL_DIR`, `BRAID_BATCH_SIZE`, `BRAID_DEFAULT_LIMIT`,
/// `BRAID_MAX_LIMIT`).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// gRPC URL of the vector store
    pub store_url: String,
    /// Deadline for individual store calls, in seconds
    pub store_timeout_secs: u64,
    /// Collection used when a request does not name one; protected from deletion
    pub default_collection: String,
    /// Directory holding the dense model (`config.json`, `tokenizer.json`,
    /// `model.safetensors`)
    pub dense_model_dir: PathBuf,
    /// Directory holding the sparse model, same layout
    pub sparse_model_dir: PathBuf,
    /// Texts per encoder forward pass
    pub encode_batch_size: usize,
    /// Result count when a search does not specify one
    pub default_limit: usize,
    /// Upper bound on requested result counts
    pub max_limit: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            store_url: "http://localhost:6334".to_string(),
            store_timeout_secs: 30,
            default_collection: "hybrid_search".to_string(),
            dense_model_dir: PathBuf::from("models/e5-large-v2"),
            sparse_model_dir: PathBuf::from("models/splade-pp-en-v1"),
            encode_batch_size: 32,
            default_limit: 10,
            max_limit: 100,
        }
    }
}

impl Settings {
    /// Builds settings from the environment, falling back to defaults for
    /// anything unset or unparseable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            store_url: env_string("BRAID_STORE_URL").unwrap_or(defaults.store_url),
            store_timeout_secs: env_parsed("BRAID_STORE_TIMEOUT_SECS")
                .unwrap_or(defaults.store_timeout_secs),
            default_collection: env_string("BRAID_COLLECTION")
                .unwrap_or(defaults.default_collection),
            dense_model_dir: env_string("BRAID_DENSE_MODEL_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.dense_model_dir),
            sparse_model_dir: env_string("BRAID_SPARSE_MODEL_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.sparse_model_dir),
            encode_batch_size: env_parsed("BRAID_BATCH_SIZE").unwrap_or(defaults.encode_batch_size),
            default_limit: env_parsed("BRAID_DEFAULT_LIMIT").unwrap_or(defaults.default_limit),
            max_limit: env_parsed("BRAID_MAX_LIMIT").unwrap_or(defaults.max_limit),
        }
    }

    /// Store call deadline as a [`Duration`].
    pub fn store_timeout(&self) -> Duration {
        Duration::from_secs(self.store_timeout_secs)
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_parsed<T: std::str::FromStr>(key: &str) -> Option<T> {
    env_string(key).and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_consistent() {
        let settings = Settings::default();
        assert!(settings.default_limit <= settings.max_limit);
        assert_eq!(settings.store_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn query_bucket_is_smaller_than_document_bucket() {
        assert!(SPARSE_QUERY_MAX_TOKENS < SPARSE_DOCUMENT_MAX_TOKENS);
    }
}
