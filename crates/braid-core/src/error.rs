//! Error types for braid-core.
//!
//! Each layer has its own error enum: [`EncodeError`] for the encoders and
//! scheduler, [`StoreError`] for the vector store client, [`SearchError`] for
//! whole-search failures, and [`EngineError`] for collection management.
//! Indexing does not get an error enum of its own: encode/store failures
//! during indexing are folded into the partial-success report instead of
//! being propagated (see [`crate::search::IndexOutcome`]).

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during encoding operations.
#[derive(Debug, Clone, Error)]
pub enum EncodeError {
    /// Encoder invoked before model initialization completed (or after it failed)
    #[error("model not loaded")]
    ModelNotLoaded,
    /// Failed to load model weights, config, or tokenizer
    #[error("failed to load model: {0}")]
    ModelLoad(String),
    /// Failed to tokenize text
    #[error("tokenization failed: {0}")]
    Tokenization(String),
    /// Failed to create tensor during inference
    #[error("failed to create tensor: {0}")]
    Tensor(String),
    /// Forward pass through the model failed
    #[error("inference failed: {0}")]
    Inference(String),
    /// Invalid model configuration
    #[error("invalid model configuration: {0}")]
    InvalidConfig(String),
    /// The encoder worker thread is no longer running
    #[error("encoder scheduler is gone")]
    SchedulerGone,
}

/// Errors surfaced by vector store implementations.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// Collection does not exist
    #[error("collection not found: {0}")]
    CollectionNotFound(String),
    /// Store is unreachable or rejected the request
    #[error("store unavailable: {0}")]
    Unavailable(String),
    /// Store call exceeded the configured deadline
    #[error("store request timed out after {0:?}")]
    Timeout(Duration),
    /// Point rejected before submission (e.g. wrong vector dimension)
    #[error("invalid point: {0}")]
    InvalidPoint(String),
    /// Filter contains a predicate the store cannot express
    #[error("unsupported filter: {0}")]
    InvalidFilter(String),
}

/// Errors that abort a whole search.
///
/// A search never returns partial results: a degraded single-leg result
/// would be misleading because fusion assumes both legs were fetched with
/// the same over-fetch factor.
#[derive(Debug, Clone, Error)]
pub enum SearchError {
    /// An encoder or the store failed; the search was aborted
    #[error("search unavailable: {0}")]
    Unavailable(String),
    /// Search targeted a collection that does not exist
    #[error("collection not found: {0}")]
    CollectionNotFound(String),
    /// Request was rejected before any work was done
    #[error("invalid query: {0}")]
    InvalidQuery(String),
}

impl From<EncodeError> for SearchError {
    fn from(err: EncodeError) -> Self {
        SearchError::Unavailable(err.to_string())
    }
}

impl From<StoreError> for SearchError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::CollectionNotFound(name) => SearchError::CollectionNotFound(name),
            other => SearchError::Unavailable(other.to_string()),
        }
    }
}

/// Errors from collection management operations.
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    /// The configured default collection cannot be deleted
    #[error("collection '{0}' is reserved and cannot be deleted")]
    ReservedCollection(String),
    /// Store-level failure
    #[error(transparent)]
    Store(#[from] StoreError),
}
