//! Indexing pipeline, fusion retriever, and their domain types.

mod engine;
mod fusion;
mod types;

pub use engine::HybridSearchEngine;
pub use fusion::{reciprocal_rank_fusion, RRF_K};
pub use types::{Document, FusedResult, IndexOutcome, SearchMode, SearchRequest};
