//! Domain types for indexing and retrieval.

use crate::store::{JsonMap, MetadataFilter};
use serde::{Deserialize, Serialize};

/// Document submitted for indexing.
///
/// `id` is optional: documents without one get a deterministic content-hash
/// id, so re-indexing identical text is idempotent without caller
/// coordination. Re-indexing an existing id overwrites the stored point.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Stable identifier; assigned from a content hash when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Text content to index
    pub text: String,
    /// Arbitrary metadata stored alongside the text
    #[serde(default)]
    pub metadata: JsonMap,
}

impl Document {
    /// Creates a document without an id or metadata.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            id: None,
            text: text.into(),
            metadata: JsonMap::new(),
        }
    }

    /// Creates a document with an explicit id.
    pub fn with_id(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            text: text.into(),
            metadata: JsonMap::new(),
        }
    }
}

/// Retrieval mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    /// Both legs, merged by reciprocal rank fusion
    Hybrid,
    /// Dense leg only, cosine similarity
    Dense,
    /// Sparse leg only, term-weight dot product
    Sparse,
}

impl std::str::FromStr for SearchMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "hybrid" => Ok(SearchMode::Hybrid),
            "dense" => Ok(SearchMode::Dense),
            "sparse" => Ok(SearchMode::Sparse),
            other => Err(format!(
                "unknown search mode '{}', expected hybrid, dense, or sparse",
                other
            )),
        }
    }
}

impl std::fmt::Display for SearchMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SearchMode::Hybrid => write!(f, "hybrid"),
            SearchMode::Dense => write!(f, "dense"),
            SearchMode::Sparse => write!(f, "sparse"),
        }
    }
}

/// Search request.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    /// Query text
    pub query: String,
    /// Retrieval mode
    pub mode: SearchMode,
    /// Maximum results to return; must be positive
    pub limit: usize,
    /// Optional metadata predicates, pushed into both legs
    pub filter: Option<MetadataFilter>,
    /// Collection to search; the configured default when absent
    pub collection: Option<String>,
}

impl SearchRequest {
    /// Creates a hybrid request with the conventional result count.
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            mode: SearchMode::Hybrid,
            limit: 10,
            filter: None,
            collection: None,
        }
    }
}

/// Final ranked search result.
///
/// `score` is the fused score in hybrid mode and the leg-native score in
/// single-leg modes; scores are not comparable across modes.
#[derive(Debug, Clone, Serialize)]
pub struct FusedResult {
    /// Point identifier
    pub id: String,
    /// Relevance score (see type docs for comparability)
    pub score: f32,
    /// Stored text
    pub text: String,
    /// Stored metadata
    pub metadata: JsonMap,
}

/// Report from an indexing run.
///
/// Indexing is at-least-once, not atomic: committed batches stay committed
/// when a later batch fails, and the failure shows up in `errors` instead of
/// rolling anything back. `indexed` is always ≤ `total`.
#[derive(Debug, Clone, Serialize)]
pub struct IndexOutcome {
    /// Documents submitted
    pub total: usize,
    /// Documents committed to the store
    pub indexed: usize,
    /// Failure descriptions; non-empty whenever `indexed < total`
    pub errors: Vec<String>,
}

impl IndexOutcome {
    pub(crate) fn new(total: usize) -> Self {
        Self {
            total,
            indexed: 0,
            errors: Vec::new(),
        }
    }

    /// Documents that did not commit.
    pub fn failed(&self) -> usize {
        self.total.saturating_sub(self.indexed)
    }

    /// True if every document committed.
    pub fn is_complete(&self) -> bool {
        self.indexed == self.total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_round_trips_through_strings() {
        for mode in [SearchMode::Hybrid, SearchMode::Dense, SearchMode::Sparse] {
            assert_eq!(mode.to_string().parse::<SearchMode>().unwrap(), mode);
        }
        assert!("fuzzy".parse::<SearchMode>().is_err());
    }

    #[test]
    fn document_deserializes_with_optional_fields() {
        let doc: Document = serde_json::from_str(r#"{"text": "hello"}"#).unwrap();
        assert!(doc.id.is_none());
        assert!(doc.metadata.is_empty());

        let doc: Document =
            serde_json::from_str(r#"{"id": "a", "text": "hello", "metadata": {"k": 1}}"#).unwrap();
        assert_eq!(doc.id.as_deref(), Some("a"));
        assert_eq!(doc.metadata.get("k"), Some(&serde_json::json!(1)));
    }

    #[test]
    fn outcome_accounting() {
        let mut outcome = IndexOutcome::new(10);
        outcome.indexed = 7;
        assert_eq!(outcome.failed(), 3);
        assert!(!outcome.is_complete());
    }
}
