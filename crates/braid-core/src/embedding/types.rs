//! Value types shared by the encoders.

use serde::{Deserialize, Serialize};

/// Which side of the retrieval pipeline a text belongs to.
///
/// Passage and query encodings are not interchangeable: the dense model uses
/// different prefixes for the two sides, and relevance degrades silently if
/// they are swapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextContext {
    /// Text being indexed as a stored document
    Passage,
    /// Text used to search the collection
    Query,
}

impl TextContext {
    /// Prefix the dense model expects for this context.
    pub fn dense_prefix(&self) -> &'static str {
        match self {
            TextContext::Passage => crate::config::DENSE_PASSAGE_PREFIX,
            TextContext::Query => crate::config::DENSE_QUERY_PREFIX,
        }
    }
}

/// Sparse term-weight vector over the MLM vocabulary.
///
/// Parallel arrays of vocabulary indices and weights. Indices are unique and
/// ascending, weights are strictly positive; the vector may be empty. Indices
/// are only comparable between vectors produced by the same sparse model
/// version.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SparseVector {
    /// Vocabulary term indices, ascending
    pub indices: Vec<u32>,
    /// Weight per index, > 0
    pub values: Vec<f32>,
}

impl SparseVector {
    /// Creates an empty sparse vector.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Builds a vector from `(index, weight)` pairs, dropping non-positive
    /// weights and sorting by index.
    pub fn from_pairs(pairs: impl IntoIterator<Item = (u32, f32)>) -> Self {
        let mut pairs: Vec<(u32, f32)> = pairs.into_iter().filter(|(_, w)| *w > 0.0).collect();
        pairs.sort_by_key(|(i, _)| *i);
        pairs.dedup_by_key(|(i, _)| *i);
        let (indices, values) = pairs.into_iter().unzip();
        Self { indices, values }
    }

    /// Returns true if no terms survived encoding.
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Number of non-zero terms.
    pub fn nnz(&self) -> usize {
        self.indices.len()
    }

    /// Dot product over matching term indices.
    ///
    /// This is the score the sparse retrieval leg assigns to a stored point.
    pub fn dot(&self, other: &SparseVector) -> f32 {
        let mut score = 0.0;
        let (mut a, mut b) = (0, 0);
        while a < self.indices.len() && b < other.indices.len() {
            match self.indices[a].cmp(&other.indices[b]) {
                std::cmp::Ordering::Less => a += 1,
                std::cmp::Ordering::Greater => b += 1,
                std::cmp::Ordering::Equal => {
                    score += self.values[a] * other.values[b];
                    a += 1;
                    b += 1;
                }
            }
        }
        score
    }

    /// Iterates `(index, weight)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (u32, f32)> + '_ {
        self.indices.iter().copied().zip(self.values.iter().copied())
    }
}
