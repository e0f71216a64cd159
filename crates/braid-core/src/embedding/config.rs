//! Encoder model configuration and asset loading.

use crate::config::{
    DENSE_DIM, SPARSE_DOCUMENT_MAX_TOKENS, SPARSE_QUERY_MAX_TOKENS, SPARSE_SHORT_TEXT_THRESHOLD,
};
use crate::error::EncodeError;
use std::path::Path;

/// Configuration for the dense sentence encoder.
///
/// Defaults target the e5-large family: 1024-dimensional embeddings,
/// L2-normalized, asymmetric passage/query prefixes.
#[derive(Debug, Clone)]
pub struct DenseModelConfig {
    /// Model identifier, e.g. "intfloat/e5-large-v2"
    pub model_id: String,
    /// Output embedding dimension
    pub embedding_dim: usize,
    /// Maximum input sequence length in tokens
    pub max_sequence_length: usize,
}

impl Default for DenseModelConfig {
    fn default() -> Self {
        Self {
            model_id: "intfloat/e5-large-v2".to_string(),
            embedding_dim: DENSE_DIM,
            max_sequence_length: 512,
        }
    }
}

/// Configuration for the sparse masked-language-model encoder.
#[derive(Debug, Clone)]
pub struct SparseModelConfig {
    /// Model identifier, e.g. "prithivida/Splade_PP_en_v1"
    pub model_id: String,
    /// Token length for short texts
    pub query_max_tokens: usize,
    /// Token length for long texts
    pub document_max_tokens: usize,
    /// Character count below which a text is treated as short
    pub short_text_threshold: usize,
}

impl Default for SparseModelConfig {
    fn default() -> Self {
        Self {
            model_id: "prithivida/Splade_PP_en_v1".to_string(),
            query_max_tokens: SPARSE_QUERY_MAX_TOKENS,
            document_max_tokens: SPARSE_DOCUMENT_MAX_TOKENS,
            short_text_threshold: SPARSE_SHORT_TEXT_THRESHOLD,
        }
    }
}

impl SparseModelConfig {
    /// Selects the token-length bucket for a text.
    ///
    /// This single function is the thresholding rule for both the indexing
    /// and query paths; sparse scores are only comparable when both sides
    /// used it.
    pub fn max_tokens_for(&self, text: &str) -> usize {
        if text.chars().count() < self.short_text_threshold {
            self.query_max_tokens
        } else {
            self.document_max_tokens
        }
    }
}

/// Raw model files read from a model directory.
///
/// A model directory holds the three files a HuggingFace checkpoint ships
/// with: `config.json`, `tokenizer.json`, and `model.safetensors`.
pub struct ModelAssets {
    /// Contents of `config.json`
    pub config_json: String,
    /// Contents of `tokenizer.json`
    pub tokenizer_bytes: Vec<u8>,
    /// Contents of `model.safetensors`
    pub model_bytes: Vec<u8>,
}

impl ModelAssets {
    /// Reads model assets from a directory.
    ///
    /// # Errors
    ///
    /// Returns `EncodeError::ModelLoad` if any of the three files is missing
    /// or unreadable.
    pub fn load(dir: &Path) -> Result<Self, EncodeError> {
        let read = |name: &str| -> Result<Vec<u8>, EncodeError> {
            let path = dir.join(name);
            std::fs::read(&path)
                .map_err(|e| EncodeError::ModelLoad(format!("{}: {}", path.display(), e)))
        };

        let config_json = String::from_utf8(read("config.json")?)
            .map_err(|e| EncodeError::ModelLoad(format!("config.json is not UTF-8: {}", e)))?;
        let tokenizer_bytes = read("tokenizer.json")?;
        let model_bytes = read("model.safetensors")?;

        Ok(Self {
            config_json,
            tokenizer_bytes,
            model_bytes,
        })
    }
}
