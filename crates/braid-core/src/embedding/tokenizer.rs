//! Tokenization utilities for the encoders.
//!
//! Wraps a HuggingFace tokenizer with a fixed truncation length. The sparse
//! encoder keeps two handles over the same vocabulary (one per length
//! bucket); the dense encoder keeps one at the model's sequence limit.

use crate::error::EncodeError;
use tokenizers::tokenizer::{Tokenizer, TruncationDirection, TruncationParams, TruncationStrategy};

/// Handle for a configured tokenizer.
///
/// Owned type; cloning duplicates the tokenizer with its truncation settings.
pub struct TokenizerHandle {
    tokenizer: Tokenizer,
    max_length: usize,
}

impl TokenizerHandle {
    /// Creates a tokenizer from JSON bytes with truncation configured.
    ///
    /// # Errors
    ///
    /// Returns `EncodeError::ModelLoad` if the tokenizer JSON is invalid and
    /// `EncodeError::InvalidConfig` if truncation cannot be configured.
    pub fn from_bytes(tokenizer_bytes: &[u8], max_length: usize) -> Result<Self, EncodeError> {
        let mut tokenizer = Tokenizer::from_bytes(tokenizer_bytes).map_err(|e| {
            EncodeError::ModelLoad(format!("failed to deserialize tokenizer: {}", e))
        })?;

        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length,
                stride: 0,
                strategy: TruncationStrategy::OnlyFirst,
                direction: TruncationDirection::Right,
            }))
            .map_err(|e| {
                EncodeError::InvalidConfig(format!("failed to configure truncation: {}", e))
            })?;

        Ok(Self {
            tokenizer,
            max_length,
        })
    }

    /// Returns the configured maximum length.
    pub fn max_length(&self) -> usize {
        self.max_length
    }

    /// Returns the vocabulary size, counting added special tokens.
    pub fn vocab_size(&self) -> usize {
        self.tokenizer.get_vocab_size(true)
    }

    /// Tokenizes text into token IDs (truncated, not padded).
    ///
    /// Includes special tokens; an empty input still yields `[CLS] [SEP]`.
    pub fn tokenize(&self, text: &str) -> Result<Vec<u32>, EncodeError> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| EncodeError::Tokenization(format!("encoding failed: {}", e)))?;
        Ok(encoding.get_ids().to_vec())
    }

    /// Tokenizes text and pads the result to exactly `max_length`.
    ///
    /// Returns `(token_ids, attention_mask)`, both of length `max_length`.
    /// Padding positions carry id 0 and mask 0.
    pub fn tokenize_padded(&self, text: &str) -> Result<(Vec<u32>, Vec<u32>), EncodeError> {
        let mut ids = self.tokenize(text)?;
        let mut mask = vec![1u32; ids.len()];
        ids.resize(self.max_length, 0);
        mask.resize(self.max_length, 0);
        Ok((ids, mask))
    }
}

impl Clone for TokenizerHandle {
    fn clone(&self) -> Self {
        Self {
            tokenizer: self.tokenizer.clone(),
            max_length: self.max_length,
        }
    }
}
