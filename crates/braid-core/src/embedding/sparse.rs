//! Sparse lexical-importance encoder.
//!
//! Runs a masked-language model over the text and turns its vocabulary
//! logits into term weights: log-softmax over the vocabulary dimension,
//! max-pool across token positions, floor at zero. Only terms with positive
//! pooled score are kept, which enforces sparsity by construction.

use super::config::{ModelAssets, SparseModelConfig};
use super::tokenizer::TokenizerHandle;
use super::types::SparseVector;
use crate::error::EncodeError;
use candle_core::{Device, Tensor, D};
use candle_nn::ops::log_softmax;
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertForMaskedLM, Config as BertConfig, DTYPE};
use tracing::info;

/// Sparse embedding model.
///
/// Input length is bucketed by character count: short texts are padded to a
/// query-tuned token length, longer texts to a document-tuned one. The
/// bucket rule is [`SparseModelConfig::max_tokens_for`] and runs identically
/// on the indexing and query paths. Texts sharing a bucket are batched
/// through one forward pass; every member of a bucket is padded to the same
/// fixed length, so batching does not change the output values.
pub struct SparseEncoder {
    model: BertForMaskedLM,
    query_tokenizer: TokenizerHandle,
    document_tokenizer: TokenizerHandle,
    config: SparseModelConfig,
    device: Device,
    batch_size: usize,
}

impl SparseEncoder {
    /// Loads the encoder from model assets onto an explicit device.
    ///
    /// # Errors
    ///
    /// Returns `EncodeError::ModelLoad` if the config or weights cannot be
    /// parsed.
    pub fn load(
        assets: ModelAssets,
        config: SparseModelConfig,
        device: &Device,
        batch_size: usize,
    ) -> Result<Self, EncodeError> {
        info!(
            "Loading sparse model '{}' ({:.2}MB)",
            config.model_id,
            assets.model_bytes.len() as f64 / 1_000_000.0
        );

        let bert_config: BertConfig = serde_json::from_str(&assets.config_json)
            .map_err(|e| EncodeError::ModelLoad(format!("failed to parse config.json: {}", e)))?;

        let query_tokenizer =
            TokenizerHandle::from_bytes(&assets.tokenizer_bytes, config.query_max_tokens)?;
        let document_tokenizer =
            TokenizerHandle::from_bytes(&assets.tokenizer_bytes, config.document_max_tokens)?;

        let vb = VarBuilder::from_buffered_safetensors(assets.model_bytes, DTYPE, device)
            .map_err(|e| EncodeError::ModelLoad(format!("failed to read safetensors: {}", e)))?;
        let model = BertForMaskedLM::load(vb, &bert_config)
            .map_err(|e| EncodeError::ModelLoad(format!("failed to build model: {}", e)))?;

        Ok(Self {
            model,
            query_tokenizer,
            document_tokenizer,
            config,
            device: device.clone(),
            batch_size: batch_size.max(1),
        })
    }

    /// Encodes texts into sparse term-weight vectors.
    ///
    /// Empty input yields empty output. A text that cannot be tokenized
    /// yields an empty [`SparseVector`] rather than an error.
    pub fn encode(&self, texts: &[String]) -> Result<Vec<SparseVector>, EncodeError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut results: Vec<SparseVector> = vec![SparseVector::empty(); texts.len()];

        for tokenizer in [&self.query_tokenizer, &self.document_tokenizer] {
            let bucket_len = tokenizer.max_length();
            let members: Vec<usize> = (0..texts.len())
                .filter(|&i| self.config.max_tokens_for(&texts[i]) == bucket_len)
                .collect();

            for chunk in members.chunks(self.batch_size) {
                let chunk_texts: Vec<&str> = chunk.iter().map(|&i| texts[i].as_str()).collect();
                let vectors = self.encode_bucket(&chunk_texts, tokenizer)?;
                for (&i, vector) in chunk.iter().zip(vectors) {
                    results[i] = vector;
                }
            }
        }

        Ok(results)
    }

    /// Encodes one batch of texts that share a length bucket.
    fn encode_bucket(
        &self,
        texts: &[&str],
        tokenizer: &TokenizerHandle,
    ) -> Result<Vec<SparseVector>, EncodeError> {
        let max_len = tokenizer.max_length();

        // Texts the tokenizer rejects stay as empty vectors.
        let slots: Vec<Option<(Vec<u32>, Vec<u32>)>> = texts
            .iter()
            .map(|t| tokenizer.tokenize_padded(t).ok())
            .collect();
        let live: Vec<usize> = (0..slots.len()).filter(|&i| slots[i].is_some()).collect();

        let mut results = vec![SparseVector::empty(); texts.len()];
        if live.is_empty() {
            return Ok(results);
        }

        let batch_size = live.len();
        let mut flat_ids = Vec::with_capacity(batch_size * max_len);
        let mut flat_mask = Vec::with_capacity(batch_size * max_len);
        for &i in &live {
            if let Some((ids, mask)) = &slots[i] {
                flat_ids.extend_from_slice(ids);
                flat_mask.extend_from_slice(mask);
            }
        }

        let input_ids = Tensor::from_vec(flat_ids, (batch_size, max_len), &self.device)
            .map_err(|e| EncodeError::Tensor(format!("input ids: {}", e)))?;
        let attention_mask = Tensor::from_vec(flat_mask, (batch_size, max_len), &self.device)
            .map_err(|e| EncodeError::Tensor(format!("attention mask: {}", e)))?;
        let token_type_ids = Tensor::zeros((batch_size, max_len), candle_core::DType::U32, &self.device)
            .map_err(|e| EncodeError::Tensor(format!("token type ids: {}", e)))?;

        // [batch, seq, vocab]
        let logits = self
            .model
            .forward(&input_ids, &token_type_ids, Some(&attention_mask))
            .map_err(|e| EncodeError::Inference(format!("forward pass failed: {}", e)))?;

        // Per-term salience: how strongly any position predicts the term.
        let log_probs = log_softmax(&logits, D::Minus1)
            .map_err(|e| EncodeError::Inference(format!("log-softmax: {}", e)))?;
        let pooled = log_probs
            .max(1)
            .map_err(|e| EncodeError::Inference(format!("max-pool: {}", e)))?; // [batch, vocab]
        let floored = pooled
            .relu()
            .map_err(|e| EncodeError::Inference(format!("relu: {}", e)))?;

        let rows = floored
            .to_vec2::<f32>()
            .map_err(|e| EncodeError::Inference(format!("failed to read weights: {}", e)))?;

        for (&slot, row) in live.iter().zip(rows) {
            results[slot] = SparseVector::from_pairs(
                row.into_iter()
                    .enumerate()
                    .filter(|(_, w)| *w > 0.0)
                    .map(|(i, w)| (i as u32, w)),
            );
        }

        Ok(results)
    }
}
