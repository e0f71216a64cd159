//! Dense sentence encoder.
//!
//! BERT-family encoder run through Candle. Texts are prefixed according to
//! their [`TextContext`], tokenized, batched, mean-pooled over the attention
//! mask, and L2-normalized so cosine similarity reduces to a dot product in
//! the store.

use super::config::{DenseModelConfig, ModelAssets};
use super::tokenizer::TokenizerHandle;
use super::types::TextContext;
use crate::error::EncodeError;
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig, DTYPE};
use tracing::info;

/// Dense embedding model.
///
/// Pure function from texts to fixed-length normalized vectors: the same
/// inputs produce the same outputs regardless of how they are split into
/// batches, because pooling only ever sees unpadded positions.
pub struct DenseEncoder {
    model: BertModel,
    tokenizer: TokenizerHandle,
    config: DenseModelConfig,
    device: Device,
    batch_size: usize,
}

impl DenseEncoder {
    /// Loads the encoder from model assets onto an explicit device.
    ///
    /// # Errors
    ///
    /// Returns `EncodeError::ModelLoad` if the config or weights cannot be
    /// parsed.
    pub fn load(
        assets: ModelAssets,
        config: DenseModelConfig,
        device: &Device,
        batch_size: usize,
    ) -> Result<Self, EncodeError> {
        info!(
            "Loading dense model '{}' ({:.2}MB)",
            config.model_id,
            assets.model_bytes.len() as f64 / 1_000_000.0
        );

        let bert_config: BertConfig = serde_json::from_str(&assets.config_json)
            .map_err(|e| EncodeError::ModelLoad(format!("failed to parse config.json: {}", e)))?;

        let tokenizer =
            TokenizerHandle::from_bytes(&assets.tokenizer_bytes, config.max_sequence_length)?;

        let vb = VarBuilder::from_buffered_safetensors(assets.model_bytes, DTYPE, device)
            .map_err(|e| EncodeError::ModelLoad(format!("failed to read safetensors: {}", e)))?;
        let model = BertModel::load(vb, &bert_config)
            .map_err(|e| EncodeError::ModelLoad(format!("failed to build model: {}", e)))?;

        Ok(Self {
            model,
            tokenizer,
            config,
            device: device.clone(),
            batch_size: batch_size.max(1),
        })
    }

    /// Output embedding dimension.
    pub fn embedding_dim(&self) -> usize {
        self.config.embedding_dim
    }

    /// Encodes texts into L2-normalized embeddings.
    ///
    /// Empty input yields empty output. Texts are processed in fixed-size
    /// batches to bound peak device memory.
    pub fn encode(
        &self,
        texts: &[String],
        context: TextContext,
    ) -> Result<Vec<Vec<f32>>, EncodeError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut embeddings = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            embeddings.extend(self.encode_batch(batch, context)?);
        }
        Ok(embeddings)
    }

    fn encode_batch(
        &self,
        texts: &[String],
        context: TextContext,
    ) -> Result<Vec<Vec<f32>>, EncodeError> {
        let prefix = context.dense_prefix();
        let token_batches: Vec<Vec<u32>> = texts
            .iter()
            .map(|t| self.tokenizer.tokenize(&format!("{}{}", prefix, t)))
            .collect::<Result<_, _>>()?;

        let batch_size = token_batches.len();
        let max_len = token_batches.iter().map(Vec::len).max().unwrap_or(1).max(1);

        // Pad to the longest sequence in the batch; the mask keeps padded
        // positions out of the pooled representation.
        let mut flat_ids = Vec::with_capacity(batch_size * max_len);
        let mut flat_mask = Vec::with_capacity(batch_size * max_len);
        for ids in &token_batches {
            flat_ids.extend_from_slice(ids);
            flat_ids.extend(std::iter::repeat(0u32).take(max_len - ids.len()));
            flat_mask.extend(std::iter::repeat(1u32).take(ids.len()));
            flat_mask.extend(std::iter::repeat(0u32).take(max_len - ids.len()));
        }

        let input_ids = Tensor::from_vec(flat_ids, (batch_size, max_len), &self.device)
            .map_err(|e| EncodeError::Tensor(format!("input ids: {}", e)))?;
        let attention_mask = Tensor::from_vec(flat_mask, (batch_size, max_len), &self.device)
            .map_err(|e| EncodeError::Tensor(format!("attention mask: {}", e)))?;
        let token_type_ids = Tensor::zeros((batch_size, max_len), DType::U32, &self.device)
            .map_err(|e| EncodeError::Tensor(format!("token type ids: {}", e)))?;

        // [batch, seq, hidden]
        let hidden = self
            .model
            .forward(&input_ids, &token_type_ids, Some(&attention_mask))
            .map_err(|e| EncodeError::Inference(format!("forward pass failed: {}", e)))?;

        let pooled = Self::masked_mean_pool(&hidden, &attention_mask)?;
        let normalized = Self::normalize_l2(&pooled)?;

        let rows = normalized
            .to_vec2::<f32>()
            .map_err(|e| EncodeError::Inference(format!("failed to read embeddings: {}", e)))?;

        if let Some(row) = rows.first() {
            if row.len() != self.config.embedding_dim {
                return Err(EncodeError::InvalidConfig(format!(
                    "model produced {}-dimensional embeddings, expected {}",
                    row.len(),
                    self.config.embedding_dim
                )));
            }
        }

        Ok(rows)
    }

    /// Mean pooling restricted to unpadded positions.
    fn masked_mean_pool(hidden: &Tensor, attention_mask: &Tensor) -> Result<Tensor, EncodeError> {
        let inference = |e: candle_core::Error| EncodeError::Inference(format!("pooling: {}", e));

        let mask = attention_mask
            .to_dtype(DType::F32)
            .map_err(inference)?
            .unsqueeze(2)
            .map_err(inference)?; // [batch, seq, 1]
        let summed = hidden
            .broadcast_mul(&mask)
            .map_err(inference)?
            .sum(1)
            .map_err(inference)?; // [batch, hidden]
        let counts = mask.sum(1).map_err(inference)?; // [batch, 1]
        summed.broadcast_div(&counts).map_err(inference)
    }

    /// L2 normalization to unit vectors.
    fn normalize_l2(v: &Tensor) -> Result<Tensor, EncodeError> {
        let inference = |e: candle_core::Error| EncodeError::Inference(format!("normalize: {}", e));

        let norms = v
            .sqr()
            .map_err(inference)?
            .sum_keepdim(1)
            .map_err(inference)?
            .sqrt()
            .map_err(inference)?;
        v.broadcast_div(&norms).map_err(inference)
    }
}
