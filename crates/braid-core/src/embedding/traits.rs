//! Encoding service abstraction.

use super::types::{SparseVector, TextContext};
use crate::error::EncodeError;
use crate::scheduler::Priority;
use async_trait::async_trait;

/// Asynchronous interface to the dense and sparse encoders.
///
/// The production implementation is [`crate::scheduler::EncoderScheduler`],
/// which serializes all model forward passes on a dedicated device-owning
/// thread. Tests substitute deterministic implementations, which is why the
/// engine is generic over this trait rather than bound to the scheduler.
///
/// # Contract
///
/// - Empty input yields empty output, never an error.
/// - Calls made before model loading completes fail fast with
///   `EncodeError::ModelNotLoaded`; they never block on initialization.
/// - Output order matches input order.
#[async_trait]
pub trait TextEncoder: Send + Sync {
    /// Whether model initialization has completed.
    fn is_ready(&self) -> bool;

    /// Encodes texts into L2-normalized dense embeddings.
    ///
    /// `context` selects the passage/query prefix; the two are not
    /// interchangeable.
    async fn encode_dense(
        &self,
        texts: &[String],
        context: TextContext,
        priority: Priority,
    ) -> Result<Vec<Vec<f32>>, EncodeError>;

    /// Encodes texts into sparse term-weight vectors.
    async fn encode_sparse(
        &self,
        texts: &[String],
        priority: Priority,
    ) -> Result<Vec<SparseVector>, EncodeError>;
}
