//! Scheduler request and status types.

use std::path::PathBuf;

/// Priority class for encode requests.
///
/// Search queries run ahead of bulk indexing so interactive latency does not
/// sit behind a long upsert job. FIFO order is preserved within a class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    /// Query-path encoding; processed first
    Interactive,
    /// Indexing-path encoding
    Background,
}

/// Compute device the scheduler ended up on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    Cuda,
    Metal,
    Cpu,
}

impl std::fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceKind::Cuda => write!(f, "cuda"),
            DeviceKind::Metal => write!(f, "metal"),
            DeviceKind::Cpu => write!(f, "cpu"),
        }
    }
}

/// Where to find the model checkpoints and how to batch forward passes.
#[derive(Debug, Clone)]
pub struct ModelLoadConfig {
    /// Dense model directory (`config.json`, `tokenizer.json`, `model.safetensors`)
    pub dense_dir: PathBuf,
    /// Sparse model directory, same layout
    pub sparse_dir: PathBuf,
    /// Texts per forward pass
    pub batch_size: usize,
}

/// Scheduler status snapshot.
#[derive(Debug, Clone, Copy)]
pub struct SchedulerStats {
    /// Device the worker thread selected at startup
    pub device: DeviceKind,
    /// Requests queued but not yet processed
    pub queue_depth: usize,
    /// Requests completed since startup
    pub requests_completed: u64,
    /// Whether both models finished loading
    pub models_loaded: bool,
}
