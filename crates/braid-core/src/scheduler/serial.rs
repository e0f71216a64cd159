//! Serial encoder scheduler.
//!
//! A single dedicated OS thread owns the compute device and both models and
//! processes all encode requests serially with priority ordering. Device
//! memory is a hard-capacity shared resource: unconstrained concurrent
//! forward passes cause out-of-memory failures, not just slowdowns, so
//! requests beyond capacity queue instead of running.

use super::types::{DeviceKind, ModelLoadConfig, Priority, SchedulerStats};
use crate::embedding::{
    DenseEncoder, DenseModelConfig, ModelAssets, SparseEncoder, SparseModelConfig, SparseVector,
    TextContext, TextEncoder,
};
use crate::error::EncodeError;
use async_trait::async_trait;
use candle_core::Device;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, RwLock};
use std::thread;
use tokio::sync::oneshot;
use tracing::{debug, info};

/// Handle to the encoder worker thread.
///
/// Cloning is cheap; all clones feed the same queue. Encode calls made
/// before [`load_models`](Self::load_models) completes fail fast with
/// `EncodeError::ModelNotLoaded` rather than waiting for initialization.
///
/// # Architecture
///
/// ```text
/// ┌─────────────────┐     ┌─────────────────┐     ┌──────────────────┐
/// │  Async Callers  │────▶│  MPSC Channel   │────▶│  Worker Thread   │
/// │  (tokio tasks)  │     │                 │     │  (owns device +  │
/// └─────────────────┘     └─────────────────┘     │   both models)   │
///                                                 └──────────────────┘
///                                                          │
///                                                          ▼
///                                                  ┌────────────────┐
///                                                  │ Priority Queue │
///                                                  │ query > index  │
///                                                  └────────────────┘
/// ```
#[derive(Clone)]
pub struct EncoderScheduler {
    tx: mpsc::Sender<SchedulerMessage>,
    ready: Arc<AtomicBool>,
    stats: Arc<StatsInner>,
}

enum SchedulerMessage {
    LoadModels {
        config: ModelLoadConfig,
        response: oneshot::Sender<Result<(), EncodeError>>,
    },
    EncodeDense {
        texts: Vec<String>,
        context: TextContext,
        priority: Priority,
        response: oneshot::Sender<Result<Vec<Vec<f32>>, EncodeError>>,
    },
    EncodeSparse {
        texts: Vec<String>,
        priority: Priority,
        response: oneshot::Sender<Result<Vec<SparseVector>, EncodeError>>,
    },
}

impl SchedulerMessage {
    fn priority(&self) -> Priority {
        match self {
            // Model loading gates everything else, run it first
            SchedulerMessage::LoadModels { .. } => Priority::Interactive,
            SchedulerMessage::EncodeDense { priority, .. } => *priority,
            SchedulerMessage::EncodeSparse { priority, .. } => *priority,
        }
    }
}

/// Wrapper for priority queue ordering.
struct PrioritizedMessage {
    priority: Priority,
    sequence: u64, // FIFO within the same priority
    message: SchedulerMessage,
}

impl PartialEq for PrioritizedMessage {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.sequence == other.sequence
    }
}

impl Eq for PrioritizedMessage {}

impl PartialOrd for PrioritizedMessage {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PrioritizedMessage {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // BinaryHeap is a max-heap: Interactive (the smaller discriminant)
        // must compare greater, and within a class the lower sequence wins.
        match other.priority.cmp(&self.priority) {
            std::cmp::Ordering::Equal => other.sequence.cmp(&self.sequence),
            ordering => ordering,
        }
    }
}

struct StatsInner {
    device: RwLock<DeviceKind>,
    queue_depth: AtomicUsize,
    requests_completed: AtomicU64,
}

struct LoadedModels {
    dense: DenseEncoder,
    sparse: SparseEncoder,
}

impl EncoderScheduler {
    /// Spawns the worker thread.
    ///
    /// The thread selects a device immediately but loads no models; call
    /// [`load_models`](Self::load_models) to complete initialization.
    pub fn spawn() -> Result<Self, EncodeError> {
        let (tx, rx) = mpsc::channel();
        let ready = Arc::new(AtomicBool::new(false));
        let stats = Arc::new(StatsInner {
            device: RwLock::new(DeviceKind::Cpu),
            queue_depth: AtomicUsize::new(0),
            requests_completed: AtomicU64::new(0),
        });

        let ready_clone = ready.clone();
        let stats_clone = stats.clone();
        thread::Builder::new()
            .name("encoder-scheduler".to_string())
            .spawn(move || worker_loop(rx, ready_clone, stats_clone))
            .map_err(|e| EncodeError::ModelLoad(format!("failed to spawn worker: {}", e)))?;

        info!("Encoder scheduler started with dedicated worker thread");
        Ok(Self { tx, ready, stats })
    }

    /// Loads both models on the worker thread.
    ///
    /// Idempotent initialization barrier: until this returns `Ok`, all
    /// encode calls fail with `ModelNotLoaded`. Calling it again after a
    /// successful load is a no-op.
    pub async fn load_models(&self, config: ModelLoadConfig) -> Result<(), EncodeError> {
        let (response, rx) = oneshot::channel();
        self.tx
            .send(SchedulerMessage::LoadModels { config, response })
            .map_err(|_| EncodeError::SchedulerGone)?;
        rx.await.map_err(|_| EncodeError::SchedulerGone)?
    }

    /// Returns a snapshot of scheduler status.
    pub fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            device: self
                .stats
                .device
                .read()
                .map(|d| *d)
                .unwrap_or(DeviceKind::Cpu),
            queue_depth: self.stats.queue_depth.load(Ordering::Relaxed),
            requests_completed: self.stats.requests_completed.load(Ordering::Relaxed),
            models_loaded: self.ready.load(Ordering::Acquire),
        }
    }

    fn send(&self, message: SchedulerMessage) -> Result<(), EncodeError> {
        self.tx.send(message).map_err(|_| EncodeError::SchedulerGone)
    }
}

#[async_trait]
impl TextEncoder for EncoderScheduler {
    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    async fn encode_dense(
        &self,
        texts: &[String],
        context: TextContext,
        priority: Priority,
    ) -> Result<Vec<Vec<f32>>, EncodeError> {
        if !self.is_ready() {
            return Err(EncodeError::ModelNotLoaded);
        }
        let (response, rx) = oneshot::channel();
        self.send(SchedulerMessage::EncodeDense {
            texts: texts.to_vec(),
            context,
            priority,
            response,
        })?;
        rx.await.map_err(|_| EncodeError::SchedulerGone)?
    }

    async fn encode_sparse(
        &self,
        texts: &[String],
        priority: Priority,
    ) -> Result<Vec<SparseVector>, EncodeError> {
        if !self.is_ready() {
            return Err(EncodeError::ModelNotLoaded);
        }
        let (response, rx) = oneshot::channel();
        self.send(SchedulerMessage::EncodeSparse {
            texts: texts.to_vec(),
            priority,
            response,
        })?;
        rx.await.map_err(|_| EncodeError::SchedulerGone)?
    }
}

/// Worker thread main loop.
fn worker_loop(
    rx: mpsc::Receiver<SchedulerMessage>,
    ready: Arc<AtomicBool>,
    stats: Arc<StatsInner>,
) {
    info!("Encoder worker thread started");

    // Device is owned by this thread only.
    let (device, device_kind) = select_device();
    if let Ok(mut slot) = stats.device.write() {
        *slot = device_kind;
    }

    let mut models: Option<LoadedModels> = None;
    let mut queue: BinaryHeap<PrioritizedMessage> = BinaryHeap::new();
    let mut sequence: u64 = 0;

    loop {
        // Drain the channel into the priority queue without blocking.
        loop {
            match rx.try_recv() {
                Ok(message) => {
                    queue.push(PrioritizedMessage {
                        priority: message.priority(),
                        sequence,
                        message,
                    });
                    sequence = sequence.wrapping_add(1);
                    stats.queue_depth.fetch_add(1, Ordering::Relaxed);
                }
                Err(mpsc::TryRecvError::Empty) => break,
                Err(mpsc::TryRecvError::Disconnected) => {
                    info!("Encoder scheduler channel disconnected, shutting down");
                    return;
                }
            }
        }

        if let Some(PrioritizedMessage {
            message, priority, ..
        }) = queue.pop()
        {
            stats.queue_depth.fetch_sub(1, Ordering::Relaxed);

            match message {
                SchedulerMessage::LoadModels { config, response } => {
                    let result = if models.is_some() {
                        debug!("Models already loaded, ignoring duplicate load request");
                        Ok(())
                    } else {
                        load_models(&device, &config).map(|loaded| {
                            models = Some(loaded);
                            ready.store(true, Ordering::Release);
                        })
                    };
                    let _ = response.send(result);
                }
                SchedulerMessage::EncodeDense {
                    texts,
                    context,
                    response,
                    ..
                } => {
                    debug!(
                        texts = texts.len(),
                        ?priority,
                        "Processing dense encode request"
                    );
                    let result = match &models {
                        Some(loaded) => loaded.dense.encode(&texts, context),
                        None => Err(EncodeError::ModelNotLoaded),
                    };
                    let _ = response.send(result);
                    stats.requests_completed.fetch_add(1, Ordering::Relaxed);
                }
                SchedulerMessage::EncodeSparse {
                    texts, response, ..
                } => {
                    debug!(
                        texts = texts.len(),
                        ?priority,
                        "Processing sparse encode request"
                    );
                    let result = match &models {
                        Some(loaded) => loaded.sparse.encode(&texts),
                        None => Err(EncodeError::ModelNotLoaded),
                    };
                    let _ = response.send(result);
                    stats.requests_completed.fetch_add(1, Ordering::Relaxed);
                }
            }
        } else {
            // Queue empty: block until the next message arrives.
            match rx.recv() {
                Ok(message) => {
                    queue.push(PrioritizedMessage {
                        priority: message.priority(),
                        sequence,
                        message,
                    });
                    sequence = sequence.wrapping_add(1);
                    stats.queue_depth.fetch_add(1, Ordering::Relaxed);
                }
                Err(_) => {
                    info!("Encoder scheduler channel disconnected, shutting down");
                    return;
                }
            }
        }
    }
}

fn load_models(device: &Device, config: &ModelLoadConfig) -> Result<LoadedModels, EncodeError> {
    let dense_assets = ModelAssets::load(&config.dense_dir)?;
    let dense = DenseEncoder::load(
        dense_assets,
        DenseModelConfig::default(),
        device,
        config.batch_size,
    )?;

    let sparse_assets = ModelAssets::load(&config.sparse_dir)?;
    let sparse = SparseEncoder::load(
        sparse_assets,
        SparseModelConfig::default(),
        device,
        config.batch_size,
    )?;

    info!("Dense and sparse models loaded");
    Ok(LoadedModels { dense, sparse })
}

/// Selects the best available compute device.
fn select_device() -> (Device, DeviceKind) {
    if let Ok(cuda) = Device::new_cuda(0) {
        info!("Encoder scheduler using CUDA device");
        return (cuda, DeviceKind::Cuda);
    }

    if let Ok(metal) = Device::new_metal(0) {
        info!("Encoder scheduler using Metal device");
        return (metal, DeviceKind::Metal);
    }

    info!("Encoder scheduler using CPU device");
    (Device::Cpu, DeviceKind::Cpu)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn probe(priority: Priority, sequence: u64) -> PrioritizedMessage {
        let (response, _rx) = oneshot::channel();
        PrioritizedMessage {
            priority,
            sequence,
            message: SchedulerMessage::EncodeSparse {
                texts: vec![],
                priority,
                response,
            },
        }
    }

    #[test]
    fn interactive_preempts_background() {
        let mut heap = BinaryHeap::new();
        heap.push(probe(Priority::Background, 0));
        heap.push(probe(Priority::Interactive, 1));

        let first = heap.pop().unwrap();
        assert_eq!(first.priority, Priority::Interactive);
        assert_eq!(first.sequence, 1);
    }

    #[test]
    fn fifo_within_priority() {
        let mut heap = BinaryHeap::new();
        heap.push(probe(Priority::Background, 2));
        heap.push(probe(Priority::Background, 0));
        heap.push(probe(Priority::Background, 1));

        assert_eq!(heap.pop().unwrap().sequence, 0);
        assert_eq!(heap.pop().unwrap().sequence, 1);
        assert_eq!(heap.pop().unwrap().sequence, 2);
    }

    #[tokio::test]
    async fn encode_before_load_fails_fast() {
        let scheduler = EncoderScheduler::spawn().unwrap();
        assert!(!scheduler.is_ready());

        let result = scheduler
            .encode_dense(
                &["hello".to_string()],
                TextContext::Query,
                Priority::Interactive,
            )
            .await;
        assert!(matches!(result, Err(EncodeError::ModelNotLoaded)));
    }

    #[tokio::test]
    async fn load_with_missing_assets_reports_model_load_error() {
        let scheduler = EncoderScheduler::spawn().unwrap();
        let result = scheduler
            .load_models(ModelLoadConfig {
                dense_dir: "/nonexistent/dense".into(),
                sparse_dir: "/nonexistent/sparse".into(),
                batch_size: 8,
            })
            .await;
        assert!(matches!(result, Err(EncodeError::ModelLoad(_))));
        assert!(!scheduler.is_ready());
    }
}
