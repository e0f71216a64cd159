//! Serialized access to the shared compute device.

mod serial;
mod types;

pub use serial::EncoderScheduler;
pub use types::{DeviceKind, ModelLoadConfig, Priority, SchedulerStats};
