pub mod batches;
pub mod buffers;
pub mod context;
pub mod pipeline;

pub(crate) use buffers::{CameraBuffer, StorageBindings};
pub use context::GpuContext;
pub(crate) use pipeline::PipelineCache;
