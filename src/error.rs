use thiserror::Error;

use crate::renderer::ObjectHandle;

/// Failures raised by [`ArenaBuffer`](crate::renderer::arena::ArenaBuffer).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArenaError {
    /// Growing the arena would exceed the addressable range or the device buffer limit.
    #[error("arena '{label}' cannot grow to {requested} elements (capacity {capacity})")]
    AllocationFailure {
        label: &'static str,
        requested: usize,
        capacity: usize,
    },
    #[error("arena '{0}' has no CPU shadow copy to map")]
    NoShadowCopy(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
    #[error(transparent)]
    Arena(#[from] ArenaError),
    #[error("object handle {0:?} is no longer alive")]
    StaleObject(ObjectHandle),
    #[error("geometry handle {0} is not registered")]
    UnknownGeometry(u32),
    #[error("material handle {0} is not registered")]
    UnknownMaterial(u32),
    #[error("{kind} handle {index} is still referenced by {refs} object(s)")]
    InUse {
        kind: &'static str,
        index: u32,
        refs: u32,
    },
}

#[derive(Debug, Error)]
pub enum ContextError {
    #[error("no suitable GPU adapter: {0}")]
    Adapter(#[from] wgpu::RequestAdapterError),
    #[error("failed to create device: {0}")]
    Device(#[from] wgpu::RequestDeviceError),
    #[error("adapter is missing required features: {0:?}")]
    MissingFeatures(wgpu::Features),
}
