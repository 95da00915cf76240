pub mod arena;
pub mod batch;
pub mod camera;
pub mod depth;
pub mod geometry;
pub(crate) mod internal;
pub mod material;
pub mod material_registry;
pub mod object_table;
pub mod objects;
pub mod pipeline_builder;
pub mod primitives;
mod renderer;
pub mod server;
pub mod vertex;

pub use arena::{ArenaBuffer, GpuDevice, HostBuffer, HostDevice, Reuse};
pub use batch::{BatchBuilder, DrawBatch, ObjectBatch, ShaderBatch};
pub use camera::CameraUniform;
pub use depth::Depth;
pub use geometry::{GeometryHandle, GeometryRecord, GeometryRegistry};
pub use internal::GpuContext;
pub use material::{
    LambertParams, Material, MaterialFlags, MaterialKind, MaterialRef, PbrParams, ShaderHandle,
    TextureSlot, UnlitParams,
};
pub use material_registry::{MaterialHandle, MaterialRegistry};
pub use object_table::{BatchState, DirtyFlags, ObjectEntry, ObjectHandle, ObjectTable};
pub use objects::{DrawIndexedIndirect, MaterialData, ObjectData};
pub use pipeline_builder::PipelineBuilder;
pub use primitives::{cube_mesh, plane_mesh, sphere_mesh};
pub use renderer::BatchRenderer;
pub use server::{FrameStats, RenderServer};
pub use vertex::Vertex;
