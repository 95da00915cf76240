// renderer/objects.rs - GPU-side records shared with the WGSL layout
use bytemuck::{Pod, Zeroable};
use glam::Mat4;

/// One entry of the object storage buffer, indexed by the object's GPU slot.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug, PartialEq)]
pub struct ObjectData {
    pub model: [[f32; 4]; 4], // 64 bytes
    pub material_slot: u32,   // 4 bytes
    pub _padding: [u32; 3],   // 12 bytes (ensures 80 byte stride)
}

impl ObjectData {
    pub fn new(model: Mat4, material_slot: u32) -> Self {
        Self {
            model: model.to_cols_array_2d(),
            material_slot,
            _padding: [0; 3],
        }
    }
}

/// Material parameter block. Field order is part of the shader contract.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug, PartialEq)]
pub struct MaterialData {
    pub color: [f32; 3],    // 12 bytes
    pub kind: u32,          // 4 bytes
    pub params: [f32; 3],   // 12 bytes
    pub flags: u32,         // 4 bytes
    pub textures: [u64; 4], // 32 bytes, read as vec2<u32> pairs in WGSL
}

/// Indexed indirect draw command as consumed by `multi_draw_indexed_indirect`.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug, Default, PartialEq, Eq)]
pub struct DrawIndexedIndirect {
    pub index_count: u32,
    pub instance_count: u32,
    pub first_index: u32,
    pub base_vertex: i32,
    pub first_instance: u32,
}
