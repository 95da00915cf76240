use bytemuck::{Pod, Zeroable};
use std::mem;

/// Fixed-layout vertex record: 14 floats, matching the attribute
/// locations declared by [`Vertex::ATTRS`].
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug, PartialEq)]
pub struct Vertex {
    pub pos: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
    pub tangent: [f32; 3],
    pub bitangent: [f32; 3],
}

impl Vertex {
    pub const ATTRS: [wgpu::VertexAttribute; 5] = wgpu::vertex_attr_array![
        0 => Float32x3,
        1 => Float32x3,
        2 => Float32x2,
        3 => Float32x3,
        4 => Float32x3
    ];

    pub fn layout<'a>() -> wgpu::VertexBufferLayout<'a> {
        wgpu::VertexBufferLayout {
            array_stride: mem::size_of::<Vertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRS,
        }
    }
}

/// Builds a vertex, deriving the bitangent from `normal x tangent`.
#[inline]
pub fn v(pos: [f32; 3], normal: [f32; 3], uv: [f32; 2], tangent: [f32; 3]) -> Vertex {
    let n = glam::Vec3::from(normal);
    let t = glam::Vec3::from(tangent);
    Vertex {
        pos,
        normal,
        uv,
        tangent,
        bitangent: n.cross(t).to_array(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn vertex_stride_matches_struct_size() {
        assert_eq!(
            Vertex::layout().array_stride,
            std::mem::size_of::<Vertex>() as wgpu::BufferAddress
        );
    }

    #[test]
    fn vertex_is_fourteen_floats() {
        assert_eq!(std::mem::size_of::<Vertex>(), 14 * 4);
    }

    #[test]
    fn bitangent_follows_handedness() {
        let vert = v([0.0; 3], [0.0, 0.0, 1.0], [0.0; 2], [1.0, 0.0, 0.0]);
        assert_eq!(vert.bitangent, [0.0, 1.0, 0.0]);
    }
}
