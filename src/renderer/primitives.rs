use super::vertex::{v, Vertex};
use crate::asset::Mesh;
use std::f32::consts::PI;

pub fn sphere_mesh(segments: u32, rings: u32) -> Mesh {
    let mut vertices = Vec::new();
    let mut indices = Vec::new();

    for ring in 0..=rings {
        let phi = PI * ring as f32 / rings as f32;
        let y = phi.cos();
        let ring_radius = phi.sin();

        for segment in 0..=segments {
            let theta = 2.0 * PI * segment as f32 / segments as f32;
            let x = ring_radius * theta.cos();
            let z = ring_radius * theta.sin();

            // Unit sphere: position doubles as the normal
            let u = segment as f32 / segments as f32;
            let tex_v = ring as f32 / rings as f32;
            let tangent = [-theta.sin(), 0.0, theta.cos()];

            vertices.push(v([x, y, z], [x, y, z], [u, tex_v], tangent));
        }
    }

    for ring in 0..rings {
        for segment in 0..segments {
            let current = ring * (segments + 1) + segment;
            let next = current + segments + 1;

            indices.extend_from_slice(&[current, next, current + 1]);
            indices.extend_from_slice(&[current + 1, next, next + 1]);
        }
    }

    Mesh::new(vertices, indices)
}

/// Unit cube centred on the origin, four vertices per face.
pub fn cube_mesh() -> Mesh {
    // (normal, tangent) per face; the face's U axis runs along the tangent
    const FACES: [([f32; 3], [f32; 3]); 6] = [
        ([1.0, 0.0, 0.0], [0.0, 0.0, 1.0]),
        ([-1.0, 0.0, 0.0], [0.0, 0.0, -1.0]),
        ([0.0, 1.0, 0.0], [1.0, 0.0, 0.0]),
        ([0.0, -1.0, 0.0], [1.0, 0.0, 0.0]),
        ([0.0, 0.0, 1.0], [1.0, 0.0, 0.0]),
        ([0.0, 0.0, -1.0], [-1.0, 0.0, 0.0]),
    ];
    const CORNERS: [([f32; 2], [f32; 2]); 4] = [
        ([-0.5, -0.5], [0.0, 1.0]),
        ([-0.5, 0.5], [0.0, 0.0]),
        ([0.5, 0.5], [1.0, 0.0]),
        ([0.5, -0.5], [1.0, 1.0]),
    ];

    let mut vertices: Vec<Vertex> = Vec::with_capacity(24);
    for (normal, tangent) in FACES {
        let n = glam::Vec3::from(normal);
        let t = glam::Vec3::from(tangent);
        let b = n.cross(t);
        for (offset, uv) in CORNERS {
            let pos = n * 0.5 + t * offset[1] + b * offset[0];
            vertices.push(v(pos.to_array(), normal, uv, tangent));
        }
    }

    let indices = (0..6u32)
        .flat_map(|f| {
            let o = f * 4;
            [o, o + 1, o + 2, o, o + 2, o + 3]
        })
        .collect();

    Mesh::new(vertices, indices)
}

/// Flat XZ quad facing +Y.
pub fn plane_mesh(size: f32) -> Mesh {
    let h = size * 0.5;
    let normal = [0.0, 1.0, 0.0];
    let tangent = [1.0, 0.0, 0.0];
    let vertices = vec![
        v([-h, 0.0, -h], normal, [0.0, 0.0], tangent),
        v([-h, 0.0, h], normal, [0.0, 1.0], tangent),
        v([h, 0.0, h], normal, [1.0, 1.0], tangent),
        v([h, 0.0, -h], normal, [1.0, 0.0], tangent),
    ];
    Mesh::new(vertices, vec![0, 1, 2, 0, 2, 3])
}
