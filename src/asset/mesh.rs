use std::rc::Rc;

use crate::renderer::Vertex;

/// CPU-side geometry source produced by a mesh loader or generator.
///
/// Meshes are shared as [`MeshRef`]; registration is keyed by the `Rc`
/// allocation, so two meshes with identical contents still get distinct
/// geometry handles.
#[derive(Debug, Clone)]
pub struct Mesh {
    vertices: Vec<Vertex>,
    indices: Vec<u32>,
}

pub type MeshRef = Rc<Mesh>;

impl Mesh {
    pub fn new(vertices: Vec<Vertex>, indices: Vec<u32>) -> Self {
        Self { vertices, indices }
    }

    pub fn shared(vertices: Vec<Vertex>, indices: Vec<u32>) -> MeshRef {
        Rc::new(Self::new(vertices, indices))
    }

    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    pub fn index_count(&self) -> u32 {
        self.indices.len() as u32
    }
}

impl From<(Vec<Vertex>, Vec<u32>)> for Mesh {
    fn from((vertices, indices): (Vec<Vertex>, Vec<u32>)) -> Self {
        Self::new(vertices, indices)
    }
}

/// Identity key of a shared allocation.
pub(crate) fn identity<T>(rc: &Rc<T>) -> usize {
    Rc::as_ptr(rc) as *const () as usize
}
