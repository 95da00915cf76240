//! Geometry registry: deduplicates meshes into the shared vertex and index
//! arenas.

use std::collections::HashMap;

use crate::asset::mesh::identity;
use crate::asset::{AssetCache, Handle, MeshRef};
use crate::error::RenderError;
use crate::renderer::arena::{ArenaBuffer, GpuDevice, Reuse};
use crate::renderer::Vertex;

pub type GeometryHandle = Handle<GeometryRecord>;

/// Where a mesh lives inside the shared arenas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeometryRecord {
    pub first_index: u32,
    pub base_vertex: u32,
    pub index_count: u32,
    pub vertex_count: u32,
}

struct Entry {
    record: GeometryRecord,
    mesh: MeshRef,
    refs: u32,
}

pub struct GeometryRegistry<D: GpuDevice> {
    vertices: ArenaBuffer<Vertex, D>,
    indices: ArenaBuffer<u32, D>,
    entries: AssetCache<Entry, GeometryRecord>,
    lookup: HashMap<usize, GeometryHandle>,
}

impl<D: GpuDevice> GeometryRegistry<D> {
    pub fn new(
        device: &D,
        vertex_capacity: usize,
        index_capacity: usize,
    ) -> Result<Self, RenderError> {
        let vertices = ArenaBuffer::allocate(
            device,
            "VertexArena",
            wgpu::BufferUsages::VERTEX,
            vertex_capacity,
            Reuse::Blocks,
            false,
        )?;
        let indices = ArenaBuffer::allocate(
            device,
            "IndexArena",
            wgpu::BufferUsages::INDEX,
            index_capacity,
            Reuse::Blocks,
            false,
        )?;

        Ok(Self {
            vertices,
            indices,
            entries: AssetCache::new(),
            lookup: HashMap::new(),
        })
    }

    /// Returns the existing handle for this mesh allocation, or uploads it.
    pub fn get_or_create_handle(
        &mut self,
        device: &D,
        mesh: &MeshRef,
    ) -> Result<GeometryHandle, RenderError> {
        if let Some(&handle) = self.lookup.get(&identity(mesh)) {
            return Ok(handle);
        }

        let base_vertex = self.vertices.add(device, mesh.vertices())?;
        let first_index = match self.indices.add(device, mesh.indices()) {
            Ok(first) => first,
            Err(err) => {
                self.vertices
                    .remove(base_vertex, mesh.vertices().len() as u32);
                return Err(err.into());
            }
        };

        let record = GeometryRecord {
            first_index,
            base_vertex,
            index_count: mesh.index_count(),
            vertex_count: mesh.vertices().len() as u32,
        };
        let handle = self.entries.insert(Entry {
            record,
            mesh: mesh.clone(),
            refs: 0,
        });
        self.lookup.insert(identity(mesh), handle);

        log::debug!(
            "Registered geometry {:?}: {} vertices at {}, {} indices at {}",
            handle,
            record.vertex_count,
            base_vertex,
            record.index_count,
            first_index
        );
        Ok(handle)
    }

    pub fn get(&self, handle: GeometryHandle) -> Option<&GeometryRecord> {
        self.entries.get(handle).map(|entry| &entry.record)
    }

    pub fn contains(&self, mesh: &MeshRef) -> bool {
        self.lookup.contains_key(&identity(mesh))
    }

    pub(crate) fn retain(&mut self, handle: GeometryHandle) {
        if let Some(entry) = self.entries.get_mut(handle) {
            entry.refs += 1;
        }
    }

    pub(crate) fn release(&mut self, handle: GeometryHandle) {
        if let Some(entry) = self.entries.get_mut(handle) {
            debug_assert!(entry.refs > 0, "geometry released more often than retained");
            entry.refs = entry.refs.saturating_sub(1);
        }
    }

    pub fn ref_count(&self, handle: GeometryHandle) -> Option<u32> {
        self.entries.get(handle).map(|entry| entry.refs)
    }

    /// Frees the mesh's arena ranges and its handle. Fails while any live
    /// object still uses it.
    pub fn unregister(&mut self, handle: GeometryHandle) -> Result<MeshRef, RenderError> {
        let entry = self
            .entries
            .get(handle)
            .ok_or(RenderError::UnknownGeometry(handle.index()))?;
        if entry.refs > 0 {
            return Err(RenderError::InUse {
                kind: "geometry",
                index: handle.index(),
                refs: entry.refs,
            });
        }

        let entry = self
            .entries
            .remove(handle)
            .ok_or(RenderError::UnknownGeometry(handle.index()))?;
        self.lookup.remove(&identity(&entry.mesh));
        self.vertices
            .remove(entry.record.base_vertex, entry.record.vertex_count);
        self.indices
            .remove(entry.record.first_index, entry.record.index_count);
        Ok(entry.mesh)
    }

    pub fn vertex_arena(&self) -> &ArenaBuffer<Vertex, D> {
        &self.vertices
    }

    pub fn index_arena(&self) -> &ArenaBuffer<u32, D> {
        &self.indices
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
