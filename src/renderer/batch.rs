// renderer/batch.rs - incremental three-level draw partition
//
// ObjectBatch[] is kept sorted by (shader, mesh, object). Draw batches are
// the contiguous (shader, mesh) runs over it and shader batches the
// contiguous shader runs over the draw batches, so each shader batch maps
// to one contiguous slice of the indirect buffer.
use super::geometry::GeometryHandle;
use super::internal::batches::{merge_sorted, remove_sorted};
use super::material::ShaderHandle;

/// One batched object. Field order defines the canonical sort order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectBatch {
    pub shader: ShaderHandle,
    pub mesh: GeometryHandle,
    pub object: u32,
}

impl ObjectBatch {
    pub fn new(object: u32, mesh: GeometryHandle, shader: ShaderHandle) -> Self {
        Self {
            shader,
            mesh,
            object,
        }
    }
}

/// A run of object batches sharing (mesh, shader): one indirect command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawBatch {
    pub mesh: GeometryHandle,
    pub shader: ShaderHandle,
    /// Index of the first object batch; becomes the command's first instance.
    pub first_instance: u32,
    pub instance_count: u32,
}

/// A run of draw batches sharing a shader: one multi-draw call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShaderBatch {
    pub shader: ShaderHandle,
    pub first: u32,
    pub count: u32,
}

#[derive(Debug, Default)]
pub struct BatchBuilder {
    object_batches: Vec<ObjectBatch>,
    draw_batches: Vec<DrawBatch>,
    shader_batches: Vec<ShaderBatch>,
    modified: bool,
}

impl BatchBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies this frame's removals and insertions and rebuilds the draw
    /// and shader batches when the partition changed. Returns whether it did.
    ///
    /// `removals` must carry the keys the objects were batched under;
    /// `insertions` their current keys.
    pub fn rebuild(
        &mut self,
        mut removals: Vec<ObjectBatch>,
        mut insertions: Vec<ObjectBatch>,
    ) -> bool {
        self.modified = !(removals.is_empty() && insertions.is_empty());
        if !self.modified {
            return false;
        }

        removals.sort_unstable();
        let removed = remove_sorted(&mut self.object_batches, &removals);
        if removed != removals.len() {
            log::error!(
                "Batch partition out of sync: {} of {} removals not found",
                removals.len() - removed,
                removals.len()
            );
            debug_assert_eq!(removed, removals.len(), "removed key missing from partition");
        }

        insertions.sort_unstable();
        merge_sorted(&mut self.object_batches, &insertions);

        self.rebuild_draw_batches();
        self.rebuild_shader_batches();

        log::debug!(
            "Rebuilt batches (-{} +{}): {} objects, {} draws, {} shaders",
            removed,
            insertions.len(),
            self.object_batches.len(),
            self.draw_batches.len(),
            self.shader_batches.len()
        );
        true
    }

    fn rebuild_draw_batches(&mut self) {
        self.draw_batches.clear();
        for (index, batch) in self.object_batches.iter().enumerate() {
            match self.draw_batches.last_mut() {
                Some(draw) if draw.mesh == batch.mesh && draw.shader == batch.shader => {
                    draw.instance_count += 1;
                }
                _ => self.draw_batches.push(DrawBatch {
                    mesh: batch.mesh,
                    shader: batch.shader,
                    first_instance: index as u32,
                    instance_count: 1,
                }),
            }
        }
    }

    fn rebuild_shader_batches(&mut self) {
        self.shader_batches.clear();
        for (index, draw) in self.draw_batches.iter().enumerate() {
            match self.shader_batches.last_mut() {
                Some(shader) if shader.shader == draw.shader => shader.count += 1,
                _ => self.shader_batches.push(ShaderBatch {
                    shader: draw.shader,
                    first: index as u32,
                    count: 1,
                }),
            }
        }
    }

    /// Whether the last [`rebuild`](Self::rebuild) changed the partition.
    pub fn modified(&self) -> bool {
        self.modified
    }

    pub fn object_batches(&self) -> &[ObjectBatch] {
        &self.object_batches
    }

    pub fn draw_batches(&self) -> &[DrawBatch] {
        &self.draw_batches
    }

    pub fn shader_batches(&self) -> &[ShaderBatch] {
        &self.shader_batches
    }
}
