//! Live render objects and the queues feeding the per-frame update pass.
//!
//! Mutators never touch batches or GPU buffers directly: they set dirty
//! flags and enqueue the object once. The render server drains the queues
//! in [`RenderServer::prepare`](crate::renderer::RenderServer::prepare).

use std::rc::Rc;

use bitflags::bitflags;
use glam::{Mat4, Quat, Vec3};

use crate::asset::MeshRef;
use crate::error::RenderError;
use crate::renderer::batch::ObjectBatch;
use crate::renderer::geometry::GeometryHandle;
use crate::renderer::material::{MaterialRef, ShaderHandle};
use crate::renderer::material_registry::MaterialHandle;
use crate::scene::Transform;

/// Index plus generation; a handle goes stale once its object is removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectHandle {
    index: u32,
    generation: u32,
}

impl ObjectHandle {
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct DirtyFlags: u8 {
        const TRANSFORM = 1 << 0;
        const MESH = 1 << 1;
        const MATERIAL = 1 << 2;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    Unbatched,
    /// Carries the key the object was inserted under at the last rebuild.
    Batched(ObjectBatch),
}

#[derive(Debug)]
pub struct ObjectEntry {
    pub(crate) mesh: MeshRef,
    pub(crate) material: MaterialRef,
    pub(crate) geometry: GeometryHandle,
    pub(crate) material_handle: MaterialHandle,
    pub(crate) material_slot: u32,
    pub(crate) shader: ShaderHandle,
    pub(crate) transform: Transform,
    pub(crate) model: Mat4,
    pub(crate) gpu_slot: u32,
    pub(crate) state: BatchState,
    pub(crate) dirty: DirtyFlags,
    queued: bool,
}

impl ObjectEntry {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        mesh: MeshRef,
        material: MaterialRef,
        geometry: GeometryHandle,
        material_handle: MaterialHandle,
        material_slot: u32,
        shader: ShaderHandle,
        transform: Transform,
        gpu_slot: u32,
    ) -> Self {
        Self {
            mesh,
            material,
            geometry,
            material_handle,
            material_slot,
            shader,
            model: transform.matrix(),
            transform,
            gpu_slot,
            state: BatchState::Unbatched,
            dirty: DirtyFlags::empty(),
            queued: false,
        }
    }

    pub fn mesh(&self) -> &MeshRef {
        &self.mesh
    }

    pub fn material(&self) -> &MaterialRef {
        &self.material
    }

    pub fn geometry(&self) -> GeometryHandle {
        self.geometry
    }

    pub fn material_handle(&self) -> MaterialHandle {
        self.material_handle
    }

    pub fn shader(&self) -> ShaderHandle {
        self.shader
    }

    pub fn transform(&self) -> &Transform {
        &self.transform
    }

    /// Model matrix as of the last update pass.
    pub fn model(&self) -> Mat4 {
        self.model
    }

    pub fn gpu_slot(&self) -> u32 {
        self.gpu_slot
    }

    pub fn state(&self) -> BatchState {
        self.state
    }

    pub fn is_batched(&self) -> bool {
        matches!(self.state, BatchState::Batched(_))
    }

    pub fn dirty(&self) -> DirtyFlags {
        self.dirty
    }
}

struct Slot {
    generation: u32,
    entry: Option<ObjectEntry>,
}

#[derive(Default)]
pub struct ObjectTable {
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
    pending: Vec<ObjectHandle>,
    unbatched: Vec<ObjectHandle>,
    to_unbatch: Vec<ObjectBatch>,
    uploads: Vec<ObjectHandle>,
}

impl ObjectTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a new object; it starts out unbatched.
    pub(crate) fn insert(&mut self, entry: ObjectEntry) -> ObjectHandle {
        let handle = match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.entry = Some(entry);
                ObjectHandle {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                let index = self.slots.len() as u32;
                self.slots.push(Slot {
                    generation: 0,
                    entry: Some(entry),
                });
                ObjectHandle {
                    index,
                    generation: 0,
                }
            }
        };

        self.live += 1;
        self.unbatched.push(handle);
        handle
    }

    /// Takes the object out of the table and out of the partition
    /// bookkeeping: a batched object queues its last batch key for removal,
    /// an unbatched one leaves the insertion queue.
    pub(crate) fn remove(&mut self, handle: ObjectHandle) -> Option<ObjectEntry> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        let entry = slot.entry.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.index);
        self.live -= 1;

        match entry.state {
            BatchState::Batched(key) => self.to_unbatch.push(key),
            BatchState::Unbatched => self.unbatched.retain(|&h| h != handle),
        }
        Some(entry)
    }

    pub fn get(&self, handle: ObjectHandle) -> Option<&ObjectEntry> {
        let slot = self.slots.get(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.entry.as_ref()
    }

    pub(crate) fn get_mut(&mut self, handle: ObjectHandle) -> Option<&mut ObjectEntry> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.entry.as_mut()
    }

    /// Looks up the live object stored at `index`, whatever its generation.
    pub(crate) fn get_by_index(&self, index: u32) -> Option<&ObjectEntry> {
        self.slots.get(index as usize)?.entry.as_ref()
    }

    pub fn contains(&self, handle: ObjectHandle) -> bool {
        self.get(handle).is_some()
    }

    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = (ObjectHandle, &ObjectEntry)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.entry.as_ref().map(|entry| {
                (
                    ObjectHandle {
                        index: index as u32,
                        generation: slot.generation,
                    },
                    entry,
                )
            })
        })
    }

    pub fn set_mesh(&mut self, handle: ObjectHandle, mesh: &MeshRef) -> Result<(), RenderError> {
        let entry = self
            .get_mut(handle)
            .ok_or(RenderError::StaleObject(handle))?;
        if Rc::ptr_eq(&entry.mesh, mesh) {
            log::warn!("set_mesh on {:?} with its current mesh, ignoring", handle);
            return Ok(());
        }
        entry.mesh = mesh.clone();
        self.mark(handle, DirtyFlags::MESH);
        Ok(())
    }

    pub fn set_material(
        &mut self,
        handle: ObjectHandle,
        material: &MaterialRef,
    ) -> Result<(), RenderError> {
        let entry = self
            .get_mut(handle)
            .ok_or(RenderError::StaleObject(handle))?;
        if Rc::ptr_eq(&entry.material, material) {
            log::warn!("set_material on {:?} with its current material, ignoring", handle);
            return Ok(());
        }
        entry.material = material.clone();
        self.mark(handle, DirtyFlags::MATERIAL);
        Ok(())
    }

    pub fn transform(&self, handle: ObjectHandle) -> Result<&Transform, RenderError> {
        self.get(handle)
            .map(|entry| &entry.transform)
            .ok_or(RenderError::StaleObject(handle))
    }

    pub fn set_transform(
        &mut self,
        handle: ObjectHandle,
        transform: Transform,
    ) -> Result<(), RenderError> {
        self.modify_transform(handle, |t| *t = transform)
    }

    pub fn translate(&mut self, handle: ObjectHandle, delta: Vec3) -> Result<(), RenderError> {
        self.modify_transform(handle, |t| t.translate(delta))
    }

    pub fn rotate(&mut self, handle: ObjectHandle, rotation: Quat) -> Result<(), RenderError> {
        self.modify_transform(handle, |t| t.rotate(rotation))
    }

    pub fn scale(&mut self, handle: ObjectHandle, factor: Vec3) -> Result<(), RenderError> {
        self.modify_transform(handle, |t| t.scale_by(factor))
    }

    pub fn set_translation(
        &mut self,
        handle: ObjectHandle,
        translation: Vec3,
    ) -> Result<(), RenderError> {
        self.modify_transform(handle, |t| t.translation = translation)
    }

    pub fn set_rotation(&mut self, handle: ObjectHandle, rotation: Quat) -> Result<(), RenderError> {
        self.modify_transform(handle, |t| t.rotation = rotation)
    }

    pub fn set_scale(&mut self, handle: ObjectHandle, scale: Vec3) -> Result<(), RenderError> {
        self.modify_transform(handle, |t| t.scale = scale)
    }

    fn modify_transform(
        &mut self,
        handle: ObjectHandle,
        f: impl FnOnce(&mut Transform),
    ) -> Result<(), RenderError> {
        let entry = self
            .get_mut(handle)
            .ok_or(RenderError::StaleObject(handle))?;
        f(&mut entry.transform);
        self.mark(handle, DirtyFlags::TRANSFORM);
        Ok(())
    }

    fn mark(&mut self, handle: ObjectHandle, flags: DirtyFlags) {
        let Some(entry) = self.get_mut(handle) else {
            return;
        };
        entry.dirty |= flags;
        if !entry.queued {
            entry.queued = true;
            self.pending.push(handle);
        }
    }

    /// Objects with dirty flags waiting for the update pass.
    pub fn pending_updates(&self) -> &[ObjectHandle] {
        &self.pending
    }

    /// Objects waiting to be inserted into the partition.
    pub fn pending_unbatched(&self) -> &[ObjectHandle] {
        &self.unbatched
    }

    /// Old batch keys waiting to be removed from the partition.
    pub fn pending_removals(&self) -> &[ObjectBatch] {
        &self.to_unbatch
    }

    pub(crate) fn take_pending(&mut self) -> Vec<ObjectHandle> {
        let pending = std::mem::take(&mut self.pending);
        for &handle in &pending {
            if let Some(entry) = self.get_mut(handle) {
                entry.queued = false;
            }
        }
        pending
    }

    /// Puts handles back on the update queue after a failed update pass.
    pub(crate) fn requeue(&mut self, handles: &[ObjectHandle]) {
        for &handle in handles {
            if let Some(entry) = self.get_mut(handle) {
                if !entry.queued && !entry.dirty.is_empty() {
                    entry.queued = true;
                    self.pending.push(handle);
                }
            }
        }
    }

    /// Moves a batched object back to the insertion queue, remembering the
    /// key it has to be removed under.
    pub(crate) fn queue_rebatch(&mut self, handle: ObjectHandle, old_key: ObjectBatch) {
        self.to_unbatch.push(old_key);
        self.unbatched.push(handle);
    }

    pub(crate) fn queue_upload(&mut self, handle: ObjectHandle) {
        self.uploads.push(handle);
    }

    pub(crate) fn take_unbatched(&mut self) -> Vec<ObjectHandle> {
        std::mem::take(&mut self.unbatched)
    }

    pub(crate) fn take_to_unbatch(&mut self) -> Vec<ObjectBatch> {
        std::mem::take(&mut self.to_unbatch)
    }

    pub(crate) fn take_uploads(&mut self) -> Vec<ObjectHandle> {
        std::mem::take(&mut self.uploads)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::{Handle, Mesh};
    use crate::renderer::material::Material;

    fn entry(mesh: &MeshRef, material: &MaterialRef, slot: u32) -> ObjectEntry {
        ObjectEntry::new(
            mesh.clone(),
            material.clone(),
            Handle::new(0),
            Handle::new(0),
            0,
            ShaderHandle(0),
            Transform::IDENTITY,
            slot,
        )
    }

    fn fixtures() -> (MeshRef, MaterialRef) {
        (
            Mesh::shared(Vec::new(), Vec::new()),
            Material::unlit(ShaderHandle(0), Vec3::ONE).into_shared(),
        )
    }

    #[test]
    fn new_objects_start_unbatched() {
        let (mesh, material) = fixtures();
        let mut table = ObjectTable::new();
        let handle = table.insert(entry(&mesh, &material, 0));

        assert_eq!(table.pending_unbatched(), &[handle]);
        assert!(table.pending_removals().is_empty());
        assert!(!table.get(handle).unwrap().is_batched());
    }

    #[test]
    fn removed_handles_go_stale() {
        let (mesh, material) = fixtures();
        let mut table = ObjectTable::new();
        let a = table.insert(entry(&mesh, &material, 0));
        table.remove(a).unwrap();
        let b = table.insert(entry(&mesh, &material, 1));

        assert_eq!(a.index(), b.index());
        assert!(table.get(a).is_none());
        assert!(matches!(
            table.translate(a, Vec3::X),
            Err(RenderError::StaleObject(_))
        ));
        assert_eq!(table.pending_unbatched(), &[b]);
    }

    #[test]
    fn mutators_queue_each_object_once() {
        let (mesh, material) = fixtures();
        let mut table = ObjectTable::new();
        let handle = table.insert(entry(&mesh, &material, 0));

        table.translate(handle, Vec3::X).unwrap();
        table.rotate(handle, Quat::from_rotation_y(1.0)).unwrap();
        table.set_mesh(handle, &Mesh::shared(Vec::new(), Vec::new())).unwrap();

        assert_eq!(table.pending_updates(), &[handle]);
        assert_eq!(
            table.get(handle).unwrap().dirty(),
            DirtyFlags::TRANSFORM | DirtyFlags::MESH
        );
    }

    #[test]
    fn same_mesh_is_a_no_op() {
        let (mesh, material) = fixtures();
        let mut table = ObjectTable::new();
        let handle = table.insert(entry(&mesh, &material, 0));

        table.set_mesh(handle, &mesh).unwrap();
        table.set_material(handle, &material).unwrap();
        assert!(table.pending_updates().is_empty());
    }

    #[test]
    fn removing_batched_object_queues_its_old_key() {
        let (mesh, material) = fixtures();
        let mut table = ObjectTable::new();
        let handle = table.insert(entry(&mesh, &material, 0));
        table.take_unbatched();
        let key = ObjectBatch::new(handle.index(), Handle::new(0), ShaderHandle(0));
        table.get_mut(handle).unwrap().state = BatchState::Batched(key);

        table.remove(handle).unwrap();
        assert_eq!(table.pending_removals(), &[key]);
        assert!(table.pending_unbatched().is_empty());
        assert!(table.is_empty());
    }
}
