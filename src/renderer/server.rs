//! Frame preparation: object updates, partition rebuild and buffer sync.
//!
//! [`RenderServer::prepare`] runs the three stages in a fixed order. Nothing
//! touches the GPU buffers outside of it apart from object creation, which
//! writes the new object's data slot directly.

use crate::asset::MeshRef;
use crate::error::RenderError;
use crate::renderer::arena::{ArenaBuffer, GpuDevice, Reuse};
use crate::renderer::batch::{BatchBuilder, ObjectBatch};
use crate::renderer::geometry::{GeometryHandle, GeometryRegistry};
use crate::renderer::material::{MaterialRef, ShaderHandle};
use crate::renderer::material_registry::{MaterialHandle, MaterialRegistry};
use crate::renderer::object_table::{
    BatchState, DirtyFlags, ObjectEntry, ObjectHandle, ObjectTable,
};
use crate::renderer::objects::{DrawIndexedIndirect, ObjectData};
use crate::scene::Transform;
use crate::settings::ServerSettings;

/// Counters describing the last [`RenderServer::prepare`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub objects: usize,
    pub object_batches: usize,
    pub draw_batches: usize,
    pub shader_batches: usize,
    pub objects_uploaded: usize,
    pub materials_uploaded: usize,
    pub partition_rebuilt: bool,
}

pub struct RenderServer<D: GpuDevice> {
    device: D,
    settings: ServerSettings,
    geometry: GeometryRegistry<D>,
    materials: MaterialRegistry<D>,
    objects: ObjectTable,
    batches: BatchBuilder,
    object_data: ArenaBuffer<ObjectData, D>,
    object_handles: ArenaBuffer<u32, D>,
    indirect: ArenaBuffer<DrawIndexedIndirect, D>,
    /// Set when the partition changed and the indirect and handle buffers
    /// have not been rewritten yet.
    partition_stale: bool,
}

impl<D: GpuDevice> RenderServer<D> {
    pub fn new(device: D, settings: ServerSettings) -> Result<Self, RenderError> {
        let settings = settings.validate();

        let geometry =
            GeometryRegistry::new(&device, settings.vertex_capacity, settings.index_capacity)?;
        let materials = MaterialRegistry::new(&device, settings.material_capacity)?;
        let object_data = ArenaBuffer::allocate(
            &device,
            "ObjectsBuffer",
            wgpu::BufferUsages::STORAGE,
            settings.object_capacity,
            Reuse::Slots,
            true,
        )?;
        let object_handles = ArenaBuffer::allocate(
            &device,
            "ObjectHandlesBuffer",
            wgpu::BufferUsages::STORAGE,
            settings.object_capacity,
            Reuse::Slots,
            true,
        )?;
        let indirect = ArenaBuffer::allocate(
            &device,
            "IndirectBuffer",
            wgpu::BufferUsages::INDIRECT | wgpu::BufferUsages::STORAGE,
            settings.draw_capacity,
            Reuse::Slots,
            true,
        )?;

        Ok(Self {
            device,
            settings,
            geometry,
            materials,
            objects: ObjectTable::new(),
            batches: BatchBuilder::new(),
            object_data,
            object_handles,
            indirect,
            partition_stale: false,
        })
    }

    pub fn create_object(
        &mut self,
        mesh: &MeshRef,
        material: &MaterialRef,
    ) -> Result<ObjectHandle, RenderError> {
        self.create_object_with_transform(mesh, material, Transform::IDENTITY)
    }

    /// Registers mesh and material if needed, writes the object's data slot
    /// and queues it for insertion into the partition.
    pub fn create_object_with_transform(
        &mut self,
        mesh: &MeshRef,
        material: &MaterialRef,
        transform: Transform,
    ) -> Result<ObjectHandle, RenderError> {
        let geometry = self.geometry.get_or_create_handle(&self.device, mesh)?;
        let material_handle = self.materials.get_or_create_handle(&self.device, material)?;
        let (material_slot, shader) = self.material_binding(material_handle)?;

        let gpu_slot = self.object_data.add(
            &self.device,
            &[ObjectData::new(transform.matrix(), material_slot)],
        )?;
        self.geometry.retain(geometry);
        self.materials.retain(material_handle);

        let handle = self.objects.insert(ObjectEntry::new(
            mesh.clone(),
            material.clone(),
            geometry,
            material_handle,
            material_slot,
            shader,
            transform,
            gpu_slot,
        ));
        log::trace!("Created object {:?} in slot {}", handle, gpu_slot);
        Ok(handle)
    }

    /// Drops the object, frees its data slot and releases its geometry and
    /// material. Registry records stay until explicitly unregistered.
    pub fn remove_object(&mut self, handle: ObjectHandle) -> Result<(), RenderError> {
        let entry = self
            .objects
            .remove(handle)
            .ok_or(RenderError::StaleObject(handle))?;
        self.object_data.remove(entry.gpu_slot, 1);
        self.geometry.release(entry.geometry);
        self.materials.release(entry.material_handle);
        Ok(())
    }

    pub fn set_mesh(&mut self, handle: ObjectHandle, mesh: &MeshRef) -> Result<(), RenderError> {
        self.objects.set_mesh(handle, mesh)
    }

    pub fn set_material(
        &mut self,
        handle: ObjectHandle,
        material: &MaterialRef,
    ) -> Result<(), RenderError> {
        self.objects.set_material(handle, material)
    }

    /// Frees a mesh no live object references any more.
    pub fn unregister_geometry(&mut self, handle: GeometryHandle) -> Result<MeshRef, RenderError> {
        self.geometry.unregister(handle)
    }

    /// Frees a material no live object references any more.
    pub fn unregister_material(
        &mut self,
        handle: MaterialHandle,
    ) -> Result<MaterialRef, RenderError> {
        self.materials.unregister(handle)
    }

    /// Runs one frame's worth of synchronization: object updates, material
    /// dirty scan, partition rebuild and buffer refresh, in that order.
    pub fn prepare(&mut self) -> Result<FrameStats, RenderError> {
        self.update_objects()?;
        self.materials.update();
        let partition_rebuilt = self.rebuild_batches();
        self.partition_stale |= partition_rebuilt;
        let (objects_uploaded, materials_uploaded) = self.refresh_buffers()?;

        Ok(FrameStats {
            objects: self.objects.len(),
            object_batches: self.batches.object_batches().len(),
            draw_batches: self.batches.draw_batches().len(),
            shader_batches: self.batches.shader_batches().len(),
            objects_uploaded,
            materials_uploaded,
            partition_rebuilt,
        })
    }

    fn update_objects(&mut self) -> Result<(), RenderError> {
        let pending = self.objects.take_pending();
        for (i, &handle) in pending.iter().enumerate() {
            if let Err(err) = self.update_object(handle) {
                self.objects.requeue(&pending[i..]);
                return Err(err);
            }
        }
        Ok(())
    }

    fn update_object(&mut self, handle: ObjectHandle) -> Result<(), RenderError> {
        let Some(entry) = self.objects.get(handle) else {
            return Ok(());
        };
        let dirty = entry.dirty;
        let mesh = entry.mesh.clone();
        let material = entry.material.clone();

        // Resolve everything fallible before touching the entry.
        let geometry = if dirty.contains(DirtyFlags::MESH) {
            Some(self.geometry.get_or_create_handle(&self.device, &mesh)?)
        } else {
            None
        };
        let material_binding = if dirty.contains(DirtyFlags::MATERIAL) {
            let material_handle = self.materials.get_or_create_handle(&self.device, &material)?;
            let (slot, shader) = self.material_binding(material_handle)?;
            Some((material_handle, slot, shader))
        } else {
            None
        };

        let Some(entry) = self.objects.get_mut(handle) else {
            return Ok(());
        };

        if dirty.contains(DirtyFlags::TRANSFORM) {
            entry.model = entry.transform.matrix();
        }
        if let Some(geometry) = geometry {
            if geometry != entry.geometry {
                self.geometry.retain(geometry);
                self.geometry.release(entry.geometry);
                entry.geometry = geometry;
            }
        }
        if let Some((material_handle, slot, shader)) = material_binding {
            if material_handle != entry.material_handle {
                self.materials.retain(material_handle);
                self.materials.release(entry.material_handle);
                entry.material_handle = material_handle;
            }
            entry.material_slot = slot;
            entry.shader = shader;
        }
        entry.dirty = DirtyFlags::empty();

        let state = entry.state;
        let rebatch = match state {
            BatchState::Batched(key) if key.mesh != entry.geometry || key.shader != entry.shader => {
                entry.state = BatchState::Unbatched;
                Some(key)
            }
            _ => None,
        };

        if let Some(old_key) = rebatch {
            self.objects.queue_rebatch(handle, old_key);
        }
        self.objects.queue_upload(handle);
        Ok(())
    }

    fn rebuild_batches(&mut self) -> bool {
        let removals = self.objects.take_to_unbatch();
        let unbatched = self.objects.take_unbatched();

        let mut insertions = Vec::with_capacity(unbatched.len());
        for handle in unbatched {
            let Some(entry) = self.objects.get_mut(handle) else {
                continue;
            };
            let key = ObjectBatch::new(handle.index(), entry.geometry, entry.shader);
            entry.state = BatchState::Batched(key);
            insertions.push(key);
        }

        self.batches.rebuild(removals, insertions)
    }

    /// Returns how many object and material slots were uploaded.
    fn refresh_buffers(&mut self) -> Result<(usize, usize), RenderError> {
        if self.partition_stale {
            self.write_indirect_commands()?;
            self.write_object_handles()?;
            self.partition_stale = false;
        }
        let objects_uploaded = self.write_dirty_objects();
        let materials_uploaded = self.materials.flush(&self.device);
        Ok((objects_uploaded, materials_uploaded))
    }

    fn write_indirect_commands(&mut self) -> Result<(), RenderError> {
        let draws = self.batches.draw_batches();
        self.indirect.resize(&self.device, draws.len())?;
        if draws.is_empty() {
            return Ok(());
        }

        let commands = self.indirect.map()?;
        for (command, draw) in commands.iter_mut().zip(draws) {
            *command = match self.geometry.get(draw.mesh) {
                Some(record) => DrawIndexedIndirect {
                    index_count: record.index_count,
                    instance_count: draw.instance_count,
                    first_index: record.first_index,
                    base_vertex: record.base_vertex as i32,
                    first_instance: draw.first_instance,
                },
                None => {
                    log::error!("Draw batch references unknown geometry {:?}", draw.mesh);
                    DrawIndexedIndirect::default()
                }
            };
        }
        self.indirect.unmap(&self.device);
        Ok(())
    }

    fn write_object_handles(&mut self) -> Result<(), RenderError> {
        let batches = self.batches.object_batches();
        self.object_handles.resize(&self.device, batches.len())?;
        if self.batches.draw_batches().is_empty() {
            return Ok(());
        }

        let slots = self.object_handles.map()?;
        for (slot, batch) in slots.iter_mut().zip(batches) {
            *slot = match self.objects.get_by_index(batch.object) {
                Some(entry) => entry.gpu_slot,
                None => {
                    log::error!("Object batch references dead object {}", batch.object);
                    0
                }
            };
        }
        self.object_handles.unmap(&self.device);
        Ok(())
    }

    /// Patches the data slots of updated objects, one write per run of
    /// adjacent slots.
    fn write_dirty_objects(&mut self) -> usize {
        let mut dirty: Vec<(u32, ObjectData)> = self
            .objects
            .take_uploads()
            .into_iter()
            .filter_map(|handle| self.objects.get(handle))
            .map(|entry| {
                (
                    entry.gpu_slot,
                    ObjectData::new(entry.model, entry.material_slot),
                )
            })
            .collect();
        dirty.sort_by_key(|&(slot, _)| slot);
        dirty.dedup_by_key(|&mut (slot, _)| slot);

        let mut run: Vec<ObjectData> = Vec::new();
        let mut run_start = 0;
        for (i, &(slot, data)) in dirty.iter().enumerate() {
            if i > 0 && slot != dirty[i - 1].0 + 1 {
                self.object_data.write(&self.device, run_start, &run);
                run.clear();
            }
            if run.is_empty() {
                run_start = slot;
            }
            run.push(data);
        }
        self.object_data.write(&self.device, run_start, &run);

        dirty.len()
    }

    fn material_binding(&self, handle: MaterialHandle) -> Result<(u32, ShaderHandle), RenderError> {
        match (self.materials.slot(handle), self.materials.shader(handle)) {
            (Some(slot), Some(shader)) => Ok((slot, shader)),
            _ => Err(RenderError::UnknownMaterial(handle.index())),
        }
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn settings(&self) -> &ServerSettings {
        &self.settings
    }

    pub fn geometry(&self) -> &GeometryRegistry<D> {
        &self.geometry
    }

    pub fn materials(&self) -> &MaterialRegistry<D> {
        &self.materials
    }

    pub fn objects(&self) -> &ObjectTable {
        &self.objects
    }

    /// Transform mutators live on the table.
    pub fn objects_mut(&mut self) -> &mut ObjectTable {
        &mut self.objects
    }

    pub fn object(&self, handle: ObjectHandle) -> Option<&ObjectEntry> {
        self.objects.get(handle)
    }

    pub fn batches(&self) -> &BatchBuilder {
        &self.batches
    }

    pub fn object_data(&self) -> &ArenaBuffer<ObjectData, D> {
        &self.object_data
    }

    pub fn object_handles(&self) -> &ArenaBuffer<u32, D> {
        &self.object_handles
    }

    pub fn indirect(&self) -> &ArenaBuffer<DrawIndexedIndirect, D> {
        &self.indirect
    }

    /// Generations of every arena bound through the storage bind group.
    pub fn storage_generations(&self) -> [u64; 3] {
        [
            self.object_data.generation(),
            self.object_handles.generation(),
            self.materials.arena().generation(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::arena::HostDevice;
    use crate::renderer::material::Material;
    use crate::renderer::primitives::{cube_mesh, plane_mesh};
    use glam::Vec3;
    use std::rc::Rc;

    fn server() -> RenderServer<HostDevice> {
        RenderServer::new(HostDevice::new(), ServerSettings::default()).unwrap()
    }

    #[test]
    fn first_prepare_batches_new_objects() {
        let mut server = server();
        let cube = Rc::new(cube_mesh());
        let material = Material::unlit(ShaderHandle(0), Vec3::ONE).into_shared();
        for _ in 0..3 {
            server.create_object(&cube, &material).unwrap();
        }

        let stats = server.prepare().unwrap();
        assert!(stats.partition_rebuilt);
        assert_eq!(stats.objects, 3);
        assert_eq!(stats.draw_batches, 1);

        let command = server.indirect().get(0).copied().unwrap();
        assert_eq!(command.index_count, 36);
        assert_eq!(command.instance_count, 3);
        assert_eq!(server.object_handles().shadow().unwrap(), &[0, 1, 2]);
    }

    #[test]
    fn idle_frame_writes_nothing() {
        let mut server = server();
        let cube = Rc::new(cube_mesh());
        let material = Material::unlit(ShaderHandle(0), Vec3::ONE).into_shared();
        server.create_object(&cube, &material).unwrap();
        server.prepare().unwrap();
        server.device().take_writes();

        let stats = server.prepare().unwrap();
        assert!(!stats.partition_rebuilt);
        assert!(server.device().take_writes().is_empty());
    }

    #[test]
    fn adjacent_dirty_slots_share_one_write() {
        let mut server = server();
        let cube = Rc::new(cube_mesh());
        let material = Material::unlit(ShaderHandle(0), Vec3::ONE).into_shared();
        let handles: Vec<_> = (0..4)
            .map(|_| server.create_object(&cube, &material).unwrap())
            .collect();
        server.prepare().unwrap();
        server.device().take_writes();

        for &handle in &[handles[2], handles[1], handles[3]] {
            server.objects_mut().translate(handle, Vec3::X).unwrap();
        }
        let stats = server.prepare().unwrap();

        assert_eq!(stats.objects_uploaded, 3);
        assert_eq!(server.device().writes_to("ObjectsBuffer"), vec![80..320]);
    }

    #[test]
    fn material_swap_within_shader_keeps_partition() {
        let mut server = server();
        let cube = Rc::new(cube_mesh());
        let red = Material::unlit(ShaderHandle(0), Vec3::X).into_shared();
        let blue = Material::unlit(ShaderHandle(0), Vec3::Z).into_shared();
        let handle = server.create_object(&cube, &red).unwrap();
        server.prepare().unwrap();

        server.set_material(handle, &blue).unwrap();
        let stats = server.prepare().unwrap();

        assert!(!stats.partition_rebuilt);
        assert_eq!(stats.objects_uploaded, 1);
        let slot = server.object(handle).unwrap().gpu_slot();
        let blue_slot = server.materials().slot(server.object(handle).unwrap().material_handle());
        assert_eq!(
            Some(server.object_data().get(slot).unwrap().material_slot),
            blue_slot
        );
    }

    #[test]
    fn material_with_other_shader_moves_object() {
        let mut server = server();
        let cube = Rc::new(cube_mesh());
        let a = Material::unlit(ShaderHandle(0), Vec3::X).into_shared();
        let b = Material::lambert(ShaderHandle(1), Vec3::X).into_shared();
        let first = server.create_object(&cube, &a).unwrap();
        server.create_object(&cube, &a).unwrap();
        server.prepare().unwrap();

        server.set_material(first, &b).unwrap();
        let stats = server.prepare().unwrap();
        assert!(stats.partition_rebuilt);
        assert_eq!(stats.shader_batches, 2);
        assert_eq!(stats.object_batches, 2);
    }

    #[test]
    fn removal_frees_slot_and_references() {
        let mut server = server();
        let cube = Rc::new(cube_mesh());
        let plane = Rc::new(plane_mesh(1.0));
        let material = Material::unlit(ShaderHandle(0), Vec3::ONE).into_shared();
        let a = server.create_object(&cube, &material).unwrap();
        server.create_object(&plane, &material).unwrap();
        server.prepare().unwrap();

        let geometry = server.object(a).unwrap().geometry();
        server.remove_object(a).unwrap();
        assert!(matches!(
            server.remove_object(a),
            Err(RenderError::StaleObject(_))
        ));
        assert_eq!(server.geometry().ref_count(geometry), Some(0));

        let stats = server.prepare().unwrap();
        assert_eq!(stats.object_batches, 1);
        assert_eq!(stats.draw_batches, 1);

        let c = server.create_object(&plane, &material).unwrap();
        assert_eq!(server.object(c).unwrap().gpu_slot(), 0);
        assert!(server.unregister_geometry(geometry).is_ok());
    }

    #[test]
    fn interrupted_refresh_is_redone_next_frame() {
        let mut server = server();
        let cube = Rc::new(cube_mesh());
        let material = Material::unlit(ShaderHandle(0), Vec3::ONE).into_shared();
        let handle = server.create_object(&cube, &material).unwrap();

        // Partition committed, buffer refresh never reached.
        server.update_objects().unwrap();
        server.partition_stale |= server.rebuild_batches();
        assert!(server.indirect().is_empty());

        let stats = server.prepare().unwrap();
        assert!(!stats.partition_rebuilt);
        assert_eq!(server.indirect().len(), 1);
        assert_eq!(server.indirect().get(0).unwrap().instance_count, 1);
        assert_eq!(
            server.object_handles().shadow().unwrap(),
            &[server.object(handle).unwrap().gpu_slot()]
        );

        server.device().take_writes();
        server.prepare().unwrap();
        assert!(server.device().take_writes().is_empty());
    }

    #[test]
    fn removing_everything_leaves_no_draws() {
        let mut server = server();
        let cube = Rc::new(cube_mesh());
        let material = Material::unlit(ShaderHandle(0), Vec3::ONE).into_shared();
        let handle = server.create_object(&cube, &material).unwrap();
        server.prepare().unwrap();

        server.remove_object(handle).unwrap();
        let stats = server.prepare().unwrap();
        assert!(stats.partition_rebuilt);
        assert_eq!(stats.draw_batches, 0);
        assert_eq!(stats.shader_batches, 0);
        assert!(server.indirect().is_empty());
    }
}
