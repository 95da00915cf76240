use std::collections::HashMap;

use crate::asset::mesh::identity;
use crate::asset::{AssetCache, Handle};
use crate::error::RenderError;
use crate::renderer::arena::{ArenaBuffer, GpuDevice, Reuse};
use crate::renderer::material::{Material, MaterialRef, ShaderHandle};
use crate::renderer::objects::MaterialData;

pub type MaterialHandle = Handle<Material>;

struct Entry {
    material: MaterialRef,
    slot: u32,
    shader: ShaderHandle,
    refs: u32,
}

/// Identity-keyed material table backed by one parameter-block slot per
/// registered material.
pub struct MaterialRegistry<D: GpuDevice> {
    arena: ArenaBuffer<MaterialData, D>,
    entries: AssetCache<Entry, Material>,
    lookup: HashMap<usize, MaterialHandle>,
    dirty: Vec<MaterialHandle>,
}

impl<D: GpuDevice> MaterialRegistry<D> {
    pub fn new(device: &D, capacity: usize) -> Result<Self, RenderError> {
        let arena = ArenaBuffer::allocate(
            device,
            "MaterialsBuffer",
            wgpu::BufferUsages::STORAGE,
            capacity,
            Reuse::Slots,
            true,
        )?;

        Ok(Self {
            arena,
            entries: AssetCache::new(),
            lookup: HashMap::new(),
            dirty: Vec::new(),
        })
    }

    pub fn get_or_create_handle(
        &mut self,
        device: &D,
        material: &MaterialRef,
    ) -> Result<MaterialHandle, RenderError> {
        if let Some(&handle) = self.lookup.get(&identity(material)) {
            return Ok(handle);
        }

        let (data, shader) = {
            let mut m = material.borrow_mut();
            m.take_dirty();
            (m.material_data(), m.shader())
        };
        let slot = self.arena.add(device, &[data])?;
        let handle = self.entries.insert(Entry {
            material: material.clone(),
            slot,
            shader,
            refs: 0,
        });
        self.lookup.insert(identity(material), handle);

        log::debug!("Registered material {:?} in slot {}", handle, slot);
        Ok(handle)
    }

    /// Scans every registered material and queues the dirty ones for
    /// upload. Returns how many were queued.
    pub fn update(&mut self) -> usize {
        let before = self.dirty.len();
        for (handle, entry) in self.entries.iter() {
            if entry.material.borrow_mut().take_dirty() {
                self.dirty.push(handle);
            }
        }
        self.dirty.len() - before
    }

    /// Re-reads and uploads the queued materials, one slot each.
    pub fn flush(&mut self, device: &D) -> usize {
        let mut uploaded = 0;
        for handle in self.dirty.drain(..) {
            let Some(entry) = self.entries.get(handle) else {
                continue;
            };
            let data = entry.material.borrow().material_data();
            self.arena.write(device, entry.slot, &[data]);
            uploaded += 1;
        }
        uploaded
    }

    pub fn slot(&self, handle: MaterialHandle) -> Option<u32> {
        self.entries.get(handle).map(|entry| entry.slot)
    }

    pub fn shader(&self, handle: MaterialHandle) -> Option<ShaderHandle> {
        self.entries.get(handle).map(|entry| entry.shader)
    }

    pub fn pending(&self) -> &[MaterialHandle] {
        &self.dirty
    }

    pub(crate) fn retain(&mut self, handle: MaterialHandle) {
        if let Some(entry) = self.entries.get_mut(handle) {
            entry.refs += 1;
        }
    }

    pub(crate) fn release(&mut self, handle: MaterialHandle) {
        if let Some(entry) = self.entries.get_mut(handle) {
            debug_assert!(entry.refs > 0, "material released more often than retained");
            entry.refs = entry.refs.saturating_sub(1);
        }
    }

    pub fn ref_count(&self, handle: MaterialHandle) -> Option<u32> {
        self.entries.get(handle).map(|entry| entry.refs)
    }

    /// Drops the registry's strong reference and frees the slot. Fails while
    /// any live object still uses the material.
    pub fn unregister(&mut self, handle: MaterialHandle) -> Result<MaterialRef, RenderError> {
        let entry = self
            .entries
            .get(handle)
            .ok_or(RenderError::UnknownMaterial(handle.index()))?;
        if entry.refs > 0 {
            return Err(RenderError::InUse {
                kind: "material",
                index: handle.index(),
                refs: entry.refs,
            });
        }

        let entry = self
            .entries
            .remove(handle)
            .ok_or(RenderError::UnknownMaterial(handle.index()))?;
        self.lookup.remove(&identity(&entry.material));
        self.dirty.retain(|&h| h != handle);
        self.arena.remove(entry.slot, 1);
        Ok(entry.material)
    }

    pub fn arena(&self) -> &ArenaBuffer<MaterialData, D> {
        &self.arena
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::arena::HostDevice;
    use glam::Vec3;

    const SHADER: ShaderHandle = ShaderHandle(1);

    #[test]
    fn same_instance_yields_same_handle() {
        let device = HostDevice::new();
        let mut registry = MaterialRegistry::new(&device, 4).unwrap();
        let material = Material::unlit(SHADER, Vec3::ONE).into_shared();

        let a = registry.get_or_create_handle(&device, &material).unwrap();
        let b = registry.get_or_create_handle(&device, &material).unwrap();
        assert_eq!(a, b);
        assert_eq!(registry.arena().len(), 1);
    }

    #[test]
    fn registration_uploads_current_data_and_clears_dirty() {
        let device = HostDevice::new();
        let mut registry = MaterialRegistry::new(&device, 4).unwrap();
        let material = Material::unlit(SHADER, Vec3::new(0.5, 0.25, 1.0)).into_shared();

        let handle = registry.get_or_create_handle(&device, &material).unwrap();
        let slot = registry.slot(handle).unwrap();
        assert_eq!(registry.arena().get(slot).unwrap().color, [0.5, 0.25, 1.0]);
        assert!(!material.borrow().is_dirty());
        assert_eq!(registry.update(), 0);
    }

    #[test]
    fn only_dirty_materials_are_reuploaded() {
        let device = HostDevice::new();
        let mut registry = MaterialRegistry::new(&device, 4).unwrap();
        let a = Material::unlit(SHADER, Vec3::X).into_shared();
        let b = Material::unlit(SHADER, Vec3::Y).into_shared();
        registry.get_or_create_handle(&device, &a).unwrap();
        let hb = registry.get_or_create_handle(&device, &b).unwrap();
        device.take_writes();

        b.borrow_mut().set_color(Vec3::Z);
        assert_eq!(registry.update(), 1);
        assert_eq!(registry.pending(), &[hb]);
        assert_eq!(registry.flush(&device), 1);

        let slot = registry.slot(hb).unwrap() as u64;
        assert_eq!(device.writes_to("MaterialsBuffer"), vec![slot * 64..slot * 64 + 64]);
        assert!(registry.pending().is_empty());
    }

    #[test]
    fn unregistered_slot_is_recycled() {
        let device = HostDevice::new();
        let mut registry = MaterialRegistry::new(&device, 4).unwrap();
        let a = Material::unlit(SHADER, Vec3::X).into_shared();
        let b = Material::unlit(SHADER, Vec3::Y).into_shared();
        let ha = registry.get_or_create_handle(&device, &a).unwrap();
        registry.get_or_create_handle(&device, &b).unwrap();

        registry.unregister(ha).unwrap();
        let c = Material::unlit(SHADER, Vec3::Z).into_shared();
        let hc = registry.get_or_create_handle(&device, &c).unwrap();
        assert_eq!(registry.slot(hc), Some(0));
        assert_eq!(registry.arena().len(), 2);
    }
}
