// renderer/material.rs
use std::cell::RefCell;
use std::rc::Rc;

use bitflags::bitflags;
use glam::Vec3;

use super::objects::MaterialData;

/// Opaque program handle handed out by the pipeline cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ShaderHandle(pub u32);

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MaterialFlags: u32 {
        const USE_BASE_COLOR_TEXTURE = 1 << 0;
        const USE_METALLIC_ROUGHNESS_TEXTURE = 1 << 1;
        const USE_NORMAL_TEXTURE = 1 << 2;
        const USE_EMISSIVE_TEXTURE = 1 << 3;
        const DOUBLE_SIDED = 1 << 4;
    }
}

/// Texture slots of the parameter block; one flag bit each.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureSlot {
    BaseColor = 0,
    MetallicRoughness = 1,
    Normal = 2,
    Emissive = 3,
}

impl TextureSlot {
    fn flag(self) -> MaterialFlags {
        match self {
            TextureSlot::BaseColor => MaterialFlags::USE_BASE_COLOR_TEXTURE,
            TextureSlot::MetallicRoughness => MaterialFlags::USE_METALLIC_ROUGHNESS_TEXTURE,
            TextureSlot::Normal => MaterialFlags::USE_NORMAL_TEXTURE,
            TextureSlot::Emissive => MaterialFlags::USE_EMISSIVE_TEXTURE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UnlitParams {
    pub color: Vec3,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LambertParams {
    pub albedo: Vec3,
    pub ambient: Vec3,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PbrParams {
    pub albedo: Vec3,
    pub metallic: f32,
    pub roughness: f32,
    pub emissive: f32,
}

impl Default for PbrParams {
    fn default() -> Self {
        Self {
            albedo: Vec3::ONE,
            metallic: 0.0,
            roughness: 0.5,
            emissive: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MaterialKind {
    Unlit(UnlitParams),
    Lambert(LambertParams),
    Pbr(PbrParams),
}

impl MaterialKind {
    pub fn id(&self) -> u32 {
        match self {
            MaterialKind::Unlit(_) => 0,
            MaterialKind::Lambert(_) => 1,
            MaterialKind::Pbr(_) => 2,
        }
    }

    fn color(&self) -> Vec3 {
        match self {
            MaterialKind::Unlit(p) => p.color,
            MaterialKind::Lambert(p) => p.albedo,
            MaterialKind::Pbr(p) => p.albedo,
        }
    }

    fn params(&self) -> Vec3 {
        match self {
            MaterialKind::Unlit(_) => Vec3::ZERO,
            MaterialKind::Lambert(p) => p.ambient,
            MaterialKind::Pbr(p) => Vec3::new(p.metallic, p.roughness, p.emissive),
        }
    }
}

/// A material instance shared by any number of objects.
///
/// The shader is fixed at construction, so a material never moves its
/// objects to a different shader batch. Every setter marks the material
/// dirty; the registry re-uploads it on the next frame.
#[derive(Debug, Clone)]
pub struct Material {
    shader: ShaderHandle,
    kind: MaterialKind,
    flags: MaterialFlags,
    textures: [u64; 4],
    dirty: bool,
}

pub type MaterialRef = Rc<RefCell<Material>>;

impl Material {
    pub fn new(shader: ShaderHandle, kind: MaterialKind) -> Self {
        Self {
            shader,
            kind,
            flags: MaterialFlags::empty(),
            textures: [0; 4],
            dirty: true,
        }
    }

    pub fn unlit(shader: ShaderHandle, color: Vec3) -> Self {
        Self::new(shader, MaterialKind::Unlit(UnlitParams { color }))
    }

    pub fn lambert(shader: ShaderHandle, albedo: Vec3) -> Self {
        Self::new(
            shader,
            MaterialKind::Lambert(LambertParams {
                albedo,
                ambient: Vec3::splat(0.03),
            }),
        )
    }

    pub fn pbr(shader: ShaderHandle, params: PbrParams) -> Self {
        Self::new(shader, MaterialKind::Pbr(params))
    }

    pub fn into_shared(self) -> MaterialRef {
        Rc::new(RefCell::new(self))
    }

    pub fn shader(&self) -> ShaderHandle {
        self.shader
    }

    pub fn kind(&self) -> &MaterialKind {
        &self.kind
    }

    pub fn flags(&self) -> MaterialFlags {
        self.flags
    }

    pub fn set_color(&mut self, color: Vec3) {
        match &mut self.kind {
            MaterialKind::Unlit(p) => p.color = color,
            MaterialKind::Lambert(p) => p.albedo = color,
            MaterialKind::Pbr(p) => p.albedo = color,
        }
        self.dirty = true;
    }

    pub fn set_ambient(&mut self, ambient: Vec3) {
        match &mut self.kind {
            MaterialKind::Lambert(p) => {
                p.ambient = ambient;
                self.dirty = true;
            }
            other => log::warn!("set_ambient ignored on material kind {}", other.id()),
        }
    }

    pub fn set_metallic(&mut self, metallic: f32) {
        self.update_pbr(|p| p.metallic = metallic.clamp(0.0, 1.0));
    }

    pub fn set_roughness(&mut self, roughness: f32) {
        self.update_pbr(|p| p.roughness = roughness.clamp(0.0, 1.0));
    }

    pub fn set_emissive(&mut self, emissive: f32) {
        self.update_pbr(|p| p.emissive = emissive.max(0.0));
    }

    fn update_pbr(&mut self, f: impl FnOnce(&mut PbrParams)) {
        match &mut self.kind {
            MaterialKind::Pbr(p) => {
                f(p);
                self.dirty = true;
            }
            other => log::warn!("PBR setter ignored on material kind {}", other.id()),
        }
    }

    /// Binds a 64-bit texture handle; `None` clears the slot.
    pub fn set_texture(&mut self, slot: TextureSlot, handle: Option<u64>) {
        self.textures[slot as usize] = handle.unwrap_or(0);
        self.flags.set(slot.flag(), handle.is_some());
        self.dirty = true;
    }

    pub fn set_double_sided(&mut self, double_sided: bool) {
        self.flags.set(MaterialFlags::DOUBLE_SIDED, double_sided);
        self.dirty = true;
    }

    pub fn material_data(&self) -> MaterialData {
        MaterialData {
            color: self.kind.color().to_array(),
            kind: self.kind.id(),
            params: self.kind.params().to_array(),
            flags: self.flags.bits(),
            textures: self.textures,
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Returns the dirty flag and clears it.
    pub(crate) fn take_dirty(&mut self) -> bool {
        std::mem::replace(&mut self.dirty, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHADER: ShaderHandle = ShaderHandle(3);

    #[test]
    fn setters_mark_dirty() {
        let mut material = Material::unlit(SHADER, Vec3::X);
        assert!(material.take_dirty());
        assert!(!material.is_dirty());

        material.set_color(Vec3::Y);
        assert!(material.take_dirty());
        assert_eq!(material.material_data().color, [0.0, 1.0, 0.0]);
    }

    #[test]
    fn pbr_factors_land_in_params() {
        let mut material = Material::pbr(SHADER, PbrParams::default());
        material.set_metallic(0.75);
        material.set_roughness(1.5);

        let data = material.material_data();
        assert_eq!(data.kind, 2);
        assert_eq!(data.params, [0.75, 1.0, 0.0]);
    }

    #[test]
    fn pbr_setter_on_unlit_is_ignored() {
        let mut material = Material::unlit(SHADER, Vec3::ONE);
        material.take_dirty();
        material.set_metallic(1.0);
        assert!(!material.is_dirty());
        assert_eq!(material.material_data().params, [0.0; 3]);
    }

    #[test]
    fn texture_slots_toggle_flags() {
        let mut material = Material::lambert(SHADER, Vec3::ONE);
        material.set_texture(TextureSlot::Normal, Some(0xdead_beef_0000_0001));

        let data = material.material_data();
        assert_eq!(data.textures[2], 0xdead_beef_0000_0001);
        assert_eq!(data.flags, MaterialFlags::USE_NORMAL_TEXTURE.bits());

        material.set_texture(TextureSlot::Normal, None);
        assert_eq!(material.material_data().flags, 0);
    }

    #[test]
    fn shader_is_fixed_at_construction() {
        let mut material = Material::lambert(SHADER, Vec3::ONE);
        material.set_color(Vec3::ZERO);
        assert_eq!(material.shader(), SHADER);
    }
}
