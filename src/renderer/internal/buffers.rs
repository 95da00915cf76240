use std::mem;
use std::num::NonZeroU64;

use wgpu::util::DeviceExt;

use crate::renderer::internal::GpuContext;
use crate::renderer::{CameraUniform, RenderServer};

pub(crate) struct CameraBuffer {
    pub(crate) buffer: wgpu::Buffer,
    pub(crate) bind_group: wgpu::BindGroup,
    pub(crate) bind_layout: wgpu::BindGroupLayout,
}

impl CameraBuffer {
    pub(crate) fn new(device: &wgpu::Device) -> Self {
        let camera = CameraUniform::new();
        let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("CameraBuffer"),
            contents: bytemuck::bytes_of(&camera),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let bind_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("CameraBindLayout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: NonZeroU64::new(mem::size_of::<CameraUniform>() as u64),
                },
                count: None,
            }],
        });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("CameraBindGroup"),
            layout: &bind_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: buffer.as_entire_binding(),
            }],
        });

        Self {
            buffer,
            bind_group,
            bind_layout,
        }
    }

    pub(crate) fn update(&self, queue: &wgpu::Queue, camera: &CameraUniform) {
        queue.write_buffer(&self.buffer, 0, bytemuck::bytes_of(camera));
    }
}

/// Bind group over the object data, object handle and material arenas.
///
/// Arena growth swaps the underlying buffers, so the group is rebuilt
/// whenever one of their generations moves.
pub(crate) struct StorageBindings {
    pub(crate) bind_group: wgpu::BindGroup,
    pub(crate) bind_layout: wgpu::BindGroupLayout,
    generations: [u64; 3],
}

impl StorageBindings {
    pub(crate) fn new(device: &wgpu::Device, server: &RenderServer<GpuContext>) -> Self {
        let entry = |binding: u32, visibility: wgpu::ShaderStages| wgpu::BindGroupLayoutEntry {
            binding,
            visibility,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage { read_only: true },
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        };

        let bind_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("StorageBindLayout"),
            entries: &[
                entry(0, wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT),
                entry(1, wgpu::ShaderStages::VERTEX),
                entry(2, wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT),
            ],
        });

        let bind_group = Self::create_bind_group(device, &bind_layout, server);
        Self {
            bind_group,
            bind_layout,
            generations: server.storage_generations(),
        }
    }

    /// Re-creates the bind group if any bound arena was reallocated.
    /// Returns whether it did.
    pub(crate) fn link(&mut self, device: &wgpu::Device, server: &RenderServer<GpuContext>) -> bool {
        let generations = server.storage_generations();
        if generations == self.generations {
            return false;
        }

        log::debug!(
            "Re-linking storage bindings: {:?} -> {:?}",
            self.generations,
            generations
        );
        self.bind_group = Self::create_bind_group(device, &self.bind_layout, server);
        self.generations = generations;
        true
    }

    fn create_bind_group(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        server: &RenderServer<GpuContext>,
    ) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("StorageBindGroup"),
            layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: server.object_data().buffer().as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: server.object_handles().buffer().as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: server.materials().arena().buffer().as_entire_binding(),
                },
            ],
        })
    }
}
