use std::collections::HashMap;

use crate::renderer::internal::{CameraBuffer, StorageBindings};
use crate::renderer::{PipelineBuilder, ShaderHandle, Vertex};

pub(crate) const BATCHED_SHADER: &str = include_str!("../../shader/batched.wgsl");

/// Compiled pipelines keyed by the shader handle materials carry.
///
/// All pipelines share one layout: camera at group 0, the storage arenas
/// at group 1.
pub(crate) struct PipelineCache {
    layout: wgpu::PipelineLayout,
    color_format: wgpu::TextureFormat,
    depth_format: wgpu::TextureFormat,
    pipelines: HashMap<ShaderHandle, wgpu::RenderPipeline>,
    next_handle: u32,
}

impl PipelineCache {
    pub(crate) fn new(
        device: &wgpu::Device,
        camera: &CameraBuffer,
        storage: &StorageBindings,
        color_format: wgpu::TextureFormat,
        depth_format: wgpu::TextureFormat,
    ) -> Self {
        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("BatchedPipelineLayout"),
            bind_group_layouts: &[&camera.bind_layout, &storage.bind_layout],
            push_constant_ranges: &[],
        });

        Self {
            layout,
            color_format,
            depth_format,
            pipelines: HashMap::new(),
            next_handle: 0,
        }
    }

    /// Compiles `source` and returns the handle materials use to select it.
    pub(crate) fn register(
        &mut self,
        device: &wgpu::Device,
        label: &str,
        source: &str,
    ) -> ShaderHandle {
        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(label),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        });

        let pipeline = PipelineBuilder::new(device, &self.layout, &module)
            .with_label(label)
            .with_vertex_buffer(Vertex::layout())
            .with_color_target(self.color_format, Some(wgpu::BlendState::REPLACE))
            .with_depth_stencil(self.depth_format, true, wgpu::CompareFunction::Less)
            .build();

        let handle = ShaderHandle(self.next_handle);
        self.next_handle += 1;
        self.pipelines.insert(handle, pipeline);
        log::info!("Registered shader {:?} as {:?}", label, handle);
        handle
    }

    pub(crate) fn get(&self, handle: ShaderHandle) -> Option<&wgpu::RenderPipeline> {
        self.pipelines.get(&handle)
    }
}
