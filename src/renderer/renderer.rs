// renderer/renderer.rs
use crate::error::RenderError;
use crate::renderer::internal::{CameraBuffer, GpuContext, PipelineCache, StorageBindings};
use crate::renderer::internal::pipeline::BATCHED_SHADER;
use crate::renderer::{CameraUniform, Depth, DrawIndexedIndirect, FrameStats, RenderServer, ShaderHandle};
use crate::settings::ServerSettings;

const CLEAR_COLOR: wgpu::Color = wgpu::Color {
    r: 0.231,
    g: 0.269,
    b: 0.338,
    a: 1.0,
};

/// Draws a [`RenderServer`] with one `multi_draw_indexed_indirect` call
/// per shader batch.
pub struct BatchRenderer {
    server: RenderServer<GpuContext>,
    camera_buffer: CameraBuffer,
    storage: StorageBindings,
    pipelines: PipelineCache,
    depth: Depth,
}

impl BatchRenderer {
    pub fn new(
        context: GpuContext,
        settings: ServerSettings,
        color_format: wgpu::TextureFormat,
        width: u32,
        height: u32,
    ) -> Result<Self, RenderError> {
        let server = RenderServer::new(context, settings)?;
        let device = &server.device().device;

        let camera_buffer = CameraBuffer::new(device);
        let storage = StorageBindings::new(device, &server);
        let pipelines =
            PipelineCache::new(device, &camera_buffer, &storage, color_format, Depth::FORMAT);
        let depth = Depth::new(device, width, height);

        Ok(Self {
            server,
            camera_buffer,
            storage,
            pipelines,
            depth,
        })
    }

    pub fn server(&self) -> &RenderServer<GpuContext> {
        &self.server
    }

    pub fn server_mut(&mut self) -> &mut RenderServer<GpuContext> {
        &mut self.server
    }

    pub fn context(&self) -> &GpuContext {
        self.server.device()
    }

    /// Compiles a WGSL shader against the batched bind group layout.
    pub fn register_shader(&mut self, label: &str, source: &str) -> ShaderHandle {
        self.pipelines
            .register(&self.server.device().device, label, source)
    }

    /// Registers the bundled shader covering every material kind.
    pub fn register_default_shader(&mut self) -> ShaderHandle {
        self.register_shader("BatchedShader", BATCHED_SHADER)
    }

    pub fn set_camera(&self, camera: &CameraUniform) {
        self.camera_buffer
            .update(&self.server.device().queue, camera);
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.depth = Depth::new(&self.server.device().device, width, height);
    }

    /// Prepares the server and records the frame into `target`.
    pub fn render(&mut self, target: &wgpu::TextureView) -> Result<FrameStats, RenderError> {
        let stats = self.server.prepare()?;

        let context = self.server.device();
        self.storage.link(&context.device, &self.server);

        let mut encoder = context
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Encoder"),
            });

        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("BatchedPass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: target,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(CLEAR_COLOR),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.depth.view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            self.record_batches(&mut pass);
        }

        context.queue.submit(Some(encoder.finish()));
        Ok(stats)
    }

    fn record_batches(&self, pass: &mut wgpu::RenderPass<'_>) {
        let shader_batches = self.server.batches().shader_batches();
        if shader_batches.is_empty() {
            return;
        }

        let geometry = self.server.geometry();
        pass.set_vertex_buffer(0, geometry.vertex_arena().buffer().slice(..));
        pass.set_index_buffer(
            geometry.index_arena().buffer().slice(..),
            wgpu::IndexFormat::Uint32,
        );
        pass.set_bind_group(0, &self.camera_buffer.bind_group, &[]);
        pass.set_bind_group(1, &self.storage.bind_group, &[]);

        let stride = std::mem::size_of::<DrawIndexedIndirect>() as u64;
        for batch in shader_batches {
            let Some(pipeline) = self.pipelines.get(batch.shader) else {
                log::warn!("No pipeline registered for {:?}, skipping batch", batch.shader);
                continue;
            };
            pass.set_pipeline(pipeline);
            pass.multi_draw_indexed_indirect(
                self.server.indirect().buffer(),
                batch.first as u64 * stride,
                batch.count,
            );
        }
    }
}
