/// The buffer operations an arena needs from a GPU.
///
/// Implemented by [`GpuContext`](crate::renderer::GpuContext) for real
/// `wgpu` devices and by [`HostDevice`](super::HostDevice) for headless use.
pub trait GpuDevice {
    type Buffer;

    fn create_buffer(&self, label: &str, size: u64, usage: wgpu::BufferUsages) -> Self::Buffer;

    fn write_buffer(&self, buffer: &Self::Buffer, offset: u64, data: &[u8]);

    /// Device-to-device copy of the first `size` bytes of `src` into `dst`.
    fn copy_buffer(&self, src: &Self::Buffer, dst: &Self::Buffer, size: u64);

    fn max_buffer_size(&self) -> u64;
}
