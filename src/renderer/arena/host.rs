use std::cell::{Cell, RefCell};
use std::ops::Range;
use std::rc::Rc;

use super::GpuDevice;

/// A single recorded `write_buffer` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferWrite {
    pub buffer: u32,
    pub label: String,
    pub range: Range<u64>,
}

/// Buffer living in host memory.
#[derive(Debug, Clone)]
pub struct HostBuffer {
    id: u32,
    label: String,
    bytes: Rc<RefCell<Vec<u8>>>,
}

impl HostBuffer {
    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn size(&self) -> u64 {
        self.bytes.borrow().len() as u64
    }

    pub fn contents(&self) -> Vec<u8> {
        self.bytes.borrow().clone()
    }

    /// Reinterprets the first `count` elements of the buffer.
    pub fn read<T: bytemuck::Pod>(&self, count: usize) -> Vec<T> {
        let bytes = self.bytes.borrow();
        let stride = std::mem::size_of::<T>();
        bytes[..count * stride]
            .chunks_exact(stride)
            .map(bytemuck::pod_read_unaligned)
            .collect()
    }
}

/// In-memory [`GpuDevice`] that records every write and copy.
#[derive(Debug)]
pub struct HostDevice {
    next_id: Cell<u32>,
    max_buffer_size: u64,
    writes: RefCell<Vec<BufferWrite>>,
    copies: Cell<u32>,
}

impl HostDevice {
    pub fn new() -> Self {
        Self::with_max_buffer_size(1 << 28)
    }

    pub fn with_max_buffer_size(max_buffer_size: u64) -> Self {
        Self {
            next_id: Cell::new(0),
            max_buffer_size,
            writes: RefCell::new(Vec::new()),
            copies: Cell::new(0),
        }
    }

    pub fn buffers_created(&self) -> u32 {
        self.next_id.get()
    }

    pub fn copies(&self) -> u32 {
        self.copies.get()
    }

    /// Drains the recorded writes.
    pub fn take_writes(&self) -> Vec<BufferWrite> {
        std::mem::take(&mut *self.writes.borrow_mut())
    }

    /// Writes recorded against buffers with the given label, without draining.
    pub fn writes_to(&self, label: &str) -> Vec<Range<u64>> {
        self.writes
            .borrow()
            .iter()
            .filter(|w| w.label == label)
            .map(|w| w.range.clone())
            .collect()
    }
}

impl Default for HostDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl GpuDevice for HostDevice {
    type Buffer = HostBuffer;

    fn create_buffer(&self, label: &str, size: u64, _usage: wgpu::BufferUsages) -> HostBuffer {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        HostBuffer {
            id,
            label: label.to_string(),
            bytes: Rc::new(RefCell::new(vec![0; size as usize])),
        }
    }

    fn write_buffer(&self, buffer: &HostBuffer, offset: u64, data: &[u8]) {
        let start = offset as usize;
        buffer.bytes.borrow_mut()[start..start + data.len()].copy_from_slice(data);
        self.writes.borrow_mut().push(BufferWrite {
            buffer: buffer.id,
            label: buffer.label.clone(),
            range: offset..offset + data.len() as u64,
        });
    }

    fn copy_buffer(&self, src: &HostBuffer, dst: &HostBuffer, size: u64) {
        let size = size as usize;
        let src = src.bytes.borrow();
        dst.bytes.borrow_mut()[..size].copy_from_slice(&src[..size]);
        self.copies.set(self.copies.get() + 1);
    }

    fn max_buffer_size(&self) -> u64 {
        self.max_buffer_size
    }
}
