//! Growable GPU arrays with CPU-tracked occupancy.
//!
//! An [`ArenaBuffer`] owns one device buffer plus an optional CPU shadow
//! copy. Growth doubles the capacity, copies the old contents device-side
//! and bumps [`ArenaBuffer::generation`]; whoever bound the old buffer
//! (bind groups, vertex/index bindings) must re-link when it changes.

pub mod device;
pub mod free_list;
pub mod host;

use std::mem;

use bytemuck::Pod;

use crate::error::ArenaError;

pub use device::GpuDevice;
pub use free_list::{FreeBlock, FreeBlocks, FreeSlots};
pub use host::{BufferWrite, HostBuffer, HostDevice};

/// How vacated elements are recycled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reuse {
    /// Single elements; `add` of one element pops the free list first.
    Slots,
    /// Variable-length ranges; best-fit search over coalesced free blocks.
    Blocks,
}

#[derive(Debug, Clone)]
enum Occupancy {
    Slots(FreeSlots),
    Blocks(FreeBlocks),
}

pub struct ArenaBuffer<T: Pod, D: GpuDevice> {
    label: &'static str,
    usage: wgpu::BufferUsages,
    buffer: D::Buffer,
    capacity: usize,
    filled: usize,
    shadow: Option<Vec<T>>,
    occupancy: Occupancy,
    generation: u64,
    mapped: bool,
}

impl<T: Pod, D: GpuDevice> ArenaBuffer<T, D> {
    pub fn allocate(
        device: &D,
        label: &'static str,
        usage: wgpu::BufferUsages,
        initial_capacity: usize,
        reuse: Reuse,
        shadow: bool,
    ) -> Result<Self, ArenaError> {
        debug_assert!(
            mem::size_of::<T>() % wgpu::COPY_BUFFER_ALIGNMENT as usize == 0,
            "arena element size must be a multiple of 4 bytes"
        );

        let capacity = initial_capacity.max(1);
        let usage = usage | wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::COPY_SRC;
        let size = Self::byte_size(device, label, capacity)?;
        let buffer = device.create_buffer(label, size, usage);

        let occupancy = match reuse {
            Reuse::Slots => Occupancy::Slots(FreeSlots::new()),
            Reuse::Blocks => Occupancy::Blocks(FreeBlocks::new()),
        };

        Ok(Self {
            label,
            usage,
            buffer,
            capacity,
            filled: 0,
            shadow: shadow.then(|| Vec::with_capacity(capacity)),
            occupancy,
            generation: 0,
            mapped: false,
        })
    }

    /// Stores `items` and returns the index of the first one.
    pub fn add(&mut self, device: &D, items: &[T]) -> Result<u32, ArenaError> {
        if items.is_empty() {
            return Ok(self.filled as u32);
        }

        let recycled = match &mut self.occupancy {
            Occupancy::Slots(free) if items.len() == 1 => free.pop(),
            Occupancy::Slots(_) => None,
            Occupancy::Blocks(free) => free.allocate(items.len() as u32),
        };

        let first = match recycled {
            Some(first) => first,
            None => {
                let first = self.filled;
                self.resize(device, first + items.len())?;
                first as u32
            }
        };

        self.write(device, first, items);
        Ok(first)
    }

    /// Returns `[first, first + len)` to the free list.
    pub fn remove(&mut self, first: u32, len: u32) {
        if len == 0 {
            return;
        }
        let end = first as usize + len as usize;
        if end > self.filled {
            log::error!(
                "{}: removing {}..{} past filled size {}",
                self.label,
                first,
                end,
                self.filled
            );
            debug_assert!(false, "arena removal past filled size");
            return;
        }

        match &mut self.occupancy {
            Occupancy::Slots(free) => {
                for index in first..first + len {
                    if !free.push(index) {
                        log::error!("{}: slot {} freed twice", self.label, index);
                        debug_assert!(false, "arena slot freed twice");
                    }
                }
            }
            Occupancy::Blocks(free) => {
                let mut filled = self.filled as u32;
                if free.release(first, len, &mut filled) {
                    self.set_filled(filled as usize);
                } else {
                    log::error!(
                        "{}: block {}..{} overlaps free space",
                        self.label,
                        first,
                        end
                    );
                    debug_assert!(false, "arena block freed twice");
                }
            }
        }
    }

    /// Patches `items` starting at `first` in the shadow and on the device
    /// with a single upload.
    pub fn write(&mut self, device: &D, first: u32, items: &[T]) {
        if items.is_empty() {
            return;
        }
        let first = first as usize;
        debug_assert!(first + items.len() <= self.filled);

        if let Some(shadow) = &mut self.shadow {
            shadow[first..first + items.len()].copy_from_slice(items);
        }
        device.write_buffer(
            &self.buffer,
            (first * mem::size_of::<T>()) as u64,
            bytemuck::cast_slice(items),
        );
    }

    /// Mutable view of the filled range of the shadow copy. Changes reach
    /// the device on [`unmap`](Self::unmap).
    pub fn map(&mut self) -> Result<&mut [T], ArenaError> {
        let filled = self.filled;
        let shadow = self
            .shadow
            .as_mut()
            .ok_or(ArenaError::NoShadowCopy(self.label))?;
        self.mapped = true;
        Ok(&mut shadow[..filled])
    }

    /// Flushes the whole mapped range to the device.
    pub fn unmap(&mut self, device: &D) {
        if !self.mapped {
            return;
        }
        self.mapped = false;
        if let Some(shadow) = &self.shadow {
            if !shadow.is_empty() {
                device.write_buffer(&self.buffer, 0, bytemuck::cast_slice(shadow));
            }
        }
    }

    /// Sets the filled size, growing the device buffer if needed.
    pub fn resize(&mut self, device: &D, filled: usize) -> Result<(), ArenaError> {
        if filled > self.capacity {
            self.reserve(device, filled)?;
        }

        if filled < self.filled {
            let len = filled as u32;
            let filled = match &mut self.occupancy {
                Occupancy::Slots(free) => {
                    free.truncate(len);
                    filled
                }
                Occupancy::Blocks(free) => free.truncate(len) as usize,
            };
            self.set_filled(filled);
        } else {
            self.set_filled(filled);
        }
        Ok(())
    }

    /// Doubles the capacity until it covers `required` elements.
    pub fn reserve(&mut self, device: &D, required: usize) -> Result<(), ArenaError> {
        if required <= self.capacity {
            return Ok(());
        }

        let capacity = grown_capacity(self.capacity, required).ok_or(
            ArenaError::AllocationFailure {
                label: self.label,
                requested: required,
                capacity: self.capacity,
            },
        )?;
        let size = Self::byte_size(device, self.label, capacity)?;

        log::info!(
            "Growing {} arena: {} -> {}",
            self.label,
            self.capacity,
            capacity
        );

        let buffer = device.create_buffer(self.label, size, self.usage);
        let used = (self.filled * mem::size_of::<T>()) as u64;
        if used > 0 {
            device.copy_buffer(&self.buffer, &buffer, used);
        }
        if let Some(shadow) = &mut self.shadow {
            shadow.reserve_exact(capacity - shadow.len());
        }

        self.buffer = buffer;
        self.capacity = capacity;
        self.generation += 1;
        Ok(())
    }

    fn set_filled(&mut self, filled: usize) {
        self.filled = filled;
        if let Some(shadow) = &mut self.shadow {
            shadow.resize(filled, T::zeroed());
        }
    }

    fn byte_size(device: &D, label: &'static str, capacity: usize) -> Result<u64, ArenaError> {
        capacity
            .checked_mul(mem::size_of::<T>())
            .map(|bytes| bytes as u64)
            .filter(|&bytes| bytes <= device.max_buffer_size())
            .ok_or(ArenaError::AllocationFailure {
                label,
                requested: capacity,
                capacity: 0,
            })
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn buffer(&self) -> &D::Buffer {
        &self.buffer
    }

    pub fn len(&self) -> usize {
        self.filled
    }

    pub fn is_empty(&self) -> bool {
        self.filled == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Incremented every time the device buffer is replaced.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn shadow(&self) -> Option<&[T]> {
        self.shadow.as_deref()
    }

    pub fn get(&self, index: u32) -> Option<&T> {
        self.shadow.as_ref()?.get(index as usize)
    }

    pub fn free_slots(&self) -> usize {
        match &self.occupancy {
            Occupancy::Slots(free) => free.len(),
            Occupancy::Blocks(free) => free.iter().map(|b| b.size as usize).sum(),
        }
    }
}

fn grown_capacity(current: usize, required: usize) -> Option<usize> {
    let mut capacity = current.max(1);
    while capacity < required {
        if capacity > usize::MAX / 2 {
            return None;
        }
        capacity *= 2;
    }
    Some(capacity)
}
