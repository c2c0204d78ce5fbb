// GPU-visible linear memory
//
// Austin Shafer - 2024
use ash::vk;
use bitflags::bitflags;

use crate::device::Device;
use crate::{GpuError, Result};

use std::sync::Arc;

bitflags! {
    /// How a buffer will be used. Selects both the Vulkan usage flags
    /// and the memory properties requested at `init` time.
    pub struct BufferUsage: u32 {
        const TRANSFER_SRC = 1 << 0;
        const TRANSFER_DST = 1 << 1;
        const UNIFORM      = 1 << 2;
        const STORAGE      = 1 << 3;
        const INDEX        = 1 << 4;
        const VERTEX       = 1 << 5;
        const DYNAMIC      = 1 << 6;
        const MAP_READ     = 1 << 7;
        const MAP_WRITE    = 1 << 8;
    }
}

impl BufferUsage {
    fn is_host_visible(&self) -> bool {
        self.intersects(Self::MAP_READ | Self::MAP_WRITE | Self::DYNAMIC)
    }

    fn to_vk(&self) -> vk::BufferUsageFlags {
        let mut flags = vk::BufferUsageFlags::empty();
        if self.contains(Self::TRANSFER_SRC) {
            flags |= vk::BufferUsageFlags::TRANSFER_SRC;
        }
        if self.contains(Self::TRANSFER_DST) || !self.is_host_visible() {
            // non-host-visible buffers are always filled via a staging
            // copy, so they need TRANSFER_DST even if the caller didn't
            // ask for it explicitly.
            flags |= vk::BufferUsageFlags::TRANSFER_DST;
        }
        if self.contains(Self::UNIFORM) {
            flags |= vk::BufferUsageFlags::UNIFORM_BUFFER;
        }
        if self.contains(Self::STORAGE) {
            flags |= vk::BufferUsageFlags::STORAGE_BUFFER;
        }
        if self.contains(Self::INDEX) {
            flags |= vk::BufferUsageFlags::INDEX_BUFFER;
        }
        if self.contains(Self::VERTEX) {
            flags |= vk::BufferUsageFlags::VERTEX_BUFFER;
        }
        flags
    }

    /// Memory property selection, per the upload algorithm's rules.
    fn memory_properties(&self) -> vk::MemoryPropertyFlags {
        if self.contains(Self::MAP_READ) {
            vk::MemoryPropertyFlags::HOST_VISIBLE
                | vk::MemoryPropertyFlags::HOST_COHERENT
                | vk::MemoryPropertyFlags::HOST_CACHED
        } else if self.intersects(Self::MAP_WRITE | Self::DYNAMIC) {
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT
        } else {
            vk::MemoryPropertyFlags::DEVICE_LOCAL
        }
    }
}

/// GPU-visible linear memory.
///
/// Once `init` succeeds, `size` and `usage` are immutable. The buffer
/// tracks the latest timeline point at which a command buffer referenced
/// it, so `wait` can rendezvous before a dynamic buffer is rewritten.
pub struct Buffer {
    b_dev: Arc<Device>,
    b_buffer: vk::Buffer,
    b_memory: vk::DeviceMemory,
    b_size: u64,
    b_usage: BufferUsage,
    /// Latest timeline point at which a command buffer held a reference
    /// to this buffer. `wait` blocks until this point retires.
    b_last_ref: u64,
}

impl Buffer {
    pub fn size(&self) -> u64 {
        self.b_size
    }

    pub fn usage(&self) -> BufferUsage {
        self.b_usage
    }

    pub(crate) fn handle(&self) -> vk::Buffer {
        self.b_buffer
    }

    /// Creates and initializes a buffer of `size` bytes for `usage`.
    pub fn new(dev: Arc<Device>, size: u64, usage: BufferUsage) -> Result<Self> {
        if size == 0 {
            return Err(GpuError::INVALID_DIMENSIONS);
        }

        let (buffer, memory) = dev.create_buffer_with_size(
            usage.to_vk(),
            vk::SharingMode::EXCLUSIVE,
            usage.memory_properties(),
            size,
        );

        unsafe {
            dev.dev
                .bind_buffer_memory(buffer, memory, 0)
                .map_err(crate::error::map_vk_result)?
        };

        Ok(Self {
            b_dev: dev,
            b_buffer: buffer,
            b_memory: memory,
            b_size: size,
            b_usage: usage,
            b_last_ref: 0,
        })
    }

    /// Records that a command buffer submitted at `point` referenced
    /// this buffer, so a later `wait` rendezvous with it.
    pub(crate) fn mark_referenced(&mut self, point: u64) {
        if point > self.b_last_ref {
            self.b_last_ref = point;
        }
    }

    /// Uploads `data` at `offset` bytes into the buffer.
    ///
    /// Host-visible buffers are mapped and written directly. Device-local
    /// buffers go through a transient staging buffer and copy command.
    pub fn upload(&self, data: &[u8], offset: u64) -> Result<()> {
        if offset + data.len() as u64 > self.b_size {
            return Err(GpuError::INVALID_DIMENSIONS);
        }

        if self.b_usage.is_host_visible() {
            self.b_dev.update_memory(self.b_memory, offset as isize, data);
            return Ok(());
        }

        // Device-local: stage through a transient host-visible buffer and
        // a one-shot copy command, exactly as the upload algorithm requires.
        let (staging_buf, staging_mem) = self.b_dev.create_buffer(
            vk::BufferUsageFlags::TRANSFER_SRC,
            vk::SharingMode::EXCLUSIVE,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            data,
        );

        self.b_dev.copy_buffer_region(staging_buf, self.b_buffer, data.len() as u64, 0, offset);
        self.b_dev.wait_for_copy();

        unsafe {
            self.b_dev.dev.destroy_buffer(staging_buf, None);
            self.b_dev.free_memory(staging_mem);
        }

        Ok(())
    }

    /// Maps `[offset, offset+size)` and returns a copy of its contents.
    ///
    /// Only valid for buffers created with `MAP_READ`/`MAP_WRITE`.
    pub fn map(&self, offset: u64, size: u64) -> Result<Vec<u8>> {
        if !self.b_usage.intersects(BufferUsage::MAP_READ | BufferUsage::MAP_WRITE) {
            return Err(GpuError::UNSUPPORTED);
        }

        unsafe {
            let ptr = self
                .b_dev
                .dev
                .map_memory(self.b_memory, offset, size, vk::MemoryMapFlags::empty())
                .map_err(crate::error::map_vk_result)?;

            let slice = std::slice::from_raw_parts(ptr as *const u8, size as usize);
            let out = slice.to_vec();

            self.b_dev.dev.unmap_memory(self.b_memory);
            Ok(out)
        }
    }

    /// Waits for every command buffer still referencing this buffer to
    /// retire, then clears the reference point.
    pub fn wait(&mut self) {
        self.b_dev.wait_for_point(self.b_last_ref);
        self.b_last_ref = 0;
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        unsafe {
            self.b_dev.dev.destroy_buffer(self.b_buffer, None);
            self.b_dev.free_memory(self.b_memory);
        }
    }
}
