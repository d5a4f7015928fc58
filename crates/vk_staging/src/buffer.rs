//! Buffer resources
//!
//! An unbound [`Buffer`] wraps a `vk::Buffer` handle with no memory behind
//! it. Binding it to a [`MemoryAllocation`] produces an [`AllocatedBuffer`],
//! which owns both and releases the memory before destroying the buffer
//! handle when dropped.

use ash::{vk, Device};
use bytemuck::Pod;

use crate::error::{VulkanError, VulkanResult};
use crate::memory::MemoryAllocation;

/// Unbound GPU buffer
pub struct Buffer {
    device: Device,
    buffer: vk::Buffer,
    size: vk::DeviceSize,
    usage: vk::BufferUsageFlags,
}

impl Buffer {
    /// Create a buffer with no memory bound
    pub fn new(
        device: &Device,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
    ) -> VulkanResult<Self> {
        let buffer_info = vk::BufferCreateInfo::builder()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe {
            device
                .create_buffer(&buffer_info, None)
                .map_err(VulkanError::Api)?
        };

        Ok(Self {
            device: device.clone(),
            buffer,
            size,
            usage,
        })
    }

    /// Memory requirements for binding this buffer
    pub fn memory_requirements(&self) -> vk::MemoryRequirements {
        unsafe { self.device.get_buffer_memory_requirements(self.buffer) }
    }

    /// Bind the buffer to a memory allocation
    ///
    /// Consumes both halves; on failure they are released by their own RAII
    /// cleanup.
    pub fn bind(self, memory: MemoryAllocation) -> VulkanResult<AllocatedBuffer> {
        unsafe {
            self.device
                .bind_buffer_memory(self.buffer, memory.handle(), 0)
                .map_err(VulkanError::Api)?;
        }

        Ok(AllocatedBuffer {
            memory,
            buffer: self,
        })
    }

    /// Get the buffer handle
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    /// Get the buffer size in bytes
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    /// Usage flags the buffer was created with
    pub fn usage(&self) -> vk::BufferUsageFlags {
        self.usage
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_buffer(self.buffer, None);
        }
    }
}

/// Buffer bound to its own memory allocation
///
/// Field order matters: the allocation is freed first, then the buffer
/// handle is destroyed.
pub struct AllocatedBuffer {
    memory: MemoryAllocation,
    buffer: Buffer,
}

impl AllocatedBuffer {
    /// Create a buffer and bind it to freshly allocated memory
    ///
    /// The memory type is chosen by `predicate` over capability flags, the
    /// same way [`MemoryAllocation::allocate`] does.
    pub fn new(
        device: &Device,
        memory_properties: &vk::PhysicalDeviceMemoryProperties,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        predicate: impl Fn(vk::MemoryPropertyFlags) -> bool,
    ) -> VulkanResult<Self> {
        let buffer = Buffer::new(device, size, usage)?;
        let memory = MemoryAllocation::allocate(
            device,
            memory_properties,
            buffer.memory_requirements(),
            predicate,
        )?;
        buffer.bind(memory)
    }

    /// Get the buffer handle
    pub fn handle(&self) -> vk::Buffer {
        self.buffer.handle()
    }

    /// Get the buffer size in bytes
    pub fn size(&self) -> vk::DeviceSize {
        self.buffer.size()
    }

    /// The memory allocation backing this buffer
    pub fn memory(&self) -> &MemoryAllocation {
        &self.memory
    }

    /// Write typed data directly through a host mapping
    ///
    /// Only valid for host-visible memory; device-local buffers go through
    /// [`MemoryStager`](crate::stager::MemoryStager) instead.
    pub fn write_data<T: Pod>(&self, data: &[T]) -> VulkanResult<()> {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        let mut mapped = self.memory.map(0, bytes.len() as vk::DeviceSize)?;
        mapped.copy_from_slice(bytes);
        Ok(())
    }
}
