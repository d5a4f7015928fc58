//! Device memory allocation and mapping
//!
//! Provides RAII-based device memory management. A [`MemoryAllocation`] owns
//! one `vk::DeviceMemory` block, remembers the capability flags of the memory
//! type it was allocated from, and exposes scoped mapping through
//! [`MappedMemory`] so that unmap happens on every exit path.
//!
//! Memory types are chosen with a plain predicate over
//! `vk::MemoryPropertyFlags`, filtered by the resource's type mask.

use ash::{vk, Device};
use std::ops::{Deref, DerefMut};

use crate::error::{VulkanError, VulkanResult};

/// Find a memory type index whose capability flags satisfy `predicate`
///
/// `type_mask` is the `memory_type_bits` field from the resource's memory
/// requirements; indices outside the mask are skipped.
pub fn find_memory_type_index(
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    type_mask: u32,
    predicate: impl Fn(vk::MemoryPropertyFlags) -> bool,
) -> VulkanResult<u32> {
    for i in 0..memory_properties.memory_type_count {
        if (type_mask & (1 << i)) != 0
            && predicate(memory_properties.memory_types[i as usize].property_flags)
        {
            return Ok(i);
        }
    }

    Err(VulkanError::NoSuitableMemoryType)
}

/// One device memory allocation with RAII cleanup
///
/// An allocation is bound to at most one buffer or image. Freeing it (by
/// dropping) invalidates whatever resource was bound to it, so allocations
/// are normally owned by the bound resource wrapper.
pub struct MemoryAllocation {
    device: Device,
    memory: vk::DeviceMemory,
    size: vk::DeviceSize,
    properties: vk::MemoryPropertyFlags,
}

impl MemoryAllocation {
    /// Allocate device memory for the given requirements
    ///
    /// The memory type is selected by `predicate` over the capability flags of
    /// the types permitted by `requirements.memory_type_bits`. Allocation
    /// failure is surfaced as [`VulkanError::OutOfMemory`]; there is no retry
    /// or fallback beyond what the predicate admits.
    pub fn allocate(
        device: &Device,
        memory_properties: &vk::PhysicalDeviceMemoryProperties,
        requirements: vk::MemoryRequirements,
        predicate: impl Fn(vk::MemoryPropertyFlags) -> bool,
    ) -> VulkanResult<Self> {
        let type_index = find_memory_type_index(
            memory_properties,
            requirements.memory_type_bits,
            predicate,
        )?;

        let alloc_info = vk::MemoryAllocateInfo::builder()
            .allocation_size(requirements.size)
            .memory_type_index(type_index);

        let memory = unsafe {
            device
                .allocate_memory(&alloc_info, None)
                .map_err(|result| match result {
                    vk::Result::ERROR_OUT_OF_HOST_MEMORY
                    | vk::Result::ERROR_OUT_OF_DEVICE_MEMORY => VulkanError::OutOfMemory {
                        requested: requirements.size,
                    },
                    other => VulkanError::Api(other),
                })?
        };

        Ok(Self {
            device: device.clone(),
            memory,
            size: requirements.size,
            properties: memory_properties.memory_types[type_index as usize].property_flags,
        })
    }

    /// Get the device memory handle
    pub fn handle(&self) -> vk::DeviceMemory {
        self.memory
    }

    /// Get the allocation size in bytes
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    /// Capability flags of the memory type this allocation came from
    pub fn properties(&self) -> vk::MemoryPropertyFlags {
        self.properties
    }

    /// Whether the host can map this allocation
    pub fn is_host_visible(&self) -> bool {
        self.properties
            .contains(vk::MemoryPropertyFlags::HOST_VISIBLE)
    }

    /// Map a range of the allocation as a byte slice
    ///
    /// The returned guard unmaps on drop, so the mapping is released even if
    /// the caller's read/write logic bails out early. The range must lie
    /// within the allocation and the memory type must be host-visible.
    pub fn map(&self, offset: vk::DeviceSize, size: vk::DeviceSize) -> VulkanResult<MappedMemory> {
        if !self.is_host_visible() {
            return Err(VulkanError::InvalidOperation {
                reason: "cannot map memory that is not host-visible".to_string(),
            });
        }
        if offset + size > self.size {
            return Err(VulkanError::InvalidOperation {
                reason: format!(
                    "mapped range {}..{} exceeds allocation of {} bytes",
                    offset,
                    offset + size,
                    self.size
                ),
            });
        }

        let ptr = unsafe {
            self.device
                .map_memory(self.memory, offset, size, vk::MemoryMapFlags::empty())
                .map_err(VulkanError::Api)?
        };

        Ok(MappedMemory {
            allocation: self,
            ptr: ptr.cast::<u8>(),
            len: size as usize,
        })
    }
}

impl Drop for MemoryAllocation {
    fn drop(&mut self) {
        unsafe {
            self.device.free_memory(self.memory, None);
        }
    }
}

/// Scoped view over mapped device memory
///
/// Derefs to `[u8]` for reading and writing. Unmaps when dropped.
pub struct MappedMemory<'a> {
    allocation: &'a MemoryAllocation,
    ptr: *mut u8,
    len: usize,
}

impl Deref for MappedMemory<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.ptr, self.len) }
    }
}

impl DerefMut for MappedMemory<'_> {
    fn deref_mut(&mut self) -> &mut [u8] {
        unsafe { std::slice::from_raw_parts_mut(self.ptr, self.len) }
    }
}

impl Drop for MappedMemory<'_> {
    fn drop(&mut self) {
        unsafe {
            self.allocation.device.unmap_memory(self.allocation.memory);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_properties(
        types: &[vk::MemoryPropertyFlags],
    ) -> vk::PhysicalDeviceMemoryProperties {
        let mut properties = vk::PhysicalDeviceMemoryProperties::default();
        properties.memory_type_count = types.len() as u32;
        for (i, &flags) in types.iter().enumerate() {
            properties.memory_types[i] = vk::MemoryType {
                property_flags: flags,
                heap_index: 0,
            };
        }
        properties
    }

    #[test]
    fn test_find_host_visible_coherent_type() {
        let properties = memory_properties(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        ]);

        let index = find_memory_type_index(&properties, u32::MAX, |flags| {
            flags.contains(
                vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            )
        })
        .unwrap();

        assert_eq!(index, 1);
    }

    #[test]
    fn test_type_mask_excludes_candidates() {
        let properties = memory_properties(&[
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        ]);

        // Mask only admits index 1 even though index 0 also matches the predicate.
        let index = find_memory_type_index(&properties, 0b10, |flags| {
            flags.contains(vk::MemoryPropertyFlags::HOST_VISIBLE)
        })
        .unwrap();

        assert_eq!(index, 1);
    }

    #[test]
    fn test_no_suitable_memory_type() {
        let properties = memory_properties(&[vk::MemoryPropertyFlags::DEVICE_LOCAL]);

        let result = find_memory_type_index(&properties, u32::MAX, |flags| {
            flags.contains(vk::MemoryPropertyFlags::HOST_VISIBLE)
        });

        assert!(matches!(result, Err(VulkanError::NoSuitableMemoryType)));
    }

    #[test]
    fn test_first_matching_type_wins() {
        let host = vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;
        let properties = memory_properties(&[host, host, host]);

        let index = find_memory_type_index(&properties, u32::MAX, |flags| {
            flags.contains(vk::MemoryPropertyFlags::HOST_VISIBLE)
        })
        .unwrap();

        assert_eq!(index, 0);
    }
}
