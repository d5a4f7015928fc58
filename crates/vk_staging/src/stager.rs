//! Staged host/device memory transfers
//!
//! [`MemoryStager`] is the per-device helper that routes transfers between
//! host memory and device-local resources. It lazily owns a single reusable
//! host-visible staging buffer that grows by doubling and never shrinks, plus
//! a dedicated command pool on a transfer-capable queue.
//!
//! Every staged transfer is synchronous: the copy is submitted and the
//! calling thread blocks until the queue is idle, so buffer contents are
//! visible to the caller the moment a call returns. This trades throughput
//! for a simple ordering model; back-to-back staged transfers never overlap.
//!
//! # Thread safety
//!
//! The stager is not thread-safe. The staging buffer and command pool are
//! mutated in place without locking, which is why every entry point takes
//! `&mut self`.

use ash::{vk, Device};
use bytemuck::{Pod, Zeroable};

use crate::buffer::AllocatedBuffer;
use crate::commands::{CommandPool, CommandRecorder};
use crate::config::StagerConfig;
use crate::error::{VulkanError, VulkanResult};
use crate::image::{AllocatedImage, ImageCopyRegion};

/// Grow `capacity` by doubling until it covers `min_size`
///
/// A capacity of zero is treated as one byte so doubling can make progress.
fn grown_capacity(capacity: vk::DeviceSize, min_size: vk::DeviceSize) -> vk::DeviceSize {
    let mut capacity = capacity.max(1);
    while capacity < min_size {
        capacity *= 2;
    }
    capacity
}

/// Per-device staging buffer and transfer queue
///
/// Owns exactly one staging buffer at a time; growing the buffer releases
/// the old one before allocating its replacement. References returned by
/// [`acquire`](Self::acquire) must not be cached across calls, since any
/// larger request replaces the buffer (the borrow checker enforces this).
pub struct MemoryStager {
    device: Device,
    memory_properties: vk::PhysicalDeviceMemoryProperties,
    queue: vk::Queue,
    command_pool: CommandPool,
    staging: Option<AllocatedBuffer>,
    capacity: vk::DeviceSize,
}

impl MemoryStager {
    /// Create a stager with its own command pool and initial staging buffer
    ///
    /// `queue` must belong to `queue_family_index` and the family must
    /// support transfer operations. Fails with
    /// [`VulkanError::NoSuitableMemoryType`] if the device exposes no
    /// host-visible, host-coherent memory type.
    pub fn new(
        device: Device,
        memory_properties: vk::PhysicalDeviceMemoryProperties,
        queue: vk::Queue,
        queue_family_index: u32,
        config: StagerConfig,
    ) -> VulkanResult<Self> {
        let command_pool = CommandPool::new(device.clone(), queue_family_index)?;

        let capacity = config.initial_capacity.max(1);
        let staging = Self::create_staging(&device, &memory_properties, capacity)?;
        log::debug!("Created staging buffer of {} bytes", capacity);

        Ok(Self {
            device,
            memory_properties,
            queue,
            command_pool,
            staging: Some(staging),
            capacity,
        })
    }

    /// Current staging buffer capacity in bytes
    pub fn capacity(&self) -> vk::DeviceSize {
        self.capacity
    }

    /// Get a staging buffer with capacity of at least `min_size` bytes
    ///
    /// Reuses the held buffer when it is already large enough (including for
    /// `min_size` of zero); otherwise doubles the capacity until it fits,
    /// releasing the old buffer before allocating the replacement so two
    /// staging buffers are never held at once.
    pub fn acquire(&mut self, min_size: vk::DeviceSize) -> VulkanResult<&AllocatedBuffer> {
        if self.staging.is_none() || self.capacity < min_size {
            let new_capacity = grown_capacity(self.capacity, min_size);
            log::debug!(
                "Growing staging buffer {} -> {} bytes for a {} byte transfer",
                self.capacity,
                new_capacity,
                min_size
            );

            // Release the old buffer before its replacement exists.
            self.staging = None;
            self.staging = Some(Self::create_staging(
                &self.device,
                &self.memory_properties,
                new_capacity,
            )?);
            self.capacity = new_capacity;
        }

        self.staging.as_ref().ok_or_else(|| VulkanError::InvalidOperation {
            reason: "staging buffer missing after acquisition".to_string(),
        })
    }

    fn create_staging(
        device: &Device,
        memory_properties: &vk::PhysicalDeviceMemoryProperties,
        size: vk::DeviceSize,
    ) -> VulkanResult<AllocatedBuffer> {
        AllocatedBuffer::new(
            device,
            memory_properties,
            size,
            vk::BufferUsageFlags::TRANSFER_SRC | vk::BufferUsageFlags::TRANSFER_DST,
            |flags| {
                flags.contains(
                    vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
                )
            },
        )
    }

    /// Record and run a one-shot command sequence on the transfer queue
    ///
    /// Allocates a single-use command buffer, records it through `record`,
    /// submits, then blocks until the queue is idle. The command buffer is
    /// freed on every exit path. No timeout: a hung device hangs the caller.
    pub fn run_once<F>(&mut self, record: F) -> VulkanResult<()>
    where
        F: FnOnce(&mut CommandRecorder) -> VulkanResult<()>,
    {
        let mut recorder = self.command_pool.begin_single_time()?;
        let command_buffer = recorder.handle();

        let result = record(&mut recorder)
            .and_then(|()| recorder.end())
            .and_then(|()| self.submit_and_wait(command_buffer));

        self.command_pool.free_command_buffers(&[command_buffer]);
        result
    }

    fn submit_and_wait(&self, command_buffer: vk::CommandBuffer) -> VulkanResult<()> {
        let command_buffers = [command_buffer];
        let submit_info = vk::SubmitInfo::builder().command_buffers(&command_buffers);

        unsafe {
            self.device
                .queue_submit(self.queue, &[submit_info.build()], vk::Fence::null())
                .map_err(VulkanError::Api)?;
            self.device
                .queue_wait_idle(self.queue)
                .map_err(VulkanError::Api)?;
        }

        Ok(())
    }

    /// Write bytes into a buffer, staging the transfer if necessary
    ///
    /// Host-visible targets are mapped directly at `offset` and handed to
    /// `fill`; the staging buffer is not touched. Otherwise `fill` writes
    /// into the staging buffer and a one-shot copy moves the bytes into the
    /// target, returning only once the copy has completed.
    pub fn write_buffer<F>(
        &mut self,
        target: &AllocatedBuffer,
        offset: vk::DeviceSize,
        size: vk::DeviceSize,
        fill: F,
    ) -> VulkanResult<()>
    where
        F: FnOnce(&mut [u8]),
    {
        if target.memory().is_host_visible() {
            let mut mapped = target.memory().map(offset, size)?;
            fill(&mut mapped);
            return Ok(());
        }

        let staging_handle = {
            let staging = self.acquire(size)?;
            let handle = staging.handle();
            let mut mapped = staging.memory().map(0, size)?;
            fill(&mut mapped);
            handle
        };

        let target_handle = target.handle();
        self.run_once(|recorder| {
            recorder.copy_buffer(
                staging_handle,
                target_handle,
                &[vk::BufferCopy {
                    src_offset: 0,
                    dst_offset: offset,
                    size,
                }],
            );
            Ok(())
        })
    }

    /// Read bytes out of a buffer, staging the transfer if necessary
    ///
    /// Host-visible targets are mapped directly. Otherwise a one-shot copy
    /// moves the bytes into the staging buffer first, and `read` sees them
    /// after the queue-idle wait.
    pub fn read_buffer<F>(
        &mut self,
        target: &AllocatedBuffer,
        offset: vk::DeviceSize,
        size: vk::DeviceSize,
        read: F,
    ) -> VulkanResult<()>
    where
        F: FnOnce(&[u8]),
    {
        if target.memory().is_host_visible() {
            let mapped = target.memory().map(offset, size)?;
            read(&mapped);
            return Ok(());
        }

        let staging_handle = self.acquire(size)?.handle();
        let target_handle = target.handle();
        self.run_once(|recorder| {
            recorder.copy_buffer(
                target_handle,
                staging_handle,
                &[vk::BufferCopy {
                    src_offset: offset,
                    dst_offset: 0,
                    size,
                }],
            );
            Ok(())
        })?;

        // Capacity is already sufficient, so this returns the same buffer.
        let staging = self.acquire(size)?;
        let mapped = staging.memory().map(0, size)?;
        read(&mapped);
        Ok(())
    }

    /// Write bytes into an image region, staging the transfer if necessary
    ///
    /// `size` is the byte span of the region as laid out in the buffer. For
    /// the staged path the image must already be in `region.layout`
    /// (typically `TRANSFER_DST_OPTIMAL`); that is not validated here. The
    /// direct path maps the image allocation from offset zero and assumes
    /// linear tiling.
    pub fn write_image<F>(
        &mut self,
        target: &AllocatedImage,
        region: ImageCopyRegion,
        size: vk::DeviceSize,
        fill: F,
    ) -> VulkanResult<()>
    where
        F: FnOnce(&mut [u8]),
    {
        if target.memory().is_host_visible() {
            let mut mapped = target.memory().map(0, size)?;
            fill(&mut mapped);
            return Ok(());
        }

        let staging_handle = {
            let staging = self.acquire(size)?;
            let handle = staging.handle();
            let mut mapped = staging.memory().map(0, size)?;
            fill(&mut mapped);
            handle
        };

        let target_handle = target.handle();
        self.run_once(|recorder| {
            recorder.copy_buffer_to_image(
                staging_handle,
                target_handle,
                region.layout,
                &[region.to_buffer_image_copy()],
            );
            Ok(())
        })
    }

    /// Read bytes out of an image region, staging the transfer if necessary
    ///
    /// For the staged path the image must already be in `region.layout`
    /// (typically `TRANSFER_SRC_OPTIMAL`).
    pub fn read_image<F>(
        &mut self,
        target: &AllocatedImage,
        region: ImageCopyRegion,
        size: vk::DeviceSize,
        read: F,
    ) -> VulkanResult<()>
    where
        F: FnOnce(&[u8]),
    {
        if target.memory().is_host_visible() {
            let mapped = target.memory().map(0, size)?;
            read(&mapped);
            return Ok(());
        }

        let staging_handle = self.acquire(size)?.handle();
        let target_handle = target.handle();
        self.run_once(|recorder| {
            recorder.copy_image_to_buffer(
                target_handle,
                region.layout,
                staging_handle,
                &[region.to_buffer_image_copy()],
            );
            Ok(())
        })?;

        let staging = self.acquire(size)?;
        let mapped = staging.memory().map(0, size)?;
        read(&mapped);
        Ok(())
    }

    /// Write a typed slice into a buffer through the routed upload path
    pub fn write_buffer_data<T: Pod>(
        &mut self,
        target: &AllocatedBuffer,
        offset: vk::DeviceSize,
        data: &[T],
    ) -> VulkanResult<()> {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        self.write_buffer(target, offset, bytes.len() as vk::DeviceSize, |dst| {
            dst.copy_from_slice(bytes);
        })
    }

    /// Read `count` typed elements from a buffer through the routed download path
    pub fn read_buffer_data<T: Pod>(
        &mut self,
        target: &AllocatedBuffer,
        offset: vk::DeviceSize,
        count: usize,
    ) -> VulkanResult<Vec<T>> {
        let mut out = vec![T::zeroed(); count];
        let size = (count * std::mem::size_of::<T>()) as vk::DeviceSize;
        self.read_buffer(target, offset, size, |src| {
            bytemuck::cast_slice_mut(&mut out).copy_from_slice(src);
        })?;
        Ok(out)
    }

    /// Write a typed slice into an image region through the routed upload path
    pub fn write_image_data<T: Pod>(
        &mut self,
        target: &AllocatedImage,
        region: ImageCopyRegion,
        data: &[T],
    ) -> VulkanResult<()> {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        self.write_image(target, region, bytes.len() as vk::DeviceSize, |dst| {
            dst.copy_from_slice(bytes);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_growth_doubles_until_sufficient() {
        // 1024 -> 2048, one doubling
        assert_eq!(grown_capacity(1024, 2000), 2048);
        // 2048 -> 4096 -> 8192, two doublings
        assert_eq!(grown_capacity(2048, 5000), 8192);
    }

    #[test]
    fn test_no_growth_when_capacity_sufficient() {
        assert_eq!(grown_capacity(1024, 0), 1024);
        assert_eq!(grown_capacity(1024, 1024), 1024);
        assert_eq!(grown_capacity(1024, 512), 1024);
    }

    #[test]
    fn test_growth_handles_zero_capacity() {
        assert_eq!(grown_capacity(0, 3), 4);
        assert_eq!(grown_capacity(0, 0), 1);
    }

    #[test]
    fn test_growth_is_monotonic_and_sufficient() {
        let sizes = [1u64, 100, 1000, 1024, 4097, 1 << 20];
        for &current in &sizes {
            for &requested in &sizes {
                let grown = grown_capacity(current, requested);
                assert!(grown >= requested);
                assert!(grown >= current);
                // Growth only happens when the current capacity is short.
                if current >= requested {
                    assert_eq!(grown, current.max(1));
                }
            }
        }
    }

    #[test]
    fn test_sequential_requests_never_undershoot_single_request() {
        let start = 1024u64;
        let (size1, size2) = (2000u64, 5000u64);

        let stepped = grown_capacity(grown_capacity(start, size1), size2);
        let direct = grown_capacity(start, size2);
        assert!(stepped >= direct);
    }
}
