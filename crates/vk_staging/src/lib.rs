//! # vk_staging
//!
//! Staged host/device memory transfers and RAII resource wrappers for Vulkan,
//! built on [`ash`].
//!
//! The centerpiece is [`MemoryStager`](stager::MemoryStager): a per-device
//! helper that owns one reusable host-visible staging buffer (grown by
//! doubling, never shrunk) and routes uploads and downloads through it
//! whenever the target memory is not host-visible. Around it sit small RAII
//! wrappers for device memory, buffers, images and one-shot transfer command
//! submission.
//!
//! All staged transfers are synchronous: submit, wait for the queue to go
//! idle, return. Simple and strictly ordered, not pipelined.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ash::vk;
//! use vk_staging::prelude::*;
//!
//! fn main() -> VulkanResult<()> {
//!     let mut context = VulkanContext::new(&ContextConfig::default())?;
//!
//!     // A device-local buffer the host cannot map directly.
//!     let buffer = context.create_allocated_buffer(
//!         1024,
//!         vk::BufferUsageFlags::STORAGE_BUFFER
//!             | vk::BufferUsageFlags::TRANSFER_DST
//!             | vk::BufferUsageFlags::TRANSFER_SRC,
//!         |flags| flags.contains(vk::MemoryPropertyFlags::DEVICE_LOCAL),
//!     )?;
//!
//!     // Routed through the staging buffer; visible on return.
//!     let stager = context.stager()?;
//!     stager.write_buffer_data(&buffer, 0, &[1u32, 2, 3, 4])?;
//!     let read_back: Vec<u32> = stager.read_buffer_data(&buffer, 0, 4)?;
//!     assert_eq!(read_back, vec![1, 2, 3, 4]);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod buffer;
pub mod commands;
pub mod config;
pub mod context;
pub mod error;
pub mod image;
pub mod memory;
pub mod stager;

pub use error::{VulkanError, VulkanResult};

/// Common imports for crate users
pub mod prelude {
    pub use crate::{
        buffer::{AllocatedBuffer, Buffer},
        commands::{CommandPool, CommandRecorder},
        config::{ContextConfig, StagerConfig},
        context::{LogicalDevice, PhysicalDeviceInfo, VulkanContext, VulkanInstance},
        error::{VulkanError, VulkanResult},
        image::{AllocatedImage, Image, ImageCopyRegion},
        memory::{MappedMemory, MemoryAllocation},
        stager::MemoryStager,
    };
}
