//! Image resources and transfer regions
//!
//! Mirrors the buffer module: an unbound [`Image`] plus an [`AllocatedImage`]
//! that owns its memory. [`ImageCopyRegion`] carries the parameters an image
//! transfer needs beyond a plain byte range: the expected layout, buffer
//! packing, subresource selection and the 3D sub-region.

use ash::{vk, Device};

use crate::error::{VulkanError, VulkanResult};
use crate::memory::MemoryAllocation;

/// Unbound GPU image
pub struct Image {
    device: Device,
    image: vk::Image,
    extent: vk::Extent3D,
    format: vk::Format,
}

impl Image {
    /// Create an image with no memory bound
    ///
    /// Single mip level, single array layer, one sample, exclusive sharing,
    /// `UNDEFINED` initial layout. The image type is inferred from the
    /// extent: depth 1 gives a 2D image, anything else a 3D image.
    pub fn new(
        device: &Device,
        extent: vk::Extent3D,
        format: vk::Format,
        tiling: vk::ImageTiling,
        usage: vk::ImageUsageFlags,
    ) -> VulkanResult<Self> {
        let image_type = if extent.depth == 1 {
            vk::ImageType::TYPE_2D
        } else {
            vk::ImageType::TYPE_3D
        };

        let image_info = vk::ImageCreateInfo::builder()
            .image_type(image_type)
            .extent(extent)
            .mip_levels(1)
            .array_layers(1)
            .format(format)
            .tiling(tiling)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .samples(vk::SampleCountFlags::TYPE_1);

        let image = unsafe {
            device
                .create_image(&image_info, None)
                .map_err(VulkanError::Api)?
        };

        Ok(Self {
            device: device.clone(),
            image,
            extent,
            format,
        })
    }

    /// Memory requirements for binding this image
    pub fn memory_requirements(&self) -> vk::MemoryRequirements {
        unsafe { self.device.get_image_memory_requirements(self.image) }
    }

    /// Bind the image to a memory allocation
    pub fn bind(self, memory: MemoryAllocation) -> VulkanResult<AllocatedImage> {
        unsafe {
            self.device
                .bind_image_memory(self.image, memory.handle(), 0)
                .map_err(VulkanError::Api)?;
        }

        Ok(AllocatedImage {
            memory,
            image: self,
        })
    }

    /// Get the image handle
    pub fn handle(&self) -> vk::Image {
        self.image
    }

    /// Get the image extent
    pub fn extent(&self) -> vk::Extent3D {
        self.extent
    }

    /// Get the image format
    pub fn format(&self) -> vk::Format {
        self.format
    }
}

impl Drop for Image {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_image(self.image, None);
        }
    }
}

/// Image bound to its own memory allocation
///
/// As with buffers, the allocation is freed before the image handle is
/// destroyed.
pub struct AllocatedImage {
    memory: MemoryAllocation,
    image: Image,
}

impl AllocatedImage {
    /// Create an image and bind it to freshly allocated memory
    pub fn new(
        device: &Device,
        memory_properties: &vk::PhysicalDeviceMemoryProperties,
        extent: vk::Extent3D,
        format: vk::Format,
        tiling: vk::ImageTiling,
        usage: vk::ImageUsageFlags,
        predicate: impl Fn(vk::MemoryPropertyFlags) -> bool,
    ) -> VulkanResult<Self> {
        let image = Image::new(device, extent, format, tiling, usage)?;
        let memory = MemoryAllocation::allocate(
            device,
            memory_properties,
            image.memory_requirements(),
            predicate,
        )?;
        image.bind(memory)
    }

    /// Get the image handle
    pub fn handle(&self) -> vk::Image {
        self.image.handle()
    }

    /// Get the image extent
    pub fn extent(&self) -> vk::Extent3D {
        self.image.extent()
    }

    /// Get the image format
    pub fn format(&self) -> vk::Format {
        self.image.format()
    }

    /// The memory allocation backing this image
    pub fn memory(&self) -> &MemoryAllocation {
        &self.memory
    }
}

/// Parameters for one buffer/image transfer
///
/// `layout` must match the image's actual current layout at transfer time;
/// that is the caller's responsibility and is not validated here.
/// `buffer_row_length` and `buffer_image_height` of 0 mean tightly packed.
#[derive(Debug, Clone, Copy)]
pub struct ImageCopyRegion {
    /// Layout the image is expected to be in during the transfer
    pub layout: vk::ImageLayout,
    /// Texel row stride in the buffer, 0 for tightly packed
    pub buffer_row_length: u32,
    /// Texel column stride in the buffer, 0 for tightly packed
    pub buffer_image_height: u32,
    /// Aspect mask, mip level and array layer range being transferred
    pub subresource: vk::ImageSubresourceLayers,
    /// Offset of the transferred sub-region
    pub offset: vk::Offset3D,
    /// Extent of the transferred sub-region
    pub extent: vk::Extent3D,
}

impl ImageCopyRegion {
    /// Tightly packed region covering a full 2D color image
    ///
    /// Defaults to `TRANSFER_DST_OPTIMAL` for uploads; set `layout` to
    /// `TRANSFER_SRC_OPTIMAL` for downloads.
    pub fn color_2d(width: u32, height: u32) -> Self {
        Self {
            layout: vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            buffer_row_length: 0,
            buffer_image_height: 0,
            subresource: vk::ImageSubresourceLayers {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                mip_level: 0,
                base_array_layer: 0,
                layer_count: 1,
            },
            offset: vk::Offset3D { x: 0, y: 0, z: 0 },
            extent: vk::Extent3D {
                width,
                height,
                depth: 1,
            },
        }
    }

    /// Same region with a different expected layout
    pub fn with_layout(mut self, layout: vk::ImageLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Build the native copy description, always staged at buffer offset 0
    pub(crate) fn to_buffer_image_copy(self) -> vk::BufferImageCopy {
        vk::BufferImageCopy {
            buffer_offset: 0,
            buffer_row_length: self.buffer_row_length,
            buffer_image_height: self.buffer_image_height,
            image_subresource: self.subresource,
            image_offset: self.offset,
            image_extent: self.extent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_2d_is_tightly_packed() {
        let region = ImageCopyRegion::color_2d(64, 32);

        assert_eq!(region.buffer_row_length, 0);
        assert_eq!(region.buffer_image_height, 0);
        assert_eq!(region.layout, vk::ImageLayout::TRANSFER_DST_OPTIMAL);
        assert_eq!(region.subresource.aspect_mask, vk::ImageAspectFlags::COLOR);
        assert_eq!(region.subresource.layer_count, 1);
        assert_eq!(region.extent.width, 64);
        assert_eq!(region.extent.height, 32);
        assert_eq!(region.extent.depth, 1);
    }

    #[test]
    fn test_with_layout_overrides_layout_only() {
        let region = ImageCopyRegion::color_2d(8, 8)
            .with_layout(vk::ImageLayout::TRANSFER_SRC_OPTIMAL);

        assert_eq!(region.layout, vk::ImageLayout::TRANSFER_SRC_OPTIMAL);
        assert_eq!(region.extent.width, 8);
    }

    #[test]
    fn test_to_buffer_image_copy_maps_fields() {
        let mut region = ImageCopyRegion::color_2d(16, 16);
        region.buffer_row_length = 32;
        region.offset = vk::Offset3D { x: 4, y: 2, z: 0 };

        let copy = region.to_buffer_image_copy();

        assert_eq!(copy.buffer_offset, 0);
        assert_eq!(copy.buffer_row_length, 32);
        assert_eq!(copy.image_offset.x, 4);
        assert_eq!(copy.image_offset.y, 2);
        assert_eq!(copy.image_extent.width, 16);
    }
}
