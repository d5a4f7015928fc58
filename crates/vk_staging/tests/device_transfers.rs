//! Integration tests against a real Vulkan device
//!
//! These exercise the full staged-transfer paths and therefore need a
//! working Vulkan driver. They are ignored by default; run them with
//! `cargo test -- --ignored` on a machine with a GPU.

use ash::vk;
use vk_staging::prelude::*;

fn test_context() -> VulkanContext {
    let _ = env_logger::builder().is_test(true).try_init();
    VulkanContext::new(&ContextConfig::new("vk_staging tests"))
        .expect("these tests require a Vulkan driver")
}

fn device_local_buffer(context: &VulkanContext, size: vk::DeviceSize) -> AllocatedBuffer {
    context
        .create_allocated_buffer(
            size,
            vk::BufferUsageFlags::TRANSFER_SRC | vk::BufferUsageFlags::TRANSFER_DST,
            |flags| flags.contains(vk::MemoryPropertyFlags::DEVICE_LOCAL),
        )
        .expect("buffer creation failed")
}

#[test]
#[ignore = "requires a Vulkan driver"]
fn test_staged_buffer_round_trip() {
    let mut context = test_context();
    let buffer = device_local_buffer(&context, 4096);

    let pattern: Vec<u32> = (0u32..1024).map(|i| i.wrapping_mul(2_654_435_761)).collect();

    let stager = context.stager().unwrap();
    stager.write_buffer_data(&buffer, 0, &pattern).unwrap();
    let read_back: Vec<u32> = stager.read_buffer_data(&buffer, 0, pattern.len()).unwrap();

    assert_eq!(read_back, pattern);
}

#[test]
#[ignore = "requires a Vulkan driver"]
fn test_host_visible_round_trip_without_staging() {
    let mut context = test_context();
    let buffer = context
        .create_allocated_buffer(256, vk::BufferUsageFlags::TRANSFER_SRC, |flags| {
            flags.contains(
                vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            )
        })
        .unwrap();

    let pattern: Vec<u8> = (0u8..=255).collect();

    let stager = context.stager().unwrap();
    stager.write_buffer_data(&buffer, 0, &pattern).unwrap();
    let read_back: Vec<u8> = stager.read_buffer_data(&buffer, 0, pattern.len()).unwrap();

    assert_eq!(read_back, pattern);
}

#[test]
#[ignore = "requires a Vulkan driver"]
fn test_staging_growth_scenario() {
    let mut context = test_context();
    let stager = context.stager().unwrap();
    assert_eq!(stager.capacity(), 1024);

    stager.acquire(2000).unwrap();
    assert_eq!(stager.capacity(), 2048);

    stager.acquire(5000).unwrap();
    assert_eq!(stager.capacity(), 8192);

    // Non-increasing requests keep the same buffer.
    let handle = stager.acquire(100).unwrap().handle();
    assert_eq!(stager.acquire(8192).unwrap().handle(), handle);
    assert_eq!(stager.capacity(), 8192);
}

#[test]
#[ignore = "requires a Vulkan driver"]
fn test_image_upload_and_download() {
    let mut context = test_context();
    let extent = vk::Extent3D {
        width: 16,
        height: 16,
        depth: 1,
    };
    let image = context
        .create_allocated_image(
            extent,
            vk::Format::R8G8B8A8_UNORM,
            vk::ImageTiling::OPTIMAL,
            vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::TRANSFER_SRC,
            |flags| flags.contains(vk::MemoryPropertyFlags::DEVICE_LOCAL),
        )
        .unwrap();

    let pixels: Vec<u8> = (0..16 * 16 * 4).map(|i| (i % 251) as u8).collect();
    let range = vk::ImageSubresourceRange {
        aspect_mask: vk::ImageAspectFlags::COLOR,
        base_mip_level: 0,
        level_count: 1,
        base_array_layer: 0,
        layer_count: 1,
    };

    let stager = context.stager().unwrap();
    stager
        .run_once(|recorder| {
            recorder.transition_image_layout(
                image.handle(),
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                range,
            )
        })
        .unwrap();

    stager
        .write_image_data(&image, ImageCopyRegion::color_2d(16, 16), &pixels)
        .unwrap();

    stager
        .run_once(|recorder| {
            recorder.transition_image_layout(
                image.handle(),
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                range,
            )
        })
        .unwrap();

    let mut read_back = vec![0u8; pixels.len()];
    stager
        .read_image(
            &image,
            ImageCopyRegion::color_2d(16, 16).with_layout(vk::ImageLayout::TRANSFER_SRC_OPTIMAL),
            pixels.len() as vk::DeviceSize,
            |bytes| read_back.copy_from_slice(bytes),
        )
        .unwrap();

    assert_eq!(read_back, pixels);
}
