//! Headless Vulkan context management
//!
//! Owns the instance, physical device selection, logical device and queue
//! needed for transfer work, with RAII teardown in the right order. No
//! surface or swapchain is involved; the context exists to back resource
//! creation and staged transfers.

use ash::{vk, Device, Entry, Instance};
#[cfg(debug_assertions)]
use ash::extensions::ext::DebugUtils;
use std::ffi::{CStr, CString};

use crate::buffer::{AllocatedBuffer, Buffer};
use crate::config::{ContextConfig, StagerConfig};
use crate::error::{VulkanError, VulkanResult};
use crate::image::{AllocatedImage, Image};
use crate::stager::MemoryStager;

/// Vulkan instance wrapper with RAII cleanup
pub struct VulkanInstance {
    /// Vulkan entry point
    pub entry: Entry,
    /// Vulkan instance handle
    pub instance: Instance,
    /// Debug utilities extension (debug builds)
    #[cfg(debug_assertions)]
    debug_utils: Option<DebugUtils>,
    /// Debug messenger handle (debug builds)
    #[cfg(debug_assertions)]
    debug_messenger: Option<vk::DebugUtilsMessengerEXT>,
}

impl VulkanInstance {
    /// Create a headless Vulkan instance, optionally with validation layers
    pub fn new(app_name: &str, enable_validation: bool) -> VulkanResult<Self> {
        let entry = unsafe { Entry::load() }.map_err(|e| {
            VulkanError::InitializationFailed(format!("Failed to load Vulkan: {:?}", e))
        })?;

        let app_name_cstr = CString::new(app_name).map_err(|_| {
            VulkanError::InitializationFailed("Application name contains a NUL byte".to_string())
        })?;
        let engine_name_cstr = CString::new("vk_staging").map_err(|_| {
            VulkanError::InitializationFailed("Engine name contains a NUL byte".to_string())
        })?;
        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name_cstr)
            .application_version(vk::make_api_version(0, 1, 0, 0))
            .engine_name(&engine_name_cstr)
            .engine_version(vk::make_api_version(0, 1, 0, 0))
            .api_version(vk::API_VERSION_1_0);

        #[allow(unused_mut)] // Mutable in debug builds for adding debug extensions
        let mut extensions: Vec<*const i8> = Vec::new();

        #[cfg(debug_assertions)]
        if enable_validation {
            extensions.push(DebugUtils::name().as_ptr());
        }

        let layer_names = if cfg!(debug_assertions) && enable_validation {
            vec![CString::new("VK_LAYER_KHRONOS_validation").map_err(|_| {
                VulkanError::InitializationFailed("Invalid layer name".to_string())
            })?]
        } else {
            vec![]
        };

        let layer_names_ptrs: Vec<*const i8> =
            layer_names.iter().map(|name| name.as_ptr()).collect();

        let create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layer_names_ptrs);

        let instance = unsafe {
            entry
                .create_instance(&create_info, None)
                .map_err(VulkanError::Api)?
        };

        #[cfg(debug_assertions)]
        let (debug_utils, debug_messenger) = if enable_validation {
            let debug_utils = DebugUtils::new(&entry, &instance);
            let debug_messenger = Self::setup_debug_messenger(&debug_utils)?;
            (Some(debug_utils), Some(debug_messenger))
        } else {
            (None, None)
        };

        Ok(Self {
            entry,
            instance,
            #[cfg(debug_assertions)]
            debug_utils,
            #[cfg(debug_assertions)]
            debug_messenger,
        })
    }

    #[cfg(debug_assertions)]
    fn setup_debug_messenger(debug_utils: &DebugUtils) -> VulkanResult<vk::DebugUtilsMessengerEXT> {
        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback));

        unsafe {
            debug_utils
                .create_debug_utils_messenger(&create_info, None)
                .map_err(VulkanError::Api)
        }
    }
}

impl Drop for VulkanInstance {
    fn drop(&mut self) {
        unsafe {
            #[cfg(debug_assertions)]
            if let (Some(debug_utils), Some(debug_messenger)) =
                (&self.debug_utils, &self.debug_messenger)
            {
                debug_utils.destroy_debug_utils_messenger(*debug_messenger, None);
            }

            self.instance.destroy_instance(None);
        }
    }
}

/// Debug callback for validation layers
#[cfg(debug_assertions)]
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    let callback_data = *callback_data;
    let message = CStr::from_ptr(callback_data.p_message).to_string_lossy();

    if message_severity >= vk::DebugUtilsMessageSeverityFlagsEXT::ERROR {
        log::error!("[Vulkan] {:?} - {}", message_type, message);
    } else if message_severity >= vk::DebugUtilsMessageSeverityFlagsEXT::WARNING {
        log::warn!("[Vulkan] {:?} - {}", message_type, message);
    } else {
        log::debug!("[Vulkan] {:?} - {}", message_type, message);
    }

    vk::FALSE
}

/// Whether a queue family can execute transfer commands
///
/// Graphics and compute queues implicitly support transfer, so any of the
/// three flags qualifies.
fn supports_transfer(flags: vk::QueueFlags) -> bool {
    flags.intersects(
        vk::QueueFlags::TRANSFER | vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE,
    )
}

/// First queue family index with transfer support
fn find_transfer_family(queue_families: &[vk::QueueFamilyProperties]) -> Option<u32> {
    queue_families
        .iter()
        .position(|family| supports_transfer(family.queue_flags))
        .map(|index| index as u32)
}

/// Physical device selection and capabilities
pub struct PhysicalDeviceInfo {
    /// Vulkan physical device handle
    pub device: vk::PhysicalDevice,
    /// Device properties and limits
    pub properties: vk::PhysicalDeviceProperties,
    /// Memory types and heaps exposed by the device
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    /// Available queue families
    pub queue_families: Vec<vk::QueueFamilyProperties>,
    /// Index of the transfer-capable queue family
    pub transfer_family: u32,
}

impl PhysicalDeviceInfo {
    /// Select a physical device that can run transfer work
    ///
    /// Picks the first device exposing a transfer-capable queue family and
    /// fails with [`VulkanError::NoTransferQueue`] when none does.
    pub fn select_suitable_device(instance: &Instance) -> VulkanResult<Self> {
        let devices = unsafe {
            instance
                .enumerate_physical_devices()
                .map_err(VulkanError::Api)?
        };

        for device in devices {
            if let Some(device_info) = Self::evaluate_device(instance, device) {
                log::info!("Selected GPU: {}", unsafe {
                    CStr::from_ptr(device_info.properties.device_name.as_ptr()).to_string_lossy()
                });
                log::debug!(
                    "Using transfer queue family {}",
                    device_info.transfer_family
                );
                return Ok(device_info);
            }
        }

        Err(VulkanError::NoTransferQueue)
    }

    fn evaluate_device(instance: &Instance, device: vk::PhysicalDevice) -> Option<Self> {
        let properties = unsafe { instance.get_physical_device_properties(device) };
        let memory_properties =
            unsafe { instance.get_physical_device_memory_properties(device) };
        let queue_families =
            unsafe { instance.get_physical_device_queue_family_properties(device) };

        let transfer_family = find_transfer_family(&queue_families)?;

        Some(Self {
            device,
            properties,
            memory_properties,
            queue_families,
            transfer_family,
        })
    }

    /// First queue family index whose flags contain `required`
    pub fn find_queue_family(&self, required: vk::QueueFlags) -> Option<u32> {
        self.queue_families
            .iter()
            .position(|family| family.queue_flags.contains(required))
            .map(|index| index as u32)
    }
}

/// Logical device wrapper with RAII cleanup
pub struct LogicalDevice {
    /// Vulkan logical device handle
    pub device: Device,
    /// Queue used for transfer submissions
    pub transfer_queue: vk::Queue,
    /// Index of the transfer queue family
    pub transfer_family: u32,
}

impl LogicalDevice {
    /// Create a logical device with one transfer-capable queue
    pub fn new(
        instance: &Instance,
        physical_device_info: &PhysicalDeviceInfo,
    ) -> VulkanResult<Self> {
        let queue_priorities = [1.0];
        let queue_infos = [vk::DeviceQueueCreateInfo::builder()
            .queue_family_index(physical_device_info.transfer_family)
            .queue_priorities(&queue_priorities)
            .build()];

        let device_features = vk::PhysicalDeviceFeatures::builder();

        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_infos)
            .enabled_features(&device_features);

        let device = unsafe {
            instance
                .create_device(physical_device_info.device, &create_info, None)
                .map_err(VulkanError::Api)?
        };

        let transfer_queue =
            unsafe { device.get_device_queue(physical_device_info.transfer_family, 0) };

        Ok(Self {
            device,
            transfer_queue,
            transfer_family: physical_device_info.transfer_family,
        })
    }
}

impl Drop for LogicalDevice {
    fn drop(&mut self) {
        unsafe {
            // Ensure device is idle before destruction
            let _ = self.device.device_wait_idle();
            self.device.destroy_device(None);
        }
    }
}

/// Main Vulkan context that owns all core resources
///
/// Field declaration order is the drop order: the stager goes first, then
/// the logical device, with the instance torn down last.
pub struct VulkanContext {
    stager: Option<MemoryStager>,
    /// Selected physical device information
    pub physical_device: PhysicalDeviceInfo,
    /// Logical device and transfer queue
    pub device: LogicalDevice,
    /// Vulkan instance and debug utilities
    pub instance: VulkanInstance,
}

impl VulkanContext {
    /// Create a headless context ready for resource creation and transfers
    pub fn new(config: &ContextConfig) -> VulkanResult<Self> {
        let instance = VulkanInstance::new(&config.app_name, config.enable_validation)?;
        let physical_device = PhysicalDeviceInfo::select_suitable_device(&instance.instance)?;
        let device = LogicalDevice::new(&instance.instance, &physical_device)?;

        Ok(Self {
            stager: None,
            physical_device,
            device,
            instance,
        })
    }

    /// Get a reference to the Vulkan instance
    pub fn instance(&self) -> &Instance {
        &self.instance.instance
    }

    /// Get the raw logical device handle
    pub fn raw_device(&self) -> Device {
        self.device.device.clone()
    }

    /// Get the physical device info
    pub fn physical_device(&self) -> &PhysicalDeviceInfo {
        &self.physical_device
    }

    /// Memory types and heaps of the selected device
    pub fn memory_properties(&self) -> &vk::PhysicalDeviceMemoryProperties {
        &self.physical_device.memory_properties
    }

    /// Get the transfer queue
    pub fn transfer_queue(&self) -> vk::Queue {
        self.device.transfer_queue
    }

    /// The per-device memory stager, created on first access
    ///
    /// Owned by the context so it is torn down before the device, never
    /// after. Created with [`StagerConfig::default`]; call
    /// [`stager_with_config`](Self::stager_with_config) first to override.
    pub fn stager(&mut self) -> VulkanResult<&mut MemoryStager> {
        self.stager_with_config(StagerConfig::default())
    }

    /// The per-device memory stager, created on first access with `config`
    ///
    /// The config only applies when this call creates the stager; afterwards
    /// the existing instance is returned unchanged.
    pub fn stager_with_config(&mut self, config: StagerConfig) -> VulkanResult<&mut MemoryStager> {
        if self.stager.is_none() {
            let stager = MemoryStager::new(
                self.device.device.clone(),
                self.physical_device.memory_properties,
                self.device.transfer_queue,
                self.device.transfer_family,
                config,
            )?;
            self.stager = Some(stager);
        }

        self.stager.as_mut().ok_or_else(|| VulkanError::InvalidOperation {
            reason: "stager missing after initialization".to_string(),
        })
    }

    /// Create an unbound buffer on this device
    pub fn create_buffer(
        &self,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
    ) -> VulkanResult<Buffer> {
        Buffer::new(&self.device.device, size, usage)
    }

    /// Create a buffer bound to memory chosen by `predicate`
    pub fn create_allocated_buffer(
        &self,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        predicate: impl Fn(vk::MemoryPropertyFlags) -> bool,
    ) -> VulkanResult<AllocatedBuffer> {
        AllocatedBuffer::new(
            &self.device.device,
            &self.physical_device.memory_properties,
            size,
            usage,
            predicate,
        )
    }

    /// Create an unbound image on this device
    pub fn create_image(
        &self,
        extent: vk::Extent3D,
        format: vk::Format,
        tiling: vk::ImageTiling,
        usage: vk::ImageUsageFlags,
    ) -> VulkanResult<Image> {
        Image::new(&self.device.device, extent, format, tiling, usage)
    }

    /// Create an image bound to memory chosen by `predicate`
    pub fn create_allocated_image(
        &self,
        extent: vk::Extent3D,
        format: vk::Format,
        tiling: vk::ImageTiling,
        usage: vk::ImageUsageFlags,
        predicate: impl Fn(vk::MemoryPropertyFlags) -> bool,
    ) -> VulkanResult<AllocatedImage> {
        AllocatedImage::new(
            &self.device.device,
            &self.physical_device.memory_properties,
            extent,
            format,
            tiling,
            usage,
            predicate,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(flags: vk::QueueFlags) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count: 1,
            ..Default::default()
        }
    }

    #[test]
    fn test_graphics_family_supports_transfer() {
        let families = [family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE)];
        assert_eq!(find_transfer_family(&families), Some(0));
    }

    #[test]
    fn test_dedicated_transfer_family() {
        let families = [
            family(vk::QueueFlags::SPARSE_BINDING),
            family(vk::QueueFlags::TRANSFER),
        ];
        assert_eq!(find_transfer_family(&families), Some(1));
    }

    #[test]
    fn test_no_transfer_capable_family() {
        let families = [family(vk::QueueFlags::SPARSE_BINDING)];
        assert_eq!(find_transfer_family(&families), None);
    }

    #[test]
    fn test_compute_only_family_qualifies() {
        let families = [family(vk::QueueFlags::COMPUTE)];
        assert_eq!(find_transfer_family(&families), Some(0));
    }
}
