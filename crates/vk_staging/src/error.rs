//! Error types for Vulkan resource and transfer operations
//!
//! All fallible operations in this crate return [`VulkanResult`]. Failures are
//! surfaced synchronously to the immediate caller; nothing is retried locally.

use ash::vk;
use thiserror::Error;

/// Vulkan-specific error types
#[derive(Error, Debug)]
pub enum VulkanError {
    /// General Vulkan API error with result code
    #[error("Vulkan API error {0:?}: {desc}", desc = describe(.0))]
    Api(vk::Result),

    /// Invalid operation attempted
    #[error("Invalid operation: {reason}")]
    InvalidOperation {
        /// Description of why the operation is invalid
        reason: String,
    },

    /// Memory allocation failed on the host or device
    #[error("Out of memory: {requested} bytes")]
    OutOfMemory {
        /// Number of bytes that were requested
        requested: u64,
    },

    /// Context initialization failed
    #[error("Initialization failed: {0}")]
    InitializationFailed(String),

    /// No memory type satisfies the requested capability flags
    #[error("No suitable memory type found")]
    NoSuitableMemoryType,

    /// No queue family on the device supports transfer operations
    #[error("No queue family with transfer support")]
    NoTransferQueue,
}

/// Result type for Vulkan operations
pub type VulkanResult<T> = Result<T, VulkanError>;

/// Human-readable descriptions for the status codes this crate can encounter
fn describe(result: &vk::Result) -> &'static str {
    match *result {
        vk::Result::ERROR_OUT_OF_HOST_MEMORY => "a host memory allocation has failed",
        vk::Result::ERROR_OUT_OF_DEVICE_MEMORY => "a device memory allocation has failed",
        vk::Result::ERROR_INITIALIZATION_FAILED => {
            "initialization of an object could not be completed"
        }
        vk::Result::ERROR_DEVICE_LOST => "the logical or physical device has been lost",
        vk::Result::ERROR_MEMORY_MAP_FAILED => "mapping of a memory object has failed",
        vk::Result::ERROR_LAYER_NOT_PRESENT => "a requested layer is not present",
        vk::Result::ERROR_EXTENSION_NOT_PRESENT => "a requested extension is not supported",
        vk::Result::ERROR_FEATURE_NOT_PRESENT => "a requested feature is not supported",
        vk::Result::ERROR_INCOMPATIBLE_DRIVER => "the driver is incompatible",
        vk::Result::ERROR_TOO_MANY_OBJECTS => "too many objects of this type already created",
        vk::Result::TIMEOUT => "a wait operation has not completed in the specified time",
        _ => "unrecognized status code",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_includes_description() {
        let error = VulkanError::Api(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY);
        let message = error.to_string();
        assert!(message.contains("ERROR_OUT_OF_DEVICE_MEMORY"));
        assert!(message.contains("device memory allocation has failed"));
    }

    #[test]
    fn test_unknown_status_falls_back() {
        let error = VulkanError::Api(vk::Result::ERROR_FRAGMENTED_POOL);
        assert!(error.to_string().contains("unrecognized status code"));
    }

    #[test]
    fn test_capability_errors_display() {
        assert_eq!(
            VulkanError::NoSuitableMemoryType.to_string(),
            "No suitable memory type found"
        );
        assert_eq!(
            VulkanError::NoTransferQueue.to_string(),
            "No queue family with transfer support"
        );
    }

    #[test]
    fn test_out_of_memory_reports_requested_size() {
        let error = VulkanError::OutOfMemory { requested: 4096 };
        assert_eq!(error.to_string(), "Out of memory: 4096 bytes");
    }
}
