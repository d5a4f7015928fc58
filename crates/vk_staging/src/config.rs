//! Configuration types
//!
//! Small serializable config structs with sensible defaults, so applications
//! can load context and stager settings from their own config files.

use serde::{Deserialize, Serialize};

/// Configuration for [`VulkanContext`](crate::context::VulkanContext) creation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Application name reported to the Vulkan driver
    pub app_name: String,
    /// Enable validation layers and the debug messenger (debug builds only)
    pub enable_validation: bool,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            app_name: "vk_staging".to_string(),
            enable_validation: true,
        }
    }
}

impl ContextConfig {
    /// Create a config with the given application name
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
            ..Self::default()
        }
    }
}

/// Configuration for [`MemoryStager`](crate::stager::MemoryStager) creation
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StagerConfig {
    /// Initial staging buffer capacity in bytes
    ///
    /// The staging buffer grows by doubling whenever a larger transfer is
    /// requested and never shrinks, so this only needs to cover typical
    /// small transfers. A zero value is treated as one byte.
    pub initial_capacity: u64,
}

impl Default for StagerConfig {
    fn default() -> Self {
        Self {
            initial_capacity: 1024,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_stager_capacity() {
        assert_eq!(StagerConfig::default().initial_capacity, 1024);
    }

    #[test]
    fn test_default_context_config() {
        let config = ContextConfig::default();
        assert_eq!(config.app_name, "vk_staging");
        assert!(config.enable_validation);
    }

    #[test]
    fn test_stager_config_ron_round_trip() {
        let config = StagerConfig {
            initial_capacity: 4096,
        };
        let text = ron::to_string(&config).unwrap();
        let parsed: StagerConfig = ron::from_str(&text).unwrap();
        assert_eq!(parsed.initial_capacity, 4096);
    }
}
