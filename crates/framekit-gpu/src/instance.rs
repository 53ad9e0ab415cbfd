//! Vulkan instance creation and physical device selection.

use crate::error::{GpuError, Result};
use ash::vk;
use std::ffi::{CStr, CString};

/// Minimum Vulkan version the renderer targets.
pub const API_VERSION: u32 = vk::API_VERSION_1_2;

/// Required instance extensions for windowed presentation.
pub fn required_instance_extensions() -> Vec<&'static CStr> {
    vec![
        ash::khr::surface::NAME,
        #[cfg(target_os = "windows")]
        ash::khr::win32_surface::NAME,
        #[cfg(target_os = "linux")]
        ash::khr::xlib_surface::NAME,
        #[cfg(target_os = "linux")]
        ash::khr::wayland_surface::NAME,
        #[cfg(target_os = "macos")]
        ash::ext::metal_surface::NAME,
        #[cfg(target_os = "macos")]
        ash::khr::portability_enumeration::NAME,
    ]
}

/// Validation layers to enable when requested.
pub fn validation_layers() -> Vec<&'static CStr> {
    vec![c"VK_LAYER_KHRONOS_validation"]
}

/// Create a Vulkan instance.
///
/// Requested validation layers that are not installed are skipped with a warning.
///
/// # Safety
/// The entry must be a valid Vulkan entry point.
pub unsafe fn create_instance(
    entry: &ash::Entry,
    app_name: &str,
    enable_validation: bool,
) -> Result<ash::Instance> {
    let app_name = CString::new(app_name)
        .map_err(|e| GpuError::Other(format!("Invalid application name: {e}")))?;

    let app_info = vk::ApplicationInfo::default()
        .application_name(&app_name)
        .application_version(vk::make_api_version(0, 0, 1, 0))
        .engine_name(c"framekit")
        .engine_version(vk::make_api_version(0, 0, 1, 0))
        .api_version(API_VERSION);

    let extension_names: Vec<*const std::ffi::c_char> = required_instance_extensions()
        .iter()
        .map(|ext| ext.as_ptr())
        .collect();

    let requested = if enable_validation {
        validation_layers()
    } else {
        vec![]
    };

    // SAFETY: forwarded to the caller.
    let available_layers = unsafe { entry.enumerate_instance_layer_properties()? };
    let layers: Vec<&CStr> = requested
        .into_iter()
        .filter(|layer| {
            let found = available_layers
                .iter()
                .any(|props| props.layer_name_as_c_str().is_ok_and(|name| name == *layer));
            if !found {
                tracing::warn!("Validation layer {} not available", layer.to_string_lossy());
            }
            found
        })
        .collect();

    let layer_names: Vec<*const std::ffi::c_char> = layers.iter().map(|l| l.as_ptr()).collect();

    // Required for MoltenVK on macOS
    #[cfg(target_os = "macos")]
    let create_flags = vk::InstanceCreateFlags::ENUMERATE_PORTABILITY_KHR;
    #[cfg(not(target_os = "macos"))]
    let create_flags = vk::InstanceCreateFlags::empty();

    let create_info = vk::InstanceCreateInfo::default()
        .application_info(&app_info)
        .enabled_extension_names(&extension_names)
        .enabled_layer_names(&layer_names)
        .flags(create_flags);

    // SAFETY: forwarded to the caller.
    let instance = unsafe { entry.create_instance(&create_info, None)? };

    Ok(instance)
}

/// What device selection looks at for one physical device.
#[derive(Clone, Copy, Debug)]
struct DeviceCandidate {
    device_type: vk::PhysicalDeviceType,
    api_version: u32,
    has_swapchain: bool,
    device_local_bytes: u64,
}

impl DeviceCandidate {
    /// # Safety
    /// `device` must have been enumerated from `instance`.
    unsafe fn query(instance: &ash::Instance, device: vk::PhysicalDevice) -> Self {
        // SAFETY: forwarded to the caller.
        let (properties, extensions, memory) = unsafe {
            (
                instance.get_physical_device_properties(device),
                instance
                    .enumerate_device_extension_properties(device)
                    .unwrap_or_default(),
                instance.get_physical_device_memory_properties(device),
            )
        };
        let heaps = memory
            .memory_heaps
            .get(..memory.memory_heap_count as usize)
            .unwrap_or_default();

        Self {
            device_type: properties.device_type,
            api_version: properties.api_version,
            has_swapchain: extensions
                .iter()
                .any(|ext| ext.extension_name_as_c_str().ok() == Some(ash::khr::swapchain::NAME)),
            device_local_bytes: heaps
                .iter()
                .filter(|heap| heap.flags.contains(vk::MemoryHeapFlags::DEVICE_LOCAL))
                .map(|heap| heap.size)
                .sum(),
        }
    }

    /// Higher is better; `None` when the device cannot drive a swapchain.
    fn score(&self) -> Option<u64> {
        if self.api_version < API_VERSION || !self.has_swapchain {
            return None;
        }
        let kind = match self.device_type {
            vk::PhysicalDeviceType::DISCRETE_GPU => 1000,
            vk::PhysicalDeviceType::INTEGRATED_GPU => 100,
            vk::PhysicalDeviceType::VIRTUAL_GPU => 50,
            _ => 0,
        };
        // Memory only breaks ties within a device type.
        Some(kind + self.device_local_bytes / (1 << 30))
    }
}

/// Pick the highest scoring physical device.
///
/// # Safety
/// The instance must be valid.
pub unsafe fn select_physical_device(instance: &ash::Instance) -> Result<vk::PhysicalDevice> {
    // SAFETY: forwarded to the caller.
    let devices = unsafe { instance.enumerate_physical_devices()? };

    devices
        .into_iter()
        .filter_map(|device| {
            // SAFETY: enumerated from `instance` above.
            let candidate = unsafe { DeviceCandidate::query(instance, device) };
            candidate.score().map(|score| (score, device))
        })
        .max_by_key(|(score, _)| *score)
        .map(|(_, device)| device)
        .ok_or(GpuError::NoSuitableDevice)
}

#[cfg(test)]
mod tests {
    use super::*;

    const GIB: u64 = 1 << 30;

    fn candidate(device_type: vk::PhysicalDeviceType, vram_gib: u64) -> DeviceCandidate {
        DeviceCandidate {
            device_type,
            api_version: API_VERSION,
            has_swapchain: true,
            device_local_bytes: vram_gib * GIB,
        }
    }

    #[test]
    fn discrete_beats_integrated_regardless_of_memory() {
        let discrete = candidate(vk::PhysicalDeviceType::DISCRETE_GPU, 2);
        let integrated = candidate(vk::PhysicalDeviceType::INTEGRATED_GPU, 64);
        assert!(discrete.score() > integrated.score());
    }

    #[test]
    fn memory_breaks_ties() {
        let small = candidate(vk::PhysicalDeviceType::DISCRETE_GPU, 4);
        let large = candidate(vk::PhysicalDeviceType::DISCRETE_GPU, 16);
        assert_eq!(large.score(), Some(1016));
        assert!(large.score() > small.score());
    }

    #[test]
    fn devices_without_swapchain_or_api_version_are_rejected() {
        let mut device = candidate(vk::PhysicalDeviceType::DISCRETE_GPU, 8);
        device.has_swapchain = false;
        assert_eq!(device.score(), None);

        device.has_swapchain = true;
        device.api_version = vk::API_VERSION_1_1;
        assert_eq!(device.score(), None);
    }

    #[test]
    fn validation_layer_is_khronos() {
        assert_eq!(validation_layers(), [c"VK_LAYER_KHRONOS_validation"]);
        assert!(required_instance_extensions().contains(&ash::khr::surface::NAME));
    }
}
