//! Instance and logical device ownership.

use crate::command::CommandPool;
use crate::error::{GpuError, Result};
use crate::instance::{create_instance, select_physical_device};
use crate::memory::GpuAllocator;
use ash::vk;
use parking_lot::Mutex;
use std::ffi::CStr;
use std::sync::Arc;

/// Instance, logical device, graphics queue, command pool and allocator.
pub struct GpuContext {
    pub(crate) entry: ash::Entry,
    pub(crate) instance: ash::Instance,
    pub(crate) physical_device: vk::PhysicalDevice,
    pub(crate) device: Arc<ash::Device>,
    pub(crate) allocator: Mutex<GpuAllocator>,
    pub(crate) command_pool: CommandPool,
    pub(crate) graphics_queue_family: u32,
    pub(crate) graphics_queue: vk::Queue,
    pub(crate) device_name: String,
}

impl GpuContext {
    pub const fn entry(&self) -> &ash::Entry {
        &self.entry
    }

    pub const fn instance(&self) -> &ash::Instance {
        &self.instance
    }

    /// Get the Vulkan device handle.
    pub fn device(&self) -> &ash::Device {
        &self.device
    }

    pub const fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    /// The graphics queue. Presentation goes through it too.
    pub const fn graphics_queue(&self) -> vk::Queue {
        self.graphics_queue
    }

    /// Family index of [`Self::graphics_queue`].
    pub const fn graphics_queue_family(&self) -> u32 {
        self.graphics_queue_family
    }

    /// Pool for graphics command buffers; buffers can be reset individually.
    pub const fn command_pool(&self) -> &CommandPool {
        &self.command_pool
    }

    /// Shared allocator for buffers and depth images.
    pub const fn allocator(&self) -> &Mutex<GpuAllocator> {
        &self.allocator
    }

    /// Name of the selected physical device.
    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// Wait for device to be idle.
    #[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
    pub fn wait_idle(&self) -> Result<()> {
        // SAFETY: the device is valid for the lifetime of the context.
        unsafe { self.device.device_wait_idle()? };
        Ok(())
    }
}

impl Drop for GpuContext {
    fn drop(&mut self) {
        // SAFETY: teardown happens once, after every user of the device is gone.
        unsafe {
            let _ = self.device.device_wait_idle();

            self.command_pool.destroy(&self.device);

            // Frees all VkDeviceMemory; must precede device destruction.
            self.allocator.lock().shutdown();

            self.device.destroy_device(None);
            self.instance.destroy_instance(None);
        }
    }
}

/// Builder for creating a GPU context.
pub struct GpuContextBuilder {
    app_name: String,
    enable_validation: bool,
}

impl Default for GpuContextBuilder {
    fn default() -> Self {
        Self {
            app_name: "framekit".to_string(),
            enable_validation: cfg!(debug_assertions),
        }
    }
}

impl GpuContextBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the application name.
    #[must_use]
    pub fn app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = name.into();
        self
    }

    /// Enable or disable validation layers.
    #[must_use]
    pub const fn validation(mut self, enable: bool) -> Self {
        self.enable_validation = enable;
        self
    }

    /// Build the GPU context.
    pub fn build(self) -> Result<GpuContext> {
        // SAFETY: loading the system Vulkan library.
        let entry = unsafe { ash::Entry::load() }
            .map_err(|e| GpuError::Other(format!("Failed to load Vulkan: {e}")))?;

        // SAFETY: entry was just loaded.
        let instance = unsafe { create_instance(&entry, &self.app_name, self.enable_validation) }?;

        // SAFETY: instance was just created.
        let physical_device = unsafe { select_physical_device(&instance) }?;

        // SAFETY: physical device was enumerated from this instance.
        let properties = unsafe { instance.get_physical_device_properties(physical_device) };
        let device_name = properties
            .device_name_as_c_str()
            .map_or_else(|_| "unknown".to_string(), |n| n.to_string_lossy().into_owned());
        tracing::info!("Selected GPU: {device_name}");

        // SAFETY: as above.
        let families =
            unsafe { instance.get_physical_device_queue_family_properties(physical_device) };
        let graphics_queue_family =
            graphics_family(&families).ok_or(GpuError::NoSuitableDevice)?;

        // SAFETY: as above.
        let device = unsafe { create_device(&instance, physical_device, graphics_queue_family)? };
        // SAFETY: the family was requested with one queue.
        let graphics_queue = unsafe { device.get_device_queue(graphics_queue_family, 0) };
        let device = Arc::new(device);

        // SAFETY: device was just created on this family.
        let command_pool = unsafe {
            CommandPool::new(
                &device,
                graphics_queue_family,
                vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
            )
        }?;

        // SAFETY: instance, device and physical device are valid and related.
        let allocator = unsafe { GpuAllocator::new(&instance, device.clone(), physical_device) }?;

        Ok(GpuContext {
            entry,
            instance,
            physical_device,
            device,
            allocator: Mutex::new(allocator),
            command_pool,
            graphics_queue_family,
            graphics_queue,
            device_name,
        })
    }
}

/// First queue family that can record graphics work.
fn graphics_family(families: &[vk::QueueFamilyProperties]) -> Option<u32> {
    families
        .iter()
        .position(|family| family.queue_flags.contains(vk::QueueFlags::GRAPHICS))
        .and_then(|index| u32::try_from(index).ok())
}

const DEVICE_EXTENSIONS: [&CStr; 1] = [ash::khr::swapchain::NAME];

/// Logical device with one queue from `graphics_queue_family`.
///
/// # Safety
/// The instance and physical device must be valid.
unsafe fn create_device(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
    graphics_queue_family: u32,
) -> Result<ash::Device> {
    let priorities = [1.0_f32];
    let queues = [vk::DeviceQueueCreateInfo::default()
        .queue_family_index(graphics_queue_family)
        .queue_priorities(&priorities)];
    let extensions = DEVICE_EXTENSIONS.map(CStr::as_ptr);
    let features = vk::PhysicalDeviceFeatures::default();

    let info = vk::DeviceCreateInfo::default()
        .queue_create_infos(&queues)
        .enabled_extension_names(&extensions)
        .enabled_features(&features);

    // SAFETY: forwarded to the caller.
    Ok(unsafe { instance.create_device(physical_device, &info, None)? })
}
