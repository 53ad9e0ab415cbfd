//! Window surfaces and what they can present.

use crate::context::GpuContext;
use crate::error::{GpuError, Result};
use crate::swapchain::{select_present_mode, select_surface_format};
use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

/// A `VkSurfaceKHR` for one window, with the instance-level loader that
/// queries and destroys it.
pub struct SurfaceContext {
    surface: vk::SurfaceKHR,
    loader: ash::khr::surface::Instance,
}

impl SurfaceContext {
    /// Create a surface for `window`.
    ///
    /// # Safety
    /// The window must outlive the returned surface.
    pub unsafe fn from_window<W>(gpu: &GpuContext, window: &W) -> Result<Self>
    where
        W: HasDisplayHandle + HasWindowHandle,
    {
        let handle_error = |what: &str, e: raw_window_handle::HandleError| {
            GpuError::SurfaceCreation(format!("window has no {what} handle: {e}"))
        };
        let display = window
            .display_handle()
            .map_err(|e| handle_error("display", e))?
            .as_raw();
        let window = window
            .window_handle()
            .map_err(|e| handle_error("window", e))?
            .as_raw();

        // SAFETY: both handles come from a live window that outlives the surface.
        let surface = unsafe {
            ash_window::create_surface(gpu.entry(), gpu.instance(), display, window, None)
        }
        .map_err(|e| GpuError::SurfaceCreation(format!("vkCreateSurfaceKHR: {e}")))?;

        Ok(Self {
            surface,
            loader: ash::khr::surface::Instance::new(gpu.entry(), gpu.instance()),
        })
    }

    pub const fn handle(&self) -> vk::SurfaceKHR {
        self.surface
    }

    /// Whether `queue_family` can present to this surface.
    pub fn supports_queue_family(&self, gpu: &GpuContext, queue_family: u32) -> Result<bool> {
        // SAFETY: surface and physical device belong to the same instance.
        Ok(unsafe {
            self.loader.get_physical_device_surface_support(
                gpu.physical_device(),
                queue_family,
                self.surface,
            )?
        })
    }

    /// Fresh capabilities, formats and present modes.
    ///
    /// The current extent changes with the window, so this is queried on
    /// every swapchain creation.
    pub fn capabilities(&self, gpu: &GpuContext) -> Result<SurfaceCapabilities> {
        let physical_device = gpu.physical_device();
        // SAFETY: surface and physical device belong to the same instance.
        unsafe {
            Ok(SurfaceCapabilities {
                capabilities: self
                    .loader
                    .get_physical_device_surface_capabilities(physical_device, self.surface)?,
                formats: self
                    .loader
                    .get_physical_device_surface_formats(physical_device, self.surface)?,
                present_modes: self
                    .loader
                    .get_physical_device_surface_present_modes(physical_device, self.surface)?,
            })
        }
    }

    /// # Safety
    /// No swapchain created for the surface may still exist.
    pub unsafe fn destroy(&self) {
        // SAFETY: forwarded to the caller.
        unsafe { self.loader.destroy_surface(self.surface, None) };
    }
}

/// One snapshot of what a surface supports.
#[derive(Clone, Debug, Default)]
pub struct SurfaceCapabilities {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SurfaceCapabilities {
    /// Preferred color format, if the surface reports any.
    pub fn recommended_format(&self) -> Option<vk::SurfaceFormatKHR> {
        select_surface_format(&self.formats)
    }

    pub fn recommended_present_mode(&self, vsync: bool) -> vk::PresentModeKHR {
        select_present_mode(&self.present_modes, vsync)
    }
}
