//! Device memory for buffers and images, backed by `gpu-allocator`.

use crate::error::{GpuError, Result};
use ash::vk;
use gpu_allocator::vulkan::{
    Allocation, AllocationCreateDesc, AllocationScheme, Allocator, AllocatorCreateDesc,
};
use gpu_allocator::{AllocationSizes, AllocatorDebugSettings, MemoryLocation};
use std::sync::Arc;

fn allocation_error(e: impl std::fmt::Display) -> GpuError {
    GpuError::AllocationFailed(e.to_string())
}

/// Sub-allocates device memory for the buffers and images the renderer owns.
///
/// Must be shut down before the logical device is destroyed.
pub struct GpuAllocator {
    allocator: Option<Allocator>,
    device: Arc<ash::Device>,
}

impl GpuAllocator {
    /// # Safety
    /// `device` must have been created from `instance` and `physical_device`.
    pub unsafe fn new(
        instance: &ash::Instance,
        device: Arc<ash::Device>,
        physical_device: vk::PhysicalDevice,
    ) -> Result<Self> {
        let debug_settings = AllocatorDebugSettings {
            log_memory_information: cfg!(debug_assertions),
            log_leaks_on_shutdown: true,
            ..Default::default()
        };
        let allocator = Allocator::new(&AllocatorCreateDesc {
            instance: instance.clone(),
            device: (*device).clone(),
            physical_device,
            debug_settings,
            buffer_device_address: false,
            allocation_sizes: AllocationSizes::default(),
        })
        .map_err(allocation_error)?;

        Ok(Self {
            allocator: Some(allocator),
            device,
        })
    }

    fn allocate(
        &mut self,
        name: &str,
        requirements: vk::MemoryRequirements,
        location: MemoryLocation,
        linear: bool,
    ) -> Result<Allocation> {
        let allocator = self
            .allocator
            .as_mut()
            .ok_or_else(|| GpuError::InvalidState("allocator already shut down".to_string()))?;
        allocator
            .allocate(&AllocationCreateDesc {
                name,
                requirements,
                location,
                linear,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            })
            .map_err(allocation_error)
    }

    fn release(&mut self, allocation: Allocation) -> Result<()> {
        match self.allocator.as_mut() {
            Some(allocator) => allocator.free(allocation).map_err(allocation_error),
            // Shutdown already reclaimed the memory.
            None => Ok(()),
        }
    }

    /// Create a buffer with exclusive sharing and bind fresh memory to it.
    pub fn create_buffer(
        &mut self,
        size: u64,
        usage: vk::BufferUsageFlags,
        location: MemoryLocation,
        name: &str,
    ) -> Result<GpuBuffer> {
        let info = vk::BufferCreateInfo {
            size,
            usage,
            sharing_mode: vk::SharingMode::EXCLUSIVE,
            ..Default::default()
        };
        // SAFETY: the device outlives the allocator.
        let buffer = unsafe { self.device.create_buffer(&info, None)? };
        // SAFETY: `buffer` was just created on this device.
        let requirements = unsafe { self.device.get_buffer_memory_requirements(buffer) };

        let bound = self
            .allocate(name, requirements, location, true)
            .and_then(|allocation| {
                // SAFETY: the allocation satisfies the buffer's requirements.
                match unsafe {
                    self.device
                        .bind_buffer_memory(buffer, allocation.memory(), allocation.offset())
                } {
                    Ok(()) => Ok(allocation),
                    Err(e) => {
                        self.release(allocation)?;
                        Err(GpuError::from(e))
                    }
                }
            });

        match bound {
            Ok(allocation) => Ok(GpuBuffer {
                buffer,
                allocation,
                size,
            }),
            Err(e) => {
                // SAFETY: never used.
                unsafe { self.device.destroy_buffer(buffer, None) };
                Err(e)
            }
        }
    }

    /// Create an optimally tiled image and bind fresh memory to it.
    pub fn create_image(
        &mut self,
        info: &vk::ImageCreateInfo<'_>,
        location: MemoryLocation,
        name: &str,
    ) -> Result<GpuImage> {
        // SAFETY: the device outlives the allocator.
        let image = unsafe { self.device.create_image(info, None)? };
        // SAFETY: `image` was just created on this device.
        let requirements = unsafe { self.device.get_image_memory_requirements(image) };

        let bound = self
            .allocate(name, requirements, location, false)
            .and_then(|allocation| {
                // SAFETY: the allocation satisfies the image's requirements.
                match unsafe {
                    self.device
                        .bind_image_memory(image, allocation.memory(), allocation.offset())
                } {
                    Ok(()) => Ok(allocation),
                    Err(e) => {
                        self.release(allocation)?;
                        Err(GpuError::from(e))
                    }
                }
            });

        match bound {
            Ok(allocation) => Ok(GpuImage {
                image,
                allocation,
                format: info.format,
                extent: info.extent,
            }),
            Err(e) => {
                // SAFETY: never used.
                unsafe { self.device.destroy_image(image, None) };
                Err(e)
            }
        }
    }

    /// Destroy `buffer` and return its memory.
    ///
    /// The caller guarantees no pending GPU work reads the buffer.
    pub fn free_buffer(&mut self, buffer: GpuBuffer) -> Result<()> {
        // SAFETY: forwarded to the caller.
        unsafe { self.device.destroy_buffer(buffer.buffer, None) };
        self.release(buffer.allocation)
    }

    /// Destroy `image` and return its memory.
    ///
    /// The caller guarantees no pending GPU work uses the image.
    pub fn free_image(&mut self, image: GpuImage) -> Result<()> {
        // SAFETY: forwarded to the caller.
        unsafe { self.device.destroy_image(image.image, None) };
        self.release(image.allocation)
    }

    /// Drop the allocator. Allocations still outstanding are reported as leaks.
    pub fn shutdown(&mut self) {
        self.allocator = None;
    }
}

impl Drop for GpuAllocator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// A buffer and the memory bound to it.
pub struct GpuBuffer {
    pub buffer: vk::Buffer,
    allocation: Allocation,
    pub size: u64,
}

impl GpuBuffer {
    /// Copy `data` to the start of a host-visible buffer.
    pub fn upload(&mut self, data: &[u8]) -> Result<()> {
        if data.len() as u64 > self.size {
            return Err(GpuError::InvalidState(format!(
                "upload of {} bytes into a {} byte buffer",
                data.len(),
                self.size
            )));
        }
        let mapped = self.allocation.mapped_slice_mut().ok_or_else(|| {
            GpuError::InvalidState("upload to a buffer that is not host visible".to_string())
        })?;
        mapped[..data.len()].copy_from_slice(data);
        Ok(())
    }
}

/// An image and the memory bound to it.
pub struct GpuImage {
    pub image: vk::Image,
    allocation: Allocation,
    pub format: vk::Format,
    pub extent: vk::Extent3D,
}
