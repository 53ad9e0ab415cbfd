//! [`GraphicsDevice`] implementation on real hardware.

use ash::prelude::VkResult;
use ash::vk;
use gpu_allocator::MemoryLocation;
use hashbrown::HashMap;
use parking_lot::Mutex;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

use crate::command::execute_single_time_commands;
use crate::context::GpuContext;
use crate::device::{GraphicsDevice, RenderPassBegin};
use crate::error::{GpuError, Result};
use crate::memory::{GpuBuffer, GpuImage};
use crate::pipeline::{GraphicsPipeline, GraphicsPipelineConfig};
use crate::surface::{SurfaceCapabilities, SurfaceContext};

/// A [`GpuContext`] bound to one window surface.
///
/// Images and buffers created through the trait keep their allocations
/// here, keyed by handle, until destroyed.
pub struct VulkanDevice {
    surface: SurfaceContext,
    swapchain_loader: ash::khr::swapchain::Device,
    images: Mutex<HashMap<vk::Image, GpuImage>>,
    buffers: Mutex<HashMap<vk::Buffer, GpuBuffer>>,
    gpu: GpuContext,
}

impl VulkanDevice {
    /// Bind `gpu` to `surface`.
    ///
    /// Fails if the graphics queue cannot present to the surface.
    pub fn new(gpu: GpuContext, surface: SurfaceContext) -> Result<Self> {
        if !surface.supports_queue_family(&gpu, gpu.graphics_queue_family())? {
            // SAFETY: no swapchain exists for the surface yet.
            unsafe { surface.destroy() };
            return Err(GpuError::SurfaceCreation(
                "graphics queue cannot present to the window surface".to_string(),
            ));
        }

        let swapchain_loader = ash::khr::swapchain::Device::new(gpu.instance(), gpu.device());

        Ok(Self {
            surface,
            swapchain_loader,
            images: Mutex::new(HashMap::new()),
            buffers: Mutex::new(HashMap::new()),
            gpu,
        })
    }

    /// Create the surface for `window` and bind `gpu` to it.
    ///
    /// # Safety
    /// The window must outlive the returned device.
    pub unsafe fn from_window<W>(gpu: GpuContext, window: &W) -> Result<Self>
    where
        W: HasDisplayHandle + HasWindowHandle,
    {
        // SAFETY: forwarded to the caller.
        let surface = unsafe { SurfaceContext::from_window(&gpu, window)? };
        Self::new(gpu, surface)
    }

    /// The underlying context.
    pub const fn gpu(&self) -> &GpuContext {
        &self.gpu
    }

    fn raw(&self) -> &ash::Device {
        self.gpu.device()
    }
}

impl Drop for VulkanDevice {
    fn drop(&mut self) {
        let _ = self.gpu.wait_idle();

        let mut allocator = self.gpu.allocator().lock();
        for (_, image) in self.images.get_mut().drain() {
            if let Err(e) = allocator.free_image(image) {
                tracing::warn!("Failed to free image on shutdown: {e}");
            }
        }
        for (_, buffer) in self.buffers.get_mut().drain() {
            if let Err(e) = allocator.free_buffer(buffer) {
                tracing::warn!("Failed to free buffer on shutdown: {e}");
            }
        }
        drop(allocator);

        // SAFETY: swapchain owners are dropped before the device.
        unsafe { self.surface.destroy() };
    }
}

impl GraphicsDevice for VulkanDevice {
    #[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
    fn wait_idle(&self) -> Result<()> {
        self.gpu.wait_idle()
    }

    fn format_properties(&self, format: vk::Format) -> vk::FormatProperties {
        // SAFETY: the physical device belongs to this instance.
        unsafe {
            self.gpu
                .instance()
                .get_physical_device_format_properties(self.gpu.physical_device(), format)
        }
    }

    fn allocate_command_buffers(&self, count: u32) -> Result<Vec<vk::CommandBuffer>> {
        // SAFETY: the pool was created on this device.
        unsafe { self.gpu.command_pool().allocate_command_buffers(self.raw(), count) }
    }

    unsafe fn free_command_buffers(&self, command_buffers: &[vk::CommandBuffer]) {
        // SAFETY: forwarded to the caller.
        unsafe {
            self.gpu
                .command_pool()
                .free_command_buffers(self.raw(), command_buffers);
        }
    }

    fn begin_command_buffer(&self, command_buffer: vk::CommandBuffer) -> Result<()> {
        let begin_info = vk::CommandBufferBeginInfo::default();
        // SAFETY: the pool allows per-buffer reset, which begin performs implicitly.
        unsafe { self.raw().begin_command_buffer(command_buffer, &begin_info)? };
        Ok(())
    }

    fn end_command_buffer(&self, command_buffer: vk::CommandBuffer) -> Result<()> {
        // SAFETY: buffer is in the recording state.
        unsafe { self.raw().end_command_buffer(command_buffer)? };
        Ok(())
    }

    fn create_semaphore(&self) -> Result<vk::Semaphore> {
        let create_info = vk::SemaphoreCreateInfo::default();
        // SAFETY: valid device.
        Ok(unsafe { self.raw().create_semaphore(&create_info, None)? })
    }

    unsafe fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        // SAFETY: forwarded to the caller.
        unsafe { self.raw().destroy_semaphore(semaphore, None) };
    }

    fn create_fence(&self, signaled: bool) -> Result<vk::Fence> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let create_info = vk::FenceCreateInfo::default().flags(flags);
        // SAFETY: valid device.
        Ok(unsafe { self.raw().create_fence(&create_info, None)? })
    }

    unsafe fn destroy_fence(&self, fence: vk::Fence) {
        // SAFETY: forwarded to the caller.
        unsafe { self.raw().destroy_fence(fence, None) };
    }

    #[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
    fn wait_for_fence(&self, fence: vk::Fence, timeout_ns: u64) -> Result<()> {
        // SAFETY: fence was created on this device.
        unsafe { self.raw().wait_for_fences(&[fence], true, timeout_ns)? };
        Ok(())
    }

    fn reset_fence(&self, fence: vk::Fence) -> Result<()> {
        // SAFETY: fence was created on this device and has been waited on.
        unsafe { self.raw().reset_fences(&[fence])? };
        Ok(())
    }

    fn surface(&self) -> vk::SurfaceKHR {
        self.surface.handle()
    }

    fn surface_capabilities(&self) -> Result<SurfaceCapabilities> {
        self.surface.capabilities(&self.gpu)
    }

    fn create_swapchain(
        &self,
        info: &vk::SwapchainCreateInfoKHR<'_>,
    ) -> Result<vk::SwapchainKHR> {
        // SAFETY: the surface in `info` belongs to this device.
        unsafe { self.swapchain_loader.create_swapchain(info, None) }
            .map_err(|e| GpuError::SwapchainCreation(e.to_string()))
    }

    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> Result<Vec<vk::Image>> {
        // SAFETY: swapchain was created by this loader.
        Ok(unsafe { self.swapchain_loader.get_swapchain_images(swapchain)? })
    }

    unsafe fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR) {
        // SAFETY: forwarded to the caller.
        unsafe { self.swapchain_loader.destroy_swapchain(swapchain, None) };
    }

    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        timeout_ns: u64,
        semaphore: vk::Semaphore,
    ) -> VkResult<(u32, bool)> {
        // SAFETY: swapchain and semaphore were created on this device.
        unsafe {
            self.swapchain_loader
                .acquire_next_image(swapchain, timeout_ns, semaphore, vk::Fence::null())
        }
    }

    fn queue_submit(
        &self,
        command_buffers: &[vk::CommandBuffer],
        wait_semaphores: &[vk::Semaphore],
        wait_stages: &[vk::PipelineStageFlags],
        signal_semaphores: &[vk::Semaphore],
        fence: vk::Fence,
    ) -> Result<()> {
        let submit_info = vk::SubmitInfo::default()
            .command_buffers(command_buffers)
            .wait_semaphores(wait_semaphores)
            .wait_dst_stage_mask(wait_stages)
            .signal_semaphores(signal_semaphores);

        // SAFETY: all handles were created on this device.
        unsafe {
            self.raw()
                .queue_submit(self.gpu.graphics_queue(), &[submit_info], fence)?;
        }
        Ok(())
    }

    fn queue_present(
        &self,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait_semaphores: &[vk::Semaphore],
    ) -> VkResult<bool> {
        let swapchains = [swapchain];
        let image_indices = [image_index];
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        // SAFETY: the graphics queue was checked for present support.
        unsafe {
            self.swapchain_loader
                .queue_present(self.gpu.graphics_queue(), &present_info)
        }
    }

    fn create_image(&self, info: &vk::ImageCreateInfo<'_>, name: &str) -> Result<vk::Image> {
        let image = self
            .gpu
            .allocator()
            .lock()
            .create_image(info, MemoryLocation::GpuOnly, name)?;
        let handle = image.image;
        self.images.lock().insert(handle, image);
        Ok(handle)
    }

    unsafe fn destroy_image(&self, image: vk::Image) {
        let Some(owned) = self.images.lock().remove(&image) else {
            tracing::warn!("Destroying unknown image {image:?}");
            return;
        };
        if let Err(e) = self.gpu.allocator().lock().free_image(owned) {
            tracing::warn!("Failed to free image: {e}");
        }
    }

    fn create_image_view(&self, info: &vk::ImageViewCreateInfo<'_>) -> Result<vk::ImageView> {
        // SAFETY: the image in `info` belongs to this device.
        Ok(unsafe { self.raw().create_image_view(info, None)? })
    }

    unsafe fn destroy_image_view(&self, view: vk::ImageView) {
        // SAFETY: forwarded to the caller.
        unsafe { self.raw().destroy_image_view(view, None) };
    }

    fn create_render_pass(&self, info: &vk::RenderPassCreateInfo<'_>) -> Result<vk::RenderPass> {
        // SAFETY: valid device.
        Ok(unsafe { self.raw().create_render_pass(info, None)? })
    }

    unsafe fn destroy_render_pass(&self, render_pass: vk::RenderPass) {
        // SAFETY: forwarded to the caller.
        unsafe { self.raw().destroy_render_pass(render_pass, None) };
    }

    fn create_framebuffer(
        &self,
        info: &vk::FramebufferCreateInfo<'_>,
    ) -> Result<vk::Framebuffer> {
        // SAFETY: attachments and render pass belong to this device.
        Ok(unsafe { self.raw().create_framebuffer(info, None)? })
    }

    unsafe fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer) {
        // SAFETY: forwarded to the caller.
        unsafe { self.raw().destroy_framebuffer(framebuffer, None) };
    }

    fn create_graphics_pipeline(
        &self,
        config: &GraphicsPipelineConfig,
        render_pass: vk::RenderPass,
        push_constant_ranges: &[vk::PushConstantRange],
    ) -> Result<GraphicsPipeline> {
        // SAFETY: shader code comes from the build-time compiler.
        unsafe { GraphicsPipeline::new(self.raw(), config, render_pass, push_constant_ranges) }
    }

    unsafe fn destroy_graphics_pipeline(&self, pipeline: &GraphicsPipeline) {
        // SAFETY: forwarded to the caller.
        unsafe { pipeline.destroy(self.raw()) };
    }

    fn create_buffer_with_data(
        &self,
        usage: vk::BufferUsageFlags,
        data: &[u8],
        name: &str,
    ) -> Result<vk::Buffer> {
        if data.is_empty() {
            return Err(GpuError::InvalidState(format!("{name}: empty buffer data")));
        }
        let size = data.len() as u64;

        let mut allocator = self.gpu.allocator().lock();
        let mut staging = allocator.create_buffer(
            size,
            vk::BufferUsageFlags::TRANSFER_SRC,
            MemoryLocation::CpuToGpu,
            &format!("{name} staging"),
        )?;
        let buffer = match allocator.create_buffer(
            size,
            usage | vk::BufferUsageFlags::TRANSFER_DST,
            MemoryLocation::GpuOnly,
            name,
        ) {
            Ok(buffer) => buffer,
            Err(e) => {
                allocator.free_buffer(staging)?;
                return Err(e);
            }
        };
        drop(allocator);

        let uploaded = staging.upload(data).and_then(|()| {
            // SAFETY: both buffers are live and the pool belongs to the graphics queue.
            unsafe {
                execute_single_time_commands(
                    self.raw(),
                    self.gpu.command_pool(),
                    self.gpu.graphics_queue(),
                    |cmd| {
                        let region = vk::BufferCopy::default().size(size);
                        self.raw()
                            .cmd_copy_buffer(cmd, staging.buffer, buffer.buffer, &[region]);
                    },
                )
            }
        });

        let mut allocator = self.gpu.allocator().lock();
        allocator.free_buffer(staging)?;
        if let Err(e) = uploaded {
            allocator.free_buffer(buffer)?;
            return Err(e);
        }
        drop(allocator);

        let handle = buffer.buffer;
        self.buffers.lock().insert(handle, buffer);
        Ok(handle)
    }

    unsafe fn destroy_buffer(&self, buffer: vk::Buffer) {
        let Some(owned) = self.buffers.lock().remove(&buffer) else {
            tracing::warn!("Destroying unknown buffer {buffer:?}");
            return;
        };
        if let Err(e) = self.gpu.allocator().lock().free_buffer(owned) {
            tracing::warn!("Failed to free buffer: {e}");
        }
    }

    fn cmd_set_viewport(&self, command_buffer: vk::CommandBuffer, viewport: vk::Viewport) {
        // SAFETY: buffer is recording.
        unsafe { self.raw().cmd_set_viewport(command_buffer, 0, &[viewport]) };
    }

    fn cmd_set_scissor(&self, command_buffer: vk::CommandBuffer, scissor: vk::Rect2D) {
        // SAFETY: buffer is recording.
        unsafe { self.raw().cmd_set_scissor(command_buffer, 0, &[scissor]) };
    }

    fn cmd_begin_render_pass(&self, command_buffer: vk::CommandBuffer, begin: &RenderPassBegin) {
        let clear_values = [
            vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: begin.clear_color,
                },
            },
            vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: begin.clear_depth,
                    stencil: begin.clear_stencil,
                },
            },
        ];
        let begin_info = vk::RenderPassBeginInfo::default()
            .render_pass(begin.render_pass)
            .framebuffer(begin.framebuffer)
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent: begin.extent,
            })
            .clear_values(&clear_values);

        // SAFETY: buffer is recording outside a render pass.
        unsafe {
            self.raw()
                .cmd_begin_render_pass(command_buffer, &begin_info, vk::SubpassContents::INLINE);
        }
    }

    fn cmd_end_render_pass(&self, command_buffer: vk::CommandBuffer) {
        // SAFETY: buffer is inside a render pass.
        unsafe { self.raw().cmd_end_render_pass(command_buffer) };
    }

    fn cmd_bind_pipeline(&self, command_buffer: vk::CommandBuffer, pipeline: vk::Pipeline) {
        // SAFETY: buffer is recording.
        unsafe {
            self.raw()
                .cmd_bind_pipeline(command_buffer, vk::PipelineBindPoint::GRAPHICS, pipeline);
        }
    }

    fn cmd_push_constants(
        &self,
        command_buffer: vk::CommandBuffer,
        layout: vk::PipelineLayout,
        stages: vk::ShaderStageFlags,
        data: &[u8],
    ) {
        // SAFETY: the layout declares a range covering `data` for `stages`.
        unsafe {
            self.raw()
                .cmd_push_constants(command_buffer, layout, stages, 0, data);
        }
    }

    fn cmd_bind_vertex_buffer(&self, command_buffer: vk::CommandBuffer, buffer: vk::Buffer) {
        // SAFETY: buffer is recording.
        unsafe {
            self.raw()
                .cmd_bind_vertex_buffers(command_buffer, 0, &[buffer], &[0]);
        }
    }

    fn cmd_bind_index_buffer(&self, command_buffer: vk::CommandBuffer, buffer: vk::Buffer) {
        // SAFETY: buffer is recording.
        unsafe {
            self.raw()
                .cmd_bind_index_buffer(command_buffer, buffer, 0, vk::IndexType::UINT32);
        }
    }

    fn cmd_draw(&self, command_buffer: vk::CommandBuffer, vertex_count: u32) {
        // SAFETY: a pipeline and vertex buffer are bound.
        unsafe { self.raw().cmd_draw(command_buffer, vertex_count, 1, 0, 0) };
    }

    fn cmd_draw_indexed(&self, command_buffer: vk::CommandBuffer, index_count: u32) {
        // SAFETY: a pipeline, vertex and index buffer are bound.
        unsafe {
            self.raw()
                .cmd_draw_indexed(command_buffer, index_count, 1, 0, 0, 0);
        }
    }
}
