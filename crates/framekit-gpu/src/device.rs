//! The device seam the frame loop is written against.
//!
//! [`GraphicsDevice`] covers everything the swapchain manager, the frame
//! orchestrator and render systems need from the GPU: command buffers,
//! synchronization objects, presentation, attachments, pipelines, buffers
//! and the handful of recording commands they issue. [`crate::VulkanDevice`]
//! implements it on top of ash; `MockDevice` (feature `mock`) implements it
//! in memory for tests.
//!
//! Creation and recording methods are safe to call with handles obtained
//! from the same device. Destruction methods are `unsafe`: the caller must
//! guarantee the handle is no longer referenced by pending GPU work.

use ash::prelude::VkResult;
use ash::vk;

use crate::error::Result;
use crate::pipeline::{GraphicsPipeline, GraphicsPipelineConfig};
use crate::surface::SurfaceCapabilities;

/// Parameters for beginning a render pass instance.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RenderPassBegin {
    pub render_pass: vk::RenderPass,
    pub framebuffer: vk::Framebuffer,
    /// Render area, always anchored at the origin.
    pub extent: vk::Extent2D,
    /// Clear value for the color attachment (RGBA).
    pub clear_color: [f32; 4],
    /// Clear value for the depth aspect.
    pub clear_depth: f32,
    /// Clear value for the stencil aspect.
    pub clear_stencil: u32,
}

/// GPU operations used by the frame loop and render systems.
pub trait GraphicsDevice {
    // -- Device ----------------------------------------------------------

    /// Block until all queues are idle.
    fn wait_idle(&self) -> Result<()>;

    /// Format support on the physical device.
    fn format_properties(&self, format: vk::Format) -> vk::FormatProperties;

    // -- Command buffers -------------------------------------------------

    /// Allocate `count` primary command buffers from the device's pool.
    fn allocate_command_buffers(&self, count: u32) -> Result<Vec<vk::CommandBuffer>>;

    /// Return command buffers to the device's pool as one batch.
    ///
    /// # Safety
    /// None of the buffers may be pending execution.
    unsafe fn free_command_buffers(&self, command_buffers: &[vk::CommandBuffer]);

    /// Begin recording, implicitly resetting the buffer.
    fn begin_command_buffer(&self, command_buffer: vk::CommandBuffer) -> Result<()>;

    /// Finish recording.
    fn end_command_buffer(&self, command_buffer: vk::CommandBuffer) -> Result<()>;

    // -- Synchronization -------------------------------------------------

    fn create_semaphore(&self) -> Result<vk::Semaphore>;

    /// # Safety
    /// The semaphore must not be in use.
    unsafe fn destroy_semaphore(&self, semaphore: vk::Semaphore);

    fn create_fence(&self, signaled: bool) -> Result<vk::Fence>;

    /// # Safety
    /// The fence must not be in use.
    unsafe fn destroy_fence(&self, fence: vk::Fence);

    /// Block until the fence is signaled or the timeout expires.
    fn wait_for_fence(&self, fence: vk::Fence, timeout_ns: u64) -> Result<()>;

    /// Return the fence to the unsignaled state.
    fn reset_fence(&self, fence: vk::Fence) -> Result<()>;

    // -- Presentation ----------------------------------------------------

    /// The surface swapchains are created for.
    fn surface(&self) -> vk::SurfaceKHR;

    /// Current capabilities, formats and present modes of the surface.
    fn surface_capabilities(&self) -> Result<SurfaceCapabilities>;

    fn create_swapchain(&self, info: &vk::SwapchainCreateInfoKHR<'_>)
        -> Result<vk::SwapchainKHR>;

    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> Result<Vec<vk::Image>>;

    /// # Safety
    /// No image of the swapchain may be in use.
    unsafe fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR);

    /// Raw acquire result; `Ok((index, suboptimal))` on success.
    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        timeout_ns: u64,
        semaphore: vk::Semaphore,
    ) -> VkResult<(u32, bool)>;

    /// Submit command buffers to the graphics queue.
    fn queue_submit(
        &self,
        command_buffers: &[vk::CommandBuffer],
        wait_semaphores: &[vk::Semaphore],
        wait_stages: &[vk::PipelineStageFlags],
        signal_semaphores: &[vk::Semaphore],
        fence: vk::Fence,
    ) -> Result<()>;

    /// Raw present result; `Ok(suboptimal)` on success.
    fn queue_present(
        &self,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait_semaphores: &[vk::Semaphore],
    ) -> VkResult<bool>;

    // -- Attachments -----------------------------------------------------

    /// Create a device-local image with its own memory allocation.
    fn create_image(&self, info: &vk::ImageCreateInfo<'_>, name: &str) -> Result<vk::Image>;

    /// # Safety
    /// The image must not be in use.
    unsafe fn destroy_image(&self, image: vk::Image);

    fn create_image_view(&self, info: &vk::ImageViewCreateInfo<'_>) -> Result<vk::ImageView>;

    /// # Safety
    /// The view must not be in use.
    unsafe fn destroy_image_view(&self, view: vk::ImageView);

    fn create_render_pass(&self, info: &vk::RenderPassCreateInfo<'_>) -> Result<vk::RenderPass>;

    /// # Safety
    /// The render pass must not be in use.
    unsafe fn destroy_render_pass(&self, render_pass: vk::RenderPass);

    fn create_framebuffer(&self, info: &vk::FramebufferCreateInfo<'_>)
        -> Result<vk::Framebuffer>;

    /// # Safety
    /// The framebuffer must not be in use.
    unsafe fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer);

    // -- Pipelines and buffers -------------------------------------------

    /// Build a graphics pipeline compatible with `render_pass`.
    fn create_graphics_pipeline(
        &self,
        config: &GraphicsPipelineConfig,
        render_pass: vk::RenderPass,
        push_constant_ranges: &[vk::PushConstantRange],
    ) -> Result<GraphicsPipeline>;

    /// # Safety
    /// The pipeline must not be in use.
    unsafe fn destroy_graphics_pipeline(&self, pipeline: &GraphicsPipeline);

    /// Create a device-local buffer and upload `data` into it.
    ///
    /// Blocks until the upload has completed.
    fn create_buffer_with_data(
        &self,
        usage: vk::BufferUsageFlags,
        data: &[u8],
        name: &str,
    ) -> Result<vk::Buffer>;

    /// # Safety
    /// The buffer must not be in use.
    unsafe fn destroy_buffer(&self, buffer: vk::Buffer);

    // -- Recording -------------------------------------------------------

    fn cmd_set_viewport(&self, command_buffer: vk::CommandBuffer, viewport: vk::Viewport);

    fn cmd_set_scissor(&self, command_buffer: vk::CommandBuffer, scissor: vk::Rect2D);

    fn cmd_begin_render_pass(&self, command_buffer: vk::CommandBuffer, begin: &RenderPassBegin);

    fn cmd_end_render_pass(&self, command_buffer: vk::CommandBuffer);

    fn cmd_bind_pipeline(&self, command_buffer: vk::CommandBuffer, pipeline: vk::Pipeline);

    fn cmd_push_constants(
        &self,
        command_buffer: vk::CommandBuffer,
        layout: vk::PipelineLayout,
        stages: vk::ShaderStageFlags,
        data: &[u8],
    );

    fn cmd_bind_vertex_buffer(&self, command_buffer: vk::CommandBuffer, buffer: vk::Buffer);

    fn cmd_bind_index_buffer(&self, command_buffer: vk::CommandBuffer, buffer: vk::Buffer);

    fn cmd_draw(&self, command_buffer: vk::CommandBuffer, vertex_count: u32);

    fn cmd_draw_indexed(&self, command_buffer: vk::CommandBuffer, index_count: u32);
}
