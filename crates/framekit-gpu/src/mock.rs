//! In-memory [`GraphicsDevice`] for tests.
//!
//! `MockDevice` hands out fake handles and keeps enough bookkeeping to
//! catch protocol mistakes as panics:
//!
//! - every handle is tracked per [`HandleKind`]; destroying an unknown or
//!   already destroyed handle panics, and [`MockDevice::total_live`] exposes
//!   leaks
//! - command buffers move through [`CommandBufferState`]; recording outside
//!   `Recording` or submitting a buffer that is not `Executable` panics
//! - submitted work completes immediately and signals its fence; waiting on
//!   an unsignaled fence panics since nothing could ever signal it, and
//!   submitting with a signaled fence panics
//!
//! Acquire and present results can be scripted, and any creation call can be
//! made to fail after a number of successes.

use std::collections::VecDeque;

use ash::prelude::VkResult;
use ash::vk::{self, Handle};
use hashbrown::{HashMap, HashSet};
use parking_lot::Mutex;

use crate::device::{GraphicsDevice, RenderPassBegin};
use crate::error::{GpuError, Result};
use crate::pipeline::{GraphicsPipeline, GraphicsPipelineConfig};
use crate::surface::SurfaceCapabilities;

const MOCK_SURFACE: u64 = 0x5_0000;

/// Kinds of handles tracked by the mock.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HandleKind {
    CommandBuffer,
    Semaphore,
    Fence,
    Swapchain,
    Image,
    ImageView,
    RenderPass,
    Framebuffer,
    Pipeline,
    PipelineLayout,
    Buffer,
}

/// Operations that can be made to fail.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MockOp {
    AllocateCommandBuffers,
    CreateSemaphore,
    CreateFence,
    CreateSwapchain,
    CreateImage,
    CreateImageView,
    CreateRenderPass,
    CreateFramebuffer,
    CreatePipeline,
    CreateBuffer,
}

/// Call counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MockCounters {
    pub allocate_calls: u32,
    pub free_calls: u32,
    pub wait_idle_calls: u32,
    pub fence_waits: u32,
    pub acquire_calls: u32,
    pub submit_calls: u32,
    pub present_calls: u32,
    pub swapchains_created: u32,
}

/// Lifecycle state of a mock command buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommandBufferState {
    Initial,
    Recording,
    Executable,
}

/// A recorded command, in recording order across all command buffers.
#[derive(Clone, Debug)]
pub enum RecordedCommand {
    SetViewport(vk::Viewport),
    SetScissor(vk::Rect2D),
    BeginRenderPass(RenderPassBegin),
    EndRenderPass,
    BindPipeline(vk::Pipeline),
    PushConstants {
        layout: vk::PipelineLayout,
        stages: vk::ShaderStageFlags,
        data: Vec<u8>,
    },
    BindVertexBuffer(vk::Buffer),
    BindIndexBuffer(vk::Buffer),
    Draw {
        vertex_count: u32,
    },
    DrawIndexed {
        index_count: u32,
    },
}

/// Parameters of a created swapchain.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SwapchainRecord {
    pub handle: vk::SwapchainKHR,
    pub old_swapchain: vk::SwapchainKHR,
    pub extent: vk::Extent2D,
    pub image_count: u32,
    pub format: vk::Format,
    pub present_mode: vk::PresentModeKHR,
}

struct SwapchainEntry {
    images: Vec<vk::Image>,
    next_image: u32,
}

struct MockState {
    next_raw: u64,
    live: HashMap<HandleKind, HashSet<u64>>,
    command_buffers: HashMap<u64, CommandBufferState>,
    fences: HashMap<u64, bool>,
    swapchains: HashMap<u64, SwapchainEntry>,
    buffer_sizes: HashMap<u64, usize>,
    caps: SurfaceCapabilities,
    depth_formats: Vec<vk::Format>,
    acquire_script: VecDeque<VkResult<(u32, bool)>>,
    present_script: VecDeque<VkResult<bool>>,
    faults: HashMap<MockOp, u32>,
    counters: MockCounters,
    commands: Vec<RecordedCommand>,
    swapchain_log: Vec<SwapchainRecord>,
    submitted: Vec<vk::CommandBuffer>,
    presented: Vec<u32>,
}

impl MockState {
    fn next_raw(&mut self) -> u64 {
        self.next_raw += 1;
        self.next_raw
    }

    fn mint(&mut self, kind: HandleKind) -> u64 {
        let raw = self.next_raw();
        self.live.entry(kind).or_default().insert(raw);
        raw
    }

    fn release(&mut self, kind: HandleKind, raw: u64) {
        if raw == 0 {
            return;
        }
        let removed = self.live.get_mut(&kind).is_some_and(|set| set.remove(&raw));
        assert!(
            removed,
            "{kind:?} {raw:#x} destroyed twice or never created"
        );
    }

    fn is_live(&self, kind: HandleKind, raw: u64) -> bool {
        self.live.get(&kind).is_some_and(|set| set.contains(&raw))
    }

    fn fault(&mut self, op: MockOp) -> VkResult<()> {
        if let Some(remaining) = self.faults.get_mut(&op) {
            if *remaining == 0 {
                self.faults.remove(&op);
                return Err(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY);
            }
            *remaining -= 1;
        }
        Ok(())
    }

    fn record(&mut self, command_buffer: vk::CommandBuffer, command: RecordedCommand) {
        let state = self.command_buffers.get(&command_buffer.as_raw()).copied();
        assert_eq!(
            state,
            Some(CommandBufferState::Recording),
            "{command:?} recorded into {command_buffer:?} outside the recording state"
        );
        self.commands.push(command);
    }
}

/// In-memory device; see the module docs.
pub struct MockDevice {
    state: Mutex<MockState>,
}

impl Default for MockDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDevice {
    /// Surface with 2..=8 images, a free extent in 1..=4096, `B8G8R8A8_SRGB`,
    /// all present modes, and every candidate depth format supported.
    pub fn new() -> Self {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 8,
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            min_image_extent: vk::Extent2D {
                width: 1,
                height: 1,
            },
            max_image_extent: vk::Extent2D {
                width: 4096,
                height: 4096,
            },
            max_image_array_layers: 1,
            current_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
            ..Default::default()
        };

        Self {
            state: Mutex::new(MockState {
                next_raw: 0,
                live: HashMap::new(),
                command_buffers: HashMap::new(),
                fences: HashMap::new(),
                swapchains: HashMap::new(),
                buffer_sizes: HashMap::new(),
                caps: SurfaceCapabilities {
                    capabilities,
                    formats: vec![vk::SurfaceFormatKHR {
                        format: vk::Format::B8G8R8A8_SRGB,
                        color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
                    }],
                    present_modes: vec![
                        vk::PresentModeKHR::FIFO,
                        vk::PresentModeKHR::MAILBOX,
                        vk::PresentModeKHR::IMMEDIATE,
                    ],
                },
                depth_formats: crate::swapchain::DEPTH_FORMAT_CANDIDATES.to_vec(),
                acquire_script: VecDeque::new(),
                present_script: VecDeque::new(),
                faults: HashMap::new(),
                counters: MockCounters::default(),
                commands: Vec::new(),
                swapchain_log: Vec::new(),
                submitted: Vec::new(),
                presented: Vec::new(),
            }),
        }
    }

    // -- Configuration ---------------------------------------------------

    /// Make the surface report only `format`.
    pub fn set_surface_format(&self, format: vk::SurfaceFormatKHR) {
        self.state.lock().caps.formats = vec![format];
    }

    /// Depth formats usable as optimal-tiling attachments.
    pub fn set_depth_formats(&self, formats: &[vk::Format]) {
        self.state.lock().depth_formats = formats.to_vec();
    }

    /// Minimum and maximum swapchain image counts; `max == 0` means unbounded.
    pub fn set_image_count_limits(&self, min: u32, max: u32) {
        let mut state = self.state.lock();
        state.caps.capabilities.min_image_count = min;
        state.caps.capabilities.max_image_count = max;
    }

    /// Fixed surface extent, or `None` to let the swapchain pick.
    pub fn set_current_extent(&self, extent: Option<vk::Extent2D>) {
        self.state.lock().caps.capabilities.current_extent = extent.unwrap_or(vk::Extent2D {
            width: u32::MAX,
            height: u32::MAX,
        });
    }

    pub fn set_present_modes(&self, modes: &[vk::PresentModeKHR]) {
        self.state.lock().caps.present_modes = modes.to_vec();
    }

    /// Queue a result for the next acquire; unscripted acquires cycle through images.
    pub fn push_acquire_result(&self, result: VkResult<(u32, bool)>) {
        self.state.lock().acquire_script.push_back(result);
    }

    /// Queue a result for the next present; unscripted presents succeed.
    pub fn push_present_result(&self, result: VkResult<bool>) {
        self.state.lock().present_script.push_back(result);
    }

    /// Let `op` succeed `successes` more times, then fail once with
    /// `ERROR_OUT_OF_DEVICE_MEMORY`.
    pub fn fail_after(&self, op: MockOp, successes: u32) {
        self.state.lock().faults.insert(op, successes);
    }

    // -- Inspection ------------------------------------------------------

    pub fn live_count(&self, kind: HandleKind) -> usize {
        self.state.lock().live.get(&kind).map_or(0, HashSet::len)
    }

    /// Live handles across all kinds.
    pub fn total_live(&self) -> usize {
        self.state.lock().live.values().map(HashSet::len).sum()
    }

    pub fn fence_signaled(&self, fence: vk::Fence) -> bool {
        self.state
            .lock()
            .fences
            .get(&fence.as_raw())
            .copied()
            .unwrap_or(false)
    }

    pub fn command_buffer_state(&self, command_buffer: vk::CommandBuffer) -> Option<CommandBufferState> {
        self.state
            .lock()
            .command_buffers
            .get(&command_buffer.as_raw())
            .copied()
    }

    pub fn counters(&self) -> MockCounters {
        self.state.lock().counters
    }

    pub fn recorded_commands(&self) -> Vec<RecordedCommand> {
        self.state.lock().commands.clone()
    }

    /// Drain the recorded command log.
    pub fn take_recorded_commands(&self) -> Vec<RecordedCommand> {
        std::mem::take(&mut self.state.lock().commands)
    }

    /// Command buffers in submission order.
    pub fn submitted_command_buffers(&self) -> Vec<vk::CommandBuffer> {
        self.state.lock().submitted.clone()
    }

    /// Image indices of successful presents, in order.
    pub fn presented_images(&self) -> Vec<u32> {
        self.state.lock().presented.clone()
    }

    /// Every swapchain created so far, oldest first.
    pub fn swapchain_log(&self) -> Vec<SwapchainRecord> {
        self.state.lock().swapchain_log.clone()
    }

    pub fn last_swapchain(&self) -> Option<SwapchainRecord> {
        self.state.lock().swapchain_log.last().copied()
    }

    /// Size of the data a live buffer was created with.
    pub fn buffer_size(&self, buffer: vk::Buffer) -> Option<usize> {
        self.state.lock().buffer_sizes.get(&buffer.as_raw()).copied()
    }
}

impl GraphicsDevice for MockDevice {
    fn wait_idle(&self) -> Result<()> {
        self.state.lock().counters.wait_idle_calls += 1;
        Ok(())
    }

    fn format_properties(&self, format: vk::Format) -> vk::FormatProperties {
        let state = self.state.lock();
        if state.depth_formats.contains(&format) {
            vk::FormatProperties {
                optimal_tiling_features: vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
                ..Default::default()
            }
        } else {
            vk::FormatProperties::default()
        }
    }

    fn allocate_command_buffers(&self, count: u32) -> Result<Vec<vk::CommandBuffer>> {
        let mut state = self.state.lock();
        state.fault(MockOp::AllocateCommandBuffers)?;
        state.counters.allocate_calls += 1;
        Ok((0..count)
            .map(|_| {
                let raw = state.mint(HandleKind::CommandBuffer);
                state.command_buffers.insert(raw, CommandBufferState::Initial);
                vk::CommandBuffer::from_raw(raw)
            })
            .collect())
    }

    unsafe fn free_command_buffers(&self, command_buffers: &[vk::CommandBuffer]) {
        let mut state = self.state.lock();
        state.counters.free_calls += 1;
        for command_buffer in command_buffers {
            let raw = command_buffer.as_raw();
            state.release(HandleKind::CommandBuffer, raw);
            state.command_buffers.remove(&raw);
        }
    }

    fn begin_command_buffer(&self, command_buffer: vk::CommandBuffer) -> Result<()> {
        let mut state = self.state.lock();
        let entry = state
            .command_buffers
            .get_mut(&command_buffer.as_raw())
            .unwrap_or_else(|| panic!("begin on unknown {command_buffer:?}"));
        assert_ne!(
            *entry,
            CommandBufferState::Recording,
            "{command_buffer:?} begun twice"
        );
        *entry = CommandBufferState::Recording;
        Ok(())
    }

    fn end_command_buffer(&self, command_buffer: vk::CommandBuffer) -> Result<()> {
        let mut state = self.state.lock();
        let entry = state
            .command_buffers
            .get_mut(&command_buffer.as_raw())
            .unwrap_or_else(|| panic!("end on unknown {command_buffer:?}"));
        assert_eq!(
            *entry,
            CommandBufferState::Recording,
            "{command_buffer:?} ended while not recording"
        );
        *entry = CommandBufferState::Executable;
        Ok(())
    }

    fn create_semaphore(&self) -> Result<vk::Semaphore> {
        let mut state = self.state.lock();
        state.fault(MockOp::CreateSemaphore)?;
        Ok(vk::Semaphore::from_raw(state.mint(HandleKind::Semaphore)))
    }

    unsafe fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        self.state
            .lock()
            .release(HandleKind::Semaphore, semaphore.as_raw());
    }

    fn create_fence(&self, signaled: bool) -> Result<vk::Fence> {
        let mut state = self.state.lock();
        state.fault(MockOp::CreateFence)?;
        let raw = state.mint(HandleKind::Fence);
        state.fences.insert(raw, signaled);
        Ok(vk::Fence::from_raw(raw))
    }

    unsafe fn destroy_fence(&self, fence: vk::Fence) {
        let mut state = self.state.lock();
        state.release(HandleKind::Fence, fence.as_raw());
        state.fences.remove(&fence.as_raw());
    }

    fn wait_for_fence(&self, fence: vk::Fence, _timeout_ns: u64) -> Result<()> {
        let mut state = self.state.lock();
        state.counters.fence_waits += 1;
        let signaled = state
            .fences
            .get(&fence.as_raw())
            .copied()
            .unwrap_or_else(|| panic!("wait on unknown {fence:?}"));
        assert!(signaled, "waited on {fence:?} with no pending work to signal it");
        Ok(())
    }

    fn reset_fence(&self, fence: vk::Fence) -> Result<()> {
        let mut state = self.state.lock();
        let entry = state
            .fences
            .get_mut(&fence.as_raw())
            .unwrap_or_else(|| panic!("reset of unknown {fence:?}"));
        *entry = false;
        Ok(())
    }

    fn surface(&self) -> vk::SurfaceKHR {
        vk::SurfaceKHR::from_raw(MOCK_SURFACE)
    }

    fn surface_capabilities(&self) -> Result<SurfaceCapabilities> {
        Ok(self.state.lock().caps.clone())
    }

    fn create_swapchain(
        &self,
        info: &vk::SwapchainCreateInfoKHR<'_>,
    ) -> Result<vk::SwapchainKHR> {
        let mut state = self.state.lock();
        assert_eq!(info.surface.as_raw(), MOCK_SURFACE, "swapchain for a foreign surface");
        let old = info.old_swapchain.as_raw();
        assert!(
            old == 0 || state.is_live(HandleKind::Swapchain, old),
            "old swapchain {old:#x} is not live"
        );
        state
            .fault(MockOp::CreateSwapchain)
            .map_err(|e| GpuError::SwapchainCreation(e.to_string()))?;

        let raw = state.mint(HandleKind::Swapchain);
        let images = (0..info.min_image_count)
            .map(|_| vk::Image::from_raw(state.next_raw()))
            .collect();
        state.swapchains.insert(
            raw,
            SwapchainEntry {
                images,
                next_image: 0,
            },
        );
        state.counters.swapchains_created += 1;

        let handle = vk::SwapchainKHR::from_raw(raw);
        state.swapchain_log.push(SwapchainRecord {
            handle,
            old_swapchain: info.old_swapchain,
            extent: info.image_extent,
            image_count: info.min_image_count,
            format: info.image_format,
            present_mode: info.present_mode,
        });
        Ok(handle)
    }

    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> Result<Vec<vk::Image>> {
        self.state
            .lock()
            .swapchains
            .get(&swapchain.as_raw())
            .map(|entry| entry.images.clone())
            .ok_or(GpuError::Vulkan(vk::Result::ERROR_UNKNOWN))
    }

    unsafe fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR) {
        let mut state = self.state.lock();
        state.release(HandleKind::Swapchain, swapchain.as_raw());
        state.swapchains.remove(&swapchain.as_raw());
    }

    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        _timeout_ns: u64,
        semaphore: vk::Semaphore,
    ) -> VkResult<(u32, bool)> {
        let mut state = self.state.lock();
        state.counters.acquire_calls += 1;
        assert!(
            state.is_live(HandleKind::Semaphore, semaphore.as_raw()),
            "acquire with dead {semaphore:?}"
        );
        if let Some(result) = state.acquire_script.pop_front() {
            return result;
        }
        let entry = state
            .swapchains
            .get_mut(&swapchain.as_raw())
            .unwrap_or_else(|| panic!("acquire from dead {swapchain:?}"));
        let image_count = u32::try_from(entry.images.len()).unwrap_or(u32::MAX);
        let index = entry.next_image % image_count;
        entry.next_image += 1;
        Ok((index, false))
    }

    fn queue_submit(
        &self,
        command_buffers: &[vk::CommandBuffer],
        _wait_semaphores: &[vk::Semaphore],
        _wait_stages: &[vk::PipelineStageFlags],
        _signal_semaphores: &[vk::Semaphore],
        fence: vk::Fence,
    ) -> Result<()> {
        let mut state = self.state.lock();
        state.counters.submit_calls += 1;
        for command_buffer in command_buffers {
            assert_eq!(
                state.command_buffers.get(&command_buffer.as_raw()).copied(),
                Some(CommandBufferState::Executable),
                "submitted {command_buffer:?} that is not executable"
            );
        }
        if fence != vk::Fence::null() {
            let signaled = state
                .fences
                .get_mut(&fence.as_raw())
                .unwrap_or_else(|| panic!("submit with unknown {fence:?}"));
            assert!(!*signaled, "submitted with {fence:?} still signaled");
            // Work completes immediately.
            *signaled = true;
        }
        state.submitted.extend_from_slice(command_buffers);
        Ok(())
    }

    fn queue_present(
        &self,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        _wait_semaphores: &[vk::Semaphore],
    ) -> VkResult<bool> {
        let mut state = self.state.lock();
        state.counters.present_calls += 1;
        assert!(
            state.is_live(HandleKind::Swapchain, swapchain.as_raw()),
            "present to dead {swapchain:?}"
        );
        let result = state.present_script.pop_front().unwrap_or(Ok(false));
        if result.is_ok() {
            state.presented.push(image_index);
        }
        result
    }

    fn create_image(&self, _info: &vk::ImageCreateInfo<'_>, _name: &str) -> Result<vk::Image> {
        let mut state = self.state.lock();
        state.fault(MockOp::CreateImage)?;
        Ok(vk::Image::from_raw(state.mint(HandleKind::Image)))
    }

    unsafe fn destroy_image(&self, image: vk::Image) {
        self.state.lock().release(HandleKind::Image, image.as_raw());
    }

    fn create_image_view(&self, _info: &vk::ImageViewCreateInfo<'_>) -> Result<vk::ImageView> {
        let mut state = self.state.lock();
        state.fault(MockOp::CreateImageView)?;
        Ok(vk::ImageView::from_raw(state.mint(HandleKind::ImageView)))
    }

    unsafe fn destroy_image_view(&self, view: vk::ImageView) {
        self.state.lock().release(HandleKind::ImageView, view.as_raw());
    }

    fn create_render_pass(&self, _info: &vk::RenderPassCreateInfo<'_>) -> Result<vk::RenderPass> {
        let mut state = self.state.lock();
        state.fault(MockOp::CreateRenderPass)?;
        Ok(vk::RenderPass::from_raw(state.mint(HandleKind::RenderPass)))
    }

    unsafe fn destroy_render_pass(&self, render_pass: vk::RenderPass) {
        self.state
            .lock()
            .release(HandleKind::RenderPass, render_pass.as_raw());
    }

    fn create_framebuffer(
        &self,
        info: &vk::FramebufferCreateInfo<'_>,
    ) -> Result<vk::Framebuffer> {
        let mut state = self.state.lock();
        assert!(
            state.is_live(HandleKind::RenderPass, info.render_pass.as_raw()),
            "framebuffer for a dead render pass"
        );
        state.fault(MockOp::CreateFramebuffer)?;
        Ok(vk::Framebuffer::from_raw(state.mint(HandleKind::Framebuffer)))
    }

    unsafe fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer) {
        self.state
            .lock()
            .release(HandleKind::Framebuffer, framebuffer.as_raw());
    }

    fn create_graphics_pipeline(
        &self,
        _config: &GraphicsPipelineConfig,
        render_pass: vk::RenderPass,
        _push_constant_ranges: &[vk::PushConstantRange],
    ) -> Result<GraphicsPipeline> {
        let mut state = self.state.lock();
        assert!(
            state.is_live(HandleKind::RenderPass, render_pass.as_raw()),
            "pipeline for a dead render pass"
        );
        state
            .fault(MockOp::CreatePipeline)
            .map_err(|e| GpuError::PipelineCreation(e.to_string()))?;
        Ok(GraphicsPipeline {
            pipeline: vk::Pipeline::from_raw(state.mint(HandleKind::Pipeline)),
            layout: vk::PipelineLayout::from_raw(state.mint(HandleKind::PipelineLayout)),
        })
    }

    unsafe fn destroy_graphics_pipeline(&self, pipeline: &GraphicsPipeline) {
        let mut state = self.state.lock();
        state.release(HandleKind::Pipeline, pipeline.pipeline.as_raw());
        state.release(HandleKind::PipelineLayout, pipeline.layout.as_raw());
    }

    fn create_buffer_with_data(
        &self,
        _usage: vk::BufferUsageFlags,
        data: &[u8],
        name: &str,
    ) -> Result<vk::Buffer> {
        if data.is_empty() {
            return Err(GpuError::InvalidState(format!("{name}: empty buffer data")));
        }
        let mut state = self.state.lock();
        state.fault(MockOp::CreateBuffer)?;
        let raw = state.mint(HandleKind::Buffer);
        state.buffer_sizes.insert(raw, data.len());
        Ok(vk::Buffer::from_raw(raw))
    }

    unsafe fn destroy_buffer(&self, buffer: vk::Buffer) {
        let mut state = self.state.lock();
        state.release(HandleKind::Buffer, buffer.as_raw());
        state.buffer_sizes.remove(&buffer.as_raw());
    }

    fn cmd_set_viewport(&self, command_buffer: vk::CommandBuffer, viewport: vk::Viewport) {
        self.state
            .lock()
            .record(command_buffer, RecordedCommand::SetViewport(viewport));
    }

    fn cmd_set_scissor(&self, command_buffer: vk::CommandBuffer, scissor: vk::Rect2D) {
        self.state
            .lock()
            .record(command_buffer, RecordedCommand::SetScissor(scissor));
    }

    fn cmd_begin_render_pass(&self, command_buffer: vk::CommandBuffer, begin: &RenderPassBegin) {
        self.state
            .lock()
            .record(command_buffer, RecordedCommand::BeginRenderPass(*begin));
    }

    fn cmd_end_render_pass(&self, command_buffer: vk::CommandBuffer) {
        self.state
            .lock()
            .record(command_buffer, RecordedCommand::EndRenderPass);
    }

    fn cmd_bind_pipeline(&self, command_buffer: vk::CommandBuffer, pipeline: vk::Pipeline) {
        self.state
            .lock()
            .record(command_buffer, RecordedCommand::BindPipeline(pipeline));
    }

    fn cmd_push_constants(
        &self,
        command_buffer: vk::CommandBuffer,
        layout: vk::PipelineLayout,
        stages: vk::ShaderStageFlags,
        data: &[u8],
    ) {
        self.state.lock().record(
            command_buffer,
            RecordedCommand::PushConstants {
                layout,
                stages,
                data: data.to_vec(),
            },
        );
    }

    fn cmd_bind_vertex_buffer(&self, command_buffer: vk::CommandBuffer, buffer: vk::Buffer) {
        self.state
            .lock()
            .record(command_buffer, RecordedCommand::BindVertexBuffer(buffer));
    }

    fn cmd_bind_index_buffer(&self, command_buffer: vk::CommandBuffer, buffer: vk::Buffer) {
        self.state
            .lock()
            .record(command_buffer, RecordedCommand::BindIndexBuffer(buffer));
    }

    fn cmd_draw(&self, command_buffer: vk::CommandBuffer, vertex_count: u32) {
        self.state
            .lock()
            .record(command_buffer, RecordedCommand::Draw { vertex_count });
    }

    fn cmd_draw_indexed(&self, command_buffer: vk::CommandBuffer, index_count: u32) {
        self.state
            .lock()
            .record(command_buffer, RecordedCommand::DrawIndexed { index_count });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[should_panic(expected = "destroyed twice")]
    fn double_free_panics() {
        let device = MockDevice::new();
        let semaphore = device.create_semaphore().unwrap();
        unsafe {
            device.destroy_semaphore(semaphore);
            device.destroy_semaphore(semaphore);
        }
    }

    #[test]
    #[should_panic(expected = "no pending work")]
    fn waiting_on_reset_fence_panics() {
        let device = MockDevice::new();
        let fence = device.create_fence(true).unwrap();
        device.reset_fence(fence).unwrap();
        device.wait_for_fence(fence, u64::MAX).unwrap();
    }

    #[test]
    #[should_panic(expected = "outside the recording state")]
    fn recording_without_begin_panics() {
        let device = MockDevice::new();
        let cmd = device.allocate_command_buffers(1).unwrap()[0];
        device.cmd_draw(cmd, 3);
    }

    #[test]
    fn submit_signals_fence() {
        let device = MockDevice::new();
        let fence = device.create_fence(false).unwrap();
        let cmd = device.allocate_command_buffers(1).unwrap()[0];
        device.begin_command_buffer(cmd).unwrap();
        device.end_command_buffer(cmd).unwrap();

        device.queue_submit(&[cmd], &[], &[], &[], fence).unwrap();

        assert!(device.fence_signaled(fence));
        assert_eq!(device.submitted_command_buffers(), vec![cmd]);
        assert_eq!(
            device.command_buffer_state(cmd),
            Some(CommandBufferState::Executable)
        );
    }

    #[test]
    fn fault_fires_once_after_successes() {
        let device = MockDevice::new();
        device.fail_after(MockOp::CreateFence, 1);

        assert!(device.create_fence(true).is_ok());
        assert!(matches!(
            device.create_fence(true),
            Err(GpuError::Vulkan(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY))
        ));
        assert!(device.create_fence(true).is_ok());
        assert_eq!(device.live_count(HandleKind::Fence), 2);
    }
}
