//! Frame orchestration: acquire, record, submit, present, recreate.
//!
//! [`FrameOrchestrator`] owns the in-flight slots (one command buffer, two
//! semaphores and a fence each) and the [`SwapchainManager`]. A frame moves
//! through [`FrameState`]:
//!
//! ```text
//! Idle --begin_frame--> Acquiring --image ready--> Recording --end_frame--> Submitting --> Idle
//!                           |
//!                           +--out of date--> recreate, skip frame --> Idle
//! ```
//!
//! Surface invalidation never surfaces as an error. `begin_frame` returns
//! `Ok(None)` when there is nothing to draw into and `end_frame` reports
//! [`FrameOutcome::Recreated`] when the swapchain had to be rebuilt.

use std::sync::Arc;

use ash::vk;
use framekit_core::constants::{CLEAR_COLOR, CLEAR_DEPTH, CLEAR_STENCIL, MAX_FRAMES_IN_FLIGHT};
use framekit_gpu::{
    create_frame_syncs, AcquireOutcome, CommandBufferPool, FrameSync, GenerationId, GpuError,
    GraphicsDevice, PresentOutcome, RenderPassBegin, SwapchainConfig, SwapchainManager,
};

use crate::error::{RenderError, Result};
use crate::frame::FrameContext;
use crate::presentation::PresentationSurface;

/// Where the orchestrator is in the frame protocol.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameState {
    Idle,
    Acquiring,
    Recording,
    Submitting,
}

/// How a frame ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Presented; the swapchain is still current.
    Presented,
    /// The swapchain was rebuilt after this frame.
    Recreated,
}

/// Running totals.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Frames presented to a swapchain that stayed current.
    pub frames_presented: u64,
    /// Swapchain recreations.
    pub recreations: u64,
    /// Times the slot command buffers were reallocated.
    pub command_pool_rebuilds: u64,
}

/// Drives the acquire / record / submit / present cycle.
pub struct FrameOrchestrator<D: GraphicsDevice> {
    device: Arc<D>,
    swapchain: SwapchainManager<D>,
    slots: Vec<FrameSync>,
    command_buffers: CommandBufferPool,
    state: FrameState,
    frame_index: usize,
    image_index: Option<u32>,
    acquired_suboptimal: bool,
    stats: FrameStats,
}

impl<D: GraphicsDevice> FrameOrchestrator<D> {
    /// Create the first swapchain generation and the in-flight slots.
    pub fn new(device: Arc<D>, extent: vk::Extent2D, config: SwapchainConfig) -> Result<Self> {
        let swapchain = SwapchainManager::new(device.clone(), extent, config)?;
        let slots = create_frame_syncs(&*device, MAX_FRAMES_IN_FLIGHT)?;
        let command_buffers = match CommandBufferPool::new(&*device, MAX_FRAMES_IN_FLIGHT) {
            Ok(pool) => pool,
            Err(e) => {
                for slot in &slots {
                    // SAFETY: never submitted.
                    unsafe { slot.destroy(&*device) };
                }
                return Err(e.into());
            }
        };

        Ok(Self {
            device,
            swapchain,
            slots,
            command_buffers,
            state: FrameState::Idle,
            frame_index: 0,
            image_index: None,
            acquired_suboptimal: false,
            stats: FrameStats::default(),
        })
    }

    /// Start a frame and return its command buffer, already begun.
    ///
    /// Blocks while the surface has a zero extent. Returns `Ok(None)` when the
    /// swapchain was out of date; it has been recreated and the caller should
    /// skip this frame.
    #[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
    pub fn begin_frame<S>(&mut self, surface: &mut S) -> Result<Option<vk::CommandBuffer>>
    where
        S: PresentationSurface + ?Sized,
    {
        if self.state != FrameState::Idle {
            return Err(RenderError::ContractViolation(
                "begin_frame called while a frame is already in progress",
            ));
        }

        let extent = wait_for_extent(surface);
        if extent != self.swapchain.requested_extent() {
            self.recreate(surface)?;
        }

        self.state = FrameState::Acquiring;
        let sync = self.slots[self.frame_index];
        let outcome = match self.swapchain.acquire_next_image(&sync) {
            Ok(outcome) => outcome,
            Err(e) => {
                self.state = FrameState::Idle;
                return Err(e.into());
            }
        };

        match outcome {
            AcquireOutcome::Retry => {
                self.state = FrameState::Idle;
                tracing::debug!("Swapchain out of date on acquire");
                self.recreate(surface)?;
                Ok(None)
            }
            AcquireOutcome::Ready {
                image_index,
                suboptimal,
            } => {
                let command_buffer = self.slot_command_buffer()?;
                self.device.begin_command_buffer(command_buffer)?;

                self.image_index = Some(image_index);
                self.acquired_suboptimal = suboptimal;
                self.state = FrameState::Recording;
                tracing::trace!(frame_index = self.frame_index, image_index, "Frame started");
                Ok(Some(command_buffer))
            }
        }
    }

    /// Finish recording, submit, present, and recreate the swapchain if needed.
    #[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
    pub fn end_frame<S>(&mut self, surface: &mut S) -> Result<FrameOutcome>
    where
        S: PresentationSurface + ?Sized,
    {
        if self.state != FrameState::Recording {
            return Err(RenderError::ContractViolation(
                "end_frame called without a frame in progress",
            ));
        }
        let command_buffer = self.slot_command_buffer()?;
        let image_index = self.image_index.ok_or(RenderError::ContractViolation(
            "frame in progress without an acquired image",
        ))?;

        self.device.end_command_buffer(command_buffer)?;
        self.state = FrameState::Submitting;

        let sync = self.slots[self.frame_index];
        let present = self.swapchain.submit(&[command_buffer], image_index, &sync)?;
        if present == PresentOutcome::Presented {
            self.stats.frames_presented += 1;
        }

        let resized = surface.consume_resize_flag();
        let recreate = present == PresentOutcome::Retry || resized || self.acquired_suboptimal;

        self.state = FrameState::Idle;
        self.image_index = None;
        self.acquired_suboptimal = false;
        self.frame_index = (self.frame_index + 1) % MAX_FRAMES_IN_FLIGHT;

        if recreate {
            tracing::debug!(?present, resized, "Swapchain needs recreation after present");
            self.recreate(surface)?;
            Ok(FrameOutcome::Recreated)
        } else {
            Ok(FrameOutcome::Presented)
        }
    }

    /// Set viewport and scissor to the swapchain extent and begin its render pass.
    pub fn begin_swapchain_render_pass(&self, command_buffer: vk::CommandBuffer) -> Result<()> {
        self.check_recording(
            command_buffer,
            "begin_swapchain_render_pass requires the command buffer of the frame in progress",
        )?;
        let image_index = self.image_index.ok_or(RenderError::ContractViolation(
            "frame in progress without an acquired image",
        ))?;
        let framebuffer = self.swapchain.framebuffer(image_index).ok_or_else(|| {
            GpuError::InvalidState(format!("no framebuffer for image {image_index}"))
        })?;

        let extent = self.swapchain.extent();
        #[allow(clippy::cast_precision_loss)]
        let viewport = vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };
        let scissor = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent,
        };

        self.device.cmd_set_viewport(command_buffer, viewport);
        self.device.cmd_set_scissor(command_buffer, scissor);
        self.device.cmd_begin_render_pass(
            command_buffer,
            &RenderPassBegin {
                render_pass: self.swapchain.render_pass(),
                framebuffer,
                extent,
                clear_color: CLEAR_COLOR,
                clear_depth: CLEAR_DEPTH,
                clear_stencil: CLEAR_STENCIL,
            },
        );
        Ok(())
    }

    /// End the swapchain render pass.
    pub fn end_swapchain_render_pass(&self, command_buffer: vk::CommandBuffer) -> Result<()> {
        self.check_recording(
            command_buffer,
            "end_swapchain_render_pass requires the command buffer of the frame in progress",
        )?;
        self.device.cmd_end_render_pass(command_buffer);
        Ok(())
    }

    /// Whether a frame is between `begin_frame` and `end_frame`.
    pub fn is_frame_in_progress(&self) -> bool {
        self.state == FrameState::Recording
    }

    pub const fn state(&self) -> FrameState {
        self.state
    }

    /// Command buffer of the frame in progress.
    pub fn current_command_buffer(&self) -> Result<vk::CommandBuffer> {
        if !self.is_frame_in_progress() {
            return Err(RenderError::ContractViolation(
                "no command buffer outside a frame",
            ));
        }
        self.slot_command_buffer()
    }

    /// In-flight slot of the frame in progress.
    pub fn frame_index(&self) -> Result<usize> {
        if !self.is_frame_in_progress() {
            return Err(RenderError::ContractViolation("no frame index outside a frame"));
        }
        Ok(self.frame_index)
    }

    /// Everything a render system needs to record the frame in progress.
    pub fn frame_context(&self, dt: f32) -> Result<FrameContext> {
        let command_buffer = self.current_command_buffer()?;
        let image_index = self.image_index.ok_or(RenderError::ContractViolation(
            "frame in progress without an acquired image",
        ))?;
        Ok(FrameContext {
            command_buffer,
            frame_index: self.frame_index,
            image_index,
            extent: self.swapchain.extent(),
            generation: self.swapchain.generation(),
            dt,
        })
    }

    pub const fn extent(&self) -> vk::Extent2D {
        self.swapchain.extent()
    }

    /// Width over height of the swapchain extent.
    pub fn aspect_ratio(&self) -> f32 {
        self.swapchain.aspect_ratio()
    }

    pub const fn render_pass(&self) -> vk::RenderPass {
        self.swapchain.render_pass()
    }

    /// Changes whenever the swapchain is rebuilt.
    pub const fn generation(&self) -> GenerationId {
        self.swapchain.generation()
    }

    pub const fn swapchain(&self) -> &SwapchainManager<D> {
        &self.swapchain
    }

    pub const fn stats(&self) -> FrameStats {
        self.stats
    }

    pub const fn device(&self) -> &Arc<D> {
        &self.device
    }

    fn slot_command_buffer(&self) -> Result<vk::CommandBuffer> {
        self.command_buffers
            .get(self.frame_index)
            .ok_or_else(|| GpuError::InvalidState("frame slot has no command buffer".to_string()).into())
    }

    fn check_recording(&self, command_buffer: vk::CommandBuffer, message: &'static str) -> Result<()> {
        if self.is_frame_in_progress() && self.slot_command_buffer()? == command_buffer {
            Ok(())
        } else {
            Err(RenderError::ContractViolation(message))
        }
    }

    /// Rebuild the swapchain for the surface's current extent.
    fn recreate<S>(&mut self, surface: &mut S) -> Result<()>
    where
        S: PresentationSurface + ?Sized,
    {
        let extent = wait_for_extent(surface);
        // The new generation already covers any resize the host reported.
        surface.consume_resize_flag();
        self.device.wait_idle()?;

        let previous_images = self.swapchain.image_count();
        // SAFETY: the device is idle.
        unsafe { self.swapchain.recreate(extent)? };
        self.stats.recreations += 1;

        if self.swapchain.image_count() != previous_images {
            // SAFETY: the device is idle, so no slot buffer is pending.
            unsafe { self.command_buffers.rebuild(&*self.device)? };
            self.stats.command_pool_rebuilds += 1;
        }

        tracing::info!(
            generation = %self.swapchain.generation(),
            width = self.swapchain.extent().width,
            height = self.swapchain.extent().height,
            "Recreated swapchain"
        );
        Ok(())
    }
}

impl<D: GraphicsDevice> Drop for FrameOrchestrator<D> {
    fn drop(&mut self) {
        if let Err(e) = self.device.wait_idle() {
            tracing::error!("Failed to wait for device idle during teardown: {e}");
        }
        // SAFETY: the device is idle.
        unsafe {
            self.command_buffers.free(&*self.device);
            for slot in &self.slots {
                slot.destroy(&*self.device);
            }
        }
    }
}

/// Poll the surface until it has a drawable extent.
fn wait_for_extent<S>(surface: &mut S) -> vk::Extent2D
where
    S: PresentationSurface + ?Sized,
{
    loop {
        let extent = surface.current_extent();
        if extent.width != 0 && extent.height != 0 {
            return extent;
        }
        surface.wait_events();
    }
}
