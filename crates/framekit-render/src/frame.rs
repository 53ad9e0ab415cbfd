//! Per-frame context for recording.

use ash::vk;
use framekit_gpu::GenerationId;

/// Context for the frame currently being recorded.
///
/// Only valid between `begin_frame` and `end_frame`; render systems must not
/// keep the command buffer past the frame.
#[derive(Clone, Copy, Debug)]
pub struct FrameContext {
    /// Command buffer for recording rendering commands.
    pub command_buffer: vk::CommandBuffer,
    /// In-flight slot the frame uses.
    pub frame_index: usize,
    /// Index of the acquired swapchain image.
    pub image_index: u32,
    /// Swapchain extent.
    pub extent: vk::Extent2D,
    /// Swapchain generation the frame renders into.
    pub generation: GenerationId,
    /// Delta time since last frame in seconds.
    pub dt: f32,
}
