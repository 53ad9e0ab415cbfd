//! Host window seam used by the frame loop.

use ash::vk;

/// The window the swapchain presents to, as seen by the frame loop.
pub trait PresentationSurface {
    /// Current drawable size in pixels. Zero in either dimension while minimized.
    fn current_extent(&mut self) -> vk::Extent2D;

    /// Whether the window was resized since the last call; clears the flag.
    fn consume_resize_flag(&mut self) -> bool;

    /// Block until at least one host event has been processed.
    fn wait_events(&mut self);
}
