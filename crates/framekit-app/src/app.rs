//! `FrameApp` trait definition.

use framekit_render::FrameContext;
use winit::event::WindowEvent;

use crate::context::AppContext;

/// An application driven by [`crate::run_app`].
///
/// The runner owns the window and the frame loop; the application supplies
/// per-frame updates and the draws recorded inside the swapchain render pass.
pub trait FrameApp: Sized {
    /// Called once after the window, device and first swapchain exist.
    fn init(ctx: &mut AppContext) -> anyhow::Result<Self>;

    /// Advance application state. `dt` is in seconds and clamped to a sane
    /// maximum after stalls.
    fn update(&mut self, ctx: &AppContext, dt: f32);

    /// Record draws for the frame.
    ///
    /// The swapchain render pass has begun and the viewport and scissor
    /// cover the whole swapchain. Record through `ctx.device()` into
    /// `frame.command_buffer`.
    fn render(&mut self, ctx: &AppContext, frame: &FrameContext) -> anyhow::Result<()>;

    /// Window events, including resizes and close requests.
    ///
    /// Default implementation does nothing.
    #[allow(unused_variables)]
    fn on_event(&mut self, event: &WindowEvent) {}

    /// Called after the swapchain was rebuilt, before the next frame begins.
    ///
    /// Default implementation does nothing.
    #[allow(unused_variables)]
    fn on_swapchain_recreated(&mut self, ctx: &mut AppContext) -> anyhow::Result<()> {
        Ok(())
    }

    /// Release GPU resources. The device is idle when this is called.
    ///
    /// Default implementation does nothing.
    #[allow(unused_variables)]
    fn cleanup(&mut self, ctx: &mut AppContext) {}
}
