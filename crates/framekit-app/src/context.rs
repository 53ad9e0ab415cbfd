//! Application context.

use std::sync::Arc;

use ash::vk;
use framekit_gpu::{GpuContextBuilder, SwapchainConfig, VulkanDevice};
use framekit_render::FrameOrchestrator;
use winit::window::Window;

use crate::runner::AppConfig;

/// Everything an application needs to create resources and record frames.
pub struct AppContext {
    // Dropped in declaration order: the frame loop, then the device, then
    // the window its surface was created from.
    renderer: FrameOrchestrator<VulkanDevice>,
    device: Arc<VulkanDevice>,
    window: Arc<Window>,
    /// Frames presented so far.
    pub frame_count: u64,
}

impl AppContext {
    pub(crate) fn new(window: Arc<Window>, config: &AppConfig) -> anyhow::Result<Self> {
        let gpu = GpuContextBuilder::new()
            .app_name(&config.title)
            .validation(config.validation)
            .build()?;
        tracing::info!("GPU: {}", gpu.device_name());

        // SAFETY: the context owns the window and drops it after the device.
        let device = Arc::new(unsafe { VulkanDevice::from_window(gpu, window.as_ref())? });

        let size = window.inner_size();
        let extent = vk::Extent2D {
            width: size.width.max(1),
            height: size.height.max(1),
        };
        let renderer = FrameOrchestrator::new(
            device.clone(),
            extent,
            SwapchainConfig {
                vsync: config.vsync,
            },
        )?;

        Ok(Self {
            renderer,
            device,
            window,
            frame_count: 0,
        })
    }

    /// Device for creating models and pipelines and for recording.
    pub const fn device(&self) -> &Arc<VulkanDevice> {
        &self.device
    }

    pub const fn renderer(&self) -> &FrameOrchestrator<VulkanDevice> {
        &self.renderer
    }

    pub(crate) fn renderer_mut(&mut self) -> &mut FrameOrchestrator<VulkanDevice> {
        &mut self.renderer
    }

    pub const fn window(&self) -> &Arc<Window> {
        &self.window
    }

    /// Current swapchain extent.
    pub const fn extent(&self) -> vk::Extent2D {
        self.renderer.extent()
    }

    /// Swapchain render pass, for pipeline creation.
    pub const fn render_pass(&self) -> vk::RenderPass {
        self.renderer.render_pass()
    }

    /// Width over height of the swapchain.
    pub fn aspect_ratio(&self) -> f32 {
        self.renderer.aspect_ratio()
    }
}
