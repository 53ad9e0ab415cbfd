//! Window ownership and event pumping.

use std::sync::Arc;
use std::time::Duration;

use ash::vk;
use framekit_render::PresentationSurface;
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, EventLoop};
use winit::platform::pump_events::{EventLoopExtPumpEvents, PumpStatus};
use winit::window::{Window, WindowAttributes, WindowId};

/// Owns the event loop and the single application window.
///
/// The frame loop stays in control: events are pumped explicitly with
/// [`WindowHost::poll_events`], or blocked on through
/// [`PresentationSurface::wait_events`] while the window is minimized.
pub struct WindowHost {
    event_loop: EventLoop<()>,
    handler: HostHandler,
    window: Arc<Window>,
    last_extent: vk::Extent2D,
}

struct HostHandler {
    attributes: WindowAttributes,
    window: Option<Arc<Window>>,
    creation_error: Option<winit::error::OsError>,
    resized: bool,
    close_requested: bool,
    events: Vec<WindowEvent>,
}

impl ApplicationHandler for HostHandler {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        match event_loop.create_window(self.attributes.clone()) {
            Ok(window) => self.window = Some(Arc::new(window)),
            Err(e) => {
                self.creation_error = Some(e);
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, _event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => self.close_requested = true,
            WindowEvent::Resized(_) => self.resized = true,
            _ => {}
        }
        self.events.push(event);
    }
}

impl WindowHost {
    /// Create the event loop and open a window.
    pub fn new(title: &str, width: u32, height: u32) -> anyhow::Result<Self> {
        let mut event_loop = EventLoop::new()?;
        let mut handler = HostHandler {
            attributes: Window::default_attributes()
                .with_title(title)
                .with_inner_size(PhysicalSize::new(width, height)),
            window: None,
            creation_error: None,
            resized: false,
            close_requested: false,
            events: Vec::new(),
        };

        // The window is created on the first resume.
        let window = loop {
            let status = event_loop.pump_app_events(Some(Duration::ZERO), &mut handler);
            if let Some(e) = handler.creation_error.take() {
                return Err(anyhow::anyhow!("Failed to create window: {e}"));
            }
            if let Some(window) = &handler.window {
                break window.clone();
            }
            if let PumpStatus::Exit(code) = status {
                anyhow::bail!("Event loop exited with code {code} before a window was created");
            }
        };

        let size = window.inner_size();
        tracing::info!(width = size.width, height = size.height, "Window created");

        Ok(Self {
            event_loop,
            handler,
            window,
            last_extent: vk::Extent2D {
                width: size.width.max(1),
                height: size.height.max(1),
            },
        })
    }

    /// Process pending events without blocking.
    pub fn poll_events(&mut self) {
        self.pump(Some(Duration::ZERO));
    }

    /// Window events received since the last call.
    pub fn drain_events(&mut self) -> Vec<WindowEvent> {
        std::mem::take(&mut self.handler.events)
    }

    pub const fn close_requested(&self) -> bool {
        self.handler.close_requested
    }

    pub const fn window(&self) -> &Arc<Window> {
        &self.window
    }

    fn pump(&mut self, timeout: Option<Duration>) {
        if let PumpStatus::Exit(_) = self.event_loop.pump_app_events(timeout, &mut self.handler) {
            self.handler.close_requested = true;
        }
    }
}

impl PresentationSurface for WindowHost {
    fn current_extent(&mut self) -> vk::Extent2D {
        let size = self.window.inner_size();
        let extent = vk::Extent2D {
            width: size.width,
            height: size.height,
        };
        if extent.width != 0 && extent.height != 0 {
            self.last_extent = extent;
            extent
        } else if self.handler.close_requested {
            // A closing window must not keep the frame loop waiting.
            self.last_extent
        } else {
            extent
        }
    }

    fn consume_resize_flag(&mut self) -> bool {
        std::mem::take(&mut self.handler.resized)
    }

    fn wait_events(&mut self) {
        self.pump(None);
    }
}
