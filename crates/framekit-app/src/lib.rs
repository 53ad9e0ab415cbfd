//! Windowed application runner for framekit.
//!
//! This crate owns the boilerplate around the frame loop:
//! - Window creation and event pumping
//! - GPU context and surface initialization
//! - Driving [`framekit_render::FrameOrchestrator`] once per frame
//! - Frame pacing, shutdown and cleanup
//!
//! # Example
//!
//! ```no_run
//! use framekit_app::{run_app, AppConfig, AppContext, FrameApp, FrameContext};
//!
//! struct MyApp;
//!
//! impl FrameApp for MyApp {
//!     fn init(_ctx: &mut AppContext) -> anyhow::Result<Self> {
//!         Ok(MyApp)
//!     }
//!
//!     fn update(&mut self, _ctx: &AppContext, _dt: f32) {}
//!
//!     fn render(&mut self, _ctx: &AppContext, _frame: &FrameContext) -> anyhow::Result<()> {
//!         Ok(())
//!     }
//! }
//!
//! fn main() -> anyhow::Result<()> {
//!     run_app::<MyApp>(AppConfig::default())
//! }
//! ```

mod app;
mod context;
mod host;
mod runner;

pub use app::FrameApp;
pub use context::AppContext;
pub use host::WindowHost;
pub use runner::{run_app, AppConfig, MAX_FRAME_TIME};

// Re-export commonly used types for convenience
pub use framekit_core::{Camera, Transform};
pub use framekit_render::FrameContext;
pub use winit::event::WindowEvent;
