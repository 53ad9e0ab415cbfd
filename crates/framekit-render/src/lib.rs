//! Frame orchestration and rendering for framekit.
//!
//! The [`FrameOrchestrator`] drives the acquire, record, submit and present
//! cycle over a [`framekit_gpu::GraphicsDevice`] and rebuilds the swapchain
//! when the surface changes. Render systems such as [`SimpleRenderSystem`]
//! record draws for a [`SceneView`] inside the swapchain render pass.

pub mod error;
pub mod frame;
pub mod model;
pub mod orchestrator;
pub mod presentation;
pub mod render_system;
pub mod scene;

#[cfg(test)]
mod testing;

pub use error::{RenderError, Result};
pub use frame::FrameContext;
pub use model::{Model, ModelBuilder, Vertex};
pub use orchestrator::{FrameOrchestrator, FrameOutcome, FrameState, FrameStats};
pub use presentation::PresentationSurface;
pub use render_system::{RenderSystem, SimpleRenderSystem};
pub use scene::{GameObject, ObjectStore, SceneView};
