//! Core types and math for the framekit renderer.
//!
//! This crate provides the foundational types shared by the GPU layer,
//! the frame orchestrator and applications:
//! - Frame-loop constants (frames in flight, clear values)
//! - Transform and camera math
//! - Object identity and the per-draw push constant layout

pub mod math;
pub mod types;

pub use math::{Camera, Transform};
pub use types::{ObjectId, ObjectIdAllocator, SimplePushConstantData};

/// Frame-loop constants.
pub mod constants {
    /// Number of frames that may be recorded or executing at the same time.
    pub const MAX_FRAMES_IN_FLIGHT: usize = 2;
    /// Clear color for the swapchain render pass (RGBA).
    pub const CLEAR_COLOR: [f32; 4] = [0.1, 0.1, 0.1, 1.0];
    /// Depth clear value (far plane).
    pub const CLEAR_DEPTH: f32 = 1.0;
    /// Stencil clear value.
    pub const CLEAR_STENCIL: u32 = 0;
}
