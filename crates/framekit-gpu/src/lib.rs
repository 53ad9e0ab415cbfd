//! Vulkan layer for the framekit renderer.
//!
//! This crate provides:
//! - Vulkan instance, device and surface setup
//! - The [`GraphicsDevice`] seam with a real ([`VulkanDevice`]) and an
//!   in-memory (`mock::MockDevice`, feature `mock`) implementation
//! - Memory allocation via gpu-allocator
//! - Per-slot command buffers and synchronization objects
//! - Swapchain generations and their recreation

pub mod command;
pub mod context;
pub mod device;
pub mod error;
pub mod instance;
pub mod memory;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod pipeline;
pub mod surface;
pub mod swapchain;
pub mod sync;
pub mod vulkan;

pub use command::{CommandBufferPool, CommandPool};
pub use context::{GpuContext, GpuContextBuilder};
pub use device::{GraphicsDevice, RenderPassBegin};
pub use error::{GpuError, Result};
pub use memory::{GpuAllocator, GpuBuffer, GpuImage};
pub use pipeline::{GraphicsPipeline, GraphicsPipelineConfig};
pub use surface::{SurfaceCapabilities, SurfaceContext};
pub use swapchain::{
    AcquireOutcome, GenerationId, PresentOutcome, SwapchainConfig, SwapchainGeneration,
    SwapchainManager,
};
pub use sync::{create_frame_syncs, FrameSync};
pub use vulkan::VulkanDevice;
