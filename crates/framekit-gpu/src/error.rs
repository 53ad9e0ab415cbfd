//! GPU error types.

use ash::vk;
use thiserror::Error;

/// GPU-related errors.
///
/// Every variant is fatal to the frame loop. Transient surface
/// invalidation is reported through [`crate::AcquireOutcome`] and
/// [`crate::PresentOutcome`] instead.
#[derive(Error, Debug)]
pub enum GpuError {
    /// Vulkan error.
    #[error("Vulkan error: {0}")]
    Vulkan(#[from] vk::Result),

    /// No suitable GPU found.
    #[error("No suitable GPU found")]
    NoSuitableDevice,

    /// Surface creation failed.
    #[error("Surface creation failed: {0}")]
    SurfaceCreation(String),

    /// Swapchain creation failed.
    #[error("Swapchain creation failed: {0}")]
    SwapchainCreation(String),

    /// A replacement swapchain would change the color or depth format.
    #[error(
        "Swapchain format changed across recreation: color {previous_color:?} -> {color:?}, \
         depth {previous_depth:?} -> {depth:?}"
    )]
    FormatMismatch {
        previous_color: vk::Format,
        color: vk::Format,
        previous_depth: vk::Format,
        depth: vk::Format,
    },

    /// None of the candidate depth formats can be used as an attachment.
    #[error("No supported depth format")]
    NoSupportedDepthFormat,

    /// Memory allocation failed.
    #[error("Memory allocation failed: {0}")]
    AllocationFailed(String),

    /// Shader module creation failed.
    #[error("Shader compilation failed: {0}")]
    ShaderCompilation(String),

    /// Pipeline creation failed.
    #[error("Pipeline creation failed: {0}")]
    PipelineCreation(String),

    /// Invalid state.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, GpuError>;
