//! Render error types.

use framekit_gpu::GpuError;
use thiserror::Error;

/// Errors surfaced by the frame loop and render systems.
///
/// Every variant is fatal. Surface invalidation is not an error: it shows up
/// as a skipped frame or [`crate::FrameOutcome::Recreated`].
#[derive(Error, Debug)]
pub enum RenderError {
    /// GPU resource creation, submission or presentation failed.
    #[error(transparent)]
    Gpu(#[from] GpuError),

    /// An operation was called out of order or with the wrong arguments.
    #[error("Frame protocol violated: {0}")]
    ContractViolation(&'static str),
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, RenderError>;
