//! Synchronization primitives.

use crate::device::GraphicsDevice;
use crate::error::Result;
use ash::vk;

/// Per-slot frame synchronization resources.
#[derive(Clone, Copy, Debug)]
pub struct FrameSync {
    /// Semaphore signaled when image is available
    pub image_available: vk::Semaphore,
    /// Semaphore signaled when rendering is complete
    pub render_finished: vk::Semaphore,
    /// Fence to wait for frame completion, created signaled
    pub in_flight: vk::Fence,
}

impl FrameSync {
    /// Create frame synchronization resources.
    ///
    /// On failure, objects created so far are destroyed before returning.
    pub fn new<D: GraphicsDevice + ?Sized>(device: &D) -> Result<Self> {
        let image_available = device.create_semaphore()?;
        let render_finished = match device.create_semaphore() {
            Ok(semaphore) => semaphore,
            Err(e) => {
                // SAFETY: never handed out.
                unsafe { device.destroy_semaphore(image_available) };
                return Err(e);
            }
        };
        let in_flight = match device.create_fence(true) {
            Ok(fence) => fence,
            Err(e) => {
                // SAFETY: never handed out.
                unsafe {
                    device.destroy_semaphore(image_available);
                    device.destroy_semaphore(render_finished);
                }
                return Err(e);
            }
        };

        Ok(Self {
            image_available,
            render_finished,
            in_flight,
        })
    }

    /// Wait for this slot's previous submission to complete.
    #[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
    pub fn wait<D: GraphicsDevice + ?Sized>(&self, device: &D) -> Result<()> {
        device.wait_for_fence(self.in_flight, u64::MAX)
    }

    /// Reset the fence for the next submission.
    pub fn reset<D: GraphicsDevice + ?Sized>(&self, device: &D) -> Result<()> {
        device.reset_fence(self.in_flight)
    }

    /// Destroy synchronization resources.
    ///
    /// # Safety
    /// Resources must not be in use.
    pub unsafe fn destroy<D: GraphicsDevice + ?Sized>(&self, device: &D) {
        // SAFETY: forwarded to the caller.
        unsafe {
            device.destroy_semaphore(self.image_available);
            device.destroy_semaphore(self.render_finished);
            device.destroy_fence(self.in_flight);
        }
    }
}

/// Create one [`FrameSync`] per in-flight slot.
///
/// On failure, slots created so far are destroyed before returning.
pub fn create_frame_syncs<D: GraphicsDevice + ?Sized>(
    device: &D,
    frames_in_flight: usize,
) -> Result<Vec<FrameSync>> {
    let mut syncs = Vec::with_capacity(frames_in_flight);
    for _ in 0..frames_in_flight {
        match FrameSync::new(device) {
            Ok(sync) => syncs.push(sync),
            Err(e) => {
                for sync in &syncs {
                    // SAFETY: never submitted.
                    unsafe { sync.destroy(device) };
                }
                return Err(e);
            }
        }
    }
    Ok(syncs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{HandleKind, MockDevice, MockOp};

    #[test]
    fn in_flight_fence_starts_signaled() {
        let device = MockDevice::new();
        let sync = FrameSync::new(&device).unwrap();

        // Waiting immediately must not block or panic.
        sync.wait(&device).unwrap();
        assert!(device.fence_signaled(sync.in_flight));

        sync.reset(&device).unwrap();
        assert!(!device.fence_signaled(sync.in_flight));

        unsafe { sync.destroy(&device) };
        assert_eq!(device.live_count(HandleKind::Semaphore), 0);
        assert_eq!(device.live_count(HandleKind::Fence), 0);
    }

    #[test]
    fn partial_slot_creation_is_released() {
        let device = MockDevice::new();
        // First slot succeeds (two semaphores), second slot fails on its first semaphore.
        device.fail_after(MockOp::CreateSemaphore, 2);

        assert!(create_frame_syncs(&device, 2).is_err());
        assert_eq!(device.live_count(HandleKind::Semaphore), 0);
        assert_eq!(device.live_count(HandleKind::Fence), 0);
    }
}
