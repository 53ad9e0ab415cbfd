//! Command buffer management.

use crate::device::GraphicsDevice;
use crate::error::Result;
use ash::vk;

/// Command pool for allocating command buffers.
pub struct CommandPool {
    pool: vk::CommandPool,
    queue_family: u32,
}

impl CommandPool {
    /// Create a new command pool.
    ///
    /// # Safety
    /// The device must be valid and the queue family must exist.
    pub unsafe fn new(
        device: &ash::Device,
        queue_family: u32,
        flags: vk::CommandPoolCreateFlags,
    ) -> Result<Self> {
        let create_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(queue_family)
            .flags(flags);

        // SAFETY: forwarded to the caller.
        let pool = unsafe { device.create_command_pool(&create_info, None)? };

        Ok(Self { pool, queue_family })
    }

    /// Get the raw pool handle.
    pub const fn handle(&self) -> vk::CommandPool {
        self.pool
    }

    /// Get the queue family index.
    pub const fn queue_family(&self) -> u32 {
        self.queue_family
    }

    /// Allocate primary command buffers.
    ///
    /// # Safety
    /// The device must be valid and own this pool.
    pub unsafe fn allocate_command_buffers(
        &self,
        device: &ash::Device,
        count: u32,
    ) -> Result<Vec<vk::CommandBuffer>> {
        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(count);

        // SAFETY: forwarded to the caller.
        let buffers = unsafe { device.allocate_command_buffers(&alloc_info)? };
        Ok(buffers)
    }

    /// Free command buffers back to the pool.
    ///
    /// # Safety
    /// The buffers must come from this pool and must not be pending.
    pub unsafe fn free_command_buffers(
        &self,
        device: &ash::Device,
        command_buffers: &[vk::CommandBuffer],
    ) {
        if command_buffers.is_empty() {
            return;
        }
        // SAFETY: forwarded to the caller.
        unsafe { device.free_command_buffers(self.pool, command_buffers) };
    }

    /// Destroy the command pool.
    ///
    /// # Safety
    /// The device must be valid and the pool must not be in use.
    pub unsafe fn destroy(&self, device: &ash::Device) {
        // SAFETY: forwarded to the caller.
        unsafe { device.destroy_command_pool(self.pool, None) };
    }
}

/// Execute a single-time command buffer and wait for it on the queue.
///
/// # Safety
/// All handles must be valid and `pool` must belong to `queue`'s family.
pub unsafe fn execute_single_time_commands<F>(
    device: &ash::Device,
    pool: &CommandPool,
    queue: vk::Queue,
    f: F,
) -> Result<()>
where
    F: FnOnce(vk::CommandBuffer),
{
    // SAFETY: forwarded to the caller.
    unsafe {
        let cmds = pool.allocate_command_buffers(device, 1)?;
        let cmd = cmds[0];

        let begin_info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        let result = (|| -> Result<()> {
            device.begin_command_buffer(cmd, &begin_info)?;
            f(cmd);
            device.end_command_buffer(cmd)?;

            let submit_info = vk::SubmitInfo::default().command_buffers(&cmds);
            device.queue_submit(queue, &[submit_info], vk::Fence::null())?;
            device.queue_wait_idle(queue)?;
            Ok(())
        })();

        pool.free_command_buffers(device, &cmds);
        result
    }
}

/// One primary command buffer per in-flight frame slot.
///
/// Buffers are reused across frames. They are replaced only as a whole:
/// the old set is freed as a single batch before a fresh set is allocated.
#[derive(Debug)]
pub struct CommandBufferPool {
    buffers: Vec<vk::CommandBuffer>,
}

impl CommandBufferPool {
    /// Allocate `slots` command buffers.
    pub fn new<D: GraphicsDevice + ?Sized>(device: &D, slots: usize) -> Result<Self> {
        let buffers = device.allocate_command_buffers(slot_count(slots))?;
        Ok(Self { buffers })
    }

    /// Command buffer owned by `slot`.
    pub fn get(&self, slot: usize) -> Option<vk::CommandBuffer> {
        self.buffers.get(slot).copied()
    }

    /// Number of slots.
    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    /// Whether the pool holds no buffers.
    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    /// Free every buffer in one batch and allocate a fresh set of the same size.
    ///
    /// If the allocation fails the pool is left empty.
    ///
    /// # Safety
    /// None of the buffers may be pending execution.
    pub unsafe fn rebuild<D: GraphicsDevice + ?Sized>(&mut self, device: &D) -> Result<()> {
        let slots = self.buffers.len();
        // SAFETY: forwarded to the caller.
        unsafe { self.free(device) };
        self.buffers = device.allocate_command_buffers(slot_count(slots))?;
        tracing::debug!(slots, "Rebuilt frame command buffers");
        Ok(())
    }

    /// Free every buffer in one batch.
    ///
    /// # Safety
    /// None of the buffers may be pending execution.
    pub unsafe fn free<D: GraphicsDevice + ?Sized>(&mut self, device: &D) {
        if self.buffers.is_empty() {
            return;
        }
        // SAFETY: forwarded to the caller.
        unsafe { device.free_command_buffers(&self.buffers) };
        self.buffers.clear();
    }
}

#[allow(clippy::cast_possible_truncation)]
const fn slot_count(slots: usize) -> u32 {
    slots as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{HandleKind, MockDevice};

    #[test]
    fn one_buffer_per_slot() {
        let device = MockDevice::new();
        let pool = CommandBufferPool::new(&device, 2).unwrap();

        assert_eq!(pool.len(), 2);
        assert_ne!(pool.get(0), pool.get(1));
        assert!(pool.get(2).is_none());
        assert_eq!(device.live_count(HandleKind::CommandBuffer), 2);
    }

    #[test]
    fn rebuild_frees_as_one_batch() {
        let device = MockDevice::new();
        let mut pool = CommandBufferPool::new(&device, 2).unwrap();
        let before = pool.get(0);

        unsafe { pool.rebuild(&device).unwrap() };

        let counters = device.counters();
        assert_eq!(counters.allocate_calls, 2);
        assert_eq!(counters.free_calls, 1);
        assert_eq!(pool.len(), 2);
        assert_ne!(pool.get(0), before);
        assert_eq!(device.live_count(HandleKind::CommandBuffer), 2);

        unsafe { pool.free(&device) };
        assert!(pool.is_empty());
        assert_eq!(device.live_count(HandleKind::CommandBuffer), 0);
    }
}
