//! Scripted presentation surface for orchestrator tests.

use std::collections::VecDeque;

use ash::vk;

use crate::presentation::PresentationSurface;

/// Reports extents from a script; the last one repeats forever.
pub struct MockSurface {
    extents: VecDeque<vk::Extent2D>,
    resized: bool,
    waits: u32,
}

impl MockSurface {
    pub fn new(extent: vk::Extent2D) -> Self {
        Self::scripted(&[extent])
    }

    pub fn scripted(extents: &[vk::Extent2D]) -> Self {
        assert!(!extents.is_empty(), "a surface needs at least one extent");
        Self {
            extents: extents.iter().copied().collect(),
            resized: false,
            waits: 0,
        }
    }

    /// Replace the script with a single extent and raise the resize flag.
    pub fn set_extent(&mut self, extent: vk::Extent2D) {
        self.extents = VecDeque::from([extent]);
        self.resized = true;
    }

    pub fn flag_resize(&mut self) {
        self.resized = true;
    }

    pub const fn resize_pending(&self) -> bool {
        self.resized
    }

    /// Times the orchestrator blocked waiting for events.
    pub const fn waits(&self) -> u32 {
        self.waits
    }
}

impl PresentationSurface for MockSurface {
    fn current_extent(&mut self) -> vk::Extent2D {
        if self.extents.len() > 1 {
            self.extents.pop_front().unwrap_or_default()
        } else {
            self.extents.front().copied().unwrap_or_default()
        }
    }

    fn consume_resize_flag(&mut self) -> bool {
        std::mem::take(&mut self.resized)
    }

    fn wait_events(&mut self) {
        self.waits += 1;
    }
}
