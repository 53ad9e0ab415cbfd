//! Core object and draw-data types.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};

/// Unique identifier for a drawable object.
///
/// Ids are handed out by an [`ObjectIdAllocator`] and are never reused
/// by the allocator that produced them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct ObjectId(pub u64);

impl std::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Sequential id source owned by an object store.
///
/// Each store owns its own allocator, so two stores built the same way
/// assign the same ids in the same order.
#[derive(Debug, Default)]
pub struct ObjectIdAllocator {
    next: u64,
}

impl ObjectIdAllocator {
    /// Create an allocator starting at id 0.
    pub const fn new() -> Self {
        Self { next: 0 }
    }

    /// Hand out the next id.
    pub fn allocate(&mut self) -> ObjectId {
        let id = ObjectId(self.next);
        self.next += 1;
        id
    }

    /// Number of ids handed out so far.
    pub const fn allocated(&self) -> u64 {
        self.next
    }
}

/// Per-object parameter block pushed before every draw.
///
/// Layout must match the `Push` block in `simple.vert`:
/// a column-major 4x4 transform followed by an RGB color padded to 16 bytes.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct SimplePushConstantData {
    /// Projection * view * model.
    pub transform: Mat4,
    /// Flat object color.
    pub color: Vec3,
    _padding: f32,
}

impl SimplePushConstantData {
    /// Size of the block in bytes, as declared in the pipeline layout.
    pub const SIZE: u32 = std::mem::size_of::<Self>() as u32;

    /// Create a new push constant block.
    pub const fn new(transform: Mat4, color: Vec3) -> Self {
        Self {
            transform,
            color,
            _padding: 0.0,
        }
    }

    /// View the block as raw bytes for `vkCmdPushConstants`.
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }
}

impl Default for SimplePushConstantData {
    fn default() -> Self {
        Self::new(Mat4::IDENTITY, Vec3::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocator_is_sequential() {
        let mut ids = ObjectIdAllocator::new();
        assert_eq!(ids.allocate(), ObjectId(0));
        assert_eq!(ids.allocate(), ObjectId(1));
        assert_eq!(ids.allocate(), ObjectId(2));
        assert_eq!(ids.allocated(), 3);
    }

    #[test]
    fn allocators_are_independent() {
        let mut a = ObjectIdAllocator::new();
        let mut b = ObjectIdAllocator::new();
        a.allocate();
        a.allocate();
        assert_eq!(b.allocate(), ObjectId(0));
        assert_eq!(a.allocate(), ObjectId(2));
    }

    #[test]
    fn push_constant_layout() {
        assert_eq!(std::mem::size_of::<SimplePushConstantData>(), 80);
        assert_eq!(SimplePushConstantData::SIZE, 80);
        assert_eq!(std::mem::offset_of!(SimplePushConstantData, transform), 0);
        assert_eq!(std::mem::offset_of!(SimplePushConstantData, color), 64);
    }

    #[test]
    fn push_constant_bytes() {
        let push = SimplePushConstantData::new(Mat4::IDENTITY, Vec3::new(1.0, 0.5, 0.25));
        let bytes = push.as_bytes();
        assert_eq!(bytes.len(), 80);

        let floats: &[f32] = bytemuck::cast_slice(bytes);
        assert_eq!(floats[0], 1.0);
        assert_eq!(floats[5], 1.0);
        assert_eq!(&floats[16..20], &[1.0, 0.5, 0.25, 0.0]);
    }
}
