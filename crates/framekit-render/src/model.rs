//! Vertex data and device-resident meshes.

use std::mem::{offset_of, size_of};

use ash::vk;
use bytemuck::{Pod, Zeroable};
use framekit_gpu::GraphicsDevice;
use glam::{Vec2, Vec3};

use crate::error::{RenderError, Result};

/// Vertex layout consumed by `simple.vert`.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: Vec3,
    pub color: Vec3,
    pub normal: Vec3,
    pub uv: Vec2,
}

impl Vertex {
    pub const fn new(position: Vec3, color: Vec3) -> Self {
        Self {
            position,
            color,
            normal: Vec3::ZERO,
            uv: Vec2::ZERO,
        }
    }

    /// A single interleaved binding at slot 0.
    #[allow(clippy::cast_possible_truncation)]
    pub fn binding_descriptions() -> Vec<vk::VertexInputBindingDescription> {
        vec![vk::VertexInputBindingDescription {
            binding: 0,
            stride: size_of::<Self>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        }]
    }

    /// Locations 0..=3: position, color, normal, uv.
    #[allow(clippy::cast_possible_truncation)]
    pub fn attribute_descriptions() -> Vec<vk::VertexInputAttributeDescription> {
        let attribute = |location, format, offset: usize| vk::VertexInputAttributeDescription {
            location,
            binding: 0,
            format,
            offset: offset as u32,
        };
        vec![
            attribute(0, vk::Format::R32G32B32_SFLOAT, offset_of!(Self, position)),
            attribute(1, vk::Format::R32G32B32_SFLOAT, offset_of!(Self, color)),
            attribute(2, vk::Format::R32G32B32_SFLOAT, offset_of!(Self, normal)),
            attribute(3, vk::Format::R32G32_SFLOAT, offset_of!(Self, uv)),
        ]
    }
}

/// CPU-side mesh data waiting to be uploaded.
#[derive(Clone, Debug, Default)]
pub struct ModelBuilder {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

/// Outward normal, color, and corners (two opposite corners first) per face.
const CUBE_FACES: [([f32; 3], [f32; 3], [[f32; 3]; 4]); 6] = [
    // left
    (
        [-1.0, 0.0, 0.0],
        [0.9, 0.9, 0.9],
        [[-0.5, -0.5, -0.5], [-0.5, 0.5, 0.5], [-0.5, -0.5, 0.5], [-0.5, 0.5, -0.5]],
    ),
    // right
    (
        [1.0, 0.0, 0.0],
        [0.8, 0.8, 0.1],
        [[0.5, -0.5, -0.5], [0.5, 0.5, 0.5], [0.5, -0.5, 0.5], [0.5, 0.5, -0.5]],
    ),
    // top (y points down)
    (
        [0.0, -1.0, 0.0],
        [0.9, 0.6, 0.1],
        [[-0.5, -0.5, -0.5], [0.5, -0.5, 0.5], [-0.5, -0.5, 0.5], [0.5, -0.5, -0.5]],
    ),
    // bottom
    (
        [0.0, 1.0, 0.0],
        [0.8, 0.1, 0.1],
        [[-0.5, 0.5, -0.5], [0.5, 0.5, 0.5], [-0.5, 0.5, 0.5], [0.5, 0.5, -0.5]],
    ),
    // nose
    (
        [0.0, 0.0, 1.0],
        [0.1, 0.1, 0.8],
        [[-0.5, -0.5, 0.5], [0.5, 0.5, 0.5], [-0.5, 0.5, 0.5], [0.5, -0.5, 0.5]],
    ),
    // tail
    (
        [0.0, 0.0, -1.0],
        [0.1, 0.8, 0.1],
        [[-0.5, -0.5, -0.5], [0.5, 0.5, -0.5], [-0.5, 0.5, -0.5], [0.5, -0.5, -0.5]],
    ),
];

impl ModelBuilder {
    pub const fn new() -> Self {
        Self {
            vertices: Vec::new(),
            indices: Vec::new(),
        }
    }

    /// Unit cube centered on `offset`, one flat color per face.
    pub fn cube(offset: Vec3) -> Self {
        let mut builder = Self::new();
        for (face, (normal, color, corners)) in (0u32..).zip(CUBE_FACES) {
            for corner in corners {
                builder.vertices.push(Vertex {
                    position: Vec3::from(corner) + offset,
                    color: Vec3::from(color),
                    normal: Vec3::from(normal),
                    uv: Vec2::ZERO,
                });
            }
            let base = face * 4;
            builder
                .indices
                .extend([0, 1, 2, 0, 3, 1].map(|i| base + i));
        }
        builder
    }

    pub fn with_vertices(mut self, vertices: Vec<Vertex>) -> Self {
        self.vertices = vertices;
        self
    }

    pub fn with_indices(mut self, indices: Vec<u32>) -> Self {
        self.indices = indices;
        self
    }
}

/// A mesh in device-local memory.
///
/// Drawn indexed when the builder carried indices, otherwise as a plain
/// triangle list.
#[derive(Debug)]
pub struct Model {
    vertex_buffer: vk::Buffer,
    vertex_count: u32,
    index_buffer: Option<vk::Buffer>,
    index_count: u32,
}

impl Model {
    /// Upload `builder` to the device. Needs at least one triangle.
    pub fn new<D: GraphicsDevice + ?Sized>(device: &D, builder: &ModelBuilder) -> Result<Self> {
        if builder.vertices.len() < 3 {
            return Err(RenderError::ContractViolation(
                "a model needs at least 3 vertices",
            ));
        }
        let vertex_count = u32::try_from(builder.vertices.len())
            .map_err(|_| RenderError::ContractViolation("too many vertices for one draw"))?;
        let index_count = u32::try_from(builder.indices.len())
            .map_err(|_| RenderError::ContractViolation("too many indices for one draw"))?;

        let vertex_buffer = device.create_buffer_with_data(
            vk::BufferUsageFlags::VERTEX_BUFFER,
            bytemuck::cast_slice(&builder.vertices),
            "model vertices",
        )?;

        let index_buffer = if builder.indices.is_empty() {
            None
        } else {
            match device.create_buffer_with_data(
                vk::BufferUsageFlags::INDEX_BUFFER,
                bytemuck::cast_slice(&builder.indices),
                "model indices",
            ) {
                Ok(buffer) => Some(buffer),
                Err(e) => {
                    // SAFETY: never bound.
                    unsafe { device.destroy_buffer(vertex_buffer) };
                    return Err(e.into());
                }
            }
        };

        tracing::debug!(vertex_count, index_count, "Uploaded model");

        Ok(Self {
            vertex_buffer,
            vertex_count,
            index_buffer,
            index_count,
        })
    }

    pub fn bind<D: GraphicsDevice + ?Sized>(&self, device: &D, command_buffer: vk::CommandBuffer) {
        device.cmd_bind_vertex_buffer(command_buffer, self.vertex_buffer);
        if let Some(index_buffer) = self.index_buffer {
            device.cmd_bind_index_buffer(command_buffer, index_buffer);
        }
    }

    pub fn draw<D: GraphicsDevice + ?Sized>(&self, device: &D, command_buffer: vk::CommandBuffer) {
        if self.index_buffer.is_some() {
            device.cmd_draw_indexed(command_buffer, self.index_count);
        } else {
            device.cmd_draw(command_buffer, self.vertex_count);
        }
    }

    pub const fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    pub const fn index_count(&self) -> u32 {
        self.index_count
    }

    pub const fn is_indexed(&self) -> bool {
        self.index_buffer.is_some()
    }

    /// Release the buffers.
    ///
    /// # Safety
    /// No pending command buffer may reference this model.
    pub unsafe fn destroy<D: GraphicsDevice + ?Sized>(&self, device: &D) {
        // SAFETY: forwarded to the caller.
        unsafe {
            if let Some(index_buffer) = self.index_buffer {
                device.destroy_buffer(index_buffer);
            }
            device.destroy_buffer(self.vertex_buffer);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use framekit_gpu::mock::{HandleKind, MockDevice, MockOp, RecordedCommand};
    use framekit_gpu::GpuError;

    fn recording(device: &MockDevice) -> vk::CommandBuffer {
        let cmd = device.allocate_command_buffers(1).unwrap()[0];
        device.begin_command_buffer(cmd).unwrap();
        cmd
    }

    fn triangle() -> ModelBuilder {
        ModelBuilder::new().with_vertices(vec![
            Vertex::new(Vec3::new(0.0, -0.5, 0.0), Vec3::X),
            Vertex::new(Vec3::new(0.5, 0.5, 0.0), Vec3::Y),
            Vertex::new(Vec3::new(-0.5, 0.5, 0.0), Vec3::Z),
        ])
    }

    #[test]
    fn vertex_layout_matches_shader_inputs() {
        assert_eq!(size_of::<Vertex>(), 44);
        assert_eq!(Vertex::binding_descriptions()[0].stride, 44);

        let offsets: Vec<_> = Vertex::attribute_descriptions()
            .iter()
            .map(|a| (a.location, a.offset))
            .collect();
        assert_eq!(offsets, vec![(0, 0), (1, 12), (2, 24), (3, 36)]);
    }

    #[test]
    fn cube_has_four_vertices_and_two_triangles_per_face() {
        let cube = ModelBuilder::cube(Vec3::new(0.0, 0.0, 2.5));

        assert_eq!(cube.vertices.len(), 24);
        assert_eq!(cube.indices.len(), 36);
        assert_eq!(&cube.indices[6..12], &[4, 5, 6, 4, 7, 5]);
        assert!(cube.indices.iter().all(|&i| i < 24));
        for vertex in &cube.vertices {
            let local = vertex.position - Vec3::new(0.0, 0.0, 2.5);
            approx::assert_relative_eq!(local.abs().max_element(), 0.5);
            approx::assert_relative_eq!(vertex.normal.length(), 1.0);
        }
    }

    #[test]
    fn fewer_than_three_vertices_is_rejected() {
        let device = MockDevice::new();
        let builder = ModelBuilder::new().with_vertices(vec![Vertex::default(); 2]);

        assert!(matches!(
            Model::new(&device, &builder),
            Err(RenderError::ContractViolation(_))
        ));
        assert_eq!(device.live_count(HandleKind::Buffer), 0);
    }

    #[test]
    fn indexed_model_binds_and_draws_indexed() {
        let device = MockDevice::new();
        let model = Model::new(&device, &ModelBuilder::cube(Vec3::ZERO)).unwrap();
        let cmd = recording(&device);

        model.bind(&device, cmd);
        model.draw(&device, cmd);

        let commands = device.recorded_commands();
        assert!(matches!(commands[0], RecordedCommand::BindVertexBuffer(_)));
        assert!(matches!(commands[1], RecordedCommand::BindIndexBuffer(_)));
        assert!(matches!(
            commands[2],
            RecordedCommand::DrawIndexed { index_count: 36 }
        ));
        let RecordedCommand::BindVertexBuffer(vertices) = commands[0] else {
            unreachable!()
        };
        assert_eq!(device.buffer_size(vertices), Some(24 * 44));

        // SAFETY: nothing was submitted.
        unsafe { model.destroy(&device) };
        assert_eq!(device.live_count(HandleKind::Buffer), 0);
    }

    #[test]
    fn plain_model_draws_vertices() {
        let device = MockDevice::new();
        let model = Model::new(&device, &triangle()).unwrap();
        let cmd = recording(&device);

        assert!(!model.is_indexed());
        model.bind(&device, cmd);
        model.draw(&device, cmd);

        let commands = device.recorded_commands();
        assert_eq!(commands.len(), 2);
        assert!(matches!(
            commands[1],
            RecordedCommand::Draw { vertex_count: 3 }
        ));

        // SAFETY: nothing was submitted.
        unsafe { model.destroy(&device) };
    }

    #[test]
    fn failed_index_upload_releases_vertex_buffer() {
        let device = MockDevice::new();
        device.fail_after(MockOp::CreateBuffer, 1);

        let result = Model::new(&device, &ModelBuilder::cube(Vec3::ZERO));

        assert!(matches!(
            result,
            Err(RenderError::Gpu(GpuError::Vulkan(_) | GpuError::AllocationFailed(_)))
        ));
        assert_eq!(device.live_count(HandleKind::Buffer), 0);
    }
}
