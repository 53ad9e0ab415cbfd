//! Render systems record draw commands for a scene.

use ash::vk;
use framekit_core::SimplePushConstantData;
use framekit_gpu::{GraphicsDevice, GraphicsPipeline, GraphicsPipelineConfig};

use crate::error::Result;
use crate::frame::FrameContext;
use crate::model::Vertex;
use crate::scene::SceneView;

/// Records one frame's worth of draws into the frame's command buffer.
///
/// Called between `begin_swapchain_render_pass` and
/// `end_swapchain_render_pass`. Implementations must not keep the command
/// buffer past the call.
pub trait RenderSystem {
    fn render<D: GraphicsDevice + ?Sized>(
        &mut self,
        device: &D,
        frame: &FrameContext,
        scene: &SceneView<'_>,
    );

    /// Called once after the swapchain was rebuilt.
    ///
    /// Pipelines use dynamic viewport and scissor, and a new generation keeps
    /// the color and depth formats, so the default does nothing.
    fn on_swapchain_recreated<D: GraphicsDevice + ?Sized>(
        &mut self,
        _device: &D,
        _render_pass: vk::RenderPass,
    ) -> Result<()> {
        Ok(())
    }
}

/// Flat-shaded objects: one pipeline, one push constant block per draw.
#[derive(Debug)]
pub struct SimpleRenderSystem {
    pipeline: GraphicsPipeline,
}

impl SimpleRenderSystem {
    /// Stages that read the push constant block.
    pub const PUSH_STAGES: vk::ShaderStageFlags = vk::ShaderStageFlags::from_raw(
        vk::ShaderStageFlags::VERTEX.as_raw() | vk::ShaderStageFlags::FRAGMENT.as_raw(),
    );

    pub fn new<D: GraphicsDevice + ?Sized>(
        device: &D,
        render_pass: vk::RenderPass,
        vertex_shader: &[u32],
        fragment_shader: &[u32],
    ) -> Result<Self> {
        let config = GraphicsPipelineConfig {
            vertex_shader: vertex_shader.to_vec(),
            fragment_shader: fragment_shader.to_vec(),
            vertex_bindings: Vertex::binding_descriptions(),
            vertex_attributes: Vertex::attribute_descriptions(),
            ..Default::default()
        };
        let pipeline =
            device.create_graphics_pipeline(&config, render_pass, &[Self::push_constant_range()])?;

        tracing::debug!("Created simple render system pipeline");
        Ok(Self { pipeline })
    }

    pub const fn push_constant_range() -> vk::PushConstantRange {
        vk::PushConstantRange {
            stage_flags: Self::PUSH_STAGES,
            offset: 0,
            size: SimplePushConstantData::SIZE,
        }
    }

    pub const fn pipeline(&self) -> GraphicsPipeline {
        self.pipeline
    }

    /// # Safety
    /// No pending command buffer may use the pipeline.
    pub unsafe fn destroy<D: GraphicsDevice + ?Sized>(&self, device: &D) {
        // SAFETY: forwarded to the caller.
        unsafe { device.destroy_graphics_pipeline(&self.pipeline) };
    }
}

impl RenderSystem for SimpleRenderSystem {
    #[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
    fn render<D: GraphicsDevice + ?Sized>(
        &mut self,
        device: &D,
        frame: &FrameContext,
        scene: &SceneView<'_>,
    ) {
        let cmd = frame.command_buffer;
        device.cmd_bind_pipeline(cmd, self.pipeline.pipeline);

        let projection_view = scene.camera.view_projection();
        for object in scene.objects {
            let Some(model) = &object.model else {
                continue;
            };
            let push = SimplePushConstantData::new(
                projection_view * object.transform.mat4(),
                object.color,
            );
            model.bind(device, cmd);
            device.cmd_push_constants(cmd, self.pipeline.layout, Self::PUSH_STAGES, push.as_bytes());
            model.draw(device, cmd);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::model::{Model, ModelBuilder};
    use crate::scene::ObjectStore;
    use framekit_core::Camera;
    use framekit_gpu::mock::{HandleKind, MockDevice, RecordedCommand};
    use framekit_gpu::GenerationId;
    use glam::{Mat4, Vec3};

    const SHADER: [u32; 1] = [0x0723_0203];

    fn frame(command_buffer: vk::CommandBuffer) -> FrameContext {
        FrameContext {
            command_buffer,
            frame_index: 0,
            image_index: 0,
            extent: vk::Extent2D {
                width: 800,
                height: 600,
            },
            generation: GenerationId(0),
            dt: 0.016,
        }
    }

    fn render_pass(device: &MockDevice) -> vk::RenderPass {
        device
            .create_render_pass(&vk::RenderPassCreateInfo::default())
            .unwrap()
    }

    #[test]
    fn push_range_covers_the_parameter_block() {
        let range = SimpleRenderSystem::push_constant_range();
        assert_eq!(range.size, 80);
        assert_eq!(range.offset, 0);
        assert!(range.stage_flags.contains(vk::ShaderStageFlags::VERTEX));
        assert!(range.stage_flags.contains(vk::ShaderStageFlags::FRAGMENT));
    }

    #[test]
    fn binds_once_and_pushes_before_every_draw() {
        let device = MockDevice::new();
        let pass = render_pass(&device);
        let mut system = SimpleRenderSystem::new(&device, pass, &SHADER, &SHADER).unwrap();
        let cube = Arc::new(Model::new(&device, &ModelBuilder::cube(Vec3::ZERO)).unwrap());

        let mut store = ObjectStore::new();
        for z in [2.5, 4.0] {
            let object = store.create();
            object.model = Some(cube.clone());
            object.color = Vec3::new(0.5, 0.25, 1.0);
            object.transform.translation = Vec3::new(0.0, 0.0, z);
        }
        // No model: skipped.
        store.create();

        let mut camera = Camera::default();
        camera.set_perspective_projection(50f32.to_radians(), 800.0 / 600.0, 0.1, 10.0);

        let cmd = device.allocate_command_buffers(1).unwrap()[0];
        device.begin_command_buffer(cmd).unwrap();
        system.render(&device, &frame(cmd), &store.view(&camera));

        let commands = device.recorded_commands();
        let binds = commands
            .iter()
            .filter(|c| matches!(c, RecordedCommand::BindPipeline(_)))
            .count();
        assert_eq!(binds, 1);
        assert!(matches!(commands[0], RecordedCommand::BindPipeline(p) if p == system.pipeline().pipeline));

        let draws: Vec<usize> = commands
            .iter()
            .enumerate()
            .filter(|(_, c)| matches!(c, RecordedCommand::DrawIndexed { index_count: 36 }))
            .map(|(i, _)| i)
            .collect();
        assert_eq!(draws.len(), 2);
        for i in draws {
            assert!(matches!(commands[i - 1], RecordedCommand::PushConstants { .. }));
        }
    }

    #[test]
    fn pushed_block_is_projection_view_times_model() {
        let device = MockDevice::new();
        let pass = render_pass(&device);
        let mut system = SimpleRenderSystem::new(&device, pass, &SHADER, &SHADER).unwrap();
        let cube = Arc::new(Model::new(&device, &ModelBuilder::cube(Vec3::ZERO)).unwrap());

        let mut store = ObjectStore::new();
        let object = store.create();
        object.model = Some(cube);
        object.color = Vec3::new(0.1, 0.8, 0.1);
        object.transform.translation = Vec3::new(1.0, 0.0, 3.0);
        object.transform.scale = Vec3::splat(0.5);
        let model_matrix = object.transform.mat4();

        let mut camera = Camera::default();
        camera.set_orthographic_projection(-1.0, 1.0, -1.0, 1.0, -1.0, 1.0);
        camera.set_view_target(Vec3::new(0.0, 0.0, -2.0), Vec3::ZERO, Vec3::NEG_Y);

        let cmd = device.allocate_command_buffers(1).unwrap()[0];
        device.begin_command_buffer(cmd).unwrap();
        system.render(&device, &frame(cmd), &store.view(&camera));

        let pushed = device
            .recorded_commands()
            .into_iter()
            .find_map(|c| match c {
                RecordedCommand::PushConstants { layout, stages, data } => {
                    Some((layout, stages, data))
                }
                _ => None,
            })
            .unwrap();
        assert_eq!(pushed.0, system.pipeline().layout);
        assert_eq!(pushed.1, SimpleRenderSystem::PUSH_STAGES);

        let block: SimplePushConstantData = bytemuck::pod_read_unaligned(&pushed.2);
        let expected: Mat4 = camera.view_projection() * model_matrix;
        assert!(block.transform.abs_diff_eq(expected, 1e-6));
        approx::assert_relative_eq!(block.color.y, 0.8);
    }

    #[test]
    fn destroy_releases_pipeline_and_layout() {
        let device = MockDevice::new();
        let pass = render_pass(&device);
        let system = SimpleRenderSystem::new(&device, pass, &SHADER, &SHADER).unwrap();
        assert_eq!(device.live_count(HandleKind::Pipeline), 1);

        // SAFETY: never recorded.
        unsafe { system.destroy(&device) };
        assert_eq!(device.live_count(HandleKind::Pipeline), 0);
        assert_eq!(device.live_count(HandleKind::PipelineLayout), 0);
    }
}
