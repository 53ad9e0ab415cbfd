//! Graphics pipeline creation.

use crate::error::{GpuError, Result};
use ash::vk;

/// Everything that varies between graphics pipelines.
///
/// Viewport and scissor are always dynamic, so a pipeline survives
/// swapchain recreation as long as the render pass stays compatible.
#[derive(Clone, Debug)]
pub struct GraphicsPipelineConfig {
    pub vertex_shader: Vec<u32>,
    pub fragment_shader: Vec<u32>,
    pub vertex_bindings: Vec<vk::VertexInputBindingDescription>,
    pub vertex_attributes: Vec<vk::VertexInputAttributeDescription>,
    pub topology: vk::PrimitiveTopology,
    pub polygon_mode: vk::PolygonMode,
    pub cull_mode: vk::CullModeFlags,
    pub front_face: vk::FrontFace,
    pub depth_test: bool,
    pub depth_write: bool,
    /// Subpass of the render pass the pipeline is used in.
    pub subpass: u32,
}

impl Default for GraphicsPipelineConfig {
    fn default() -> Self {
        Self {
            vertex_shader: Vec::new(),
            fragment_shader: Vec::new(),
            vertex_bindings: Vec::new(),
            vertex_attributes: Vec::new(),
            topology: vk::PrimitiveTopology::TRIANGLE_LIST,
            polygon_mode: vk::PolygonMode::FILL,
            cull_mode: vk::CullModeFlags::NONE,
            front_face: vk::FrontFace::CLOCKWISE,
            depth_test: true,
            depth_write: true,
            subpass: 0,
        }
    }
}

const DYNAMIC_STATES: [vk::DynamicState; 2] = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];

impl GraphicsPipelineConfig {
    fn input_assembly(&self) -> vk::PipelineInputAssemblyStateCreateInfo<'static> {
        vk::PipelineInputAssemblyStateCreateInfo {
            topology: self.topology,
            ..Default::default()
        }
    }

    fn rasterization(&self) -> vk::PipelineRasterizationStateCreateInfo<'static> {
        vk::PipelineRasterizationStateCreateInfo {
            polygon_mode: self.polygon_mode,
            cull_mode: self.cull_mode,
            front_face: self.front_face,
            line_width: 1.0,
            ..Default::default()
        }
    }

    fn depth_stencil(&self) -> vk::PipelineDepthStencilStateCreateInfo<'static> {
        vk::PipelineDepthStencilStateCreateInfo {
            depth_test_enable: vk::Bool32::from(self.depth_test),
            depth_write_enable: vk::Bool32::from(self.depth_write),
            depth_compare_op: vk::CompareOp::LESS,
            ..Default::default()
        }
    }

    fn check_shaders(&self) -> Result<()> {
        if self.vertex_shader.is_empty() || self.fragment_shader.is_empty() {
            return Err(GpuError::PipelineCreation(
                "vertex and fragment shaders are required".to_string(),
            ));
        }
        Ok(())
    }
}

/// A pipeline and the layout its push constants are declared in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GraphicsPipeline {
    pub pipeline: vk::Pipeline,
    pub layout: vk::PipelineLayout,
}

impl GraphicsPipeline {
    /// Create a graphics pipeline for `render_pass`.
    ///
    /// # Safety
    /// `render_pass` must belong to `device`, and the shaders must be valid
    /// SPIR-V with a `main` entry point.
    pub unsafe fn new(
        device: &ash::Device,
        config: &GraphicsPipelineConfig,
        render_pass: vk::RenderPass,
        push_constant_ranges: &[vk::PushConstantRange],
    ) -> Result<Self> {
        config.check_shaders()?;

        // SAFETY: forwarded to the caller.
        unsafe {
            let modules = ShaderModules::new(device, config)?;
            let layout = device
                .create_pipeline_layout(
                    &vk::PipelineLayoutCreateInfo::default()
                        .push_constant_ranges(push_constant_ranges),
                    None,
                )
                .map_err(|e| GpuError::PipelineCreation(format!("layout: {e}")))?;

            let result = create_pipeline(device, config, render_pass, layout, &modules);
            // Baked into the pipeline, or no longer needed on failure.
            modules.destroy(device);

            match result {
                Ok(pipeline) => Ok(Self { pipeline, layout }),
                Err(e) => {
                    device.destroy_pipeline_layout(layout, None);
                    Err(e)
                }
            }
        }
    }

    /// # Safety
    /// No pending command buffer may use the pipeline.
    pub unsafe fn destroy(&self, device: &ash::Device) {
        // SAFETY: forwarded to the caller.
        unsafe {
            device.destroy_pipeline(self.pipeline, None);
            device.destroy_pipeline_layout(self.layout, None);
        }
    }
}

struct ShaderModules {
    vertex: vk::ShaderModule,
    fragment: vk::ShaderModule,
}

impl ShaderModules {
    unsafe fn new(device: &ash::Device, config: &GraphicsPipelineConfig) -> Result<Self> {
        let create = |code: &[u32], stage: &str| {
            let info = vk::ShaderModuleCreateInfo::default().code(code);
            // SAFETY: forwarded to the caller.
            unsafe { device.create_shader_module(&info, None) }
                .map_err(|e| GpuError::ShaderCompilation(format!("{stage} shader: {e}")))
        };

        let vertex = create(&config.vertex_shader, "vertex")?;
        match create(&config.fragment_shader, "fragment") {
            Ok(fragment) => Ok(Self { vertex, fragment }),
            Err(e) => {
                // SAFETY: never used.
                unsafe { device.destroy_shader_module(vertex, None) };
                Err(e)
            }
        }
    }

    unsafe fn destroy(&self, device: &ash::Device) {
        // SAFETY: forwarded to the caller.
        unsafe {
            device.destroy_shader_module(self.vertex, None);
            device.destroy_shader_module(self.fragment, None);
        }
    }
}

unsafe fn create_pipeline(
    device: &ash::Device,
    config: &GraphicsPipelineConfig,
    render_pass: vk::RenderPass,
    layout: vk::PipelineLayout,
    modules: &ShaderModules,
) -> Result<vk::Pipeline> {
    let stages = [
        (vk::ShaderStageFlags::VERTEX, modules.vertex),
        (vk::ShaderStageFlags::FRAGMENT, modules.fragment),
    ]
    .map(|(stage, module)| {
        vk::PipelineShaderStageCreateInfo::default()
            .stage(stage)
            .module(module)
            .name(c"main")
    });

    let vertex_input = vk::PipelineVertexInputStateCreateInfo::default()
        .vertex_binding_descriptions(&config.vertex_bindings)
        .vertex_attribute_descriptions(&config.vertex_attributes);
    let input_assembly = config.input_assembly();
    let viewport = vk::PipelineViewportStateCreateInfo {
        viewport_count: 1,
        scissor_count: 1,
        ..Default::default()
    };
    let rasterization = config.rasterization();
    let multisample = vk::PipelineMultisampleStateCreateInfo {
        rasterization_samples: vk::SampleCountFlags::TYPE_1,
        ..Default::default()
    };
    let depth_stencil = config.depth_stencil();
    let blend_attachments = [vk::PipelineColorBlendAttachmentState {
        color_write_mask: vk::ColorComponentFlags::RGBA,
        ..Default::default()
    }];
    let color_blend =
        vk::PipelineColorBlendStateCreateInfo::default().attachments(&blend_attachments);
    let dynamic = vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&DYNAMIC_STATES);

    let info = vk::GraphicsPipelineCreateInfo::default()
        .stages(&stages)
        .vertex_input_state(&vertex_input)
        .input_assembly_state(&input_assembly)
        .viewport_state(&viewport)
        .rasterization_state(&rasterization)
        .multisample_state(&multisample)
        .depth_stencil_state(&depth_stencil)
        .color_blend_state(&color_blend)
        .dynamic_state(&dynamic)
        .layout(layout)
        .render_pass(render_pass)
        .subpass(config.subpass);

    // SAFETY: forwarded to the caller.
    let pipelines =
        unsafe { device.create_graphics_pipelines(vk::PipelineCache::null(), &[info], None) }
            .map_err(|(_, e)| GpuError::PipelineCreation(e.to_string()))?;
    pipelines
        .first()
        .copied()
        .ok_or_else(|| GpuError::PipelineCreation("driver returned no pipeline".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_function_state_follows_config() {
        let config = GraphicsPipelineConfig {
            cull_mode: vk::CullModeFlags::BACK,
            depth_write: false,
            ..Default::default()
        };

        let rasterization = config.rasterization();
        assert_eq!(rasterization.cull_mode, vk::CullModeFlags::BACK);
        assert_eq!(rasterization.front_face, vk::FrontFace::CLOCKWISE);

        let depth = config.depth_stencil();
        assert_eq!(depth.depth_test_enable, vk::TRUE);
        assert_eq!(depth.depth_write_enable, vk::FALSE);
        assert_eq!(
            config.input_assembly().topology,
            vk::PrimitiveTopology::TRIANGLE_LIST
        );
    }

    #[test]
    fn missing_shaders_are_rejected() {
        let config = GraphicsPipelineConfig {
            vertex_shader: vec![0x0723_0203],
            ..Default::default()
        };
        assert!(matches!(
            config.check_shaders(),
            Err(GpuError::PipelineCreation(_))
        ));
    }
}
