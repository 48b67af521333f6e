use std::ffi::CString;

use anyhow::Result;
use ash::vk;

use crate::{GpuDevice, PassDescriptor, ShaderLoader};

/// Pipeline objects owned by one pass.
#[derive(Debug, Copy, Clone)]
pub(crate) struct PassPipeline {
    pub layout: vk::PipelineLayout,
    pub pipeline: vk::Pipeline,
}

/// Fixed function state for a single subpass forward pass.
pub(crate) struct PipelineBuildInfo<'a> {
    pub name: &'a str,
    pub render_pass: vk::RenderPass,
    /// Descriptor set layouts, in set index order.
    pub set_layouts: &'a [vk::DescriptorSetLayout],
    pub color_attachments: u32,
    pub depth: bool,
}

impl PassPipeline {
    /// Load the pass shaders and build a pipeline layout and graphics pipeline. Shader modules only live until the
    /// pipeline is created.
    pub fn build<D: GpuDevice, S: ShaderLoader>(
        device: &D,
        shaders: &S,
        pass: &PassDescriptor,
        info: &PipelineBuildInfo,
    ) -> Result<Self> {
        let mut push_constants = vec![];
        if pass.push_constant_size > 0 {
            push_constants.push(vk::PushConstantRange {
                stage_flags: vk::ShaderStageFlags::ALL_GRAPHICS,
                offset: 0,
                size: pass.push_constant_size,
            });
        }
        let layout_info = vk::PipelineLayoutCreateInfo::builder()
            .set_layouts(info.set_layouts)
            .push_constant_ranges(&push_constants)
            .build();
        let layout = device.create_pipeline_layout(&layout_info, info.name)?;

        match Self::build_pipeline(device, shaders, pass, info, layout) {
            Ok(pipeline) => Ok(Self {
                layout,
                pipeline,
            }),
            Err(err) => {
                device.destroy_pipeline_layout(layout);
                Err(err)
            }
        }
    }

    fn build_pipeline<D: GpuDevice, S: ShaderLoader>(
        device: &D,
        shaders: &S,
        pass: &PassDescriptor,
        info: &PipelineBuildInfo,
        layout: vk::PipelineLayout,
    ) -> Result<vk::Pipeline> {
        let vertex_code = shaders.read_shader_file(&pass.vertex_shader)?;
        let fragment_code = shaders.read_shader_file(&pass.fragment_shader)?;
        let vertex = device.create_shader_module(&vertex_code, &pass.vertex_shader)?;
        let fragment = match device.create_shader_module(&fragment_code, &pass.fragment_shader) {
            Ok(module) => module,
            Err(err) => {
                device.destroy_shader_module(vertex);
                return Err(err);
            }
        };

        let result = Self::create_pipeline(device, pass, info, layout, vertex, fragment);
        device.destroy_shader_module(vertex);
        device.destroy_shader_module(fragment);
        result
    }

    fn create_pipeline<D: GpuDevice>(
        device: &D,
        pass: &PassDescriptor,
        info: &PipelineBuildInfo,
        layout: vk::PipelineLayout,
        vertex: vk::ShaderModule,
        fragment: vk::ShaderModule,
    ) -> Result<vk::Pipeline> {
        let entry = CString::new("main")?;
        let stages = [
            vk::PipelineShaderStageCreateInfo::builder()
                .stage(vk::ShaderStageFlags::VERTEX)
                .module(vertex)
                .name(&entry)
                .build(),
            vk::PipelineShaderStageCreateInfo::builder()
                .stage(vk::ShaderStageFlags::FRAGMENT)
                .module(fragment)
                .name(&entry)
                .build(),
        ];

        let vertex_input = vk::PipelineVertexInputStateCreateInfo::builder()
            .vertex_binding_descriptions(&pass.vertex_bindings)
            .vertex_attribute_descriptions(&pass.vertex_attributes)
            .build();
        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::builder()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
            .primitive_restart_enable(false)
            .build();
        // Viewport and scissor are dynamic, only the counts matter.
        let viewport = vk::PipelineViewportStateCreateInfo::builder()
            .viewport_count(1)
            .scissor_count(1)
            .build();
        let rasterization = vk::PipelineRasterizationStateCreateInfo::builder()
            .polygon_mode(vk::PolygonMode::FILL)
            .cull_mode(vk::CullModeFlags::BACK)
            .front_face(vk::FrontFace::COUNTER_CLOCKWISE)
            .line_width(1.0)
            .build();
        let multisample = vk::PipelineMultisampleStateCreateInfo::builder()
            .rasterization_samples(vk::SampleCountFlags::TYPE_1)
            .build();
        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::builder()
            .depth_test_enable(info.depth)
            .depth_write_enable(info.depth)
            .depth_compare_op(vk::CompareOp::LESS)
            .build();
        let blend_attachments = (0..info.color_attachments)
            .map(|_| {
                vk::PipelineColorBlendAttachmentState::builder()
                    .blend_enable(false)
                    .color_write_mask(vk::ColorComponentFlags::RGBA)
                    .build()
            })
            .collect::<Vec<_>>();
        let blend = vk::PipelineColorBlendStateCreateInfo::builder()
            .logic_op_enable(false)
            .attachments(&blend_attachments)
            .build();
        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic = vk::PipelineDynamicStateCreateInfo::builder()
            .dynamic_states(&dynamic_states)
            .build();

        let pipeline_info = vk::GraphicsPipelineCreateInfo::builder()
            .stages(&stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport)
            .rasterization_state(&rasterization)
            .multisample_state(&multisample)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&blend)
            .dynamic_state(&dynamic)
            .layout(layout)
            .render_pass(info.render_pass)
            .subpass(0)
            .build();
        device.create_graphics_pipeline(&pipeline_info, info.name)
    }

    pub fn destroy<D: GpuDevice>(self, device: &D) {
        device.destroy_pipeline(self.pipeline);
        device.destroy_pipeline_layout(self.layout);
    }
}
