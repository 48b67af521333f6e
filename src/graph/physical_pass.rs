//! Render pass, framebuffers and pipeline backing one pass.

use anyhow::Result;
use ash::vk;

use crate::{FRAMES_IN_FLIGHT, GpuDevice, PassDescriptor, ResourceDescriptor, ResourceRole, ShaderLoader};
use crate::graph::physical_resource::PhysicalResource;
use crate::pipeline::builder::{PassPipeline, PipelineBuildInfo};

/// One attachment of a pass, in write order.
pub(crate) struct AttachmentInfo<'a, M> {
    pub descriptor: &'a ResourceDescriptor,
    pub physical: &'a PhysicalResource<M>,
    pub sampled: bool,
    /// The attachment is the compile target and is copied out after the graph runs.
    pub transfer_source: bool,
}

#[derive(Derivative)]
#[derivative(Debug)]
pub(crate) struct PhysicalPass {
    pub render_pass: vk::RenderPass,
    pub framebuffers: Vec<vk::Framebuffer>,
    pub extent: vk::Extent2D,
    #[derivative(Debug = "ignore")]
    pub clear_values: Vec<vk::ClearValue>,
    pub pipeline: PassPipeline,
}

fn attachment_description(attachment: &AttachmentInfo<'_, impl Sized>) -> vk::AttachmentDescription {
    let (store_op, final_layout) = match attachment.descriptor.role {
        ResourceRole::Color if attachment.transfer_source => {
            (vk::AttachmentStoreOp::STORE, vk::ImageLayout::TRANSFER_SRC_OPTIMAL)
        }
        ResourceRole::Color if attachment.sampled => (vk::AttachmentStoreOp::STORE, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL),
        ResourceRole::Color => (vk::AttachmentStoreOp::STORE, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL),
        ResourceRole::Depth if attachment.sampled => (vk::AttachmentStoreOp::STORE, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL),
        ResourceRole::Depth if attachment.transfer_source => {
            (vk::AttachmentStoreOp::STORE, vk::ImageLayout::TRANSFER_SRC_OPTIMAL)
        }
        ResourceRole::Depth => (vk::AttachmentStoreOp::DONT_CARE, vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL),
    };
    vk::AttachmentDescription {
        flags: Default::default(),
        format: attachment.descriptor.format,
        samples: vk::SampleCountFlags::TYPE_1,
        load_op: vk::AttachmentLoadOp::CLEAR,
        store_op,
        stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
        stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
        initial_layout: vk::ImageLayout::UNDEFINED,
        final_layout,
    }
}

impl PhysicalPass {
    /// Build the render pass, one framebuffer per frame in flight, and the pipeline.
    /// Everything created so far is destroyed again if a step fails.
    pub fn build<D: GpuDevice, S: ShaderLoader>(
        device: &D,
        shaders: &S,
        pass: &PassDescriptor,
        attachments: &[AttachmentInfo<'_, D::Memory>],
        set_layouts: &[vk::DescriptorSetLayout],
        extent: vk::Extent2D,
    ) -> Result<Self> {
        let render_pass = Self::create_render_pass(device, pass, attachments)?;

        let mut framebuffers = Vec::with_capacity(FRAMES_IN_FLIGHT);
        for frame in 0..FRAMES_IN_FLIGHT {
            let views = attachments
                .iter()
                .map(|attachment| attachment.physical.slots[frame].view)
                .collect::<Vec<_>>();
            let info = vk::FramebufferCreateInfo::builder()
                .render_pass(render_pass)
                .attachments(&views)
                .width(extent.width)
                .height(extent.height)
                .layers(1)
                .build();
            match device.create_framebuffer(&info, &format!("{}[{frame}]", pass.name)) {
                Ok(framebuffer) => framebuffers.push(framebuffer),
                Err(err) => {
                    framebuffers.into_iter().for_each(|fb| device.destroy_framebuffer(fb));
                    device.destroy_render_pass(render_pass);
                    return Err(err);
                }
            }
        }

        let color_attachments = attachments
            .iter()
            .filter(|a| a.descriptor.role == ResourceRole::Color)
            .count() as u32;
        let depth = attachments.iter().any(|a| a.descriptor.role == ResourceRole::Depth);
        let info = PipelineBuildInfo {
            name: &pass.name,
            render_pass,
            set_layouts,
            color_attachments,
            depth,
        };
        let pipeline = match PassPipeline::build(device, shaders, pass, &info) {
            Ok(pipeline) => pipeline,
            Err(err) => {
                framebuffers.into_iter().for_each(|fb| device.destroy_framebuffer(fb));
                device.destroy_render_pass(render_pass);
                return Err(err);
            }
        };

        debug!("Built pass `{}` ({}x{})", pass.name, extent.width, extent.height);
        Ok(Self {
            render_pass,
            framebuffers,
            extent,
            clear_values: attachments.iter().map(|a| a.descriptor.clear).collect(),
            pipeline,
        })
    }

    fn create_render_pass<D: GpuDevice>(
        device: &D,
        pass: &PassDescriptor,
        attachments: &[AttachmentInfo<'_, D::Memory>],
    ) -> Result<vk::RenderPass> {
        let descriptions = attachments.iter().map(attachment_description).collect::<Vec<_>>();
        let mut color_refs = vec![];
        let mut depth_ref = None;
        for (index, attachment) in attachments.iter().enumerate() {
            match attachment.descriptor.role {
                ResourceRole::Color => color_refs.push(vk::AttachmentReference {
                    attachment: index as u32,
                    layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
                }),
                ResourceRole::Depth => {
                    depth_ref = Some(vk::AttachmentReference {
                        attachment: index as u32,
                        layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
                    })
                }
            }
        }

        let mut subpass = vk::SubpassDescription::builder()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(&color_refs);
        if let Some(depth_ref) = &depth_ref {
            subpass = subpass.depth_stencil_attachment(depth_ref);
        }
        let subpass = subpass.build();

        let attachment_stages = vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
            | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS
            | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS;
        let attachment_writes = vk::AccessFlags::COLOR_ATTACHMENT_WRITE | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE;
        // Previous readers of the attachments must finish before they are cleared, and later passes sample or copy
        // the results.
        let dependencies = [
            vk::SubpassDependency {
                src_subpass: vk::SUBPASS_EXTERNAL,
                dst_subpass: 0,
                src_stage_mask: vk::PipelineStageFlags::FRAGMENT_SHADER | vk::PipelineStageFlags::TRANSFER | attachment_stages,
                dst_stage_mask: attachment_stages,
                src_access_mask: attachment_writes,
                dst_access_mask: attachment_writes
                    | vk::AccessFlags::COLOR_ATTACHMENT_READ
                    | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ,
                dependency_flags: vk::DependencyFlags::BY_REGION,
            },
            vk::SubpassDependency {
                src_subpass: 0,
                dst_subpass: vk::SUBPASS_EXTERNAL,
                src_stage_mask: attachment_stages,
                dst_stage_mask: vk::PipelineStageFlags::FRAGMENT_SHADER | vk::PipelineStageFlags::TRANSFER,
                src_access_mask: attachment_writes,
                dst_access_mask: vk::AccessFlags::SHADER_READ | vk::AccessFlags::TRANSFER_READ,
                dependency_flags: vk::DependencyFlags::BY_REGION,
            },
        ];

        let info = vk::RenderPassCreateInfo::builder()
            .attachments(&descriptions)
            .subpasses(std::slice::from_ref(&subpass))
            .dependencies(&dependencies)
            .build();
        device.create_render_pass(&info, &pass.name)
    }

    pub fn begin_info(&self, frame: usize) -> vk::RenderPassBeginInfo {
        vk::RenderPassBeginInfo::builder()
            .render_pass(self.render_pass)
            .framebuffer(self.framebuffers[frame])
            .render_area(self.render_area())
            .clear_values(&self.clear_values)
            .build()
    }

    // Uses the framebuffer extent, which differs from the graph extent for passes writing fixed-size resources.
    pub fn render_area(&self) -> vk::Rect2D {
        vk::Rect2D {
            offset: vk::Offset2D::default(),
            extent: self.extent,
        }
    }

    pub fn viewport(&self) -> vk::Viewport {
        vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: self.extent.width as f32,
            height: self.extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }

    pub fn destroy<D: GpuDevice>(self, device: &D) {
        self.pipeline.destroy(device);
        for framebuffer in self.framebuffers {
            device.destroy_framebuffer(framebuffer);
        }
        device.destroy_render_pass(self.render_pass);
    }
}
