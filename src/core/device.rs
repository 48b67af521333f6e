//! The device capability interface the frame graph is built on.
//!
//! The graph never talks to Vulkan directly. Every object it owns is created and destroyed through a [`GpuDevice`],
//! which is handed to [`Graph::new()`](crate::Graph::new) and stored for the lifetime of the graph. The production
//! implementation is [`VulkanDevice`](crate::VulkanDevice); tests substitute a recording device.
//!
//! All creation calls are synchronous. A failing call returns [`Error::VkError`](crate::Error::VkError)
//! (or an allocation error) and the graph propagates it unchanged.

use std::ptr::NonNull;

use anyhow::Result;
use ash::vk;

use crate::allocator::traits::MemoryType;

/// Object creation, destruction and command recording verbs used by the frame graph.
///
/// Creation functions take a `name`, which implementations may attach to the object for graphics debuggers.
pub trait GpuDevice {
    /// Memory backing an image or buffer. Freed together with its owner.
    type Memory;

    /// Create an image and bind freshly allocated GPU-only memory to it.
    fn create_image(&self, info: &vk::ImageCreateInfo, name: &str) -> Result<(vk::Image, Self::Memory)>;
    /// Destroy an image and release its memory.
    fn destroy_image(&self, image: vk::Image, memory: Self::Memory);

    /// Create a buffer and bind memory of the requested type to it.
    fn create_buffer(&self, info: &vk::BufferCreateInfo, ty: MemoryType, name: &str) -> Result<(vk::Buffer, Self::Memory)>;
    /// Destroy a buffer and release its memory.
    fn destroy_buffer(&self, buffer: vk::Buffer, memory: Self::Memory);

    /// Map host visible memory. The returned pointer stays valid until [`GpuDevice::unmap_memory()`].
    fn map_memory(&self, memory: &Self::Memory) -> Result<NonNull<u8>>;
    fn unmap_memory(&self, memory: &Self::Memory);
    /// Make host writes to the first `size` bytes of mapped memory visible to the device.
    fn flush_memory(&self, memory: &Self::Memory, size: vk::DeviceSize) -> Result<()>;

    fn create_image_view(&self, info: &vk::ImageViewCreateInfo, name: &str) -> Result<vk::ImageView>;
    fn destroy_image_view(&self, view: vk::ImageView);

    fn create_sampler(&self, info: &vk::SamplerCreateInfo, name: &str) -> Result<vk::Sampler>;
    fn destroy_sampler(&self, sampler: vk::Sampler);

    fn create_descriptor_pool(&self, info: &vk::DescriptorPoolCreateInfo, name: &str) -> Result<vk::DescriptorPool>;
    fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool);

    fn create_descriptor_set_layout(&self, info: &vk::DescriptorSetLayoutCreateInfo, name: &str) -> Result<vk::DescriptorSetLayout>;
    fn destroy_descriptor_set_layout(&self, layout: vk::DescriptorSetLayout);

    /// Allocate a single descriptor set from a pool created with `FREE_DESCRIPTOR_SET`.
    fn allocate_descriptor_set(&self, pool: vk::DescriptorPool, layout: vk::DescriptorSetLayout, name: &str) -> Result<vk::DescriptorSet>;
    fn free_descriptor_set(&self, pool: vk::DescriptorPool, set: vk::DescriptorSet);
    fn update_descriptor_sets(&self, writes: &[vk::WriteDescriptorSet]);

    fn create_render_pass(&self, info: &vk::RenderPassCreateInfo, name: &str) -> Result<vk::RenderPass>;
    fn destroy_render_pass(&self, render_pass: vk::RenderPass);

    fn create_framebuffer(&self, info: &vk::FramebufferCreateInfo, name: &str) -> Result<vk::Framebuffer>;
    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer);

    fn create_shader_module(&self, code: &[u32], name: &str) -> Result<vk::ShaderModule>;
    fn destroy_shader_module(&self, module: vk::ShaderModule);

    fn create_pipeline_layout(&self, info: &vk::PipelineLayoutCreateInfo, name: &str) -> Result<vk::PipelineLayout>;
    fn destroy_pipeline_layout(&self, layout: vk::PipelineLayout);

    fn create_graphics_pipeline(&self, info: &vk::GraphicsPipelineCreateInfo, name: &str) -> Result<vk::Pipeline>;
    fn destroy_pipeline(&self, pipeline: vk::Pipeline);

    /// Current extent of the presentation surface, if there is one.
    fn surface_extent(&self) -> Option<vk::Extent2D> {
        None
    }

    fn cmd_begin_render_pass(&self, cmd: vk::CommandBuffer, info: &vk::RenderPassBeginInfo);
    fn cmd_end_render_pass(&self, cmd: vk::CommandBuffer);
    fn cmd_set_viewport(&self, cmd: vk::CommandBuffer, viewport: vk::Viewport);
    fn cmd_set_scissor(&self, cmd: vk::CommandBuffer, scissor: vk::Rect2D);
    /// Bind `sets` to consecutive set indices starting at `first_set`.
    fn cmd_bind_descriptor_sets(&self, cmd: vk::CommandBuffer, layout: vk::PipelineLayout, first_set: u32, sets: &[vk::DescriptorSet]);
    fn cmd_bind_pipeline(&self, cmd: vk::CommandBuffer, pipeline: vk::Pipeline);
}
