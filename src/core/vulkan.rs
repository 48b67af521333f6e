//! [`GpuDevice`] implementation on top of a real Vulkan device.
//!
//! The [`VulkanDevice`] wraps an [`ash::Device`] together with an [`Allocator`]. Images and buffers get their memory
//! from the allocator, everything else maps one to one onto a Vulkan call. When created with [`VulkanDevice::with_debug_utils`]
//! and the `debug-names` feature is enabled, every object is named through `VK_EXT_debug_utils` so it shows up properly in
//! graphics debuggers.
//!
//! Cloning a [`VulkanDevice`] is cheap, all clones refer to the same device.

use std::ptr::NonNull;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use ash::extensions::ext::DebugUtils;
use ash::vk;
use ash::vk::Handle;

use crate::{Allocation, Allocator, DefaultAllocator, Error, GpuDevice};
use crate::allocator::traits::MemoryType;

#[derive(Derivative)]
#[derivative(Debug)]
struct DeviceInner<A: Allocator> {
    #[derivative(Debug = "ignore")]
    handle: ash::Device,
    #[derivative(Debug = "ignore")]
    allocator: Mutex<A>,
    #[derivative(Debug = "ignore")]
    debug_utils: Option<DebugUtils>,
    non_coherent_atom_size: vk::DeviceSize,
    surface_extent: Mutex<Option<vk::Extent2D>>,
}

/// Vulkan backed device capability object. See the [module level documentation](crate::core::vulkan) for details.
#[derive(Derivative)]
#[derivative(Debug, Clone(bound = ""))]
pub struct VulkanDevice<A: Allocator = DefaultAllocator> {
    inner: Arc<DeviceInner<A>>,
}

impl<A: Allocator> VulkanDevice<A> {
    /// Wrap an existing logical device. `limits` must be the limits of the physical device `device` was created from.
    pub fn new(device: ash::Device, allocator: A, limits: &vk::PhysicalDeviceLimits) -> Self {
        Self::create(device, allocator, limits, None)
    }

    /// Wrap an existing logical device and name every created object through `VK_EXT_debug_utils`.
    /// The instance must have been created with the extension enabled.
    pub fn with_debug_utils(
        entry: &ash::Entry,
        instance: &ash::Instance,
        device: ash::Device,
        allocator: A,
        limits: &vk::PhysicalDeviceLimits,
    ) -> Self {
        let debug_utils = DebugUtils::new(entry, instance);
        Self::create(device, allocator, limits, Some(debug_utils))
    }

    fn create(device: ash::Device, allocator: A, limits: &vk::PhysicalDeviceLimits, debug_utils: Option<DebugUtils>) -> Self {
        Self {
            inner: Arc::new(DeviceInner {
                handle: device,
                allocator: Mutex::new(allocator),
                debug_utils,
                non_coherent_atom_size: limits.non_coherent_atom_size.max(1),
                surface_extent: Mutex::new(None),
            }),
        }
    }

    /// Access the underlying [`ash::Device`].
    pub fn handle(&self) -> &ash::Device {
        &self.inner.handle
    }

    /// Record the current extent of the presentation surface. This is reported back through
    /// [`GpuDevice::surface_extent()`] and picked up by [`Graph::resize_to_surface()`](crate::Graph::resize_to_surface).
    pub fn set_surface_extent(&self, extent: Option<vk::Extent2D>) -> Result<()> {
        *self.inner.surface_extent.lock().map_err(|_| Error::PoisonError)? = extent;
        Ok(())
    }

    /// Naming is best effort, a failure is logged and otherwise ignored.
    fn set_name<H: Handle>(&self, object: H, name: &str) {
        if let Err(err) = self.try_set_name(object, name) {
            warn!("Failed to name object `{name}`: {err}");
        }
    }

    #[cfg(feature = "debug-names")]
    fn try_set_name<H: Handle>(&self, object: H, name: &str) -> Result<()> {
        let Some(debug_utils) = &self.inner.debug_utils else {
            return Ok(());
        };
        let object_name = std::ffi::CString::new(name)?;
        let info = vk::DebugUtilsObjectNameInfoEXT::builder()
            .object_type(H::TYPE)
            .object_handle(object.as_raw())
            .object_name(&object_name)
            .build();
        unsafe {
            debug_utils.set_debug_utils_object_name(self.inner.handle.handle(), &info)?;
        }
        Ok(())
    }

    #[cfg(not(feature = "debug-names"))]
    fn try_set_name<H: Handle>(&self, _object: H, _name: &str) -> Result<()> {
        Ok(())
    }

    fn allocate(&self, name: &str, requirements: &vk::MemoryRequirements, ty: MemoryType) -> Result<A::Allocation> {
        let mut allocator = self.inner.allocator.lock().map_err(|_| Error::PoisonError)?;
        allocator.allocate(name, requirements, ty)
    }

    fn free(&self, memory: A::Allocation) {
        let result = self
            .inner
            .allocator
            .lock()
            .map_err(|_| anyhow::Error::from(Error::PoisonError))
            .and_then(|mut allocator| allocator.free(memory));
        if let Err(err) = result {
            error!("Failed to free device memory: {err}");
        }
    }
}

impl<A: Allocator> GpuDevice for VulkanDevice<A> {
    type Memory = A::Allocation;

    fn create_image(&self, info: &vk::ImageCreateInfo, name: &str) -> Result<(vk::Image, Self::Memory)> {
        let device = &self.inner.handle;
        let handle = unsafe { device.create_image(info, None)? };
        #[cfg(feature = "log-objects")]
        trace!("Created new VkImage {handle:p}");

        let requirements = unsafe { device.get_image_memory_requirements(handle) };
        let bound = self.allocate(name, &requirements, MemoryType::GpuOnly).and_then(|memory| {
            unsafe { device.bind_image_memory(handle, memory.memory(), memory.offset())? };
            Ok(memory)
        });
        match bound {
            Ok(memory) => {
                self.set_name(handle, name);
                Ok((handle, memory))
            }
            Err(err) => {
                unsafe { device.destroy_image(handle, None) };
                Err(err)
            }
        }
    }

    fn destroy_image(&self, image: vk::Image, memory: Self::Memory) {
        #[cfg(feature = "log-objects")]
        trace!("Destroying VkImage {image:p}");
        unsafe { self.inner.handle.destroy_image(image, None) };
        self.free(memory);
    }

    fn create_buffer(&self, info: &vk::BufferCreateInfo, ty: MemoryType, name: &str) -> Result<(vk::Buffer, Self::Memory)> {
        let device = &self.inner.handle;
        let handle = unsafe { device.create_buffer(info, None)? };
        #[cfg(feature = "log-objects")]
        trace!("Created new VkBuffer {handle:p}");

        let requirements = unsafe { device.get_buffer_memory_requirements(handle) };
        let bound = self.allocate(name, &requirements, ty).and_then(|memory| {
            unsafe { device.bind_buffer_memory(handle, memory.memory(), memory.offset())? };
            Ok(memory)
        });
        match bound {
            Ok(memory) => {
                self.set_name(handle, name);
                Ok((handle, memory))
            }
            Err(err) => {
                unsafe { device.destroy_buffer(handle, None) };
                Err(err)
            }
        }
    }

    fn destroy_buffer(&self, buffer: vk::Buffer, memory: Self::Memory) {
        #[cfg(feature = "log-objects")]
        trace!("Destroying VkBuffer {buffer:p}");
        unsafe { self.inner.handle.destroy_buffer(buffer, None) };
        self.free(memory);
    }

    /// Memory is persistently mapped by the allocator, so this only hands out the existing pointer.
    fn map_memory(&self, memory: &Self::Memory) -> Result<NonNull<u8>> {
        memory
            .mapped_ptr()
            .map(NonNull::cast)
            .ok_or_else(|| Error::UnmappableMemory.into())
    }

    fn unmap_memory(&self, _memory: &Self::Memory) {}

    fn flush_memory(&self, memory: &Self::Memory, size: vk::DeviceSize) -> Result<()> {
        if size == 0 {
            return Ok(());
        }
        let atom = self.inner.non_coherent_atom_size;
        let offset = memory.offset();
        let aligned_offset = offset - offset % atom;
        // Rounding the end up could run past the memory block, flushing to its end always satisfies the atom size.
        let range = vk::MappedMemoryRange::builder()
            .memory(unsafe { memory.memory() })
            .offset(aligned_offset)
            .size(vk::WHOLE_SIZE)
            .build();
        unsafe { self.inner.handle.flush_mapped_memory_ranges(std::slice::from_ref(&range))? };
        Ok(())
    }

    fn create_image_view(&self, info: &vk::ImageViewCreateInfo, name: &str) -> Result<vk::ImageView> {
        let handle = unsafe { self.inner.handle.create_image_view(info, None)? };
        #[cfg(feature = "log-objects")]
        trace!("Created new VkImageView {handle:p}");
        self.set_name(handle, name);
        Ok(handle)
    }

    fn destroy_image_view(&self, view: vk::ImageView) {
        #[cfg(feature = "log-objects")]
        trace!("Destroying VkImageView {view:p}");
        unsafe { self.inner.handle.destroy_image_view(view, None) };
    }

    fn create_sampler(&self, info: &vk::SamplerCreateInfo, name: &str) -> Result<vk::Sampler> {
        let handle = unsafe { self.inner.handle.create_sampler(info, None)? };
        #[cfg(feature = "log-objects")]
        trace!("Created new VkSampler {handle:p}");
        self.set_name(handle, name);
        Ok(handle)
    }

    fn destroy_sampler(&self, sampler: vk::Sampler) {
        #[cfg(feature = "log-objects")]
        trace!("Destroying VkSampler {sampler:p}");
        unsafe { self.inner.handle.destroy_sampler(sampler, None) };
    }

    fn create_descriptor_pool(&self, info: &vk::DescriptorPoolCreateInfo, name: &str) -> Result<vk::DescriptorPool> {
        let handle = unsafe { self.inner.handle.create_descriptor_pool(info, None)? };
        #[cfg(feature = "log-objects")]
        trace!("Created new VkDescriptorPool {handle:p}");
        self.set_name(handle, name);
        Ok(handle)
    }

    fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool) {
        #[cfg(feature = "log-objects")]
        trace!("Destroying VkDescriptorPool {pool:p}");
        unsafe { self.inner.handle.destroy_descriptor_pool(pool, None) };
    }

    fn create_descriptor_set_layout(&self, info: &vk::DescriptorSetLayoutCreateInfo, name: &str) -> Result<vk::DescriptorSetLayout> {
        let handle = unsafe { self.inner.handle.create_descriptor_set_layout(info, None)? };
        #[cfg(feature = "log-objects")]
        trace!("Created new VkDescriptorSetLayout {handle:p}");
        self.set_name(handle, name);
        Ok(handle)
    }

    fn destroy_descriptor_set_layout(&self, layout: vk::DescriptorSetLayout) {
        #[cfg(feature = "log-objects")]
        trace!("Destroying VkDescriptorSetLayout {layout:p}");
        unsafe { self.inner.handle.destroy_descriptor_set_layout(layout, None) };
    }

    fn allocate_descriptor_set(&self, pool: vk::DescriptorPool, layout: vk::DescriptorSetLayout, name: &str) -> Result<vk::DescriptorSet> {
        let info = vk::DescriptorSetAllocateInfo::builder()
            .descriptor_pool(pool)
            .set_layouts(std::slice::from_ref(&layout))
            .build();
        let set = unsafe { self.inner.handle.allocate_descriptor_sets(&info)? }
            .into_iter()
            .next()
            .ok_or(Error::Uncategorized("Descriptor set allocation returned no sets"))?;
        #[cfg(feature = "log-objects")]
        trace!("Allocated new VkDescriptorSet {set:p}");
        self.set_name(set, name);
        Ok(set)
    }

    fn free_descriptor_set(&self, pool: vk::DescriptorPool, set: vk::DescriptorSet) {
        #[cfg(feature = "log-objects")]
        trace!("Freeing VkDescriptorSet {set:p}");
        if let Err(err) = unsafe { self.inner.handle.free_descriptor_sets(pool, std::slice::from_ref(&set)) } {
            error!("Failed to free descriptor set: {err}");
        }
    }

    fn update_descriptor_sets(&self, writes: &[vk::WriteDescriptorSet]) {
        unsafe { self.inner.handle.update_descriptor_sets(writes, &[]) };
    }

    fn create_render_pass(&self, info: &vk::RenderPassCreateInfo, name: &str) -> Result<vk::RenderPass> {
        let handle = unsafe { self.inner.handle.create_render_pass(info, None)? };
        #[cfg(feature = "log-objects")]
        trace!("Created new VkRenderPass {handle:p}");
        self.set_name(handle, name);
        Ok(handle)
    }

    fn destroy_render_pass(&self, render_pass: vk::RenderPass) {
        #[cfg(feature = "log-objects")]
        trace!("Destroying VkRenderPass {render_pass:p}");
        unsafe { self.inner.handle.destroy_render_pass(render_pass, None) };
    }

    fn create_framebuffer(&self, info: &vk::FramebufferCreateInfo, name: &str) -> Result<vk::Framebuffer> {
        let handle = unsafe { self.inner.handle.create_framebuffer(info, None)? };
        #[cfg(feature = "log-objects")]
        trace!("Created new VkFramebuffer {handle:p}");
        self.set_name(handle, name);
        Ok(handle)
    }

    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer) {
        #[cfg(feature = "log-objects")]
        trace!("Destroying VkFramebuffer {framebuffer:p}");
        unsafe { self.inner.handle.destroy_framebuffer(framebuffer, None) };
    }

    fn create_shader_module(&self, code: &[u32], name: &str) -> Result<vk::ShaderModule> {
        let info = vk::ShaderModuleCreateInfo::builder().code(code).build();
        let handle = unsafe { self.inner.handle.create_shader_module(&info, None)? };
        #[cfg(feature = "log-objects")]
        trace!("Created new VkShaderModule {handle:p}");
        self.set_name(handle, name);
        Ok(handle)
    }

    fn destroy_shader_module(&self, module: vk::ShaderModule) {
        #[cfg(feature = "log-objects")]
        trace!("Destroying VkShaderModule {module:p}");
        unsafe { self.inner.handle.destroy_shader_module(module, None) };
    }

    fn create_pipeline_layout(&self, info: &vk::PipelineLayoutCreateInfo, name: &str) -> Result<vk::PipelineLayout> {
        let handle = unsafe { self.inner.handle.create_pipeline_layout(info, None)? };
        #[cfg(feature = "log-objects")]
        trace!("Created new VkPipelineLayout {handle:p}");
        self.set_name(handle, name);
        Ok(handle)
    }

    fn destroy_pipeline_layout(&self, layout: vk::PipelineLayout) {
        #[cfg(feature = "log-objects")]
        trace!("Destroying VkPipelineLayout {layout:p}");
        unsafe { self.inner.handle.destroy_pipeline_layout(layout, None) };
    }

    fn create_graphics_pipeline(&self, info: &vk::GraphicsPipelineCreateInfo, name: &str) -> Result<vk::Pipeline> {
        let handle = unsafe {
            self.inner
                .handle
                .create_graphics_pipelines(vk::PipelineCache::null(), std::slice::from_ref(info), None)
                .map_err(Error::from)?
        }
        .into_iter()
        .next()
        .ok_or(Error::Uncategorized("Pipeline creation returned no pipelines"))?;
        #[cfg(feature = "log-objects")]
        trace!("Created new VkPipeline {handle:p}");
        self.set_name(handle, name);
        Ok(handle)
    }

    fn destroy_pipeline(&self, pipeline: vk::Pipeline) {
        #[cfg(feature = "log-objects")]
        trace!("Destroying VkPipeline {pipeline:p}");
        unsafe { self.inner.handle.destroy_pipeline(pipeline, None) };
    }

    fn surface_extent(&self) -> Option<vk::Extent2D> {
        self.inner.surface_extent.lock().ok().and_then(|extent| *extent)
    }

    fn cmd_begin_render_pass(&self, cmd: vk::CommandBuffer, info: &vk::RenderPassBeginInfo) {
        unsafe { self.inner.handle.cmd_begin_render_pass(cmd, info, vk::SubpassContents::INLINE) };
    }

    fn cmd_end_render_pass(&self, cmd: vk::CommandBuffer) {
        unsafe { self.inner.handle.cmd_end_render_pass(cmd) };
    }

    fn cmd_set_viewport(&self, cmd: vk::CommandBuffer, viewport: vk::Viewport) {
        unsafe { self.inner.handle.cmd_set_viewport(cmd, 0, std::slice::from_ref(&viewport)) };
    }

    fn cmd_set_scissor(&self, cmd: vk::CommandBuffer, scissor: vk::Rect2D) {
        unsafe { self.inner.handle.cmd_set_scissor(cmd, 0, std::slice::from_ref(&scissor)) };
    }

    fn cmd_bind_descriptor_sets(&self, cmd: vk::CommandBuffer, layout: vk::PipelineLayout, first_set: u32, sets: &[vk::DescriptorSet]) {
        unsafe {
            self.inner
                .handle
                .cmd_bind_descriptor_sets(cmd, vk::PipelineBindPoint::GRAPHICS, layout, first_set, sets, &[])
        };
    }

    fn cmd_bind_pipeline(&self, cmd: vk::CommandBuffer, pipeline: vk::Pipeline) {
        unsafe { self.inner.handle.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, pipeline) };
    }
}
