#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::ptr::NonNull;
use std::rc::Rc;
use std::sync::Once;

use anyhow::Result;
use ash::vk;
use ash::vk::Handle;

use whisper_graph::prelude::*;

static INIT_LOGGER: Once = Once::new();

/// Initialize logging once for the whole test binary.
pub fn init_logger() {
    INIT_LOGGER.call_once(|| {
        let _ = pretty_env_logger::formatted_builder()
            .is_test(true)
            .parse_filters(&std::env::var("RUST_LOG").unwrap_or_else(|_| String::from("debug")))
            .try_init();
    });
}

/// Memory handed out by the [`MockDevice`]. Host visible memory is backed by a host buffer.
#[derive(Debug)]
pub struct MockMemory {
    id: u64,
}

#[derive(Debug, Clone, Copy)]
pub struct ImageRecord {
    pub extent: vk::Extent3D,
    pub format: vk::Format,
    pub usage: vk::ImageUsageFlags,
}

#[derive(Debug, Clone)]
pub struct RenderPassRecord {
    pub formats: Vec<vk::Format>,
    pub store_ops: Vec<vk::AttachmentStoreOp>,
    pub final_layouts: Vec<vk::ImageLayout>,
    pub color_refs: u32,
    pub has_depth: bool,
    pub dependencies: u32,
}

#[derive(Debug, Clone)]
pub struct PipelineLayoutRecord {
    pub set_layouts: Vec<vk::DescriptorSetLayout>,
    pub push_constants: Vec<vk::PushConstantRange>,
}

#[derive(Debug, Clone)]
pub struct PipelineRecord {
    pub layout: vk::PipelineLayout,
    pub render_pass: vk::RenderPass,
    pub depth_test: bool,
    pub blend_attachments: u32,
    pub cull_mode: vk::CullModeFlags,
    pub front_face: vk::FrontFace,
    pub vertex_bindings: Vec<vk::VertexInputBindingDescription>,
    pub vertex_attributes: Vec<vk::VertexInputAttributeDescription>,
}

/// A recorded command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    BeginRenderPass {
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        extent: vk::Extent2D,
        clear_values: Vec<Clear>,
    },
    EndRenderPass,
    SetViewport(vk::Extent2D),
    SetScissor(vk::Extent2D),
    BindDescriptorSets {
        layout: vk::PipelineLayout,
        first_set: u32,
        sets: Vec<vk::DescriptorSet>,
    },
    BindPipeline(vk::Pipeline),
}

/// A clear value, read according to the format of the attachment it clears.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Clear {
    Color([f32; 4]),
    DepthStencil(f32, u32),
}

fn is_depth_format(format: vk::Format) -> bool {
    matches!(
        format,
        vk::Format::D16_UNORM
            | vk::Format::X8_D24_UNORM_PACK32
            | vk::Format::D32_SFLOAT
            | vk::Format::D16_UNORM_S8_UINT
            | vk::Format::D24_UNORM_S8_UINT
            | vk::Format::D32_SFLOAT_S8_UINT
    )
}

/// What a descriptor set element points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Descriptor {
    Image {
        view: vk::ImageView,
        sampler: vk::Sampler,
    },
    Buffer(vk::Buffer),
}

#[derive(Debug, Default)]
struct State {
    next_handle: u64,
    /// Raw handle of every live object, with a short description of its kind.
    live: HashMap<u64, &'static str>,
    created: HashMap<&'static str, usize>,
    fail: HashMap<&'static str, usize>,
    images: HashMap<u64, ImageRecord>,
    buffers: HashMap<u64, u64>,
    host_memory: HashMap<u64, Box<[u8]>>,
    mapped: HashSet<u64>,
    flushes: Vec<(u64, vk::DeviceSize)>,
    descriptors: HashMap<(u64, u32, u32), Descriptor>,
    render_passes: HashMap<u64, RenderPassRecord>,
    framebuffers: HashMap<u64, vk::Extent2D>,
    pipeline_layouts: HashMap<u64, PipelineLayoutRecord>,
    pipelines: HashMap<u64, PipelineRecord>,
    names: HashMap<u64, String>,
    surface_extent: Option<vk::Extent2D>,
    commands: Vec<Command>,
}

/// A [`GpuDevice`] that hands out unique handles, tracks which objects are alive and records every command.
#[derive(Debug, Clone, Default)]
pub struct MockDevice {
    state: Rc<RefCell<State>>,
}

impl MockDevice {
    pub fn new() -> Self {
        Self::default()
    }

    fn create<H: Handle>(&self, kind: &'static str, name: &str) -> Result<H> {
        let mut state = self.state.borrow_mut();
        if let Some(remaining) = state.fail.get_mut(kind) {
            if *remaining == 0 {
                state.fail.remove(kind);
                return Err(Error::VkError(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY).into());
            }
            *remaining -= 1;
        }
        state.next_handle += 1;
        let raw = state.next_handle;
        state.live.insert(raw, kind);
        *state.created.entry(kind).or_default() += 1;
        state.names.insert(raw, name.to_string());
        Ok(H::from_raw(raw))
    }

    fn destroy<H: Handle>(&self, kind: &'static str, handle: H) {
        let mut state = self.state.borrow_mut();
        let raw = handle.as_raw();
        match state.live.remove(&raw) {
            Some(live_kind) => assert_eq!(live_kind, kind, "destroyed {raw:#x} as the wrong kind of object"),
            None => panic!("destroyed {kind} {raw:#x} which is not alive"),
        }
    }

    /// Let the next `after` creations of `kind` succeed, and fail the one after that.
    pub fn fail_after(&self, kind: &'static str, after: usize) {
        self.state.borrow_mut().fail.insert(kind, after);
    }

    pub fn set_surface_extent(&self, extent: Option<vk::Extent2D>) {
        self.state.borrow_mut().surface_extent = extent;
    }

    pub fn live_count(&self, kind: &'static str) -> usize {
        self.state.borrow().live.values().filter(|k| **k == kind).count()
    }

    pub fn live_total(&self) -> usize {
        self.state.borrow().live.len()
    }

    pub fn created_count(&self, kind: &'static str) -> usize {
        self.state.borrow().created.get(kind).copied().unwrap_or(0)
    }

    pub fn is_alive<H: Handle>(&self, handle: H) -> bool {
        self.state.borrow().live.contains_key(&handle.as_raw())
    }

    pub fn name_of<H: Handle>(&self, handle: H) -> Option<String> {
        self.state.borrow().names.get(&handle.as_raw()).cloned()
    }

    pub fn image(&self, image: vk::Image) -> ImageRecord {
        self.state.borrow().images[&image.as_raw()]
    }

    pub fn render_pass(&self, render_pass: vk::RenderPass) -> RenderPassRecord {
        self.state.borrow().render_passes[&render_pass.as_raw()].clone()
    }

    pub fn framebuffer_extent(&self, framebuffer: vk::Framebuffer) -> vk::Extent2D {
        self.state.borrow().framebuffers[&framebuffer.as_raw()]
    }

    pub fn pipeline_layout(&self, layout: vk::PipelineLayout) -> PipelineLayoutRecord {
        self.state.borrow().pipeline_layouts[&layout.as_raw()].clone()
    }

    /// Pipeline created with `layout`.
    pub fn pipeline_for_layout(&self, layout: vk::PipelineLayout) -> PipelineRecord {
        self.state
            .borrow()
            .pipelines
            .values()
            .find(|p| p.layout == layout)
            .cloned()
            .expect("no pipeline for layout")
    }

    pub fn descriptor(&self, set: vk::DescriptorSet, binding: u32, element: u32) -> Option<Descriptor> {
        self.state
            .borrow()
            .descriptors
            .get(&(set.as_raw(), binding, element))
            .copied()
    }

    /// Contents of the host memory backing `buffer`.
    pub fn buffer_contents(&self, buffer: vk::Buffer) -> Vec<u8> {
        let state = self.state.borrow();
        let memory = state.buffers[&buffer.as_raw()];
        state.host_memory[&memory].to_vec()
    }

    /// Contents of the uniform buffer bound through descriptor `set`.
    pub fn uniform_contents(&self, set: vk::DescriptorSet) -> Vec<u8> {
        match self.descriptor(set, 0, 0) {
            Some(Descriptor::Buffer(buffer)) => self.buffer_contents(buffer),
            other => panic!("set {set:?} does not point at a buffer: {other:?}"),
        }
    }

    pub fn flush_count(&self) -> usize {
        self.state.borrow().flushes.len()
    }

    pub fn commands(&self) -> Vec<Command> {
        self.state.borrow().commands.clone()
    }

    pub fn clear_commands(&self) {
        self.state.borrow_mut().commands.clear();
    }
}

impl GpuDevice for MockDevice {
    type Memory = MockMemory;

    fn create_image(&self, info: &vk::ImageCreateInfo, name: &str) -> Result<(vk::Image, Self::Memory)> {
        let image: vk::Image = self.create("image", name)?;
        let memory: vk::DeviceMemory = match self.create("memory", name) {
            Ok(memory) => memory,
            Err(err) => {
                self.destroy("image", image);
                return Err(err);
            }
        };
        self.state.borrow_mut().images.insert(
            image.as_raw(),
            ImageRecord {
                extent: info.extent,
                format: info.format,
                usage: info.usage,
            },
        );
        Ok((
            image,
            MockMemory {
                id: memory.as_raw(),
            },
        ))
    }

    fn destroy_image(&self, image: vk::Image, memory: Self::Memory) {
        self.destroy("image", image);
        self.destroy("memory", vk::DeviceMemory::from_raw(memory.id));
    }

    fn create_buffer(&self, info: &vk::BufferCreateInfo, ty: MemoryType, name: &str) -> Result<(vk::Buffer, Self::Memory)> {
        let buffer: vk::Buffer = self.create("buffer", name)?;
        let memory: vk::DeviceMemory = match self.create("memory", name) {
            Ok(memory) => memory,
            Err(err) => {
                self.destroy("buffer", buffer);
                return Err(err);
            }
        };
        let mut state = self.state.borrow_mut();
        state.buffers.insert(buffer.as_raw(), memory.as_raw());
        if ty != MemoryType::GpuOnly {
            state
                .host_memory
                .insert(memory.as_raw(), vec![0u8; info.size as usize].into_boxed_slice());
        }
        Ok((
            buffer,
            MockMemory {
                id: memory.as_raw(),
            },
        ))
    }

    fn destroy_buffer(&self, buffer: vk::Buffer, memory: Self::Memory) {
        self.destroy("buffer", buffer);
        self.destroy("memory", vk::DeviceMemory::from_raw(memory.id));
        assert!(
            !self.state.borrow().mapped.contains(&memory.id),
            "buffer destroyed while its memory is still mapped"
        );
    }

    fn map_memory(&self, memory: &Self::Memory) -> Result<NonNull<u8>> {
        let mut state = self.state.borrow_mut();
        state.mapped.insert(memory.id);
        let host = state.host_memory.get_mut(&memory.id).ok_or(Error::UnmappableMemory)?;
        NonNull::new(host.as_mut_ptr()).ok_or_else(|| Error::UnmappableMemory.into())
    }

    fn unmap_memory(&self, memory: &Self::Memory) {
        self.state.borrow_mut().mapped.remove(&memory.id);
    }

    fn flush_memory(&self, memory: &Self::Memory, size: vk::DeviceSize) -> Result<()> {
        self.state.borrow_mut().flushes.push((memory.id, size));
        Ok(())
    }

    fn create_image_view(&self, _info: &vk::ImageViewCreateInfo, name: &str) -> Result<vk::ImageView> {
        self.create("image_view", name)
    }

    fn destroy_image_view(&self, view: vk::ImageView) {
        self.destroy("image_view", view)
    }

    fn create_sampler(&self, _info: &vk::SamplerCreateInfo, name: &str) -> Result<vk::Sampler> {
        self.create("sampler", name)
    }

    fn destroy_sampler(&self, sampler: vk::Sampler) {
        self.destroy("sampler", sampler)
    }

    fn create_descriptor_pool(&self, _info: &vk::DescriptorPoolCreateInfo, name: &str) -> Result<vk::DescriptorPool> {
        self.create("descriptor_pool", name)
    }

    fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool) {
        self.destroy("descriptor_pool", pool)
    }

    fn create_descriptor_set_layout(&self, _info: &vk::DescriptorSetLayoutCreateInfo, name: &str) -> Result<vk::DescriptorSetLayout> {
        self.create("descriptor_set_layout", name)
    }

    fn destroy_descriptor_set_layout(&self, layout: vk::DescriptorSetLayout) {
        self.destroy("descriptor_set_layout", layout)
    }

    fn allocate_descriptor_set(&self, pool: vk::DescriptorPool, layout: vk::DescriptorSetLayout, name: &str) -> Result<vk::DescriptorSet> {
        assert!(self.is_alive(pool), "allocating from a dead descriptor pool");
        assert!(self.is_alive(layout), "allocating with a dead descriptor set layout");
        self.create("descriptor_set", name)
    }

    fn free_descriptor_set(&self, pool: vk::DescriptorPool, set: vk::DescriptorSet) {
        assert!(self.is_alive(pool), "freeing into a dead descriptor pool");
        self.destroy("descriptor_set", set)
    }

    fn update_descriptor_sets(&self, writes: &[vk::WriteDescriptorSet]) {
        let mut state = self.state.borrow_mut();
        for write in writes {
            let set = write.dst_set.as_raw();
            assert!(state.live.contains_key(&set), "writing to a dead descriptor set");
            for i in 0..write.descriptor_count {
                let element = write.dst_array_element + i;
                // SAFETY: The graph passes arrays of `descriptor_count` elements that live for the duration of the call.
                let descriptor = unsafe {
                    if !write.p_image_info.is_null() {
                        let info = *write.p_image_info.add(i as usize);
                        Descriptor::Image {
                            view: info.image_view,
                            sampler: info.sampler,
                        }
                    } else {
                        let info = *write.p_buffer_info.add(i as usize);
                        Descriptor::Buffer(info.buffer)
                    }
                };
                state.descriptors.insert((set, write.dst_binding, element), descriptor);
            }
        }
    }

    fn create_render_pass(&self, info: &vk::RenderPassCreateInfo, name: &str) -> Result<vk::RenderPass> {
        // SAFETY: All pointers in the create info are valid for the duration of the call.
        let record = unsafe {
            let attachments = std::slice::from_raw_parts(info.p_attachments, info.attachment_count as usize);
            let subpass = &*info.p_subpasses;
            RenderPassRecord {
                formats: attachments.iter().map(|a| a.format).collect(),
                store_ops: attachments.iter().map(|a| a.store_op).collect(),
                final_layouts: attachments.iter().map(|a| a.final_layout).collect(),
                color_refs: subpass.color_attachment_count,
                has_depth: !subpass.p_depth_stencil_attachment.is_null(),
                dependencies: info.dependency_count,
            }
        };
        let render_pass: vk::RenderPass = self.create("render_pass", name)?;
        self.state.borrow_mut().render_passes.insert(render_pass.as_raw(), record);
        Ok(render_pass)
    }

    fn destroy_render_pass(&self, render_pass: vk::RenderPass) {
        self.destroy("render_pass", render_pass)
    }

    fn create_framebuffer(&self, info: &vk::FramebufferCreateInfo, name: &str) -> Result<vk::Framebuffer> {
        assert!(self.is_alive(info.render_pass), "framebuffer for a dead render pass");
        let framebuffer: vk::Framebuffer = self.create("framebuffer", name)?;
        self.state.borrow_mut().framebuffers.insert(
            framebuffer.as_raw(),
            vk::Extent2D {
                width: info.width,
                height: info.height,
            },
        );
        Ok(framebuffer)
    }

    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer) {
        self.destroy("framebuffer", framebuffer)
    }

    fn create_shader_module(&self, code: &[u32], name: &str) -> Result<vk::ShaderModule> {
        assert!(!code.is_empty(), "empty shader code");
        self.create("shader_module", name)
    }

    fn destroy_shader_module(&self, module: vk::ShaderModule) {
        self.destroy("shader_module", module)
    }

    fn create_pipeline_layout(&self, info: &vk::PipelineLayoutCreateInfo, name: &str) -> Result<vk::PipelineLayout> {
        // SAFETY: All pointers in the create info are valid for the duration of the call.
        let record = unsafe {
            PipelineLayoutRecord {
                set_layouts: slice_or_empty(info.p_set_layouts, info.set_layout_count).to_vec(),
                push_constants: slice_or_empty(info.p_push_constant_ranges, info.push_constant_range_count).to_vec(),
            }
        };
        let layout: vk::PipelineLayout = self.create("pipeline_layout", name)?;
        self.state.borrow_mut().pipeline_layouts.insert(layout.as_raw(), record);
        Ok(layout)
    }

    fn destroy_pipeline_layout(&self, layout: vk::PipelineLayout) {
        self.destroy("pipeline_layout", layout)
    }

    fn create_graphics_pipeline(&self, info: &vk::GraphicsPipelineCreateInfo, name: &str) -> Result<vk::Pipeline> {
        // SAFETY: All pointers in the create info are valid for the duration of the call.
        let record = unsafe {
            let depth = &*info.p_depth_stencil_state;
            let blend = &*info.p_color_blend_state;
            let raster = &*info.p_rasterization_state;
            let vertex = &*info.p_vertex_input_state;
            PipelineRecord {
                layout: info.layout,
                render_pass: info.render_pass,
                depth_test: depth.depth_test_enable == vk::TRUE,
                blend_attachments: blend.attachment_count,
                cull_mode: raster.cull_mode,
                front_face: raster.front_face,
                vertex_bindings: slice_or_empty(vertex.p_vertex_binding_descriptions, vertex.vertex_binding_description_count)
                    .to_vec(),
                vertex_attributes: slice_or_empty(
                    vertex.p_vertex_attribute_descriptions,
                    vertex.vertex_attribute_description_count,
                )
                .to_vec(),
            }
        };
        let pipeline: vk::Pipeline = self.create("pipeline", name)?;
        self.state.borrow_mut().pipelines.insert(pipeline.as_raw(), record);
        Ok(pipeline)
    }

    fn destroy_pipeline(&self, pipeline: vk::Pipeline) {
        self.destroy("pipeline", pipeline)
    }

    fn surface_extent(&self) -> Option<vk::Extent2D> {
        self.state.borrow().surface_extent
    }

    fn cmd_begin_render_pass(&self, _cmd: vk::CommandBuffer, info: &vk::RenderPassBeginInfo) {
        let mut state = self.state.borrow_mut();
        let formats = state.render_passes[&info.render_pass.as_raw()].formats.clone();
        // SAFETY: The clear values stay valid for the duration of the call, and each one was
        // written through the member matching its attachment format.
        let clear_values = unsafe {
            slice_or_empty(info.p_clear_values, info.clear_value_count)
                .iter()
                .zip(formats)
                .map(|(value, format)| {
                    if is_depth_format(format) {
                        Clear::DepthStencil(value.depth_stencil.depth, value.depth_stencil.stencil)
                    } else {
                        Clear::Color(value.color.float32)
                    }
                })
                .collect()
        };
        state.commands.push(Command::BeginRenderPass {
            render_pass: info.render_pass,
            framebuffer: info.framebuffer,
            extent: info.render_area.extent,
            clear_values,
        });
    }

    fn cmd_end_render_pass(&self, _cmd: vk::CommandBuffer) {
        self.state.borrow_mut().commands.push(Command::EndRenderPass);
    }

    fn cmd_set_viewport(&self, _cmd: vk::CommandBuffer, viewport: vk::Viewport) {
        self.state.borrow_mut().commands.push(Command::SetViewport(vk::Extent2D {
            width: viewport.width as u32,
            height: viewport.height as u32,
        }));
    }

    fn cmd_set_scissor(&self, _cmd: vk::CommandBuffer, scissor: vk::Rect2D) {
        self.state.borrow_mut().commands.push(Command::SetScissor(scissor.extent));
    }

    fn cmd_bind_descriptor_sets(&self, _cmd: vk::CommandBuffer, layout: vk::PipelineLayout, first_set: u32, sets: &[vk::DescriptorSet]) {
        self.state.borrow_mut().commands.push(Command::BindDescriptorSets {
            layout,
            first_set,
            sets: sets.to_vec(),
        });
    }

    fn cmd_bind_pipeline(&self, _cmd: vk::CommandBuffer, pipeline: vk::Pipeline) {
        self.state.borrow_mut().commands.push(Command::BindPipeline(pipeline));
    }
}

unsafe fn slice_or_empty<'a, T>(ptr: *const T, count: u32) -> &'a [T] {
    if ptr.is_null() || count == 0 {
        &[]
    } else {
        std::slice::from_raw_parts(ptr, count as usize)
    }
}

/// Hands out a minimal SPIR-V header for every shader name, and remembers what was requested.
#[derive(Debug, Clone, Default)]
pub struct MockShaders {
    requested: Rc<RefCell<Vec<String>>>,
}

impl MockShaders {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn requested(&self) -> Vec<String> {
        self.requested.borrow().clone()
    }
}

impl ShaderLoader for MockShaders {
    fn read_shader_file(&self, name: &str) -> Result<Vec<u32>> {
        self.requested.borrow_mut().push(name.to_string());
        Ok(vec![0x0723_0203, 0x0001_0000, 0, 1, 0])
    }
}

pub type TestGraph = Graph<MockDevice, MockShaders>;

/// Create a graph on a fresh mock device with the given output extent and uniform size.
pub fn make_graph(width: u32, height: u32, ubo_size: Option<usize>) -> Result<(MockDevice, TestGraph)> {
    init_logger();
    let device = MockDevice::new();
    let mut settings = GraphBuilder::new().name("test").extent(width, height);
    if let Some(size) = ubo_size {
        settings = settings.ubo_size(size);
    }
    let graph = Graph::new(device.clone(), MockShaders::new(), settings.build())?;
    Ok((device, graph))
}

pub fn color(name: &str) -> ResourceDescriptor {
    ResourceDescriptor::color(name, vk::Format::R8G8B8A8_UNORM)
}

pub fn depth(name: &str) -> ResourceDescriptor {
    ResourceDescriptor::depth(name, vk::Format::D32_SFLOAT)
}

pub fn pass(name: &str) -> PassBuilder {
    PassBuilder::new(name).shaders(format!("{name}.vert.spv"), format!("{name}.frag.spv"))
}

/// Number of objects a freshly created graph owns: three samplers, the sampled descriptor pool and its layout.
pub const GRAPH_BASE_OBJECTS: usize = 5;

pub fn error_of(err: &anyhow::Error) -> &Error {
    err.downcast_ref::<Error>().expect("not a whisper graph error")
}
