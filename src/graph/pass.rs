//! This module mainly exposes the [`PassBuilder`] struct, used for correctly defining passes in a [`Graph`](crate::Graph).
//!
//! Every pass declares the resources it reads and writes. Written resources become the attachments of the pass' render
//! pass and are cleared with the clear value of their [`ResourceDescriptor`](crate::ResourceDescriptor). Read resources are
//! sampled in the shaders through one descriptor set each, bound after the uniform buffer set (if the pass reads the uniform)
//! and before the static texture set (if the pass binds one).
//!
//! # Example
//!
//! In this example we define two passes: one that renders into an offscreen texture, and one that samples it
//! while rendering to the final target.
//! ```
//! use whisper_graph::prelude::*;
//!
//! # fn declare<D: GpuDevice, S: ShaderLoader>(graph: &mut Graph<D, S>) -> anyhow::Result<()> {
//! let offscreen = graph.new_resource(ResourceDescriptor::color("offscreen", vk::Format::R16G16B16A16_SFLOAT));
//! let output = graph.new_resource(ResourceDescriptor::color("output", vk::Format::R8G8B8A8_UNORM));
//!
//! let scene = PassBuilder::new("scene")
//!     .writes([offscreen])
//!     .reads_uniform(true)
//!     .shaders("scene.vert.spv", "scene.frag.spv")
//!     .vertex_input(0, vk::VertexInputRate::VERTEX)
//!     // Position and normal, offsets and stride are calculated automatically.
//!     .vertex_attribute(0, 0, vk::Format::R32G32B32_SFLOAT)?
//!     .vertex_attribute(0, 1, vk::Format::R32G32B32_SFLOAT)?
//!     .execute_fn(|cmd, layout| {
//!         // Bind vertex buffers and draw
//!         Ok(())
//!     })
//!     .build();
//! graph.new_pass(scene);
//!
//! let post = PassBuilder::new("post")
//!     .reads([offscreen])
//!     .writes([output])
//!     .shaders("fullscreen.vert.spv", "post.frag.spv")
//!     .build();
//! graph.new_pass(post);
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use ash::vk;

use crate::{Error, Resource, StaticTextures};
use crate::util::byte_size::ByteSize;

/// Defines a pass executor that is called when the pass is rendered.
pub trait PassExecutor {
    /// Record the draw commands of this pass. The render pass is already begun and the pipeline and all descriptor
    /// sets of the pass are bound.
    fn execute(&mut self, cmd: vk::CommandBuffer, layout: vk::PipelineLayout) -> Result<()>;
}

impl<F> PassExecutor for F
where
    F: FnMut(vk::CommandBuffer, vk::PipelineLayout) -> Result<()>,
{
    /// Record this pass by calling the given function.
    fn execute(&mut self, cmd: vk::CommandBuffer, layout: vk::PipelineLayout) -> Result<()> {
        self(cmd, layout)
    }
}

/// An empty pass executor that does nothing
pub struct EmptyPassExecutor;

impl EmptyPassExecutor {
    /// Creates an empty pass executor
    pub fn new() -> Self {
        Self {}
    }

    /// Create a new empty pass executor in a [`Box`]
    pub fn new_boxed() -> Box<Self> {
        Box::new(Self::new())
    }
}

impl PassExecutor for EmptyPassExecutor {
    fn execute(&mut self, _cmd: vk::CommandBuffer, _layout: vk::PipelineLayout) -> Result<()> {
        Ok(())
    }
}

/// Describes one render pass in the graph. You can obtain one using a [`PassBuilder`].
#[derive(Derivative)]
#[derivative(Debug)]
pub struct PassDescriptor {
    pub name: String,
    /// Resources sampled by this pass, one descriptor set each, in binding order.
    pub reads: Vec<Resource>,
    /// Resources rendered to by this pass, one attachment each, in attachment order.
    pub writes: Vec<Resource>,
    pub reads_uniform: bool,
    /// Size of the push constant range in bytes. No range is declared when this is zero.
    pub push_constant_size: u32,
    #[derivative(Debug = "ignore")]
    pub static_textures: Option<Arc<dyn StaticTextures>>,
    pub vertex_shader: String,
    pub fragment_shader: String,
    pub vertex_bindings: Vec<vk::VertexInputBindingDescription>,
    pub vertex_attributes: Vec<vk::VertexInputAttributeDescription>,
    #[derivative(Debug = "ignore")]
    pub execute: Box<dyn PassExecutor>,
}

impl PassDescriptor {
    /// Passes that render to any resource have framebuffers tied to the identity of those resources, and must
    /// be rebuilt whenever they are.
    pub fn rebuild_on_change(&self) -> bool {
        !self.writes.is_empty()
    }
}

/// Used to create [`PassDescriptor`] objects correctly.
/// # Example
/// See the [`pass`](crate::graph::pass) module level documentation.
pub struct PassBuilder {
    inner: PassDescriptor,
    vertex_binding_offsets: HashMap<u32, u32>,
}

impl PassBuilder {
    /// Create a new pass with no resources, no shaders and an empty executor.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            inner: PassDescriptor {
                name: name.into(),
                reads: vec![],
                writes: vec![],
                reads_uniform: false,
                push_constant_size: 0,
                static_textures: None,
                vertex_shader: String::new(),
                fragment_shader: String::new(),
                vertex_bindings: vec![],
                vertex_attributes: vec![],
                execute: EmptyPassExecutor::new_boxed(),
            },
            vertex_binding_offsets: Default::default(),
        }
    }

    /// Add resources this pass samples from.
    pub fn reads(mut self, resources: impl IntoIterator<Item = Resource>) -> Self {
        self.inner.reads.extend(resources);
        self
    }

    /// Add resources this pass renders to.
    pub fn writes(mut self, resources: impl IntoIterator<Item = Resource>) -> Self {
        self.inner.writes.extend(resources);
        self
    }

    /// Whether this pass binds the per-frame uniform buffer at set 0.
    pub fn reads_uniform(mut self, reads: bool) -> Self {
        self.inner.reads_uniform = reads;
        self
    }

    /// Declare a push constant range of `size` bytes, visible to all graphics stages.
    pub fn push_constants(mut self, size: u32) -> Self {
        self.inner.push_constant_size = size;
        self
    }

    /// Bind an externally owned static texture set after all other descriptor sets.
    pub fn static_textures(mut self, textures: Arc<dyn StaticTextures>) -> Self {
        self.inner.static_textures = Some(textures);
        self
    }

    /// Set the SPIR-V files for the vertex and fragment stage. These are resolved through the graph's
    /// [`ShaderLoader`](crate::ShaderLoader).
    pub fn shaders(mut self, vertex: impl Into<String>, fragment: impl Into<String>) -> Self {
        self.inner.vertex_shader = vertex.into();
        self.inner.fragment_shader = fragment.into();
        self
    }

    /// Add a vertex input binding. These are the binding indices for `vkCmdBindVertexBuffers`
    pub fn vertex_input(mut self, binding: u32, rate: vk::VertexInputRate) -> Self {
        self.vertex_binding_offsets.insert(binding, 0);
        self.inner.vertex_bindings.push(vk::VertexInputBindingDescription {
            binding,
            stride: 0,
            input_rate: rate,
        });
        self
    }

    /// Add a vertex attribute to the specified binding.
    /// Doing this will automatically calculate offsets and sizes, so make sure to add these in order of declaration in
    /// the shader.
    /// # Errors
    /// * Fails if the binding was not declared with [`PassBuilder::vertex_input()`].
    /// * Fails if the size of `format` is unknown.
    pub fn vertex_attribute(mut self, binding: u32, location: u32, format: vk::Format) -> Result<Self> {
        let offset = self
            .vertex_binding_offsets
            .get_mut(&binding)
            .ok_or(Error::NoVertexBinding)?;
        let size = format.byte_size().ok_or(Error::UnsupportedVertexFormat(format))?;
        self.inner.vertex_attributes.push(vk::VertexInputAttributeDescription {
            location,
            binding,
            format,
            offset: *offset,
        });
        *offset += size;
        let stride = *offset;
        for description in self.inner.vertex_bindings.iter_mut().filter(|b| b.binding == binding) {
            description.stride = stride;
        }
        Ok(self)
    }

    /// Set the function to be called when recording this pass.
    pub fn execute_fn<F>(mut self, exec: F) -> Self
    where
        F: FnMut(vk::CommandBuffer, vk::PipelineLayout) -> Result<()> + 'static,
    {
        self.inner.execute = Box::new(exec);
        self
    }

    /// Use an arbitrary [`PassExecutor`] to record this pass.
    pub fn executor(mut self, exec: Box<dyn PassExecutor>) -> Self {
        self.inner.execute = exec;
        self
    }

    /// Obtain a built [`PassDescriptor`] object.
    pub fn build(self) -> PassDescriptor {
        self.inner
    }
}
