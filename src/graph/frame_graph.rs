//! The [`Graph`] type: registry, compilation, rendering and resizing.

use std::collections::{BTreeMap, BTreeSet};

use anyhow::Result;
use ash::vk;

use crate::{
    Error, FRAMES_IN_FLIGHT, GpuDevice, GraphSettings, Pass, PassDescriptor, Resource, ResourceDescriptor, ResourceRole,
    SamplerKind, ShaderDirectory, ShaderLoader, UsageMode,
};
use crate::graph::physical_pass::{AttachmentInfo, PhysicalPass};
use crate::graph::physical_resource::{PhysicalResource, ResourceBuildInfo};
use crate::graph::resolve::{find_dependencies, Dependencies, Topology};
use crate::graph::schedule::order_passes;
use crate::graph::uniform::UniformBuffers;
use crate::sampler::GraphSamplers;

type PopulateUboFn = Box<dyn FnMut(&mut [u8])>;

/// A frame graph. See the [module level documentation](crate::graph) for an overview.
///
/// The graph owns every GPU object it creates and destroys them when it is dropped. It is not thread safe,
/// all calls must come from the same render thread.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct Graph<D: GpuDevice, S: ShaderLoader = ShaderDirectory> {
    #[derivative(Debug = "ignore")]
    device: D,
    #[derivative(Debug = "ignore")]
    shaders: S,
    name: String,
    extent: vk::Extent2D,

    resource_infos: Vec<ResourceDescriptor>,
    pass_infos: Vec<PassDescriptor>,

    target: Option<Resource>,
    usage: UsageMode,
    compiled: bool,
    topology: Topology,
    valid: Dependencies,
    ordered: Vec<Pass>,

    #[derivative(Debug = "ignore")]
    resources: BTreeMap<Resource, PhysicalResource<D::Memory>>,
    passes: BTreeMap<Pass, PhysicalPass>,

    ubo_size: Option<usize>,
    #[derivative(Debug = "ignore")]
    populate_ubo: Option<PopulateUboFn>,
    ubo_scratch: Vec<u8>,
    #[derivative(Debug = "ignore")]
    uniform: Option<UniformBuffers<D::Memory>>,

    samplers: GraphSamplers,
    descriptor_pool: vk::DescriptorPool,
    descriptor_layout: vk::DescriptorSetLayout,
}

impl<D: GpuDevice, S: ShaderLoader> Graph<D, S> {
    /// Create an empty graph. This creates the graph's samplers and the descriptor pool used for sampled resources.
    /// # Errors
    /// * Fails if any of these objects cannot be created.
    pub fn new(device: D, shaders: S, settings: GraphSettings) -> Result<Self> {
        let samplers = GraphSamplers::new(&device, &settings.name)?;

        let pool_size = vk::DescriptorPoolSize {
            ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            descriptor_count: settings.max_sampler_sets,
        };
        let pool_info = vk::DescriptorPoolCreateInfo::builder()
            .flags(vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET)
            .max_sets(settings.max_sampler_sets)
            .pool_sizes(std::slice::from_ref(&pool_size))
            .build();
        let descriptor_pool = match device.create_descriptor_pool(&pool_info, &format!("{}_sampled_pool", settings.name)) {
            Ok(pool) => pool,
            Err(err) => {
                samplers.destroy(&device);
                return Err(err);
            }
        };

        let binding = vk::DescriptorSetLayoutBinding::builder()
            .binding(0)
            .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .descriptor_count(1)
            .stage_flags(vk::ShaderStageFlags::FRAGMENT)
            .build();
        let layout_info = vk::DescriptorSetLayoutCreateInfo::builder()
            .bindings(std::slice::from_ref(&binding))
            .build();
        let descriptor_layout =
            match device.create_descriptor_set_layout(&layout_info, &format!("{}_sampled_layout", settings.name)) {
                Ok(layout) => layout,
                Err(err) => {
                    device.destroy_descriptor_pool(descriptor_pool);
                    samplers.destroy(&device);
                    return Err(err);
                }
            };

        info!("Created graph `{}` ({}x{})", settings.name, settings.width, settings.height);
        Ok(Self {
            device,
            shaders,
            name: settings.name,
            extent: vk::Extent2D {
                width: settings.width,
                height: settings.height,
            },
            resource_infos: vec![],
            pass_infos: vec![],
            target: None,
            usage: UsageMode::ToTransfer,
            compiled: false,
            topology: Topology::default(),
            valid: Dependencies::default(),
            ordered: vec![],
            resources: BTreeMap::new(),
            passes: BTreeMap::new(),
            ubo_size: settings.ubo_size,
            populate_ubo: None,
            ubo_scratch: vec![],
            uniform: None,
            samplers,
            descriptor_pool,
            descriptor_layout,
        })
    }

    /// Register a resource. Declarations are kept across compiles.
    pub fn new_resource(&mut self, descriptor: ResourceDescriptor) -> Resource {
        self.resource_infos.push(descriptor);
        Resource(self.resource_infos.len() - 1)
    }

    /// Register a pass. Resources it references are only checked by [`Graph::compile()`].
    pub fn new_pass(&mut self, descriptor: PassDescriptor) -> Pass {
        self.pass_infos.push(descriptor);
        Pass(self.pass_infos.len() - 1)
    }

    /// Set the size of the uniform buffer in bytes. Takes effect on the next compile.
    pub fn set_ubo_size(&mut self, size: usize) {
        self.ubo_size = Some(size);
    }

    /// Set a function that fills the uniform buffer at the start of every [`Graph::render()`]. It receives a zeroed
    /// buffer of the configured uniform size.
    pub fn set_populate_ubo_fn<F: FnMut(&mut [u8]) + 'static>(&mut self, populate: F) {
        self.populate_ubo = Some(Box::new(populate));
    }

    /// Compile the graph for `target`. Everything built by a previous compile is destroyed first.
    ///
    /// All validation happens before any GPU object is created, so a failing compile leaves the graph
    /// uncompiled and without live objects.
    /// # Errors
    /// * [`Error::InvalidHandle`] if the target or any pass references an unregistered resource.
    /// * [`Error::GraphHasCycle`] if the target depends on itself.
    /// * [`Error::ExtentMismatch`] if a reachable pass writes resources with different extents.
    /// * [`Error::MultipleDepthWrites`] if a reachable pass writes more than one depth resource.
    /// * [`Error::MissingUboSize`] if a reachable pass reads the uniform but no uniform size was set.
    /// * Any device error while building GPU objects.
    pub fn compile(&mut self, target: Resource, usage: UsageMode) -> Result<()> {
        self.reset();
        self.target = Some(target);
        self.usage = usage;

        let topology = Topology::new(
            self.resource_infos.len(),
            self.pass_infos
                .iter()
                .map(|pass| (pass.name.as_str(), pass.reads.as_slice(), pass.writes.as_slice())),
        )?;
        let valid = find_dependencies(&topology, target)?;
        let ordered = order_passes(&topology, &valid)?;
        self.validate(&valid)?;

        info!(
            "Graph `{}` compiled for `{}` ({:?}): {} resources, {} passes",
            self.name,
            self.resource_infos[target.0].name,
            usage,
            valid.resources.len(),
            valid.passes.len()
        );
        info!(
            "Pass order: [{}]",
            ordered
                .iter()
                .map(|pass| self.pass_infos[pass.0].name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );

        self.topology = topology;
        self.valid = valid;
        self.ordered = ordered;

        if let Err(err) = self.build() {
            error!("Failed to build graph `{}`: {err}", self.name);
            self.reset();
            return Err(err);
        }
        self.compiled = true;
        Ok(())
    }

    /// Recompile for the same target with a different usage. This rebuilds everything.
    /// # Errors
    /// * [`Error::NotCompiled`] if the graph was never compiled.
    /// * Any error [`Graph::compile()`] can return.
    pub fn change_usage(&mut self, usage: UsageMode) -> Result<()> {
        let target = self.target.ok_or(Error::NotCompiled)?;
        self.compile(target, usage)
    }

    /// Resize the output of the graph. Screen-relative resources and passes that write resources are rebuilt,
    /// resources with an explicit extent keep their GPU objects.
    /// # Errors
    /// * Any device error while rebuilding. The graph is reset in that case.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        self.extent = vk::Extent2D {
            width,
            height,
        };
        if !self.compiled {
            return Ok(());
        }
        info!("Resizing graph `{}` to {width}x{height}", self.name);
        if let Err(err) = self.rebuild_screen_relative() {
            error!("Failed to resize graph `{}`: {err}", self.name);
            self.reset();
            return Err(err);
        }
        Ok(())
    }

    /// Resize to the extent of the presentation surface, if the device reports one and it differs from the
    /// current extent. Returns whether a resize happened.
    pub fn resize_to_surface(&mut self) -> Result<bool> {
        match self.device.surface_extent() {
            Some(extent) if extent.width != self.extent.width || extent.height != self.extent.height => {
                self.resize(extent.width, extent.height)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Copy `bytes` into the uniform buffer of `frame` and flush it to the device.
    /// Does nothing if the compiled graph has no uniform buffer.
    /// # Errors
    /// * [`Error::InvalidFrameIndex`] if `frame` is not smaller than [`FRAMES_IN_FLIGHT`].
    /// * [`Error::UniformOverflow`] if `bytes` is larger than the uniform buffer.
    pub fn flush_ubo(&mut self, bytes: &[u8], frame: usize) -> Result<()> {
        check_frame(frame)?;
        match &self.uniform {
            Some(uniform) => uniform.flush(&self.device, bytes, frame),
            None => {
                warn!("Flushing uniform data into graph `{}`, which has no uniform buffer", self.name);
                Ok(())
            }
        }
    }

    /// Record every pass in execution order into `cmd`, using the objects of frame slot `frame`.
    ///
    /// If a populate function was set and the graph has a uniform buffer, it is called first and its result flushed
    /// to the uniform buffer of `frame`.
    /// # Errors
    /// * [`Error::NotCompiled`] if the graph was not compiled successfully.
    /// * [`Error::InvalidFrameIndex`] if `frame` is not smaller than [`FRAMES_IN_FLIGHT`].
    /// * Any error returned by a pass executor.
    pub fn render(&mut self, cmd: vk::CommandBuffer, frame: usize) -> Result<()> {
        if !self.compiled {
            return Err(Error::NotCompiled.into());
        }
        check_frame(frame)?;

        if let (Some(populate), Some(uniform)) = (self.populate_ubo.as_mut(), &self.uniform) {
            self.ubo_scratch.clear();
            self.ubo_scratch.resize(uniform.size(), 0);
            populate(&mut self.ubo_scratch);
            uniform.flush(&self.device, &self.ubo_scratch, frame)?;
        }

        for &pass in &self.ordered {
            let physical = self
                .passes
                .get(&pass)
                .ok_or_else(|| Error::InvalidHandle(pass.to_string()))?;
            let info = &mut self.pass_infos[pass.0];

            let mut sets = Vec::with_capacity(info.reads.len() + 2);
            if info.reads_uniform {
                if let Some(uniform) = &self.uniform {
                    sets.push(uniform.descriptor_set(frame));
                }
            }
            for read in &info.reads {
                let set = self
                    .resources
                    .get(read)
                    .and_then(|resource| resource.slots[frame].descriptor_set)
                    .ok_or_else(|| Error::InvalidHandle(format!("{read} is not sampled")))?;
                sets.push(set);
            }
            if let Some(textures) = &info.static_textures {
                sets.push(textures.descriptor_set());
            }

            self.device.cmd_begin_render_pass(cmd, &physical.begin_info(frame));
            self.device.cmd_set_viewport(cmd, physical.viewport());
            self.device.cmd_set_scissor(cmd, physical.render_area());
            if !sets.is_empty() {
                self.device.cmd_bind_descriptor_sets(cmd, physical.pipeline.layout, 0, &sets);
            }
            self.device.cmd_bind_pipeline(cmd, physical.pipeline.pipeline);
            let result = info.execute.execute(cmd, physical.pipeline.layout);
            self.device.cmd_end_render_pass(cmd);
            result?;
        }
        Ok(())
    }

    /// The target image of `frame`, for use as a transfer source.
    /// The graph keeps no current frame, so callers pass the same `frame` they rendered and flushed.
    /// # Errors
    /// * [`Error::UsageMismatch`] if the graph is not compiled with [`UsageMode::ToTransfer`].
    pub fn target_image(&self, frame: usize) -> Result<vk::Image> {
        let target = self.checked_target(UsageMode::ToTransfer, frame)?;
        self.resource_image(target, frame).ok_or_else(|| Error::NotCompiled.into())
    }

    /// The descriptor set sampling the target image of `frame`.
    /// # Errors
    /// * [`Error::UsageMismatch`] if the graph is not compiled with [`UsageMode::ToDescriptorSet`].
    pub fn target_descriptor_set(&self, frame: usize) -> Result<vk::DescriptorSet> {
        let target = self.checked_target(UsageMode::ToDescriptorSet, frame)?;
        self.resource_descriptor_set(target, frame)
            .ok_or_else(|| Error::NotCompiled.into())
    }

    fn checked_target(&self, expected: UsageMode, frame: usize) -> Result<Resource> {
        let target = match self.target {
            Some(target) if self.compiled => target,
            _ => return Err(Error::NotCompiled.into()),
        };
        if self.usage != expected {
            return Err(Error::UsageMismatch {
                expected,
            }
            .into());
        }
        check_frame(frame)?;
        Ok(target)
    }

    /// Structural checks on the reachable subset that do not need GPU objects.
    fn validate(&self, valid: &Dependencies) -> Result<()> {
        for &pass in &valid.passes {
            let info = &self.pass_infos[pass.0];
            let mut extents = info.writes.iter().map(|r| self.resource_infos[r.0].extent);
            if let Some(first) = extents.next() {
                if extents.any(|extent| extent.width != first.width || extent.height != first.height) {
                    return Err(Error::ExtentMismatch {
                        pass: info.name.clone(),
                    }
                    .into());
                }
            }
            let depth_writes = info
                .writes
                .iter()
                .filter(|r| self.resource_infos[r.0].role == ResourceRole::Depth)
                .count();
            if depth_writes > 1 {
                return Err(Error::MultipleDepthWrites {
                    pass: info.name.clone(),
                }
                .into());
            }
            if info.reads_uniform && self.ubo_size.unwrap_or(0) == 0 {
                return Err(Error::MissingUboSize {
                    pass: info.name.clone(),
                }
                .into());
            }
        }
        Ok(())
    }

    fn build(&mut self) -> Result<()> {
        let resources = self.valid.resources.iter().copied().collect::<Vec<_>>();
        for resource in resources {
            self.build_resource(resource)?;
        }

        let reads_uniform = self.valid.passes.iter().any(|pass| self.pass_infos[pass.0].reads_uniform);
        if let (true, true, Some(size)) = (reads_uniform, self.uniform.is_none(), self.ubo_size) {
            self.uniform = Some(UniformBuffers::build(&self.device, size, &self.name)?);
        }

        let passes = self.valid.passes.iter().copied().collect::<Vec<_>>();
        for pass in passes {
            self.build_pass(pass)?;
        }
        Ok(())
    }

    fn rebuild_screen_relative(&mut self) -> Result<()> {
        let resources = self
            .valid
            .resources
            .iter()
            .copied()
            .filter(|r| self.resource_infos[r.0].is_screen_relative())
            .collect::<Vec<_>>();
        for resource in resources {
            self.free_resource(resource);
            self.build_resource(resource)?;
        }

        let passes = self
            .valid
            .passes
            .iter()
            .copied()
            .filter(|p| self.pass_infos[p.0].rebuild_on_change())
            .collect::<Vec<_>>();
        for pass in passes {
            self.free_pass(pass);
            self.build_pass(pass)?;
        }
        Ok(())
    }

    /// The target is never sampled when it is copied out, and always sampled when it is exposed as a descriptor set.
    /// Any other resource is sampled when some pass reads it.
    fn is_sampled(&self, resource: Resource) -> bool {
        let has_readers = !self.topology.readers[resource.0].is_empty();
        match (self.target == Some(resource), self.usage) {
            (true, UsageMode::ToTransfer) => false,
            (true, UsageMode::ToDescriptorSet) => true,
            (false, _) => has_readers,
        }
    }

    fn is_transfer_source(&self, resource: Resource) -> bool {
        self.target == Some(resource) && self.usage == UsageMode::ToTransfer
    }

    fn output_extent_for(&self, resource: Resource) -> vk::Extent2D {
        let info = &self.resource_infos[resource.0];
        if info.is_screen_relative() {
            self.extent
        } else {
            info.extent
        }
    }

    fn build_resource(&mut self, resource: Resource) -> Result<()> {
        let info = &self.resource_infos[resource.0];
        let sampled = self.is_sampled(resource);

        let mut usage = vk::ImageUsageFlags::empty();
        if !self.topology.writers[resource.0].is_empty() {
            usage |= match info.role {
                ResourceRole::Color => vk::ImageUsageFlags::COLOR_ATTACHMENT,
                ResourceRole::Depth => vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
            };
        }
        if sampled {
            usage |= vk::ImageUsageFlags::SAMPLED;
        }
        if self.is_transfer_source(resource) {
            usage |= vk::ImageUsageFlags::TRANSFER_SRC;
        }

        let build_info = ResourceBuildInfo {
            extent: self.output_extent_for(resource),
            usage,
            sampler: sampled.then(|| self.samplers.get(info.sampler_kind())),
            pool: self.descriptor_pool,
            layout: self.descriptor_layout,
        };
        let physical = PhysicalResource::build(&self.device, info, &build_info)?;
        self.resources.insert(resource, physical);
        Ok(())
    }

    fn free_resource(&mut self, resource: Resource) {
        if let Some(mut physical) = self.resources.remove(&resource) {
            physical.free(&self.device, self.descriptor_pool);
            debug!("Freed resource `{}`", self.resource_infos[resource.0].name);
        }
    }

    fn build_pass(&mut self, pass: Pass) -> Result<()> {
        let info = &self.pass_infos[pass.0];

        let mut attachments = Vec::with_capacity(info.writes.len());
        for &write in &info.writes {
            let physical = self
                .resources
                .get(&write)
                .ok_or_else(|| Error::InvalidHandle(write.to_string()))?;
            attachments.push(AttachmentInfo {
                descriptor: &self.resource_infos[write.0],
                physical,
                sampled: self.is_sampled(write),
                transfer_source: self.is_transfer_source(write),
            });
        }

        let mut set_layouts = Vec::with_capacity(info.reads.len() + 2);
        if info.reads_uniform {
            if let Some(uniform) = &self.uniform {
                set_layouts.push(uniform.layout());
            }
        }
        set_layouts.extend(info.reads.iter().map(|_| self.descriptor_layout));
        if let Some(textures) = &info.static_textures {
            set_layouts.push(textures.descriptor_set_layout());
        }

        let extent = info
            .writes
            .iter()
            .map(|r| &self.resource_infos[r.0])
            .filter(|r| !r.is_screen_relative())
            .map(|r| r.extent)
            .max_by_key(|extent| (extent.width, extent.height))
            .unwrap_or(self.extent);

        let physical = PhysicalPass::build(&self.device, &self.shaders, info, &attachments, &set_layouts, extent)?;
        self.passes.insert(pass, physical);
        Ok(())
    }

    fn free_pass(&mut self, pass: Pass) {
        if let Some(physical) = self.passes.remove(&pass) {
            physical.destroy(&self.device);
            debug!("Freed pass `{}`", self.pass_infos[pass.0].name);
        }
    }

    /// Destroy every object built by compile, and forget the compiled state. Declarations are kept.
    fn reset(&mut self) {
        let passes = self.passes.keys().copied().collect::<Vec<_>>();
        for pass in passes {
            self.free_pass(pass);
        }
        let resources = self.resources.keys().copied().collect::<Vec<_>>();
        for resource in resources {
            self.free_resource(resource);
        }
        if let Some(mut uniform) = self.uniform.take() {
            uniform.free(&self.device);
        }
        self.valid = Dependencies::default();
        self.ordered.clear();
        self.topology = Topology::default();
        self.compiled = false;
    }

    /// The device this graph creates its objects with.
    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current output extent. Screen-relative resources have this size.
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Usage of the last compile.
    pub fn usage(&self) -> UsageMode {
        self.usage
    }

    /// Target of the last compile.
    pub fn target(&self) -> Option<Resource> {
        self.target
    }

    pub fn is_compiled(&self) -> bool {
        self.compiled
    }

    pub fn sampler(&self, kind: SamplerKind) -> vk::Sampler {
        self.samplers.get(kind)
    }

    pub fn resource(&self, resource: Resource) -> Option<&ResourceDescriptor> {
        self.resource_infos.get(resource.0)
    }

    pub fn pass(&self, pass: Pass) -> Option<&PassDescriptor> {
        self.pass_infos.get(pass.0)
    }

    /// Resources reachable from the compile target.
    pub fn valid_resources(&self) -> &BTreeSet<Resource> {
        &self.valid.resources
    }

    /// Passes reachable from the compile target.
    pub fn valid_passes(&self) -> &BTreeSet<Pass> {
        &self.valid.passes
    }

    /// Reachable passes in execution order.
    pub fn ordered_passes(&self) -> &[Pass] {
        &self.ordered
    }

    /// Passes that write `resource`, as derived by the last compile.
    pub fn writers(&self, resource: Resource) -> &[Pass] {
        self.topology.writers.get(resource.0).map_or(&[], Vec::as_slice)
    }

    /// Passes that read `resource`, as derived by the last compile.
    pub fn readers(&self, resource: Resource) -> &[Pass] {
        self.topology.readers.get(resource.0).map_or(&[], Vec::as_slice)
    }

    pub fn resource_image(&self, resource: Resource, frame: usize) -> Option<vk::Image> {
        self.resources
            .get(&resource)
            .and_then(|r| r.slots.get(frame))
            .map(|slot| slot.image)
    }

    pub fn resource_view(&self, resource: Resource, frame: usize) -> Option<vk::ImageView> {
        self.resources
            .get(&resource)
            .and_then(|r| r.slots.get(frame))
            .map(|slot| slot.view)
    }

    /// Extent the GPU objects of `resource` were built with.
    pub fn resource_extent(&self, resource: Resource) -> Option<vk::Extent2D> {
        self.resources.get(&resource).map(|r| r.extent)
    }

    pub fn resource_descriptor_set(&self, resource: Resource, frame: usize) -> Option<vk::DescriptorSet> {
        self.resources
            .get(&resource)
            .and_then(|r| r.slots.get(frame))
            .and_then(|slot| slot.descriptor_set)
    }

    pub fn pass_pipeline_layout(&self, pass: Pass) -> Option<vk::PipelineLayout> {
        self.passes.get(&pass).map(|p| p.pipeline.layout)
    }

    pub fn pass_framebuffer(&self, pass: Pass, frame: usize) -> Option<vk::Framebuffer> {
        self.passes.get(&pass).and_then(|p| p.framebuffers.get(frame).copied())
    }

    /// Descriptor set of the uniform buffer of `frame`, if the compiled graph has one.
    pub fn ubo_descriptor_set(&self, frame: usize) -> Option<vk::DescriptorSet> {
        self.uniform
            .as_ref()
            .filter(|_| frame < FRAMES_IN_FLIGHT)
            .map(|uniform| uniform.descriptor_set(frame))
    }
}

fn check_frame(frame: usize) -> Result<()> {
    if frame >= FRAMES_IN_FLIGHT {
        return Err(Error::InvalidFrameIndex(frame).into());
    }
    Ok(())
}

impl<D: GpuDevice, S: ShaderLoader> Drop for Graph<D, S> {
    fn drop(&mut self) {
        self.reset();
        self.device.destroy_descriptor_set_layout(self.descriptor_layout);
        self.device.destroy_descriptor_pool(self.descriptor_pool);
        self.samplers.destroy(&self.device);
        info!("Destroyed graph `{}`", self.name);
    }
}
