//! The frame graph lets you declare logical images ([`Resource`]s) and render passes ([`Pass`]es) together with their
//! read/write relationships, and then compiles them against a single target resource.
//!
//! Compiling walks the graph backwards from the target to find the reachable subset, rejects dependency cycles,
//! orders the passes so every pass runs after the writers of the resources it reads, and finally builds the GPU objects
//! that back the reachable subset. Every per-frame object exists once per frame in flight
//! (see [`FRAMES_IN_FLIGHT`]), so the CPU can record frame `k + 1` while the GPU is still busy with frame `k`.
//!
//! # Example
//!
//! ```
//! use whisper_graph::prelude::*;
//!
//! # fn build<D: GpuDevice>(device: D, shaders: ShaderDirectory) -> anyhow::Result<()> {
//! let mut graph = Graph::new(device, shaders, GraphBuilder::new().extent(1280, 720).build())?;
//! // A screen-relative color target and depth buffer.
//! let color = graph.new_resource(ResourceDescriptor::color("color", vk::Format::R8G8B8A8_UNORM));
//! let depth = graph.new_resource(ResourceDescriptor::depth("depth", vk::Format::D32_SFLOAT));
//!
//! graph.new_pass(
//!     PassBuilder::new("forward")
//!         .writes([color, depth])
//!         .shaders("forward.vert.spv", "forward.frag.spv")
//!         .execute_fn(|cmd, layout| {
//!             // Record draw calls here
//!             Ok(())
//!         })
//!         .build(),
//! );
//!
//! // Expose the color target as a sampled descriptor set, for example to display it inside a UI.
//! graph.compile(color, UsageMode::ToDescriptorSet)?;
//! let set = graph.target_descriptor_set(0)?;
//! # Ok(())
//! # }
//! ```
//!
//! # Rendering
//!
//! Once compiled, [`Graph::render()`] records every pass in execution order into a command buffer.
//! When the output is resized, [`Graph::resize()`] only rebuilds the screen-relative resources and the passes
//! that write to resources.

pub mod handles;
pub mod resource;
pub mod pass;
pub mod frame_graph;
pub mod viz;

pub(crate) mod resolve;
pub(crate) mod schedule;
pub(crate) mod physical_resource;
pub(crate) mod physical_pass;
pub(crate) mod uniform;

pub use frame_graph::Graph;
pub use handles::{Node, Pass, Resource};

/// Number of frames that can be in flight at the same time. Every per-frame GPU object is duplicated this many times.
pub const FRAMES_IN_FLIGHT: usize = 2;

const_assert!(FRAMES_IN_FLIGHT > 0);

/// How the target resource is exposed after compilation.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum UsageMode {
    /// The target is used as a transfer source, for example to blit it into a swapchain image.
    /// Retrieve it with [`Graph::target_image()`].
    ToTransfer,
    /// The target is sampled through a descriptor set, for example to display it inside a UI.
    /// Retrieve it with [`Graph::target_descriptor_set()`].
    ToDescriptorSet,
}
