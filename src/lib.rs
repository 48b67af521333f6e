//! A render graph compiler and scheduler on top of Vulkan.
//!
//! Whisper graph lets you declare logical images and render passes together with what they read and write, and
//! turns that declaration into a working frame: it finds the subset that contributes to a chosen output, rejects
//! dependency cycles, orders the passes, and manages every GPU object backing them across multiple frames in flight.
//! When the output is resized, only what depends on the output extent is rebuilt.
//!
//! To get started, the easiest way is to simply
//! ```
//! // Import all important types and traits
//! use whisper_graph::prelude::*;
//! ```
//!
//! # Example
//!
//! The graph never talks to Vulkan directly, it goes through a [`GpuDevice`]. For a real device, wrap your
//! [`ash::Device`] in a [`VulkanDevice`]:
//! ```
//! use whisper_graph::prelude::*;
//!
//! # fn setup(instance: &ash::Instance, device: ash::Device, physical_device: vk::PhysicalDevice) -> anyhow::Result<()> {
//! let limits = unsafe { instance.get_physical_device_properties(physical_device) }.limits;
//! let allocator = DefaultAllocator::new(instance, &device, physical_device)?;
//! let device = VulkanDevice::new(device, allocator, &limits);
//!
//! let settings = GraphBuilder::new()
//!     .name("main")
//!     .extent(1920, 1080)
//!     .ubo_size(256)
//!     .build();
//! let mut graph = Graph::new(device, ShaderDirectory::new("shaders"), settings)?;
//! # Ok(())
//! # }
//! ```
//! For further example code, check out the following modules
//! - [`graph`] for declaring, compiling and rendering a frame graph.
//! - [`graph::pass`] for declaring passes.
//! - [`descriptor::static_textures`] for binding external texture tables to passes.
//! - [`pipeline`] for the pipeline state passes are rendered with.
//! - [`allocator`] for memory allocation.

#[macro_use]
extern crate derivative;
#[macro_use]
extern crate log;
#[macro_use]
extern crate static_assertions;

pub mod prelude;
pub use crate::prelude::*;

pub mod allocator;
pub mod core;
pub mod descriptor;
pub mod graph;
pub mod pipeline;
pub mod util;

pub(crate) mod sampler;
