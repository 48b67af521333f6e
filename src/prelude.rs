pub use ash::vk;

pub use crate::core::app_info::*;
pub use crate::core::device::GpuDevice;
pub use crate::core::error::Error;
pub use crate::core::vulkan::VulkanDevice;

pub use crate::allocator::traits::*;
pub use crate::allocator::default_allocator;
pub use crate::allocator::default_allocator::DefaultAllocator;

pub use crate::graph::{FRAMES_IN_FLIGHT, Graph, Node, Pass, Resource, UsageMode};
pub use crate::graph::pass::{EmptyPassExecutor, PassBuilder, PassDescriptor, PassExecutor};
pub use crate::graph::resource::{ResourceDescriptor, ResourceRole, SamplerKind};
pub use crate::graph::viz::GraphViz;

pub use crate::pipeline::shader::{ShaderDirectory, ShaderLoader};

pub use crate::descriptor::static_textures::{StaticTextures, StaticTextureTable};
