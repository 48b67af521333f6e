//! Static texture tables: long-lived descriptor sets owned outside of the graph.
//!
//! A pass can bind one static texture set in addition to the sets the graph manages. It is bound last, after the uniform
//! set and the sets of the resources the pass reads. The graph only needs the layout and the set itself, see [`StaticTextures`].
//!
//! [`StaticTextureTable`] is a ready to use implementation: a single arrayed `COMBINED_IMAGE_SAMPLER` binding that is filled
//! front to back, with every unused element pointing at a fallback texture.
//!
//! # Example
//! ```
//! # use std::sync::Arc;
//! # use whisper_graph::prelude::*;
//! # fn declare<D: GpuDevice + Clone + 'static, S: ShaderLoader>(
//! #     graph: &mut Graph<D, S>,
//! #     fallback: vk::ImageView,
//! #     albedo: vk::ImageView,
//! # ) -> anyhow::Result<()> {
//! let sampler = graph.sampler(SamplerKind::ColorRepeated);
//! let texture = |view| vk::DescriptorImageInfo {
//!     sampler,
//!     image_view: view,
//!     image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
//! };
//! let table = StaticTextureTable::new(graph.device().clone(), 64, texture(fallback), "materials")?;
//! // In GLSL: layout(set = X, binding = 0) uniform sampler2D textures[64];
//! let first = table.push(&[texture(albedo)])?;
//! assert_eq!(first, 0);
//! let table = Arc::new(table);
//! graph.new_pass(PassBuilder::new("forward").static_textures(table).build());
//! # Ok(())
//! # }
//! ```

use std::cell::Cell;

use anyhow::Result;
use ash::vk;

use crate::{Error, GpuDevice};

/// An externally owned descriptor set that a pass binds after all graph managed sets.
pub trait StaticTextures {
    fn descriptor_set_layout(&self) -> vk::DescriptorSetLayout;
    fn descriptor_set(&self) -> vk::DescriptorSet;
}

/// A fixed size array of combined image samplers in a single descriptor set.
/// Objects are destroyed when the table is dropped.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct StaticTextureTable<D: GpuDevice> {
    #[derivative(Debug = "ignore")]
    device: D,
    name: String,
    capacity: u32,
    len: Cell<u32>,
    #[derivative(Debug = "ignore")]
    fallback: vk::DescriptorImageInfo,
    pool: vk::DescriptorPool,
    layout: vk::DescriptorSetLayout,
    set: vk::DescriptorSet,
}

impl<D: GpuDevice> StaticTextureTable<D> {
    /// Create a table with room for `capacity` textures. Every element starts out as `fallback`.
    pub fn new(device: D, capacity: u32, fallback: vk::DescriptorImageInfo, name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let pool_size = vk::DescriptorPoolSize {
            ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            descriptor_count: capacity,
        };
        let pool_info = vk::DescriptorPoolCreateInfo::builder()
            .flags(vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET)
            .max_sets(1)
            .pool_sizes(std::slice::from_ref(&pool_size))
            .build();
        let pool = device.create_descriptor_pool(&pool_info, &format!("{name}_pool"))?;

        let binding = vk::DescriptorSetLayoutBinding::builder()
            .binding(0)
            .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .descriptor_count(capacity)
            .stage_flags(vk::ShaderStageFlags::ALL_GRAPHICS)
            .build();
        let layout_info = vk::DescriptorSetLayoutCreateInfo::builder()
            .bindings(std::slice::from_ref(&binding))
            .build();
        let layout = match device.create_descriptor_set_layout(&layout_info, &format!("{name}_layout")) {
            Ok(layout) => layout,
            Err(err) => {
                device.destroy_descriptor_pool(pool);
                return Err(err);
            }
        };
        let set = match device.allocate_descriptor_set(pool, layout, &format!("{name}_set")) {
            Ok(set) => set,
            Err(err) => {
                device.destroy_descriptor_set_layout(layout);
                device.destroy_descriptor_pool(pool);
                return Err(err);
            }
        };

        let table = Self {
            device,
            name,
            capacity,
            len: Cell::new(0),
            fallback,
            pool,
            layout,
            set,
        };
        table.clear();
        debug!("Built static texture table `{}` with {capacity} slots", table.name);
        Ok(table)
    }

    /// Write `textures` to the next free elements and return the index of the first one.
    /// # Errors
    /// * [`Error::StaticTextureOverflow`] if the textures do not fit. Nothing is written in that case.
    pub fn push(&self, textures: &[vk::DescriptorImageInfo]) -> Result<u32> {
        let first = self.len.get();
        let count = textures.len() as u64;
        if first as u64 + count > self.capacity as u64 {
            return Err(Error::StaticTextureOverflow {
                name: self.name.clone(),
                capacity: self.capacity,
            }
            .into());
        }
        if !textures.is_empty() {
            self.write(first, textures);
            self.len.set(first + textures.len() as u32);
        }
        Ok(first)
    }

    /// Point every element back at the fallback texture.
    pub fn clear(&self) {
        if self.capacity > 0 {
            let fallback = vec![self.fallback; self.capacity as usize];
            self.write(0, &fallback);
        }
        self.len.set(0);
    }

    fn write(&self, first: u32, textures: &[vk::DescriptorImageInfo]) {
        let write = vk::WriteDescriptorSet::builder()
            .dst_set(self.set)
            .dst_binding(0)
            .dst_array_element(first)
            .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .image_info(textures)
            .build();
        self.device.update_descriptor_sets(std::slice::from_ref(&write));
    }

    /// Number of textures pushed since the last clear.
    pub fn len(&self) -> u32 {
        self.len.get()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Destroy the table now instead of when it is dropped.
    pub fn destroy(self) {}
}

impl<D: GpuDevice> StaticTextures for StaticTextureTable<D> {
    fn descriptor_set_layout(&self) -> vk::DescriptorSetLayout {
        self.layout
    }

    fn descriptor_set(&self) -> vk::DescriptorSet {
        self.set
    }
}

impl<D: GpuDevice> Drop for StaticTextureTable<D> {
    fn drop(&mut self) {
        self.device.free_descriptor_set(self.pool, self.set);
        self.device.destroy_descriptor_set_layout(self.layout);
        self.device.destroy_descriptor_pool(self.pool);
        debug!("Freed static texture table `{}`", self.name);
    }
}
