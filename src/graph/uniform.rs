//! Per-frame uniform buffers shared by every pass that reads the uniform.

use std::ptr::NonNull;

use anyhow::Result;
use ash::vk;

use crate::{Error, FRAMES_IN_FLIGHT, GpuDevice, MemoryType};

#[derive(Debug)]
struct UniformSlot<M> {
    buffer: vk::Buffer,
    memory: M,
    mapped: NonNull<u8>,
    set: vk::DescriptorSet,
}

/// One host visible, persistently mapped uniform buffer per frame in flight, each with its own descriptor set.
#[derive(Debug)]
pub(crate) struct UniformBuffers<M> {
    size: usize,
    pool: vk::DescriptorPool,
    layout: vk::DescriptorSetLayout,
    slots: Vec<UniformSlot<M>>,
}

impl<M> UniformBuffers<M> {
    pub fn build<D: GpuDevice<Memory = M>>(device: &D, size: usize, name: &str) -> Result<Self> {
        let pool_size = vk::DescriptorPoolSize {
            ty: vk::DescriptorType::UNIFORM_BUFFER,
            descriptor_count: FRAMES_IN_FLIGHT as u32,
        };
        let pool_info = vk::DescriptorPoolCreateInfo::builder()
            .flags(vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET)
            .max_sets(FRAMES_IN_FLIGHT as u32)
            .pool_sizes(std::slice::from_ref(&pool_size))
            .build();
        let pool = device.create_descriptor_pool(&pool_info, &format!("{name}_ubo"))?;

        let binding = vk::DescriptorSetLayoutBinding::builder()
            .binding(0)
            .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
            .descriptor_count(1)
            .stage_flags(vk::ShaderStageFlags::ALL_GRAPHICS)
            .build();
        let layout_info = vk::DescriptorSetLayoutCreateInfo::builder()
            .bindings(std::slice::from_ref(&binding))
            .build();
        let layout = match device.create_descriptor_set_layout(&layout_info, &format!("{name}_ubo")) {
            Ok(layout) => layout,
            Err(err) => {
                device.destroy_descriptor_pool(pool);
                return Err(err);
            }
        };

        let mut uniform = Self {
            size,
            pool,
            layout,
            slots: Vec::with_capacity(FRAMES_IN_FLIGHT),
        };
        for frame in 0..FRAMES_IN_FLIGHT {
            match uniform.build_slot(device, &format!("{name}_ubo[{frame}]")) {
                Ok(slot) => uniform.slots.push(slot),
                Err(err) => {
                    uniform.free(device);
                    return Err(err);
                }
            }
        }
        debug!("Built {FRAMES_IN_FLIGHT} uniform buffers of {size} bytes");
        Ok(uniform)
    }

    fn build_slot<D: GpuDevice<Memory = M>>(&self, device: &D, name: &str) -> Result<UniformSlot<M>> {
        let info = vk::BufferCreateInfo::builder()
            .size(self.size as vk::DeviceSize)
            .usage(vk::BufferUsageFlags::UNIFORM_BUFFER)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .build();
        let (buffer, memory) = device.create_buffer(&info, MemoryType::CpuToGpu, name)?;
        let mapped = match device.map_memory(&memory) {
            Ok(mapped) => mapped,
            Err(err) => {
                device.destroy_buffer(buffer, memory);
                return Err(err);
            }
        };
        let set = match device.allocate_descriptor_set(self.pool, self.layout, name) {
            Ok(set) => set,
            Err(err) => {
                device.unmap_memory(&memory);
                device.destroy_buffer(buffer, memory);
                return Err(err);
            }
        };

        let buffer_info = vk::DescriptorBufferInfo {
            buffer,
            offset: 0,
            range: self.size as vk::DeviceSize,
        };
        let write = vk::WriteDescriptorSet::builder()
            .dst_set(set)
            .dst_binding(0)
            .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
            .buffer_info(std::slice::from_ref(&buffer_info))
            .build();
        device.update_descriptor_sets(std::slice::from_ref(&write));

        Ok(UniformSlot {
            buffer,
            memory,
            mapped,
            set,
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn layout(&self) -> vk::DescriptorSetLayout {
        self.layout
    }

    pub fn descriptor_set(&self, frame: usize) -> vk::DescriptorSet {
        self.slots[frame].set
    }

    /// Copy `bytes` into the buffer of `frame` and flush the written range. `frame` must be in range.
    pub fn flush<D: GpuDevice<Memory = M>>(&self, device: &D, bytes: &[u8], frame: usize) -> Result<()> {
        if bytes.len() > self.size {
            return Err(Error::UniformOverflow {
                given: bytes.len(),
                capacity: self.size,
            }
            .into());
        }
        let slot = &self.slots[frame];
        // SAFETY: The mapping is at least `self.size` bytes long and stays valid until the slot is freed.
        unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), slot.mapped.as_ptr(), bytes.len());
        }
        device.flush_memory(&slot.memory, bytes.len() as vk::DeviceSize)
    }

    pub fn free<D: GpuDevice<Memory = M>>(&mut self, device: &D) {
        for slot in self.slots.drain(..) {
            device.free_descriptor_set(self.pool, slot.set);
            device.unmap_memory(&slot.memory);
            device.destroy_buffer(slot.buffer, slot.memory);
        }
        device.destroy_descriptor_set_layout(self.layout);
        device.destroy_descriptor_pool(self.pool);
        debug!("Freed uniform buffers");
    }
}
