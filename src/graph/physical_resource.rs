//! GPU objects backing one resource, one set per frame in flight.

use anyhow::Result;
use ash::vk;

use crate::{FRAMES_IN_FLIGHT, GpuDevice, ResourceDescriptor};

/// Backing objects for a single frame slot.
#[derive(Debug)]
pub(crate) struct ImageSlot<M> {
    pub image: vk::Image,
    pub memory: M,
    pub view: vk::ImageView,
    /// Only present when the resource is sampled.
    pub descriptor_set: Option<vk::DescriptorSet>,
}

#[derive(Debug)]
pub(crate) struct PhysicalResource<M> {
    pub slots: Vec<ImageSlot<M>>,
    pub extent: vk::Extent2D,
}

/// Everything needed to build a resource apart from its declaration.
pub(crate) struct ResourceBuildInfo {
    pub extent: vk::Extent2D,
    pub usage: vk::ImageUsageFlags,
    pub sampler: Option<vk::Sampler>,
    pub pool: vk::DescriptorPool,
    pub layout: vk::DescriptorSetLayout,
}

impl<M> PhysicalResource<M> {
    /// Create an image, a view, and a descriptor set if `info.sampler` is set, for every frame in flight.
    /// Slots that were already built are destroyed again if a later one fails.
    pub fn build<D: GpuDevice<Memory = M>>(device: &D, descriptor: &ResourceDescriptor, info: &ResourceBuildInfo) -> Result<Self> {
        let mut resource = Self {
            slots: Vec::with_capacity(FRAMES_IN_FLIGHT),
            extent: info.extent,
        };
        for frame in 0..FRAMES_IN_FLIGHT {
            match Self::build_slot(device, descriptor, info, frame) {
                Ok(slot) => resource.slots.push(slot),
                Err(err) => {
                    resource.free(device, info.pool);
                    return Err(err);
                }
            }
        }
        debug!(
            "Built resource `{}` ({}x{}, {:?})",
            descriptor.name, info.extent.width, info.extent.height, info.usage
        );
        Ok(resource)
    }

    fn build_slot<D: GpuDevice<Memory = M>>(
        device: &D,
        descriptor: &ResourceDescriptor,
        info: &ResourceBuildInfo,
        frame: usize,
    ) -> Result<ImageSlot<M>> {
        let name = format!("{}[{frame}]", descriptor.name);
        let image_info = vk::ImageCreateInfo::builder()
            .image_type(vk::ImageType::TYPE_2D)
            .format(descriptor.format)
            .extent(vk::Extent3D {
                width: info.extent.width,
                height: info.extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(info.usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .build();
        let (image, memory) = device.create_image(&image_info, &name)?;

        let view_info = vk::ImageViewCreateInfo::builder()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(descriptor.format)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: descriptor.aspect(),
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            })
            .build();
        let view = match device.create_image_view(&view_info, &name) {
            Ok(view) => view,
            Err(err) => {
                device.destroy_image(image, memory);
                return Err(err);
            }
        };

        let descriptor_set = match info.sampler {
            Some(sampler) => match device.allocate_descriptor_set(info.pool, info.layout, &name) {
                Ok(set) => {
                    let image_info = vk::DescriptorImageInfo {
                        sampler,
                        image_view: view,
                        image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                    };
                    let write = vk::WriteDescriptorSet::builder()
                        .dst_set(set)
                        .dst_binding(0)
                        .dst_array_element(0)
                        .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                        .image_info(std::slice::from_ref(&image_info))
                        .build();
                    device.update_descriptor_sets(std::slice::from_ref(&write));
                    Some(set)
                }
                Err(err) => {
                    device.destroy_image_view(view);
                    device.destroy_image(image, memory);
                    return Err(err);
                }
            },
            None => None,
        };

        Ok(ImageSlot {
            image,
            memory,
            view,
            descriptor_set,
        })
    }

    /// Destroy every slot. Descriptor sets go back to `pool`.
    pub fn free<D: GpuDevice<Memory = M>>(&mut self, device: &D, pool: vk::DescriptorPool) {
        for slot in self.slots.drain(..) {
            if let Some(set) = slot.descriptor_set {
                device.free_descriptor_set(pool, set);
            }
            device.destroy_image_view(slot.view);
            device.destroy_image(slot.image, slot.memory);
        }
    }
}
