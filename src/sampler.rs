//! The samplers owned by a graph, one per [`SamplerKind`].

use anyhow::Result;
use ash::vk;

use crate::{GpuDevice, SamplerKind};

/// Samplers shared by every sampled resource in a graph.
#[derive(Debug, Copy, Clone)]
pub(crate) struct GraphSamplers {
    depth: vk::Sampler,
    color_clamped: vk::Sampler,
    color_repeated: vk::Sampler,
}

/// Settings shared by all graph samplers:
/// - `LINEAR` min/mag filters and mipmap mode
/// - `0.0` mip lod bias
/// - Anisotropic filtering off
/// - Min mipmap level `0`, unbounded max mipmap level
/// - Normalized coordinates
fn sampler_info(address_mode: vk::SamplerAddressMode, compare: bool) -> vk::SamplerCreateInfo {
    vk::SamplerCreateInfo::builder()
        .mag_filter(vk::Filter::LINEAR)
        .min_filter(vk::Filter::LINEAR)
        .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
        .address_mode_u(address_mode)
        .address_mode_v(address_mode)
        .address_mode_w(address_mode)
        .mip_lod_bias(0.0)
        .anisotropy_enable(false)
        .max_anisotropy(1.0)
        .compare_enable(compare)
        .compare_op(if compare {
            vk::CompareOp::LESS
        } else {
            vk::CompareOp::ALWAYS
        })
        .min_lod(0.0)
        .max_lod(vk::LOD_CLAMP_NONE)
        .border_color(vk::BorderColor::FLOAT_OPAQUE_WHITE)
        .unnormalized_coordinates(false)
        .build()
}

impl GraphSamplers {
    pub fn new<D: GpuDevice>(device: &D, name: &str) -> Result<Self> {
        let depth = device.create_sampler(
            &sampler_info(vk::SamplerAddressMode::CLAMP_TO_EDGE, true),
            &format!("{name}_depth_sampler"),
        )?;
        let color_clamped = match device.create_sampler(
            &sampler_info(vk::SamplerAddressMode::CLAMP_TO_EDGE, false),
            &format!("{name}_color_clamped_sampler"),
        ) {
            Ok(sampler) => sampler,
            Err(err) => {
                device.destroy_sampler(depth);
                return Err(err);
            }
        };
        let color_repeated = match device.create_sampler(
            &sampler_info(vk::SamplerAddressMode::REPEAT, false),
            &format!("{name}_color_repeated_sampler"),
        ) {
            Ok(sampler) => sampler,
            Err(err) => {
                device.destroy_sampler(color_clamped);
                device.destroy_sampler(depth);
                return Err(err);
            }
        };
        Ok(Self {
            depth,
            color_clamped,
            color_repeated,
        })
    }

    pub fn get(&self, kind: SamplerKind) -> vk::Sampler {
        match kind {
            SamplerKind::Depth => self.depth,
            SamplerKind::ColorClamped => self.color_clamped,
            SamplerKind::ColorRepeated => self.color_repeated,
        }
    }

    pub fn destroy<D: GpuDevice>(&self, device: &D) {
        device.destroy_sampler(self.depth);
        device.destroy_sampler(self.color_clamped);
        device.destroy_sampler(self.color_repeated);
    }
}
