use std::mem::size_of;

use ash::vk;

/// Size in bytes of one element of a vertex attribute format.
pub trait ByteSize {
    /// Returns `None` for formats that are not supported as vertex attributes.
    fn byte_size(&self) -> Option<u32>;
}

impl ByteSize for vk::Format {
    fn byte_size(&self) -> Option<u32> {
        let size = match *self {
            vk::Format::R32_SFLOAT | vk::Format::R32_UINT | vk::Format::R32_SINT => size_of::<f32>(),
            vk::Format::R32G32_SFLOAT | vk::Format::R32G32_UINT | vk::Format::R32G32_SINT => 2 * size_of::<f32>(),
            vk::Format::R32G32B32_SFLOAT | vk::Format::R32G32B32_UINT | vk::Format::R32G32B32_SINT => 3 * size_of::<f32>(),
            vk::Format::R32G32B32A32_SFLOAT | vk::Format::R32G32B32A32_UINT | vk::Format::R32G32B32A32_SINT => 4 * size_of::<f32>(),
            vk::Format::R16G16_SFLOAT => 4,
            vk::Format::R16G16B16A16_SFLOAT => 8,
            vk::Format::R8_UNORM => 1,
            vk::Format::R8G8_UNORM => 2,
            vk::Format::R8G8B8_UNORM => 3,
            vk::Format::R8G8B8A8_UNORM | vk::Format::R8G8B8A8_UINT => 4,
            _ => return None,
        };
        Some(size as u32)
    }
}
