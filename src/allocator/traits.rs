use std::ffi::c_void;
use std::ptr::NonNull;

use anyhow::Result;
use ash::vk;

/// Where an allocation should live.
///
/// Graph images always live in [`MemoryType::GpuOnly`] memory, uniform buffers in [`MemoryType::CpuToGpu`] memory.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum MemoryType {
    GpuOnly,
    /// Host visible, rewritten every frame.
    CpuToGpu,
}

impl From<MemoryType> for gpu_allocator::MemoryLocation {
    fn from(value: MemoryType) -> Self {
        match value {
            MemoryType::GpuOnly => gpu_allocator::MemoryLocation::GpuOnly,
            MemoryType::CpuToGpu => gpu_allocator::MemoryLocation::CpuToGpu,
        }
    }
}

/// A device memory allocator. Cloning must yield a handle to the same allocator.
pub trait Allocator: Clone + Send + Sync {
    type Allocation: Allocation;

    fn allocate(&mut self, name: &str, requirements: &vk::MemoryRequirements, ty: MemoryType) -> Result<Self::Allocation>;
    fn free(&mut self, allocation: Self::Allocation) -> Result<()>;
}

/// A region of device memory returned by an [`Allocator`].
pub trait Allocation: Default {
    /// # Safety
    /// The caller must not free the returned memory, and must only access it in the range
    /// `offset()..offset() + size()`.
    unsafe fn memory(&self) -> vk::DeviceMemory;
    fn offset(&self) -> vk::DeviceSize;
    fn size(&self) -> vk::DeviceSize;
    /// Pointer into the allocation's memory, or `None` if it is not host visible.
    fn mapped_ptr(&self) -> Option<NonNull<c_void>>;
}
