//! Exposes the frame graph error type

use std::ffi::NulError;
use std::sync::PoisonError;

use ash;
use gpu_allocator::AllocationError;
use thiserror::Error;

use crate::graph::UsageMode;

/// Error type that the frame graph can return.
#[derive(Error, Debug)]
pub enum Error {
    /// Could not convert rust string to C-String because it has null bytes
    #[error("Invalid C string")]
    InvalidString(NulError),
    /// Generic Vulkan error type. Any failing object creation call ends up here.
    #[error("Vulkan error: `{0}`")]
    VkError(ash::vk::Result),
    /// Vulkan allocation error.
    #[error("Vulkan allocation error: `{0}`")]
    AllocationError(AllocationError),
    /// A dependency cycle was found while resolving or scheduling the graph.
    #[error("Graph contains cycle, cannot compile.")]
    GraphHasCycle,
    /// The resources written by one pass do not share a single extent.
    #[error("Resolution mismatch between the write resources of pass `{pass}`.")]
    ExtentMismatch {
        /// Debug name of the offending pass
        pass: String,
    },
    /// A pass renders to more than one depth resource.
    #[error("Pass `{pass}` writes more than one depth resource.")]
    MultipleDepthWrites {
        /// Debug name of the offending pass
        pass: String,
    },
    /// A pass references a resource that was never registered, or a handle from another graph was used.
    #[error("Handle `{0}` does not refer to a registered graph object.")]
    InvalidHandle(String),
    /// A target accessor was called while the graph is compiled for another usage.
    #[error("Graph usage must be `{expected:?}` for this call.")]
    UsageMismatch {
        /// The usage the accessor requires
        expected: UsageMode,
    },
    /// A reachable pass reads the uniform buffer, but no uniform size was set.
    #[error("Pass `{pass}` reads uniform, but no uniform buffer size was set.")]
    MissingUboSize {
        /// Debug name of the pass reading the uniform
        pass: String,
    },
    /// Uniform data is larger than the configured uniform buffer size.
    #[error("Uniform data of {given} bytes does not fit the {capacity} byte uniform buffer.")]
    UniformOverflow {
        /// Size of the data that was flushed
        given: usize,
        /// Configured uniform buffer size
        capacity: usize,
    },
    /// Frame index is not smaller than [`FRAMES_IN_FLIGHT`](crate::FRAMES_IN_FLIGHT).
    #[error("Frame index {0} is out of range.")]
    InvalidFrameIndex(usize),
    /// Operation requires a successfully compiled graph.
    #[error("Graph was not compiled.")]
    NotCompiled,
    /// Tried to add a vertex attribute to a vertex binding that does not exist.
    #[error("Tried to add a vertex attribute to a vertex binding that does not exist.")]
    NoVertexBinding,
    /// A vertex attribute uses a format whose size is unknown.
    #[error("Unsupported vertex attribute format `{0:?}`.")]
    UnsupportedVertexFormat(ash::vk::Format),
    /// Tried to push more textures than a static texture table can hold.
    #[error("Static texture table `{name}` is full ({capacity} textures).")]
    StaticTextureOverflow {
        /// Debug name of the table
        name: String,
        /// Capacity of the table
        capacity: u32,
    },
    /// Requested memory mapping on memory that is not host visible.
    #[error("Requested a memory map, but memory is not host visible")]
    UnmappableMemory,
    /// Poisoned mutex
    #[error("Poisoned mutex")]
    PoisonError,
    /// Uncategorized error.
    #[error("Uncategorized error: `{0}`")]
    Uncategorized(&'static str),
}

impl From<NulError> for Error {
    fn from(value: NulError) -> Self {
        Error::InvalidString(value)
    }
}

impl From<ash::vk::Result> for Error {
    fn from(value: ash::vk::Result) -> Self {
        Error::VkError(value)
    }
}

impl From<AllocationError> for Error {
    fn from(value: AllocationError) -> Self {
        Error::AllocationError(value)
    }
}

impl From<(Vec<ash::vk::Pipeline>, ash::vk::Result)> for Error {
    fn from((_, result): (Vec<ash::vk::Pipeline>, ash::vk::Result)) -> Self {
        Error::VkError(result)
    }
}

impl<T> From<PoisonError<T>> for Error {
    fn from(_: PoisonError<T>) -> Self {
        Error::PoisonError
    }
}
