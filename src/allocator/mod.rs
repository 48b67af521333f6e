//! The allocator module backs graph images and uniform buffers with device memory.
//! <br>
//! <br>
//! # Allocator traits
//! These are defined in [`traits`], and can be implemented to supply a custom allocator type to
//! [`VulkanDevice`](crate::VulkanDevice).
//! # Default allocator
//! A default allocator based on the `gpu_allocator` crate is implemented in [`default_allocator`].
//! [`VulkanDevice`](crate::VulkanDevice) defaults to this allocator.

pub mod traits;
pub mod default_allocator;
