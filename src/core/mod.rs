//! The core module holds the device capability interface, its Vulkan implementation, configuration and the error type.

pub mod app_info;
pub mod device;
pub mod error;
pub mod vulkan;
