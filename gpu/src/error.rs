// Error types returned by the gpu abstraction layer
//
// Every backend funnels its errors through this one enum so that
// embedders have a single type to match against regardless of which
// backend is active.

use ash::vk;
use thiserror::Error;

#[allow(non_camel_case_types)]
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpuError {
    #[error("the requested backend is not supported on this platform")]
    INVALID_BACKEND,
    #[error("the requested dimensions are invalid (zero or exceed device limits)")]
    INVALID_DIMENSIONS,
    #[error("the requested format is not supported for this usage")]
    INVALID_FORMAT,
    #[error("the supplied stride does not match the amount of data provided")]
    INVALID_STRIDE,
    #[error("this operation is not supported by the active backend")]
    UNSUPPORTED,
    #[error("the descriptor pool chain is exhausted and growing it failed")]
    OUT_OF_POOL_MEMORY,
    #[error("the swapchain is out of date and must be recreated")]
    OUT_OF_DATE,
    #[error("the vulkan surface is not supported by the selected physical device")]
    VK_SURF_NOT_SUPPORTED,
    #[error("the vulkan device does not support all required extensions")]
    VK_NOT_ALL_EXTENSIONS_AVAILABLE,
    #[error("failed to create the swapchain")]
    COULD_NOT_CREATE_SWAPCHAIN,
    #[error("failed to create an image")]
    COULD_NOT_CREATE_IMAGE,
    #[error("failed to acquire the next swapchain image")]
    COULD_NOT_ACQUIRE_NEXT_IMAGE,
    #[error("presentation failed")]
    PRESENT_FAILED,
    #[error("the device was lost")]
    DEVICE_LOST,
    #[error("unhandled vulkan error: {0:?}")]
    VK_ERROR(vk::Result),
}

/// Maps any `vk::Result` that doesn't already have a dedicated variant
/// into the catch-all `VK_ERROR` case. Every ash call site in the Vulkan
/// backend routes its error through this one function.
pub fn map_vk_result(result: vk::Result) -> GpuError {
    match result {
        vk::Result::ERROR_DEVICE_LOST => GpuError::DEVICE_LOST,
        vk::Result::ERROR_OUT_OF_DATE_KHR => GpuError::OUT_OF_DATE,
        vk::Result::ERROR_SURFACE_LOST_KHR => GpuError::VK_SURF_NOT_SUPPORTED,
        other => GpuError::VK_ERROR(other),
    }
}

pub type Result<T> = std::result::Result<T, GpuError>;
