// Swapchain abstraction owned by the Vulkan Context
//
// A `Swapchain` is whatever supplies per-frame images to draw into: an
// on-screen `VkSwapchainKHR` behind a window, or the headless backend
// used by tests and offscreen rendering. `Context` only ever talks to
// the trait object, never to a specific backend.
//
// Austin Shafer - 2024

pub mod headless;
pub mod onscreen;

use ash::vk;

use crate::{CreateInfo, GpuError, Result};

/// Instance-level helper for the bits that depend on whether we're
/// going on-screen or headless, queried before a `Device`/`Swapchain`
/// exists to pick at.
pub struct Display;

impl Display {
    /// Instance extensions required to create a surface for `info`, or
    /// none at all for an offscreen/headless context.
    pub(crate) fn extension_names(info: &CreateInfo) -> Vec<*const i8> {
        match info.window {
            Some(handles) => onscreen::extension_names(&handles),
            None => Vec::new(),
        }
    }
}

/// Shared per-frame state that the `Context` frame driver reads and
/// writes every frame, independent of which `Swapchain` backend is in
/// use.
pub struct DisplayState {
    /// views describing how to access the current set of images
    pub(crate) d_views: Vec<vk::ImageView>,
    pub(crate) d_images: Vec<vk::Image>,
    /// Current resolution of this output
    pub d_resolution: vk::Extent2D,
    pub d_surface_caps: vk::SurfaceCapabilitiesKHR,
    pub d_surface_format: vk::SurfaceFormatKHR,
    /// index into swapchain images that we are currently using
    pub(crate) d_current_image: u32,
    /// processes things to be physically displayed
    pub(crate) d_present_queue: vk::Queue,
    /// Frame end semaphore, signaled by the last cbuf submitted in a frame
    pub(crate) d_frame_sema: vk::Semaphore,
    /// One "image acquired" semaphore per in-flight image, plus a pool of
    /// spares so acquire can hand out a fresh one each call
    pub(crate) d_present_semas: Vec<Option<vk::Semaphore>>,
    pub(crate) d_available_present_semas: Vec<vk::Semaphore>,
}

impl DisplayState {
    pub(crate) fn new(present_queue: vk::Queue, frame_sema: vk::Semaphore) -> Self {
        Self {
            d_views: Vec::new(),
            d_images: Vec::new(),
            d_resolution: vk::Extent2D {
                width: 0,
                height: 0,
            },
            d_surface_caps: vk::SurfaceCapabilitiesKHR::default(),
            d_surface_format: vk::SurfaceFormatKHR::default(),
            d_current_image: 0,
            d_present_queue: present_queue,
            d_frame_sema: frame_sema,
            d_present_semas: Vec::new(),
            d_available_present_semas: Vec::new(),
        }
    }
}

/// Implemented by each source of per-frame images.
pub(crate) trait Swapchain {
    /// Choose a queue family able to present to this swapchain's surface
    fn select_queue_family(&self) -> Result<u32>;

    /// Get the surface capabilities and chosen format
    fn get_surface_info(&self) -> Result<(vk::SurfaceCapabilitiesKHR, vk::SurfaceFormatKHR)>;

    /// (Re)create the swapchain's images. Called once at startup and
    /// again whenever `OUT_OF_DATE`/`SUBOPTIMAL` is observed.
    fn recreate_swapchain(&mut self, dstate: &mut DisplayState) -> Result<()>;

    /// Dots per inch of the physical output, where known
    fn get_dpi(&self) -> Result<(i32, i32)>;

    /// Acquire the next image to draw into
    fn get_next_swapchain_image(&mut self, dstate: &mut DisplayState) -> Result<()>;

    /// Present the currently acquired image
    fn present(&mut self, dstate: &DisplayState) -> Result<()>;
}

pub(crate) fn map_acquire_result(result: vk::Result) -> GpuError {
    match result {
        vk::Result::ERROR_OUT_OF_DATE_KHR | vk::Result::SUBOPTIMAL_KHR => GpuError::OUT_OF_DATE,
        _ => GpuError::COULD_NOT_ACQUIRE_NEXT_IMAGE,
    }
}
