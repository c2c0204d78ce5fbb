/// On-screen Swapchain backend
///
/// Surface creation is generic over `raw-window-handle` rather than
/// tied to a specific windowing system; embedders hand us their
/// window/display handles and we create the matching `VkSurfaceKHR`
/// for whichever platform those handles describe.
///
/// Austin Shafer - 2024
use ash::extensions::khr;
use ash::vk;
use ash::Entry;
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};

use super::{map_acquire_result, DisplayState, Swapchain};
use crate::config::WindowHandles;
use crate::device::Device;
use crate::{CreateInfo, GpuError, Result};

use std::str::FromStr;
use std::sync::Arc;

/// Returns the instance extensions needed to create a surface for
/// `handles` on this platform.
pub(crate) fn extension_names(handles: &WindowHandles) -> Vec<*const i8> {
    let mut names = vec![khr::Surface::name().as_ptr()];

    match handles.display {
        #[cfg(target_os = "linux")]
        RawDisplayHandle::Xlib(_) => names.push(khr::XlibSurface::name().as_ptr()),
        #[cfg(target_os = "linux")]
        RawDisplayHandle::Wayland(_) => names.push(khr::WaylandSurface::name().as_ptr()),
        #[cfg(target_os = "windows")]
        RawDisplayHandle::Windows(_) => names.push(khr::Win32Surface::name().as_ptr()),
        _ => {}
    }

    names
}

unsafe fn create_surface(
    entry: &Entry,
    inst: &ash::Instance,
    handles: &WindowHandles,
) -> std::result::Result<vk::SurfaceKHR, vk::Result> {
    match (handles.window, handles.display) {
        #[cfg(target_os = "linux")]
        (RawWindowHandle::Xlib(window), RawDisplayHandle::Xlib(display)) => {
            let loader = khr::XlibSurface::new(entry, inst);
            let info = vk::XlibSurfaceCreateInfoKHR::builder()
                .dpy(display.display as *mut _)
                .window(window.window);
            loader.create_xlib_surface(&info, None)
        }
        #[cfg(target_os = "linux")]
        (RawWindowHandle::Wayland(window), RawDisplayHandle::Wayland(display)) => {
            let loader = khr::WaylandSurface::new(entry, inst);
            let info = vk::WaylandSurfaceCreateInfoKHR::builder()
                .display(display.display)
                .surface(window.surface);
            loader.create_wayland_surface(&info, None)
        }
        #[cfg(target_os = "windows")]
        (RawWindowHandle::Win32(window), _) => {
            let loader = khr::Win32Surface::new(entry, inst);
            let info = vk::Win32SurfaceCreateInfoKHR::builder()
                .hinstance(window.hinstance)
                .hwnd(window.hwnd);
            loader.create_win32_surface(&info, None)
        }
        _ => Err(vk::Result::ERROR_EXTENSION_NOT_PRESENT),
    }
}

pub(crate) struct OnscreenSwapchain {
    d_dev: Arc<Device>,
    pub d_surface: vk::SurfaceKHR,
    d_surface_loader: khr::Surface,
    pub d_present_mode: vk::PresentModeKHR,
    pub(crate) d_swapchain_loader: khr::Swapchain,
    pub(crate) d_swapchain: vk::SwapchainKHR,
}

impl OnscreenSwapchain {
    pub fn new(info: &CreateInfo, dev: Arc<Device>, handles: &WindowHandles) -> Result<Self> {
        unsafe {
            let entry = &dev.inst.loader;
            let inst = &dev.inst.inst;
            let surface_loader = khr::Surface::new(entry, inst);

            let surface = create_surface(entry, inst, handles)
                .map_err(crate::error::map_vk_result)?;

            let present_modes = surface_loader
                .get_physical_device_surface_present_modes(dev.pdev, surface)
                .map_err(crate::error::map_vk_result)?;
            let mode = present_modes
                .iter()
                .cloned()
                .find(|&m| m == vk::PresentModeKHR::MAILBOX)
                .unwrap_or(vk::PresentModeKHR::FIFO);

            let swapchain_loader = khr::Swapchain::new(inst, &dev.dev);

            let _ = info;
            Ok(Self {
                d_dev: dev,
                d_surface: surface,
                d_surface_loader: surface_loader,
                d_present_mode: mode,
                d_swapchain_loader: swapchain_loader,
                d_swapchain: vk::SwapchainKHR::null(),
            })
        }
    }

    fn select_surface_format(&self) -> Result<vk::SurfaceFormatKHR> {
        let formats = unsafe {
            self.d_surface_loader
                .get_physical_device_surface_formats(self.d_dev.pdev, self.d_surface)
                .map_err(crate::error::map_vk_result)?
        };

        formats
            .iter()
            .find(|fmt| fmt.format == vk::Format::B8G8R8A8_UNORM)
            .copied()
            .ok_or(GpuError::INVALID_FORMAT)
    }

    fn select_images_and_views(&mut self, dstate: &mut DisplayState) -> Result<()> {
        let images = unsafe {
            self.d_swapchain_loader
                .get_swapchain_images(self.d_swapchain)
                .map_err(crate::error::map_vk_result)?
        };

        let mut views = Vec::new();
        for image in images.iter() {
            let create_info = vk::ImageViewCreateInfo::builder()
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(dstate.d_surface_format.format)
                .subresource_range(vk::ImageSubresourceRange {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    base_mip_level: 0,
                    level_count: 1,
                    base_array_layer: 0,
                    layer_count: 1,
                })
                .image(*image);

            unsafe {
                views.push(
                    self.d_dev
                        .dev
                        .create_image_view(&create_info, None)
                        .map_err(crate::error::map_vk_result)?,
                );
            }
        }

        dstate.d_images = images;
        dstate.d_views = views;
        Ok(())
    }

    fn destroy_swapchain(&mut self) {
        unsafe {
            self.d_swapchain_loader
                .destroy_swapchain(self.d_swapchain, None);
            self.d_swapchain = vk::SwapchainKHR::null();
        }
    }

    fn create_swapchain(&mut self, dstate: &mut DisplayState) -> Result<()> {
        let mut desired_image_count = 2;
        if desired_image_count < dstate.d_surface_caps.min_image_count {
            desired_image_count = dstate.d_surface_caps.min_image_count;
        }

        let transform = if dstate
            .d_surface_caps
            .supported_transforms
            .contains(vk::SurfaceTransformFlagsKHR::IDENTITY)
        {
            vk::SurfaceTransformFlagsKHR::IDENTITY
        } else {
            dstate.d_surface_caps.current_transform
        };

        let create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(self.d_surface)
            .min_image_count(desired_image_count)
            .image_color_space(dstate.d_surface_format.color_space)
            .image_format(dstate.d_surface_format.format)
            .image_extent(dstate.d_resolution)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(self.d_present_mode)
            .clipped(true)
            .image_array_layers(1)
            .old_swapchain(self.d_swapchain)
            .build();

        let new_swapchain = unsafe {
            self.d_swapchain_loader
                .create_swapchain(&create_info, None)
                .or(Err(GpuError::COULD_NOT_CREATE_SWAPCHAIN))?
        };

        self.destroy_swapchain();
        self.d_swapchain = new_swapchain;
        Ok(())
    }
}

impl Swapchain for OnscreenSwapchain {
    fn select_queue_family(&self) -> Result<u32> {
        let inst = &self.d_dev.inst.inst;

        unsafe { inst.get_physical_device_queue_family_properties(self.d_dev.pdev) }
            .iter()
            .enumerate()
            .filter_map(|(index, info)| {
                let supported = unsafe {
                    self.d_surface_loader
                        .get_physical_device_surface_support(self.d_dev.pdev, index as u32, self.d_surface)
                        .unwrap_or(false)
                };
                match info.queue_flags.contains(vk::QueueFlags::GRAPHICS) && supported {
                    true => Some(index as u32),
                    false => None,
                }
            })
            .nth(0)
            .ok_or(GpuError::VK_SURF_NOT_SUPPORTED)
    }

    fn get_surface_info(&self) -> Result<(vk::SurfaceCapabilitiesKHR, vk::SurfaceFormatKHR)> {
        let caps = unsafe {
            self.d_surface_loader
                .get_physical_device_surface_capabilities(self.d_dev.pdev, self.d_surface)
                .map_err(crate::error::map_vk_result)?
        };
        let format = self.select_surface_format()?;
        Ok((caps, format))
    }

    fn recreate_swapchain(&mut self, dstate: &mut DisplayState) -> Result<()> {
        unsafe { self.d_dev.dev.device_wait_idle().ok() };

        let caps = unsafe {
            self.d_surface_loader
                .get_physical_device_surface_capabilities(self.d_dev.pdev, self.d_surface)
                .map_err(crate::error::map_vk_result)?
        };
        dstate.d_resolution = caps.current_extent;

        self.create_swapchain(dstate)?;
        self.select_images_and_views(dstate)
    }

    fn get_dpi(&self) -> Result<(i32, i32)> {
        if let Ok(env) = std::env::var("NOPE_GPU_DPI") {
            let val: i32 =
                i32::from_str(env.as_str()).expect("NOPE_GPU_DPI must be a valid integer");
            return Ok((val, val));
        }

        Ok((96, 96))
    }

    fn get_next_swapchain_image(&mut self, dstate: &mut DisplayState) -> Result<()> {
        let present_sema = dstate
            .d_available_present_semas
            .pop()
            .expect("no spare present semaphore available");

        loop {
            match unsafe {
                self.d_swapchain_loader.acquire_next_image(
                    self.d_swapchain,
                    u64::MAX,
                    present_sema,
                    vk::Fence::null(),
                )
            } {
                Ok((index, _)) => {
                    dstate.d_current_image = index;
                    if let Some(sema) = dstate.d_present_semas[index as usize].take() {
                        dstate.d_available_present_semas.push(sema);
                    }
                    dstate.d_present_semas[index as usize] = Some(present_sema);
                    return Ok(());
                }
                Err(vk::Result::NOT_READY) | Err(vk::Result::TIMEOUT) => continue,
                Err(e) => {
                    dstate.d_available_present_semas.push(present_sema);
                    return Err(map_acquire_result(e));
                }
            }
        }
    }

    fn present(&mut self, dstate: &DisplayState) -> Result<()> {
        let wait_semas = &[dstate.d_frame_sema];
        let swapchains = [self.d_swapchain];
        let indices = [dstate.d_current_image];
        let info = vk::PresentInfoKHR::builder()
            .wait_semaphores(wait_semas)
            .swapchains(&swapchains)
            .image_indices(&indices);

        unsafe {
            match self
                .d_swapchain_loader
                .queue_present(dstate.d_present_queue, &info)
            {
                Ok(_) => Ok(()),
                Err(vk::Result::ERROR_OUT_OF_DATE_KHR) | Err(vk::Result::SUBOPTIMAL_KHR) => {
                    Err(GpuError::OUT_OF_DATE)
                }
                Err(_) => Err(GpuError::PRESENT_FAILED),
            }
        }
    }
}

impl Drop for OnscreenSwapchain {
    fn drop(&mut self) {
        unsafe {
            self.d_dev.dev.device_wait_idle().ok();
            self.destroy_swapchain();
            self.d_surface_loader.destroy_surface(self.d_surface, None);
        }
    }
}
