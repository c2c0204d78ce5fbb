/// Headless Swapchain backend
///
/// Used for offscreen rendering and as the target for tests, since none
/// of them require an on-screen surface. Defaults to a 640x480 surface.
///
/// Austin Shafer - 2024
use ash::vk;

use super::{DisplayState, Swapchain};
use crate::device::Device;
use crate::{GpuError, Result};

use std::sync::Arc;

const WIDTH: u32 = 640;
const HEIGHT: u32 = 480;

pub struct HeadlessSwapchain {
    h_dev: Arc<Device>,
    /// Copy of our images that we have allocated, so we can free them
    h_images: Vec<vk::Image>,
    h_image_mems: Vec<vk::DeviceMemory>,
}

impl HeadlessSwapchain {
    fn destroy_swapchain(&mut self) {
        unsafe {
            for image in self.h_images.drain(..) {
                self.h_dev.dev.destroy_image(image, None);
            }
            for mem in self.h_image_mems.drain(..) {
                self.h_dev.dev.free_memory(mem, None);
            }
        }
    }

    fn create_swapchain(&mut self, dstate: &mut DisplayState) {
        assert!(dstate.d_images.len() == 0);
        assert!(dstate.d_views.len() == 0);
        assert!(self.h_image_mems.len() == 0);

        let resolution = vk::Extent2D {
            width: WIDTH,
            height: HEIGHT,
        };

        for _ in 0..2 {
            let (image, view, mem) = self.h_dev.create_image(
                &resolution,
                vk::Format::B8G8R8A8_UNORM,
                vk::ImageUsageFlags::TRANSFER_SRC | vk::ImageUsageFlags::COLOR_ATTACHMENT,
                vk::ImageAspectFlags::COLOR,
                vk::MemoryPropertyFlags::DEVICE_LOCAL
                    | vk::MemoryPropertyFlags::HOST_COHERENT
                    | vk::MemoryPropertyFlags::HOST_VISIBLE,
                vk::ImageTiling::LINEAR,
            );

            dstate.d_images.push(image);
            self.h_images.push(image);
            dstate.d_views.push(view);
            self.h_image_mems.push(mem);
        }

        dstate.d_resolution = resolution;
    }

    pub fn new(dev: Arc<Device>) -> Result<Self> {
        Ok(Self {
            h_dev: dev,
            h_images: Vec::new(),
            h_image_mems: Vec::new(),
        })
    }
}

impl Swapchain for HeadlessSwapchain {
    fn select_queue_family(&self) -> Result<u32> {
        let inst = &self.h_dev.inst.inst;

        unsafe { inst.get_physical_device_queue_family_properties(self.h_dev.pdev) }
            .iter()
            .enumerate()
            .filter_map(|(index, info)| match info.queue_flags.contains(vk::QueueFlags::GRAPHICS) {
                true => Some(index as u32),
                false => None,
            })
            .nth(0)
            .ok_or(GpuError::VK_SURF_NOT_SUPPORTED)
    }

    fn get_surface_info(&self) -> Result<(vk::SurfaceCapabilitiesKHR, vk::SurfaceFormatKHR)> {
        let extent = vk::Extent2D {
            width: WIDTH,
            height: HEIGHT,
        };

        Ok((
            vk::SurfaceCapabilitiesKHR::builder()
                .min_image_count(2)
                .max_image_count(2)
                .current_extent(extent)
                .min_image_extent(extent)
                .max_image_extent(extent)
                .max_image_array_layers(1)
                .build(),
            vk::SurfaceFormatKHR::builder()
                .format(vk::Format::B8G8R8A8_UNORM)
                .color_space(vk::ColorSpaceKHR::SRGB_NONLINEAR)
                .build(),
        ))
    }

    fn recreate_swapchain(&mut self, dstate: &mut DisplayState) -> Result<()> {
        self.destroy_swapchain();
        self.create_swapchain(dstate);
        Ok(())
    }

    fn get_dpi(&self) -> Result<(i32, i32)> {
        // Default to 100, lower end of average DPI
        Ok((100, 100))
    }

    fn get_next_swapchain_image(&mut self, dstate: &mut DisplayState) -> Result<()> {
        // simply bump the image number
        dstate.d_current_image += 1;
        if dstate.d_current_image >= self.h_images.len() as u32 {
            dstate.d_current_image = 0;
        }

        Ok(())
    }

    fn present(&mut self, _dstate: &DisplayState) -> Result<()> {
        // no-op here, nothing to present
        Ok(())
    }
}

impl Drop for HeadlessSwapchain {
    fn drop(&mut self) {
        self.destroy_swapchain();
    }
}
