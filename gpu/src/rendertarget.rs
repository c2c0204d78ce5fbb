// Collection of color+depth attachments bound to a renderpass/framebuffer
//
// Austin Shafer - 2024
use ash::vk;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::device::Device;
use crate::format::Format;
use crate::texture::Texture;
use crate::{GpuError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOp {
    Load,
    Clear,
    DontCare,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOp {
    Store,
    DontCare,
}

#[derive(Debug, Clone, Copy)]
pub enum ClearValue {
    Color([f32; 4]),
    DepthStencil(f32, u32),
}

impl LoadOp {
    fn to_vk(&self) -> vk::AttachmentLoadOp {
        match self {
            LoadOp::Load => vk::AttachmentLoadOp::LOAD,
            LoadOp::Clear => vk::AttachmentLoadOp::CLEAR,
            LoadOp::DontCare => vk::AttachmentLoadOp::DONT_CARE,
        }
    }
}

impl StoreOp {
    fn to_vk(&self) -> vk::AttachmentStoreOp {
        match self {
            StoreOp::Store => vk::AttachmentStoreOp::STORE,
            StoreOp::DontCare => vk::AttachmentStoreOp::DONT_CARE,
        }
    }
}

/// One color or depth/stencil attachment in a [`Rendertarget`].
pub struct Attachment {
    pub texture: Arc<Texture>,
    pub layer: u32,
    pub resolve_target: Option<(Arc<Texture>, u32)>,
    pub load_op: LoadOp,
    pub store_op: StoreOp,
    pub clear_value: ClearValue,
}

/// The compatibility key for a rendertarget: two rendertargets sharing a
/// layout share a compatible renderpass, and pipelines built against one
/// are usable with the other.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RendertargetLayout {
    pub samples: u32,
    pub colors: Vec<(Format, bool)>,
    pub depth_stencil: Option<(Format, bool)>,
}

/// A cache from [`RendertargetLayout`] to its compatible `VkRenderPass`,
/// shared by every `Rendertarget`/`Pipeline` built against the same
/// context so layout-sharing rendertargets reuse pipelines.
pub struct RenderpassCache {
    entries: Mutex<HashMap<RendertargetLayout, vk::RenderPass>>,
}

impl RenderpassCache {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) fn get_or_create(&self, dev: &Device, layout: &RendertargetLayout) -> Result<vk::RenderPass> {
        let mut entries = self.entries.lock().unwrap();
        if let Some(rp) = entries.get(layout) {
            return Ok(*rp);
        }

        let rp = build_compatible_renderpass(dev, layout)?;
        entries.insert(layout.clone(), rp);
        Ok(rp)
    }

    pub(crate) fn destroy_all(&self, dev: &Device) {
        let mut entries = self.entries.lock().unwrap();
        for (_, rp) in entries.drain() {
            unsafe { dev.dev.destroy_render_pass(rp, None) };
        }
    }
}

fn build_compatible_renderpass(dev: &Device, layout: &RendertargetLayout) -> Result<vk::RenderPass> {
    let samples = crate::texture::samples_to_vk(layout.samples);

    let mut descs = Vec::new();
    let mut color_refs = Vec::new();
    let mut resolve_refs = Vec::new();

    for (fmt, has_resolve) in layout.colors.iter() {
        let idx = descs.len() as u32;
        descs.push(
            vk::AttachmentDescription::builder()
                .format(fmt.to_vk())
                .samples(samples)
                .load_op(vk::AttachmentLoadOp::CLEAR)
                .store_op(vk::AttachmentStoreOp::STORE)
                .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
                .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
                .initial_layout(vk::ImageLayout::UNDEFINED)
                .final_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
                .build(),
        );
        color_refs.push(
            vk::AttachmentReference::builder()
                .attachment(idx)
                .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
                .build(),
        );

        if *has_resolve {
            let ridx = descs.len() as u32;
            descs.push(
                vk::AttachmentDescription::builder()
                    .format(fmt.to_vk())
                    .samples(vk::SampleCountFlags::TYPE_1)
                    .load_op(vk::AttachmentLoadOp::DONT_CARE)
                    .store_op(vk::AttachmentStoreOp::STORE)
                    .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
                    .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
                    .initial_layout(vk::ImageLayout::UNDEFINED)
                    .final_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
                    .build(),
            );
            resolve_refs.push(
                vk::AttachmentReference::builder()
                    .attachment(ridx)
                    .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
                    .build(),
            );
        }
    }

    // Resolving a depth/stencil attachment is explicitly unsupported.
    if matches!(layout.depth_stencil, Some((_, true))) {
        return Err(GpuError::UNSUPPORTED);
    }

    let depth_ref = layout.depth_stencil.map(|(fmt, _)| {
        let idx = descs.len() as u32;
        descs.push(
            vk::AttachmentDescription::builder()
                .format(fmt.to_vk())
                .samples(samples)
                .load_op(vk::AttachmentLoadOp::CLEAR)
                .store_op(vk::AttachmentStoreOp::STORE)
                .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
                .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
                .initial_layout(vk::ImageLayout::UNDEFINED)
                .final_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)
                .build(),
        );
        vk::AttachmentReference::builder()
            .attachment(idx)
            .layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)
            .build()
    });

    let mut subpass = vk::SubpassDescription::builder()
        .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
        .color_attachments(&color_refs);
    if !resolve_refs.is_empty() {
        subpass = subpass.resolve_attachments(&resolve_refs);
    }
    let depth_ref_storage;
    if let Some(d) = &depth_ref {
        depth_ref_storage = *d;
        subpass = subpass.depth_stencil_attachment(&depth_ref_storage);
    }
    let subpass = subpass.build();

    let deps = [
        vk::SubpassDependency::builder()
            .src_subpass(vk::SUBPASS_EXTERNAL)
            .dst_subpass(0)
            .src_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
            .dst_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
            .src_access_mask(vk::AccessFlags::empty())
            .dst_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE | vk::AccessFlags::COLOR_ATTACHMENT_READ)
            .build(),
        vk::SubpassDependency::builder()
            .src_subpass(0)
            .dst_subpass(vk::SUBPASS_EXTERNAL)
            .src_stage_mask(vk::PipelineStageFlags::BOTTOM_OF_PIPE)
            .dst_stage_mask(vk::PipelineStageFlags::BOTTOM_OF_PIPE)
            .src_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE)
            .dst_access_mask(vk::AccessFlags::empty())
            .build(),
    ];

    let create_info = vk::RenderPassCreateInfo::builder()
        .attachments(&descs)
        .subpasses(std::slice::from_ref(&subpass))
        .dependencies(&deps);

    unsafe {
        dev.dev
            .create_render_pass(&create_info, None)
            .map_err(crate::error::map_vk_result)
    }
}

/// Builds a renderpass dedicated to one `Rendertarget`, honoring the real
/// load/store ops of its attachments and, for the on-screen default
/// rendertarget, a `PRESENT_SRC_KHR` final layout so
/// `vkCmdEndRenderPass` performs the presentation transition for us.
///
/// Unlike `build_compatible_renderpass`, this renderpass is never shared:
/// two rendertargets with identical load/store ops still get distinct
/// `VkRenderPass` objects, since Vulkan's renderpass-compatibility rules
/// (format/sample-count/attachment-count only) say nothing about
/// load/store ops or layouts, and those are exactly what this function
/// needs to get right.
fn build_concrete_renderpass(
    dev: &Device,
    colors: &[Attachment],
    depth: Option<&Attachment>,
    samples: u32,
    present: bool,
) -> Result<vk::RenderPass> {
    let vk_samples = crate::texture::samples_to_vk(samples);
    let color_final_layout = if present {
        vk::ImageLayout::PRESENT_SRC_KHR
    } else {
        vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL
    };

    let mut descs = Vec::new();
    let mut color_refs = Vec::new();
    let mut resolve_refs = Vec::new();

    for c in colors.iter() {
        let idx = descs.len() as u32;
        let initial_layout = match c.load_op {
            LoadOp::Load => vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            LoadOp::Clear | LoadOp::DontCare => vk::ImageLayout::UNDEFINED,
        };
        descs.push(
            vk::AttachmentDescription::builder()
                .format(c.texture.format().to_vk())
                .samples(vk_samples)
                .load_op(c.load_op.to_vk())
                .store_op(c.store_op.to_vk())
                .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
                .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
                .initial_layout(initial_layout)
                .final_layout(color_final_layout)
                .build(),
        );
        color_refs.push(
            vk::AttachmentReference::builder()
                .attachment(idx)
                .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
                .build(),
        );

        if let Some((resolve, _)) = &c.resolve_target {
            let ridx = descs.len() as u32;
            descs.push(
                vk::AttachmentDescription::builder()
                    .format(resolve.format().to_vk())
                    .samples(vk::SampleCountFlags::TYPE_1)
                    .load_op(vk::AttachmentLoadOp::DONT_CARE)
                    .store_op(vk::AttachmentStoreOp::STORE)
                    .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
                    .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
                    .initial_layout(vk::ImageLayout::UNDEFINED)
                    .final_layout(color_final_layout)
                    .build(),
            );
            resolve_refs.push(
                vk::AttachmentReference::builder()
                    .attachment(ridx)
                    .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
                    .build(),
            );
        }
    }

    if matches!(depth.and_then(|d| d.resolve_target.as_ref()), Some(_)) {
        return Err(GpuError::UNSUPPORTED);
    }

    let depth_ref = depth.map(|d| {
        let idx = descs.len() as u32;
        let initial_layout = match d.load_op {
            LoadOp::Load => vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            LoadOp::Clear | LoadOp::DontCare => vk::ImageLayout::UNDEFINED,
        };
        descs.push(
            vk::AttachmentDescription::builder()
                .format(d.texture.format().to_vk())
                .samples(vk_samples)
                .load_op(d.load_op.to_vk())
                .store_op(d.store_op.to_vk())
                .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
                .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
                .initial_layout(initial_layout)
                .final_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)
                .build(),
        );
        vk::AttachmentReference::builder()
            .attachment(idx)
            .layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)
            .build()
    });

    let mut subpass = vk::SubpassDescription::builder()
        .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
        .color_attachments(&color_refs);
    if !resolve_refs.is_empty() {
        subpass = subpass.resolve_attachments(&resolve_refs);
    }
    let depth_ref_storage;
    if let Some(d) = &depth_ref {
        depth_ref_storage = *d;
        subpass = subpass.depth_stencil_attachment(&depth_ref_storage);
    }
    let subpass = subpass.build();

    let deps = [
        vk::SubpassDependency::builder()
            .src_subpass(vk::SUBPASS_EXTERNAL)
            .dst_subpass(0)
            .src_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
            .dst_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
            .src_access_mask(vk::AccessFlags::empty())
            .dst_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE | vk::AccessFlags::COLOR_ATTACHMENT_READ)
            .build(),
        vk::SubpassDependency::builder()
            .src_subpass(0)
            .dst_subpass(vk::SUBPASS_EXTERNAL)
            .src_stage_mask(vk::PipelineStageFlags::BOTTOM_OF_PIPE)
            .dst_stage_mask(vk::PipelineStageFlags::BOTTOM_OF_PIPE)
            .src_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE)
            .dst_access_mask(vk::AccessFlags::empty())
            .build(),
    ];

    let create_info = vk::RenderPassCreateInfo::builder()
        .attachments(&descs)
        .subpasses(std::slice::from_ref(&subpass))
        .dependencies(&deps);

    unsafe {
        dev.dev
            .create_render_pass(&create_info, None)
            .map_err(crate::error::map_vk_result)
    }
}

/// An immutable descriptor of attachments bound to a compatible renderpass.
pub struct Rendertarget {
    rt_dev: Arc<Device>,
    rt_layout: RendertargetLayout,
    rt_renderpass: vk::RenderPass,
    rt_framebuffer: vk::Framebuffer,
    rt_colors: Vec<Attachment>,
    rt_depth: Option<Attachment>,
    rt_extent: vk::Extent2D,
}

impl Rendertarget {
    pub fn layout(&self) -> &RendertargetLayout {
        &self.rt_layout
    }

    pub(crate) fn renderpass(&self) -> vk::RenderPass {
        self.rt_renderpass
    }

    pub(crate) fn framebuffer(&self) -> vk::Framebuffer {
        self.rt_framebuffer
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.rt_extent
    }

    pub fn colors(&self) -> &[Attachment] {
        &self.rt_colors
    }

    pub fn depth(&self) -> Option<&Attachment> {
        self.rt_depth.as_ref()
    }

    /// `present` marks this as the on-screen default rendertarget: its
    /// renderpass's color attachment(s) get a `PRESENT_SRC_KHR` final
    /// layout so the transition the swapchain needs before `vkQueuePresentKHR`
    /// happens automatically at `vkCmdEndRenderPass`.
    pub fn new(
        dev: Arc<Device>,
        colors: Vec<Attachment>,
        depth: Option<Attachment>,
        samples: u32,
        present: bool,
    ) -> Result<Self> {
        if colors.is_empty() && depth.is_none() {
            return Err(GpuError::INVALID_DIMENSIONS);
        }

        let extent = vk::Extent2D {
            width: colors.first().map(|c| c.texture.width()).unwrap_or_else(|| depth.as_ref().unwrap().texture.width()),
            height: colors.first().map(|c| c.texture.height()).unwrap_or_else(|| depth.as_ref().unwrap().texture.height()),
        };

        // All color attachments must share width/height; the depth
        // attachment, if present, must match too.
        for c in colors.iter() {
            if c.texture.width() != extent.width || c.texture.height() != extent.height {
                return Err(GpuError::INVALID_DIMENSIONS);
            }
        }
        if let Some(d) = &depth {
            if d.texture.width() != extent.width || d.texture.height() != extent.height {
                return Err(GpuError::INVALID_DIMENSIONS);
            }
        }

        let layout = RendertargetLayout {
            samples,
            colors: colors.iter().map(|c| (c.texture.format(), c.resolve_target.is_some())).collect(),
            depth_stencil: depth.as_ref().map(|d| (d.texture.format(), d.resolve_target.is_some())),
        };

        let renderpass = build_concrete_renderpass(&dev, &colors, depth.as_ref(), samples, present)?;

        let mut views = Vec::new();
        for c in colors.iter() {
            views.push(c.texture.view());
            if let Some((resolve, _)) = &c.resolve_target {
                views.push(resolve.view());
            }
        }
        if let Some(d) = &depth {
            views.push(d.texture.view());
        }

        let fb_info = vk::FramebufferCreateInfo::builder()
            .render_pass(renderpass)
            .attachments(&views)
            .width(extent.width)
            .height(extent.height)
            .layers(1);
        let framebuffer = unsafe { dev.dev.create_framebuffer(&fb_info, None).map_err(crate::error::map_vk_result)? };

        Ok(Self {
            rt_dev: dev,
            rt_layout: layout,
            rt_renderpass: renderpass,
            rt_framebuffer: framebuffer,
            rt_colors: colors,
            rt_depth: depth,
            rt_extent: extent,
        })
    }
}

impl Drop for Rendertarget {
    fn drop(&mut self) {
        unsafe {
            self.rt_dev.dev.destroy_framebuffer(self.rt_framebuffer, None);
            self.rt_dev.dev.destroy_render_pass(self.rt_renderpass, None);
        }
    }
}
