// GpuContext: the per-process frame driver. Owns the device, swapchain
// (if on-screen), per-frame command buffer slots, the dummy texture, the
// renderpass cache, and the default rendertargets.
//
// Austin Shafer - 2024
use ash::vk;

extern crate utils as cat5_utils;
use cat5_utils::log;

use std::sync::Arc;

use crate::bindgroup::{BindGroup, BindGroupLayout};
use crate::buffer::{Buffer, BufferUsage};
use crate::command_buffer::CommandBuffer;
use crate::config::{Backend, CreateInfo, WindowHandles};
use crate::device::Device;
use crate::display::headless::HeadlessSwapchain;
use crate::display::onscreen::OnscreenSwapchain;
use crate::display::{DisplayState, Swapchain};
use crate::dummy_texture::DummyTexture;
use crate::format::Format;
use crate::instance::Instance;
use crate::limits::{Features, Limits};
use crate::pass::{self, PassDriver, PassEntry, PassNode};
use crate::pipeline::Pipeline;
use crate::program::Program;
use crate::rendertarget::{Attachment, ClearValue, LoadOp, Rendertarget, RenderpassCache, StoreOp};
use crate::rnode::Rnode;
use crate::texture::{Texture, TextureParams, TextureType, TextureUsage};
use crate::{GpuError, Result};

const NB_IN_FLIGHT_FRAMES: usize = 2;

/// One (update, draw) command-buffer pair, plus the semaphore used to
/// hand off from the update submission to the draw submission.
struct FrameSlot {
    update_cbuf: CommandBuffer,
    draw_cbuf: CommandBuffer,
    update_finished_sema: vk::Semaphore,
}

impl FrameSlot {
    fn new(dev: Arc<Device>, queue_family: u32) -> Self {
        let sema_info = vk::SemaphoreCreateInfo::builder();
        let sema = unsafe { dev.dev.create_semaphore(&sema_info, None).expect("Could not create semaphore") };

        Self {
            update_cbuf: CommandBuffer::new(dev.clone(), queue_family),
            draw_cbuf: CommandBuffer::new(dev, queue_family),
            update_finished_sema: sema,
        }
    }
}

/// Which variant of the default rendertarget a caller wants: the first
/// entry into it this frame (clears), or a resumption after an
/// interruption (loads prior contents).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadVariant {
    Clear,
    Load,
}

/// A `GpuContext` backed by the Vulkan backend.
pub struct VulkanContext {
    pub(crate) dev: Arc<Device>,
    inst: Arc<Instance>,
    info: CreateInfo,
    queue_family: u32,
    queue: vk::Queue,

    swapchain: Option<Box<dyn Swapchain>>,
    dstate: DisplayState,

    frames: Vec<FrameSlot>,
    frame_index: usize,

    rp_cache: Arc<RenderpassCache>,
    dummy: Arc<DummyTexture>,
    pass_driver: PassDriver,

    color_textures: Vec<Arc<Texture>>,
    depth_texture: Option<Arc<Texture>>,
    rt_clear: Option<Rendertarget>,
    rt_load: Option<Rendertarget>,

    limits: Limits,
    features: Features,

    current_pipeline: Option<Arc<Pipeline>>,
    resize_pending: Option<(u32, u32)>,

    /// Lazily allocated the first time `end_draw` needs to service a
    /// capture-buffer readback; sized to the default color texture.
    capture_readback: Option<Buffer>,

    query_pool: Option<vk::QueryPool>,
    timestamp_period: f32,
}

impl VulkanContext {
    /// `create` + `init` collapsed into one call: validates the config,
    /// brings up the device/swapchain/frame slots, and reports the
    /// negotiated `Limits`/`Features`.
    pub fn new(info: CreateInfo) -> Result<Self> {
        if !info.is_offscreen() && info.capture_buffer.is_some() {
            return Err(GpuError::UNSUPPORTED);
        }
        let (w, h) = info.dims();
        if w == 0 || h == 0 {
            return Err(GpuError::INVALID_DIMENSIONS);
        }
        if info.backend() != Backend::Vulkan {
            return Err(GpuError::INVALID_BACKEND);
        }

        let inst = Arc::new(Instance::new(&info));
        let dev = Arc::new(Device::new(inst.clone(), &info)?);

        let mut swapchain: Box<dyn Swapchain> = match info.window {
            Some(handles) => Box::new(OnscreenSwapchain::new(&info, dev.clone(), &handles)?),
            None => Box::new(HeadlessSwapchain::new(dev.clone())?),
        };

        let queue_family = swapchain.select_queue_family()?;
        dev.register_graphics_queue_family(queue_family);
        let queue = unsafe { dev.dev.get_device_queue(queue_family, 0) };

        let frame_sema_info = vk::SemaphoreCreateInfo::builder();
        let frame_sema = unsafe { dev.dev.create_semaphore(&frame_sema_info, None).expect("Could not create semaphore") };
        let mut dstate = DisplayState::new(queue, frame_sema);

        let (caps, format) = swapchain.get_surface_info()?;
        dstate.d_surface_caps = caps;
        dstate.d_surface_format = format;

        swapchain.recreate_swapchain(&mut dstate)?;
        sync_present_semaphores(&dev, &mut dstate);

        let frames = (0..NB_IN_FLIGHT_FRAMES)
            .map(|_| FrameSlot::new(dev.clone(), queue_family))
            .collect();

        let rp_cache = Arc::new(RenderpassCache::new());
        let dummy = Arc::new(DummyTexture::new(dev.clone())?);
        let pass_driver = PassDriver::new(dev.clone());

        let limits = Limits::default();
        let features = Features::COMPUTE | Features::INSTANCED_DRAW | Features::TEXTURE_NPOT;

        let mut ctx = Self {
            dev,
            inst,
            info,
            queue_family,
            queue,
            swapchain: Some(swapchain),
            dstate,
            frames,
            frame_index: 0,
            rp_cache,
            dummy,
            pass_driver,
            color_textures: Vec::new(),
            depth_texture: None,
            rt_clear: None,
            rt_load: None,
            limits,
            features,
            current_pipeline: None,
            resize_pending: None,
            capture_readback: None,
            query_pool: None,
            timestamp_period: 1.0,
        };

        ctx.rebuild_default_rendertargets()?;
        if ctx.info.hud {
            ctx.create_query_pool();
        }

        Ok(ctx)
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    pub fn features(&self) -> Features {
        self.features
    }

    pub fn dummy_texture(&self) -> &Arc<DummyTexture> {
        &self.dummy
    }

    pub fn renderpass_cache(&self) -> &Arc<RenderpassCache> {
        &self.rp_cache
    }

    fn create_query_pool(&mut self) {
        let info = vk::QueryPoolCreateInfo::builder()
            .query_type(vk::QueryType::TIMESTAMP)
            .query_count(2);
        let pool = unsafe { self.dev.dev.create_query_pool(&info, None).expect("Could not create query pool") };
        self.query_pool = Some(pool);

        let props = unsafe { self.inst.inst.get_physical_device_properties(self.dev.pdev) };
        self.timestamp_period = props.limits.timestamp_period;
    }

    /// Builds the clear+load variants of the default color(+depth)
    /// rendertarget from the swapchain's current images.
    fn rebuild_default_rendertargets(&mut self) -> Result<()> {
        self.rt_clear = None;
        self.rt_load = None;
        self.color_textures.clear();
        self.depth_texture = None;
        self.capture_readback = None;

        let format = Format::from_vk(self.dstate.d_surface_format.format).unwrap_or(Format::Bgra8Unorm);
        let extent = self.dstate.d_resolution;

        let image = self.dstate.d_images[self.dstate.d_current_image as usize];
        let color = Arc::new(Texture::wrap(
            self.dev.clone(),
            image,
            format,
            extent.width,
            extent.height,
            vk::ImageLayout::UNDEFINED,
        )?);
        self.color_textures.push(color.clone());

        // The default framebuffer's color attachment is the swapchain
        // image itself (always single-sampled), so the depth attachment
        // paired with it has to be single-sampled too; MSAA is only
        // offered to render-to-texture targets for now (see DESIGN.md).
        let depth_format = self.get_preferred_depth_format();
        let depth = Arc::new(Texture::new(
            self.dev.clone(),
            TextureParams {
                ty: TextureType::D2,
                format: depth_format,
                width: extent.width,
                height: extent.height,
                depth: 1,
                samples: 1,
                usage: TextureUsage::DEPTH_STENCIL_ATTACHMENT,
                ..TextureParams::default()
            },
        )?);
        self.depth_texture = Some(depth.clone());

        let present = !self.info.is_offscreen();
        let make_rt = |load_op: LoadOp, clear_load: LoadOp| -> Result<Rendertarget> {
            Rendertarget::new(
                self.dev.clone(),
                vec![Attachment {
                    texture: color.clone(),
                    layer: 0,
                    resolve_target: None,
                    load_op,
                    store_op: StoreOp::Store,
                    clear_value: ClearValue::Color([
                        self.info.clear_color.0,
                        self.info.clear_color.1,
                        self.info.clear_color.2,
                        self.info.clear_color.3,
                    ]),
                }],
                Some(Attachment {
                    texture: depth.clone(),
                    layer: 0,
                    resolve_target: None,
                    load_op: clear_load,
                    store_op: StoreOp::DontCare,
                    clear_value: ClearValue::DepthStencil(1.0, 0),
                }),
                /* samples */ 1,
                present,
            )
        };

        self.rt_clear = Some(make_rt(LoadOp::Clear, LoadOp::Clear)?);
        self.rt_load = Some(make_rt(LoadOp::Load, LoadOp::Load)?);

        Ok(())
    }

    /// Non-offscreen contexts flag a pending resize; it's applied lazily
    /// the next time `begin_draw` observes `OUT_OF_DATE` or this flag.
    pub fn resize(&mut self, w: u32, h: u32) -> Result<()> {
        if self.info.is_offscreen() {
            return Err(GpuError::UNSUPPORTED);
        }
        self.resize_pending = Some((w, h));
        Ok(())
    }

    fn apply_pending_resize(&mut self) -> Result<()> {
        if self.resize_pending.take().is_none() {
            return Ok(());
        }

        unsafe { self.dev.dev.device_wait_idle().ok() };
        self.rt_clear = None;
        self.rt_load = None;
        self.color_textures.clear();
        self.depth_texture = None;

        if let Some(sc) = self.swapchain.as_mut() {
            sc.recreate_swapchain(&mut self.dstate)?;
        }
        sync_present_semaphores(&self.dev, &mut self.dstate);
        if self.dstate.d_resolution.width == 0 || self.dstate.d_resolution.height == 0 {
            // minimised; try again next frame
            return Ok(());
        }

        self.rebuild_default_rendertargets()
    }

    /// Swaps the destination CPU buffer the capture-buffer readback path
    /// writes into. `ptr` must point to at least `width * height *
    /// bytes_per_texel` bytes of writable memory for the context's
    /// current dimensions; pass a null pointer to disable capture.
    pub fn set_capture_buffer(&mut self, ptr: *mut u8) -> Result<()> {
        if !self.info.is_offscreen() {
            return Err(GpuError::UNSUPPORTED);
        }
        self.info.capture_buffer = if ptr.is_null() {
            None
        } else {
            Some(crate::config::CaptureTarget(ptr))
        };
        Ok(())
    }

    fn current_frame(&mut self) -> &mut FrameSlot {
        &mut self.frames[self.frame_index]
    }

    /// Waits for the slot's previous work to retire, then begins
    /// recording the update command buffer.
    pub fn begin_update(&mut self) -> Result<()> {
        let frame = self.current_frame();
        frame.update_cbuf.wait();
        frame.draw_cbuf.wait();
        frame.update_cbuf.begin()
    }

    /// Ends and submits the update command buffer, signalling the
    /// update-finished semaphore consumed by `begin_draw`.
    pub fn end_update(&mut self) -> Result<()> {
        let frame = self.current_frame();
        frame.update_cbuf.add_signal_sem(frame.update_finished_sema);
        frame.update_cbuf.submit(self.queue);
        Ok(())
    }

    /// Acquires the next swapchain image (on-screen) and begins the
    /// draw command buffer, recreating the swapchain on `OUT_OF_DATE`
    /// and retrying once.
    pub fn begin_draw(&mut self) -> Result<()> {
        self.apply_pending_resize()?;

        if let Some(sc) = self.swapchain.as_mut() {
            match sc.get_next_swapchain_image(&mut self.dstate) {
                Ok(()) => {}
                Err(GpuError::OUT_OF_DATE) => {
                    sc.recreate_swapchain(&mut self.dstate)?;
                    self.rebuild_default_rendertargets()?;
                    sc.get_next_swapchain_image(&mut self.dstate)?;
                }
                Err(e) => return Err(e),
            }
        }

        let update_finished = self.frames[self.frame_index].update_finished_sema;
        let frame = self.current_frame();
        frame.draw_cbuf.add_wait_sem(update_finished);
        frame.draw_cbuf.begin()?;

        if let Some(pool) = self.query_pool {
            unsafe {
                self.dev.dev.cmd_reset_query_pool(frame.draw_cbuf.handle(), pool, 0, 2);
                self.dev.dev.cmd_write_timestamp(frame.draw_cbuf.handle(), vk::PipelineStageFlags::TOP_OF_PIPE, pool, 0);
            }
        }

        Ok(())
    }

    /// Only valid when HUD is enabled. Writes the end timestamp, splits
    /// the recording (submit + wait), reads back both timestamps, and
    /// resumes a fresh recording so the rest of the frame can continue.
    pub fn query_draw_time(&mut self) -> Result<u64> {
        let pool = self.query_pool.ok_or(GpuError::UNSUPPORTED)?;
        let frame_index = self.frame_index;

        {
            let frame = &mut self.frames[frame_index];
            unsafe {
                self.dev.dev.cmd_write_timestamp(frame.draw_cbuf.handle(), vk::PipelineStageFlags::BOTTOM_OF_PIPE, pool, 1);
            }
            frame.draw_cbuf.submit(self.queue);
            frame.draw_cbuf.wait();
        }

        let mut data = [0u64; 2];
        unsafe {
            self.dev
                .dev
                .get_query_pool_results(pool, 0, 2, &mut data, vk::QueryResultFlags::TYPE_64 | vk::QueryResultFlags::WAIT)
                .map_err(crate::error::map_vk_result)?;
        }

        let ns = ((data[1] - data[0]) as f64 * self.timestamp_period as f64) as u64;

        self.frames[frame_index].draw_cbuf.begin()?;
        Ok(ns)
    }

    /// Submits the draw command buffer. For offscreen contexts with a
    /// capture buffer enabled, this also copies the default color texture
    /// to a host-visible readback buffer, waits for the copy, and memcpys
    /// it out to the destination `set_capture_buffer` pointed at. For
    /// on-screen contexts, the default rendertarget's renderpass already
    /// left the swapchain image in `PRESENT_SRC_KHR` layout (its
    /// `final_layout`, applied automatically at `vkCmdEndRenderPass`), so
    /// this only needs to submit and present.
    pub fn end_draw(&mut self) -> Result<()> {
        let frame_sema = self.dstate.d_frame_sema;
        {
            let frame = self.current_frame();
            frame.draw_cbuf.add_signal_sem(frame_sema);
            frame.draw_cbuf.submit(self.queue);
        }

        if let Some(ptr) = self.info.capture_target() {
            // The copy reads the color texture's finished contents, so it
            // must wait for this frame's draw work to retire first.
            self.current_frame().draw_cbuf.wait();
            self.capture_to(ptr)?;
        }

        if let Some(sc) = self.swapchain.as_mut() {
            match sc.present(&self.dstate) {
                Ok(()) => {}
                Err(GpuError::OUT_OF_DATE) => {
                    self.resize_pending = Some((self.dstate.d_resolution.width, self.dstate.d_resolution.height));
                }
                Err(e) => return Err(e),
            }
        }

        self.frame_index = (self.frame_index + 1) % self.frames.len();
        Ok(())
    }

    /// Copies the default color texture into the lazily-allocated
    /// readback buffer and memcpys it to `ptr`.
    fn capture_to(&mut self, ptr: *mut u8) -> Result<()> {
        let color = self.color_textures.first().ok_or(GpuError::UNSUPPORTED)?;
        let row_bytes = color.width() as u64 * color.format().bytes_per_texel() as u64;
        let size = row_bytes * color.height() as u64;

        if self.capture_readback.as_ref().map(|b| b.size()) != Some(size) {
            self.capture_readback = Some(Buffer::new(
                self.dev.clone(),
                size,
                BufferUsage::MAP_READ | BufferUsage::TRANSFER_DST,
            )?);
        }
        let readback = self.capture_readback.as_ref().unwrap();

        color.copy_to_buffer(readback)?;
        let pixels = readback.map(0, size)?;

        unsafe {
            std::ptr::copy_nonoverlapping(pixels.as_ptr(), ptr, pixels.len());
        }
        Ok(())
    }

    pub fn wait_idle(&self) {
        unsafe { self.dev.dev.device_wait_idle().expect("device_wait_idle failed") };
    }

    /// Maps the graph's OpenGL-style clip space (`[-1,1]^3`, y-up) to
    /// Vulkan's clip space (y-down, z in `[0,1]`).
    pub fn transform_projection_matrix(&self, m: [[f32; 4]; 4]) -> [[f32; 4]; 4] {
        let flip = [
            [1.0, 0.0, 0.0, 0.0],
            [0.0, -1.0, 0.0, 0.0],
            [0.0, 0.0, 0.5, 0.0],
            [0.0, 0.0, 0.5, 1.0],
        ];
        mat4_mul(&flip, &m)
    }

    /// Vulkan's y-flip inverts triangle winding, so front/back faces
    /// swap relative to what the scene graph computed in its own space.
    pub fn transform_cull_mode(&self, mode: crate::pipeline::CullMode) -> crate::pipeline::CullMode {
        use crate::pipeline::CullMode::*;
        match mode {
            None => None,
            Front => Back,
            Back => Front,
        }
    }

    pub fn get_rendertarget_uvcoord_matrix(&self) -> [[f32; 4]; 4] {
        crate::pass::rendertarget_uv_matrix(false)
    }

    pub fn get_default_rendertarget(&self, variant: LoadVariant) -> &Rendertarget {
        match variant {
            LoadVariant::Clear => self.rt_clear.as_ref().unwrap(),
            LoadVariant::Load => self.rt_load.as_ref().unwrap(),
        }
    }

    /// Begins a renderpass over `rt`. Must be paired with `end_render_pass`
    /// before the draw command buffer this was recorded on is submitted.
    pub fn begin_render_pass(&self, cbuf: &mut CommandBuffer, rt: &Rendertarget) {
        self.pass_driver.begin_render_pass(cbuf.handle(), rt);
    }

    pub fn end_render_pass(&self, cbuf: &mut CommandBuffer) {
        self.pass_driver.end_render_pass(cbuf.handle());
    }

    /// Builds the color(+depth) textures and rendertarget for one
    /// render-to-texture subtree, applying the RTT driver's rules: the
    /// interruption-derived depth store op, the color/depth load op
    /// selected by `entry`, the automatic attachment-usage extension, and
    /// the device's MSAA sample-count clamp.
    pub fn create_rtt_rendertarget(
        &mut self,
        nodes: &[PassNode],
        mut color_params: Vec<TextureParams>,
        mut depth_params: Option<TextureParams>,
        entry: PassEntry,
    ) -> Result<(Vec<Arc<Texture>>, Option<Arc<Texture>>, Rendertarget)> {
        let interruptions = pass::count_interruptions(nodes)?;
        let depth_ops = pass::depth_store_ops(interruptions);
        let depth_store_op = match entry {
            PassEntry::First => depth_ops.first,
            PassEntry::Resumed => depth_ops.resumed,
        };

        for p in color_params.iter_mut() {
            p.usage = pass::extend_color_usage(p.usage);
            p.samples = pass::clamp_samples(p.samples, self.limits.max_samples);
        }
        if let Some(p) = depth_params.as_mut() {
            p.usage = pass::extend_depth_usage(p.usage);
            p.samples = pass::clamp_samples(p.samples, self.limits.max_samples);
        }
        let samples = color_params.first().map(|p| p.samples).unwrap_or(1);

        let colors: Vec<Arc<Texture>> = color_params
            .into_iter()
            .map(|p| Texture::new(self.dev.clone(), p).map(Arc::new))
            .collect::<Result<_>>()?;
        let depth = depth_params
            .map(|p| Texture::new(self.dev.clone(), p).map(Arc::new))
            .transpose()?;

        let color_attachments = colors
            .iter()
            .map(|tex| Attachment {
                texture: tex.clone(),
                layer: 0,
                resolve_target: None,
                load_op: entry.color_load_op(),
                store_op: StoreOp::Store,
                clear_value: ClearValue::Color([
                    self.info.clear_color.0,
                    self.info.clear_color.1,
                    self.info.clear_color.2,
                    self.info.clear_color.3,
                ]),
            })
            .collect();
        let depth_attachment = depth.as_ref().map(|tex| Attachment {
            texture: tex.clone(),
            layer: 0,
            resolve_target: None,
            load_op: entry.color_load_op(),
            store_op: depth_store_op,
            clear_value: ClearValue::DepthStencil(1.0, 0),
        });

        let rt = Rendertarget::new(self.dev.clone(), color_attachments, depth_attachment, samples, false)?;
        Ok((colors, depth, rt))
    }

    /// Builds a pipeline for `node`, rejecting the combination up front
    /// if its graphics state was built against a rendertarget layout
    /// other than the one it now targets.
    pub fn pipeline_for_rnode(
        &self,
        node: &Rnode,
        program: &Program,
        bindgroup_layout: &BindGroupLayout,
    ) -> Result<Pipeline> {
        if node.graphics_state.rt_layout != node.rendertarget_layout {
            return Err(GpuError::UNSUPPORTED);
        }
        Pipeline::new_graphics(self.dev.clone(), program, bindgroup_layout, &node.graphics_state, &self.rp_cache)
    }

    /// Vulkan's viewport y-origin is flipped relative to the scissor's,
    /// so the scissor rect's y must be mirrored to match.
    pub fn set_viewport(&self, cbuf: vk::CommandBuffer, x: f32, y: f32, w: f32, h: f32) {
        let viewport = vk::Viewport {
            x,
            y: y + h,
            width: w,
            height: -h,
            min_depth: 0.0,
            max_depth: 1.0,
        };
        unsafe { self.dev.dev.cmd_set_viewport(cbuf, 0, &[viewport]) };
    }

    pub fn set_scissor(&self, cbuf: vk::CommandBuffer, x: i32, y: i32, w: u32, h: u32, target_height: u32) {
        let rect = vk::Rect2D {
            offset: vk::Offset2D {
                x,
                y: target_height as i32 - y - h as i32,
            },
            extent: vk::Extent2D { width: w, height: h },
        };
        unsafe { self.dev.dev.cmd_set_scissor(cbuf, 0, &[rect]) };
    }

    pub fn get_preferred_depth_format(&self) -> Format {
        Format::Depth32Float
    }

    pub fn get_preferred_depth_stencil_format(&self) -> Format {
        Format::Depth24Stencil8
    }

    pub fn get_format_features(&self, format: Format) -> vk::FormatFeatureFlags {
        unsafe { self.inst.inst.get_physical_device_format_properties(self.dev.pdev, format.to_vk()) }.optimal_tiling_features
    }

    pub fn generate_texture_mipmap(&self, tex: &Texture) -> Result<()> {
        tex.generate_mipmap()
    }

    /// Records the bindgroup's dirty descriptor-set updates (if any),
    /// then binds it for subsequent draws/dispatches.
    pub fn set_bindgroup(&mut self, cbuf: &mut CommandBuffer, bindgroup: &mut BindGroup, pipeline: &Pipeline) {
        bindgroup.update_descriptor_set(&self.dummy);
        unsafe {
            self.dev.dev.cmd_bind_descriptor_sets(
                cbuf.handle(),
                pipeline.bind_point(),
                pipeline.layout(),
                0,
                &[bindgroup.descriptor_set()],
                &[],
            );
        }
    }

    pub fn set_pipeline(&mut self, cbuf: &mut CommandBuffer, pipeline: Arc<Pipeline>) {
        unsafe {
            self.dev.dev.cmd_bind_pipeline(cbuf.handle(), pipeline.bind_point(), pipeline.handle());
        }
        self.current_pipeline = Some(pipeline);
    }

    pub fn draw(&self, cbuf: &mut CommandBuffer, n_vert: u32, n_inst: u32, first: u32) {
        unsafe { self.dev.dev.cmd_draw(cbuf.handle(), n_vert, n_inst, first, 0) };
    }

    pub fn draw_indexed(&self, cbuf: &mut CommandBuffer, n_idx: u32, n_inst: u32) {
        unsafe { self.dev.dev.cmd_draw_indexed(cbuf.handle(), n_idx, n_inst, 0, 0, 0) };
    }

    /// If `cbuf` is a transient one-shot buffer (no current draw
    /// recording in flight, e.g. a standalone compute dispatch outside
    /// any frame), the caller is expected to have begun it already; this
    /// only emits the dispatch and the memory barrier that makes the
    /// results visible to subsequent consumers.
    pub fn dispatch(&self, cbuf: &mut CommandBuffer, gx: u32, gy: u32, gz: u32) {
        unsafe {
            self.dev.dev.cmd_dispatch(cbuf.handle(), gx, gy, gz);

            let barrier = vk::MemoryBarrier::builder()
                .src_access_mask(vk::AccessFlags::SHADER_WRITE)
                .dst_access_mask(
                    vk::AccessFlags::SHADER_READ
                        | vk::AccessFlags::SHADER_WRITE
                        | vk::AccessFlags::COLOR_ATTACHMENT_READ
                        | vk::AccessFlags::COLOR_ATTACHMENT_WRITE
                        | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ
                        | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE
                        | vk::AccessFlags::TRANSFER_READ
                        | vk::AccessFlags::TRANSFER_WRITE
                        | vk::AccessFlags::MEMORY_READ
                        | vk::AccessFlags::MEMORY_WRITE,
                )
                .build();
            self.dev.dev.cmd_pipeline_barrier(
                cbuf.handle(),
                vk::PipelineStageFlags::COMPUTE_SHADER,
                vk::PipelineStageFlags::ALL_COMMANDS,
                vk::DependencyFlags::empty(),
                &[barrier],
                &[],
                &[],
            );
        }
    }

    pub fn set_vertex_buffer(&self, cbuf: &mut CommandBuffer, binding: u32, buffer: Arc<crate::buffer::Buffer>) {
        unsafe {
            self.dev
                .dev
                .cmd_bind_vertex_buffers(cbuf.handle(), binding, &[buffer.handle()], &[0]);
        }
        cbuf.ref_buffer(buffer);
    }

    pub fn set_index_buffer(&self, cbuf: &mut CommandBuffer, buffer: Arc<crate::buffer::Buffer>, index_ty: vk::IndexType) {
        unsafe {
            self.dev.dev.cmd_bind_index_buffer(cbuf.handle(), buffer.handle(), 0, index_ty);
        }
        cbuf.ref_buffer(buffer);
    }
}

/// Keeps the "image acquired" semaphore pool in sync with the current
/// swapchain image count. Harmless no-op for the headless backend,
/// which never reads `d_available_present_semas`.
fn sync_present_semaphores(dev: &Device, dstate: &mut DisplayState) {
    let needed = dstate.d_images.len();
    if dstate.d_present_semas.len() == needed {
        return;
    }

    for sema in dstate.d_present_semas.drain(..).flatten() {
        unsafe { dev.dev.destroy_semaphore(sema, None) };
    }
    for sema in dstate.d_available_present_semas.drain(..) {
        unsafe { dev.dev.destroy_semaphore(sema, None) };
    }

    dstate.d_present_semas = (0..needed).map(|_| None).collect();
    let info = vk::SemaphoreCreateInfo::builder();
    for _ in 0..needed {
        let sema = unsafe { dev.dev.create_semaphore(&info, None).expect("Could not create semaphore") };
        dstate.d_available_present_semas.push(sema);
    }
}

fn mat4_mul(a: &[[f32; 4]; 4], b: &[[f32; 4]; 4]) -> [[f32; 4]; 4] {
    let mut out = [[0.0f32; 4]; 4];
    for i in 0..4 {
        for j in 0..4 {
            let mut sum = 0.0;
            for k in 0..4 {
                sum += a[i][k] * b[k][j];
            }
            out[i][j] = sum;
        }
    }
    out
}

impl Drop for VulkanContext {
    fn drop(&mut self) {
        self.wait_idle();
        if let Some(pool) = self.query_pool {
            unsafe { self.dev.dev.destroy_query_pool(pool, None) };
        }
        unsafe {
            self.dev.dev.destroy_semaphore(self.dstate.d_frame_sema, None);
            for frame in self.frames.iter() {
                self.dev.dev.destroy_semaphore(frame.update_finished_sema, None);
            }
            for sema in self.dstate.d_present_semas.drain(..).flatten() {
                self.dev.dev.destroy_semaphore(sema, None);
            }
            for sema in self.dstate.d_available_present_semas.drain(..) {
                self.dev.dev.destroy_semaphore(sema, None);
            }
        }
        self.rp_cache.destroy_all(&self.dev);
        log::debug!("destroying gpu context");
    }
}

/// The capability-level handle embedders hold: one concrete
/// implementation per backend, picked at `new()` time from
/// `CreateInfo::backend`.
pub enum GpuContext {
    Vulkan(VulkanContext),
    Gl(crate::opengl::GlContext),
}

impl GpuContext {
    pub fn new(info: CreateInfo) -> Result<Self> {
        match info.backend() {
            Backend::Vulkan => Ok(GpuContext::Vulkan(VulkanContext::new(info)?)),
            Backend::OpenGl | Backend::OpenGlEs => Ok(GpuContext::Gl(crate::opengl::GlContext::new(info)?)),
        }
    }

    pub fn as_vulkan(&mut self) -> &mut VulkanContext {
        match self {
            GpuContext::Vulkan(c) => c,
            GpuContext::Gl(_) => panic!("GpuContext is not backed by Vulkan"),
        }
    }

    pub fn as_gl(&mut self) -> &mut crate::opengl::GlContext {
        match self {
            GpuContext::Gl(c) => c,
            GpuContext::Vulkan(_) => panic!("GpuContext is not backed by OpenGL"),
        }
    }
}

/// Window handles are only meaningful for on-screen Vulkan contexts;
/// re-exported here so callers don't need to reach into `config`.
pub type ContextWindowHandles = WindowHandles;
