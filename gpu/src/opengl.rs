// OpenGL/ES backend: the same object model as the Vulkan backend, minus
// the concerns GL doesn't have (renderpass compatibility, descriptor
// pools, explicit layout transitions).
//
// Austin Shafer - 2024
use glow::HasContext;

use std::rc::Rc;

use crate::format::Format;
use crate::pipeline::FixedFunctionState;
use crate::{GpuError, Result};

/// The GL context handle, shared by every GL-backend object the way
/// `Arc<Device>` is shared on the Vulkan side. `glow::Context` is not
/// `Send`/`Sync`, matching GL's single-thread-per-context rule, so this
/// is an `Rc` rather than an `Arc`.
pub struct GlDevice {
    pub(crate) gl: glow::Context,
}

impl GlDevice {
    pub fn new(gl: glow::Context) -> Rc<Self> {
        Rc::new(Self { gl })
    }
}

pub struct GlBuffer {
    dev: Rc<GlDevice>,
    handle: glow::Buffer,
    target: u32,
    size: u64,
}

impl GlBuffer {
    pub fn new(dev: Rc<GlDevice>, target: u32, size: u64, data: Option<&[u8]>) -> Result<Self> {
        unsafe {
            let handle = dev.gl.create_buffer().map_err(|_| GpuError::COULD_NOT_CREATE_IMAGE)?;
            dev.gl.bind_buffer(target, Some(handle));
            match data {
                Some(d) => dev.gl.buffer_data_u8_slice(target, d, glow::STATIC_DRAW),
                None => dev.gl.buffer_data_size(target, size as i32, glow::DYNAMIC_DRAW),
            }
            Ok(Self { dev, handle, target, size })
        }
    }

    /// No staging buffer on the GL side: `upload` is always a direct
    /// `glBufferSubData`, regardless of usage flags.
    pub fn upload(&self, data: &[u8], offset: u64) -> Result<()> {
        if offset + data.len() as u64 > self.size {
            return Err(GpuError::INVALID_DIMENSIONS);
        }
        unsafe {
            self.dev.gl.bind_buffer(self.target, Some(self.handle));
            self.dev.gl.buffer_sub_data_u8_slice(self.target, offset as i32, data);
        }
        Ok(())
    }

    pub(crate) fn handle(&self) -> glow::Buffer {
        self.handle
    }
}

impl Drop for GlBuffer {
    fn drop(&mut self) {
        unsafe { self.dev.gl.delete_buffer(self.handle) };
    }
}

pub struct GlTexture {
    dev: Rc<GlDevice>,
    handle: glow::Texture,
    target: u32,
    format: Format,
    width: u32,
    height: u32,
}

impl GlTexture {
    pub fn new(dev: Rc<GlDevice>, format: Format, width: u32, height: u32) -> Result<Self> {
        unsafe {
            let handle = dev.gl.create_texture().map_err(|_| GpuError::COULD_NOT_CREATE_IMAGE)?;
            dev.gl.bind_texture(glow::TEXTURE_2D, Some(handle));
            dev.gl.tex_storage_2d(glow::TEXTURE_2D, 1, format.to_gl_internal_format(), width as i32, height as i32);
            dev.gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MIN_FILTER, glow::LINEAR as i32);
            dev.gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MAG_FILTER, glow::LINEAR as i32);
            Ok(Self {
                dev,
                handle,
                target: glow::TEXTURE_2D,
                format,
                width,
                height,
            })
        }
    }

    /// There is no layout concept in GL: an upload is just a
    /// `glTexSubImage2D`, with no barrier or transition bookkeeping.
    pub fn upload(&self, data: &[u8], x: u32, y: u32, w: u32, h: u32) -> Result<()> {
        let (format, ty) = gl_format_and_type(self.format);
        unsafe {
            self.dev.gl.bind_texture(self.target, Some(self.handle));
            self.dev.gl.tex_sub_image_2d(
                self.target,
                0,
                x as i32,
                y as i32,
                w as i32,
                h as i32,
                format,
                ty,
                glow::PixelUnpackData::Slice(data),
            );
        }
        Ok(())
    }

    pub fn generate_mipmap(&self) -> Result<()> {
        unsafe {
            self.dev.gl.bind_texture(self.target, Some(self.handle));
            self.dev.gl.generate_mipmap(self.target);
        }
        Ok(())
    }

    pub(crate) fn handle(&self) -> glow::Texture {
        self.handle
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }
}

impl Drop for GlTexture {
    fn drop(&mut self) {
        unsafe { self.dev.gl.delete_texture(self.handle) };
    }
}

fn gl_format_and_type(format: Format) -> (u32, u32) {
    match format {
        Format::R8Unorm => (glow::RED, glow::UNSIGNED_BYTE),
        Format::Rg8Unorm => (glow::RG, glow::UNSIGNED_BYTE),
        Format::Rgba8Unorm | Format::Rgba8Srgb => (glow::RGBA, glow::UNSIGNED_BYTE),
        Format::Bgra8Unorm => (glow::BGRA, glow::UNSIGNED_BYTE),
        Format::R16Float => (glow::RED, glow::HALF_FLOAT),
        Format::Rgba16Float => (glow::RGBA, glow::HALF_FLOAT),
        Format::R32Float => (glow::RED, glow::FLOAT),
        Format::Rgba32Float => (glow::RGBA, glow::FLOAT),
        Format::Depth24Stencil8 => (glow::DEPTH_STENCIL, glow::UNSIGNED_INT_24_8),
        Format::Depth32Float => (glow::DEPTH_COMPONENT, glow::FLOAT),
    }
}

/// Directly mirrors a `Rendertarget`'s attachments onto an FBO; there is
/// no renderpass-compatibility concept to cache against.
pub struct GlRendertarget {
    dev: Rc<GlDevice>,
    handle: Option<glow::Framebuffer>,
    width: u32,
    height: u32,
}

impl GlRendertarget {
    /// Passing no color/depth textures builds the default-framebuffer
    /// rendertarget (handle `None`, binds to 0).
    pub fn new(dev: Rc<GlDevice>, colors: &[&GlTexture], depth: Option<&GlTexture>) -> Result<Self> {
        if colors.is_empty() && depth.is_none() {
            return Ok(Self { dev, handle: None, width: 0, height: 0 });
        }

        unsafe {
            let fbo = dev.gl.create_framebuffer().map_err(|_| GpuError::COULD_NOT_CREATE_IMAGE)?;
            dev.gl.bind_framebuffer(glow::FRAMEBUFFER, Some(fbo));

            for (i, c) in colors.iter().enumerate() {
                dev.gl.framebuffer_texture_2d(
                    glow::FRAMEBUFFER,
                    glow::COLOR_ATTACHMENT0 + i as u32,
                    glow::TEXTURE_2D,
                    Some(c.handle()),
                    0,
                );
            }
            if let Some(d) = depth {
                dev.gl.framebuffer_texture_2d(
                    glow::FRAMEBUFFER,
                    glow::DEPTH_STENCIL_ATTACHMENT,
                    glow::TEXTURE_2D,
                    Some(d.handle()),
                    0,
                );
            }

            if dev.gl.check_framebuffer_status(glow::FRAMEBUFFER) != glow::FRAMEBUFFER_COMPLETE {
                return Err(GpuError::COULD_NOT_CREATE_IMAGE);
            }

            let (width, height) = colors
                .first()
                .map(|c| (c.width(), c.height()))
                .or_else(|| depth.map(|d| (d.width(), d.height())))
                .unwrap();

            Ok(Self { dev, handle: Some(fbo), width, height })
        }
    }

    pub fn bind(&self) {
        unsafe { self.dev.gl.bind_framebuffer(glow::FRAMEBUFFER, self.handle) };
    }
}

impl Drop for GlRendertarget {
    fn drop(&mut self) {
        if let Some(fbo) = self.handle {
            unsafe { self.dev.gl.delete_framebuffer(fbo) };
        }
    }
}

/// A linked `vertex+fragment` GLSL program, compiled at pipeline-creation
/// time (GL has no separate shader-module object to precompile).
pub struct GlProgram {
    dev: Rc<GlDevice>,
    handle: glow::Program,
}

impl GlProgram {
    pub fn new(dev: Rc<GlDevice>, vertex_src: &str, fragment_src: &str) -> Result<Self> {
        unsafe {
            let program = dev.gl.create_program().map_err(|_| GpuError::COULD_NOT_CREATE_IMAGE)?;

            let vs = compile_stage(&dev.gl, glow::VERTEX_SHADER, vertex_src)?;
            let fs = compile_stage(&dev.gl, glow::FRAGMENT_SHADER, fragment_src)?;
            dev.gl.attach_shader(program, vs);
            dev.gl.attach_shader(program, fs);
            dev.gl.link_program(program);

            if !dev.gl.get_program_link_status(program) {
                return Err(GpuError::COULD_NOT_CREATE_IMAGE);
            }

            dev.gl.delete_shader(vs);
            dev.gl.delete_shader(fs);

            Ok(Self { dev, handle: program })
        }
    }

    pub(crate) fn handle(&self) -> glow::Program {
        self.handle
    }
}

fn compile_stage(gl: &glow::Context, stage: u32, src: &str) -> Result<glow::Shader> {
    unsafe {
        let shader = gl.create_shader(stage).map_err(|_| GpuError::COULD_NOT_CREATE_IMAGE)?;
        gl.shader_source(shader, src);
        gl.compile_shader(shader);
        if !gl.get_shader_compile_status(shader) {
            return Err(GpuError::COULD_NOT_CREATE_IMAGE);
        }
        Ok(shader)
    }
}

impl Drop for GlProgram {
    fn drop(&mut self) {
        unsafe { self.dev.gl.delete_program(self.handle) };
    }
}

/// Unlike the Vulkan `Pipeline`, this carries no baked PSO: `bind`
/// replays the fixed-function state as `gl*` calls immediately before
/// each draw, since GL has no persistent pipeline object.
pub struct GlPipeline {
    pub program: Rc<GlProgram>,
    pub state: FixedFunctionState,
}

impl GlPipeline {
    pub fn bind(&self, gl: &glow::Context) {
        unsafe {
            gl.use_program(Some(self.program.handle()));

            if self.state.blend.enable {
                gl.enable(glow::BLEND);
                gl.blend_equation_separate(blend_op_to_gl(self.state.blend.color_op), blend_op_to_gl(self.state.blend.alpha_op));
                gl.blend_func_separate(
                    blend_factor_to_gl(self.state.blend.src_color),
                    blend_factor_to_gl(self.state.blend.dst_color),
                    blend_factor_to_gl(self.state.blend.src_alpha),
                    blend_factor_to_gl(self.state.blend.dst_alpha),
                );
            } else {
                gl.disable(glow::BLEND);
            }

            if self.state.depth.test {
                gl.enable(glow::DEPTH_TEST);
                gl.depth_mask(self.state.depth.write);
            } else {
                gl.disable(glow::DEPTH_TEST);
            }

            match self.state.cull_mode {
                crate::pipeline::CullMode::None => gl.disable(glow::CULL_FACE),
                crate::pipeline::CullMode::Front => {
                    gl.enable(glow::CULL_FACE);
                    gl.cull_face(glow::FRONT);
                }
                crate::pipeline::CullMode::Back => {
                    gl.enable(glow::CULL_FACE);
                    gl.cull_face(glow::BACK);
                }
            }
        }
    }
}

fn blend_factor_to_gl(f: crate::pipeline::BlendFactor) -> u32 {
    use crate::pipeline::BlendFactor::*;
    match f {
        Zero => glow::ZERO,
        One => glow::ONE,
        SrcAlpha => glow::SRC_ALPHA,
        OneMinusSrcAlpha => glow::ONE_MINUS_SRC_ALPHA,
        DstAlpha => glow::DST_ALPHA,
        OneMinusDstAlpha => glow::ONE_MINUS_DST_ALPHA,
    }
}

fn blend_op_to_gl(op: crate::pipeline::BlendOp) -> u32 {
    use crate::pipeline::BlendOp::*;
    match op {
        Add => glow::FUNC_ADD,
        Subtract => glow::FUNC_SUBTRACT,
        ReverseSubtract => glow::FUNC_REVERSE_SUBTRACT,
    }
}

/// The GL backend has no separate command-buffer object: every call is
/// issued directly against the current context. This type exists only
/// so the rest of the crate can treat "record a command buffer" the
/// same way across backends; here it is an identity no-op that simply
/// forwards to immediate-mode `gl*` calls.
pub struct GlCommandBuffer;

impl GlCommandBuffer {
    pub fn begin(&mut self) -> Result<()> {
        Ok(())
    }

    pub fn submit(&mut self) {}

    pub fn wait(&mut self) {}
}

/// The GL-backed `GpuContext` implementation: the frame driver
/// counterpart to `VulkanContext`. GL has no queue, swapchain, or
/// command-buffer machinery to own, so this is much thinner — most of
/// what `VulkanContext` tracks collapses into "the current GL context's
/// implicit state". This crate never creates the GL context or window
/// surface itself; the caller makes a context current on the calling
/// thread and hands it in via `CreateInfo::gl_context`, and is
/// responsible for swapping buffers after `end_draw` returns.
pub struct GlContext {
    dev: Rc<GlDevice>,
    clear_color: (f32, f32, f32, f32),
    default_rt: GlRendertarget,
    width: u32,
    height: u32,
    offscreen: bool,
    capture_buffer: Option<*mut u8>,
}

impl GlContext {
    pub fn new(mut info: crate::config::CreateInfo) -> Result<Self> {
        let gl = info.gl_context.take().ok_or(GpuError::INVALID_BACKEND)?;
        if !info.is_offscreen() && info.capture_target().is_some() {
            return Err(GpuError::UNSUPPORTED);
        }
        let (width, height) = info.dims();
        if width == 0 || height == 0 {
            return Err(GpuError::INVALID_DIMENSIONS);
        }

        let dev = GlDevice::new(gl);
        let default_rt = GlRendertarget::new(dev.clone(), &[], None)?;

        Ok(Self {
            dev,
            clear_color: info.clear_color,
            default_rt,
            width,
            height,
            offscreen: info.is_offscreen(),
            capture_buffer: info.capture_target(),
        })
    }

    pub fn begin_update(&mut self) -> Result<()> {
        Ok(())
    }

    pub fn end_update(&mut self) -> Result<()> {
        Ok(())
    }

    /// Binds the default framebuffer and clears it. GL has no discrete
    /// renderpass object to begin; the Vulkan driver's load/store-op
    /// bookkeeping collapses to an immediate `glClear` here.
    pub fn begin_draw(&mut self) -> Result<()> {
        self.default_rt.bind();
        unsafe {
            self.dev.gl.viewport(0, 0, self.width as i32, self.height as i32);
            self.dev
                .gl
                .clear_color(self.clear_color.0, self.clear_color.1, self.clear_color.2, self.clear_color.3);
            self.dev.gl.clear(glow::COLOR_BUFFER_BIT | glow::DEPTH_BUFFER_BIT);
        }
        Ok(())
    }

    /// For offscreen contexts with a capture buffer set, reads the
    /// default framebuffer back with `glReadPixels`. On-screen
    /// presentation is the caller's, via whatever window-system call
    /// swaps the surface bound to the context handed to `gl_context`.
    pub fn end_draw(&mut self) -> Result<()> {
        if let Some(ptr) = self.capture_buffer {
            let len = (self.width * self.height * 4) as usize;
            unsafe {
                let slice = std::slice::from_raw_parts_mut(ptr, len);
                self.dev.gl.read_pixels(
                    0,
                    0,
                    self.width as i32,
                    self.height as i32,
                    glow::RGBA,
                    glow::UNSIGNED_BYTE,
                    glow::PixelPackData::Slice(slice),
                );
            }
        }
        Ok(())
    }

    /// Swaps the destination CPU buffer the capture-buffer readback path
    /// writes into. A null `ptr` disables capture.
    pub fn set_capture_buffer(&mut self, ptr: *mut u8) -> Result<()> {
        if !self.offscreen {
            return Err(GpuError::UNSUPPORTED);
        }
        self.capture_buffer = if ptr.is_null() { None } else { Some(ptr) };
        Ok(())
    }

    pub fn wait_idle(&self) {
        unsafe { self.dev.gl.finish() };
    }

    /// OpenGL's clip space already matches the graph's own; no correction
    /// needed.
    pub fn transform_projection_matrix(&self, m: [[f32; 4]; 4]) -> [[f32; 4]; 4] {
        m
    }

    /// OpenGL's winding convention needs no correction either.
    pub fn transform_cull_mode(&self, mode: crate::pipeline::CullMode) -> crate::pipeline::CullMode {
        mode
    }

    pub fn get_rendertarget_uvcoord_matrix(&self) -> [[f32; 4]; 4] {
        crate::pass::rendertarget_uv_matrix(true)
    }

    pub fn default_rendertarget(&self) -> &GlRendertarget {
        &self.default_rt
    }

    pub fn set_viewport(&self, x: f32, y: f32, w: f32, h: f32) {
        unsafe { self.dev.gl.viewport(x as i32, y as i32, w as i32, h as i32) };
    }

    pub fn set_scissor(&self, x: i32, y: i32, w: u32, h: u32) {
        unsafe {
            self.dev.gl.enable(glow::SCISSOR_TEST);
            self.dev.gl.scissor(x, y, w as i32, h as i32);
        }
    }

    pub fn generate_texture_mipmap(&self, tex: &GlTexture) -> Result<()> {
        tex.generate_mipmap()
    }

    pub fn set_pipeline(&self, pipeline: &GlPipeline) {
        pipeline.bind(&self.dev.gl);
    }

    pub fn set_vertex_buffer(&self, buffer: &GlBuffer) {
        unsafe { self.dev.gl.bind_buffer(glow::ARRAY_BUFFER, Some(buffer.handle())) };
    }

    pub fn set_index_buffer(&self, buffer: &GlBuffer) {
        unsafe { self.dev.gl.bind_buffer(glow::ELEMENT_ARRAY_BUFFER, Some(buffer.handle())) };
    }

    pub fn draw(&self, n_vert: u32, n_inst: u32, first: u32) {
        unsafe {
            if n_inst > 1 {
                self.dev
                    .gl
                    .draw_arrays_instanced(glow::TRIANGLES, first as i32, n_vert as i32, n_inst as i32);
            } else {
                self.dev.gl.draw_arrays(glow::TRIANGLES, first as i32, n_vert as i32);
            }
        }
    }

    pub fn draw_indexed(&self, n_idx: u32, n_inst: u32) {
        unsafe {
            if n_inst > 1 {
                self.dev
                    .gl
                    .draw_elements_instanced(glow::TRIANGLES, n_idx as i32, glow::UNSIGNED_INT, 0, n_inst as i32);
            } else {
                self.dev.gl.draw_elements(glow::TRIANGLES, n_idx as i32, glow::UNSIGNED_INT, 0);
            }
        }
    }
}
