// Gpu context creation parameters
//
// Austin Shafer - 2024

use raw_window_handle::{RawDisplayHandle, RawWindowHandle};

/// Which rendering backend a `GpuContext` should use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    OpenGl,
    OpenGlEs,
    Vulkan,
}

/// A raw pointer to CPU memory the capture-buffer readback path writes
/// into. Ownership and lifetime are the caller's; this wrapper only
/// carries the address across the context's internal `Send` boundary
/// (the context itself is handed off between the update/draw threads a
/// caller may use).
#[derive(Debug, Clone, Copy)]
pub(crate) struct CaptureTarget(pub(crate) *mut u8);

unsafe impl Send for CaptureTarget {}

/// A window/display handle pair for on-screen presentation.
///
/// This is only needed when `offscreen` is false. Ownership of the
/// underlying window is left to the caller; these handles only need to
/// stay valid for the lifetime of the `GpuContext`.
#[derive(Clone, Copy)]
pub struct WindowHandles {
    pub window: RawWindowHandle,
    pub display: RawDisplayHandle,
}

/// Parameters used to create a `GpuContext`.
///
/// Constructed through the builder methods below, mirroring the rest of
/// this codebase's `CreateInfo::builder()...build()` convention.
pub struct CreateInfo {
    pub(crate) backend: Backend,
    pub(crate) offscreen: bool,
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) samples: u32,
    pub(crate) swap_interval: u32,
    pub(crate) clear_color: (f32, f32, f32, f32),
    pub(crate) capture_buffer: Option<CaptureTarget>,
    pub(crate) set_surface_pts: bool,
    pub(crate) hud: bool,
    pub(crate) window: Option<WindowHandles>,
    /// For `Backend::OpenGl`/`OpenGlEs` only: the already-current GL
    /// context function pointers are loaded from. This crate never
    /// creates the GL context or window surface itself (EGL/GLX/WGL setup
    /// is platform-specific window-system glue, out of scope here); the
    /// caller makes a context current and hands the loader in.
    pub(crate) gl_context: Option<glow::Context>,
}

impl CreateInfo {
    pub fn builder() -> CreateInfoBuilder {
        CreateInfoBuilder {
            info: CreateInfo {
                backend: Backend::Vulkan,
                offscreen: true,
                width: 640,
                height: 480,
                samples: 1,
                swap_interval: 1,
                clear_color: (0.0, 0.0, 0.0, 1.0),
                capture_buffer: None,
                set_surface_pts: false,
                hud: false,
                window: None,
                gl_context: None,
            },
        }
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    pub fn is_offscreen(&self) -> bool {
        self.offscreen
    }

    pub fn dims(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub(crate) fn capture_target(&self) -> Option<*mut u8> {
        self.capture_buffer.map(|t| t.0)
    }
}

pub struct CreateInfoBuilder {
    info: CreateInfo,
}

impl CreateInfoBuilder {
    pub fn backend(mut self, backend: Backend) -> Self {
        self.info.backend = backend;
        self
    }

    pub fn offscreen(mut self, offscreen: bool) -> Self {
        self.info.offscreen = offscreen;
        self
    }

    pub fn dimensions(mut self, width: u32, height: u32) -> Self {
        self.info.width = width;
        self.info.height = height;
        self
    }

    pub fn samples(mut self, samples: u32) -> Self {
        self.info.samples = samples;
        self
    }

    pub fn swap_interval(mut self, interval: u32) -> Self {
        self.info.swap_interval = interval;
        self
    }

    pub fn clear_color(mut self, color: (f32, f32, f32, f32)) -> Self {
        self.info.clear_color = color;
        self
    }

    /// Enables offscreen capture-buffer readback, directing it at `ptr`.
    /// A null `ptr` disables capture.
    pub fn capture_buffer(mut self, ptr: *mut u8) -> Self {
        self.info.capture_buffer = if ptr.is_null() { None } else { Some(CaptureTarget(ptr)) };
        self
    }

    pub fn set_surface_pts(mut self, enable: bool) -> Self {
        self.info.set_surface_pts = enable;
        self
    }

    pub fn hud(mut self, enable: bool) -> Self {
        self.info.hud = enable;
        self
    }

    pub fn window(mut self, window: WindowHandles) -> Self {
        self.info.window = Some(window);
        self
    }

    /// Required for `Backend::OpenGl`/`OpenGlEs`: the GL context the
    /// caller already made current, wrapped in the loader `glow::Context`
    /// expects.
    pub fn gl_context(mut self, gl: glow::Context) -> Self {
        self.info.gl_context = Some(gl);
        self
    }

    pub fn build(self) -> CreateInfo {
        self.info
    }
}
