// Device limits and feature flags
//
// Mirrors the `gpu_limits`/feature bitmask pair nope.gl's gpu_ctx.h keeps
// next to each context, queried once at context creation time.

use bitflags::bitflags;

bitflags! {
    /// Optional capabilities a backend may or may not expose.
    ///
    /// Queried once at context creation; callers are expected to check the
    /// relevant flag before relying on the associated behavior (e.g. before
    /// requesting a pipeline using instanced draw).
    pub struct Features: u32 {
        const COMPUTE                        = 1 << 0;
        const TEXTURE_3D                      = 1 << 1;
        const TEXTURE_CUBE_MAP_ARRAY          = 1 << 2;
        const STORAGE_IMAGE                   = 1 << 3;
        const INSTANCED_DRAW                  = 1 << 4;
        const TEXTURE_NPOT                    = 1 << 5;
        const TEXTURE_FLOAT_RENDERABLE        = 1 << 6;
        const TEXTURE_HALF_FLOAT_RENDERABLE   = 1 << 7;
        const SHADER_TEXTURE_LOD              = 1 << 8;
        const UINT_UNIFORMS                   = 1 << 9;
    }
}

/// Hardware limits reported by the active backend.
///
/// All fields are populated at context creation and never change for the
/// lifetime of the context.
#[derive(Debug, Clone, Copy)]
pub struct Limits {
    pub max_texture_dimension: u32,
    pub max_color_attachments: u32,
    pub max_samples: u32,
    pub max_texture_image_units: u32,
    pub max_draw_buffers: u32,
    pub max_uniform_buffer_range: u32,
    pub max_bindgroup_entries: u32,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_texture_dimension: 4096,
            max_color_attachments: 8,
            max_samples: 4,
            max_texture_image_units: 16,
            max_draw_buffers: 8,
            max_uniform_buffer_range: 16384,
            max_bindgroup_entries: 16,
        }
    }
}
