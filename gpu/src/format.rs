// Format registry
//
// Maps the abstract pixel formats textures/rendertargets are created
// with onto each backend's native format enum, and records the derived
// properties (bytes per pixel, depth/stencil aspect) other modules need
// without re-deriving them at every call site.

use ash::vk;

/// An abstract pixel format, backend-independent.
///
/// Every `Texture`/`Rendertarget` attachment is created from one of
/// these; the backend maps it to its own native format at creation
/// time.
#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    R8Unorm,
    Rg8Unorm,
    Rgba8Unorm,
    Rgba8Srgb,
    Bgra8Unorm,
    R16Float,
    Rgba16Float,
    R32Float,
    Rgba32Float,
    Depth24Stencil8,
    Depth32Float,
}

/// Which aspect(s) of an image a format addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aspect {
    Color,
    Depth,
    DepthStencil,
}

impl Format {
    pub fn aspect(&self) -> Aspect {
        match self {
            Format::Depth24Stencil8 => Aspect::DepthStencil,
            Format::Depth32Float => Aspect::Depth,
            _ => Aspect::Color,
        }
    }

    pub fn is_depth_or_stencil(&self) -> bool {
        !matches!(self.aspect(), Aspect::Color)
    }

    /// Size of one texel in bytes. Used to compute staging-buffer sizes
    /// and row pitches.
    pub fn bytes_per_texel(&self) -> u32 {
        match self {
            Format::R8Unorm => 1,
            Format::Rg8Unorm => 2,
            Format::Rgba8Unorm | Format::Rgba8Srgb | Format::Bgra8Unorm => 4,
            Format::R16Float => 2,
            Format::Rgba16Float => 8,
            Format::R32Float => 4,
            Format::Rgba32Float => 16,
            Format::Depth24Stencil8 => 4,
            Format::Depth32Float => 4,
        }
    }

    /// Maps this format to its Vulkan equivalent.
    pub fn to_vk(&self) -> vk::Format {
        match self {
            Format::R8Unorm => vk::Format::R8_UNORM,
            Format::Rg8Unorm => vk::Format::R8G8_UNORM,
            Format::Rgba8Unorm => vk::Format::R8G8B8A8_UNORM,
            Format::Rgba8Srgb => vk::Format::R8G8B8A8_SRGB,
            Format::Bgra8Unorm => vk::Format::B8G8R8A8_UNORM,
            Format::R16Float => vk::Format::R16_SFLOAT,
            Format::Rgba16Float => vk::Format::R16G16B16A16_SFLOAT,
            Format::R32Float => vk::Format::R32_SFLOAT,
            Format::Rgba32Float => vk::Format::R32G32B32A32_SFLOAT,
            Format::Depth24Stencil8 => vk::Format::D24_UNORM_S8_UINT,
            Format::Depth32Float => vk::Format::D32_SFLOAT,
        }
    }

    /// Maps a Vulkan format back to this registry's enum, if recognized.
    pub fn from_vk(fmt: vk::Format) -> Option<Self> {
        Some(match fmt {
            vk::Format::R8_UNORM => Format::R8Unorm,
            vk::Format::R8G8_UNORM => Format::Rg8Unorm,
            vk::Format::R8G8B8A8_UNORM => Format::Rgba8Unorm,
            vk::Format::R8G8B8A8_SRGB => Format::Rgba8Srgb,
            vk::Format::B8G8R8A8_UNORM => Format::Bgra8Unorm,
            vk::Format::R16_SFLOAT => Format::R16Float,
            vk::Format::R16G16B16A16_SFLOAT => Format::Rgba16Float,
            vk::Format::R32_SFLOAT => Format::R32Float,
            vk::Format::R32G32B32A32_SFLOAT => Format::Rgba32Float,
            vk::Format::D24_UNORM_S8_UINT => Format::Depth24Stencil8,
            vk::Format::D32_SFLOAT => Format::Depth32Float,
            _ => return None,
        })
    }

    /// Maps this format to its `glow`/OpenGL internal format constant.
    ///
    /// Returned as the raw GLenum value so this module doesn't need a
    /// hard dependency on `glow` types; the opengl backend wraps it.
    pub fn to_gl_internal_format(&self) -> u32 {
        // GL_* constants, duplicated here rather than pulling in `glow`
        // just for these integer constants.
        match self {
            Format::R8Unorm => 0x8229,             // GL_R8
            Format::Rg8Unorm => 0x822B,             // GL_RG8
            Format::Rgba8Unorm => 0x8058,           // GL_RGBA8
            Format::Rgba8Srgb => 0x8C43,            // GL_SRGB8_ALPHA8
            Format::Bgra8Unorm => 0x8058,           // no native BGRA internal format, stored as RGBA8
            Format::R16Float => 0x822D,             // GL_R16F
            Format::Rgba16Float => 0x881A,          // GL_RGBA16F
            Format::R32Float => 0x822E,              // GL_R32F
            Format::Rgba32Float => 0x8814,           // GL_RGBA32F
            Format::Depth24Stencil8 => 0x88F0,       // GL_DEPTH24_STENCIL8
            Format::Depth32Float => 0x8CAC,          // GL_DEPTH_COMPONENT32F
        }
    }

    pub const VALID_COLOR_FORMATS: &'static [Format] = &[
        Format::R8Unorm,
        Format::Rg8Unorm,
        Format::Rgba8Unorm,
        Format::Rgba8Srgb,
        Format::Bgra8Unorm,
        Format::R16Float,
        Format::Rgba16Float,
        Format::R32Float,
        Format::Rgba32Float,
    ];
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_format_round_trips_through_vk() {
        let all = [
            Format::R8Unorm,
            Format::Rg8Unorm,
            Format::Rgba8Unorm,
            Format::Rgba8Srgb,
            Format::Bgra8Unorm,
            Format::R16Float,
            Format::Rgba16Float,
            Format::R32Float,
            Format::Rgba32Float,
            Format::Depth24Stencil8,
            Format::Depth32Float,
        ];
        for fmt in all {
            assert_eq!(Format::from_vk(fmt.to_vk()), Some(fmt));
        }
    }

    #[test]
    fn unrecognized_vk_format_maps_to_none() {
        assert_eq!(Format::from_vk(vk::Format::ASTC_4X4_UNORM_BLOCK), None);
    }

    #[test]
    fn depth_formats_report_the_right_aspect() {
        assert_eq!(Format::Depth32Float.aspect(), Aspect::Depth);
        assert_eq!(Format::Depth24Stencil8.aspect(), Aspect::DepthStencil);
        assert!(Format::Depth32Float.is_depth_or_stencil());
        assert!(!Format::Rgba8Unorm.is_depth_or_stencil());
    }

    #[test]
    fn texel_sizes_match_their_component_layout() {
        assert_eq!(Format::R8Unorm.bytes_per_texel(), 1);
        assert_eq!(Format::Rg8Unorm.bytes_per_texel(), 2);
        assert_eq!(Format::Rgba8Unorm.bytes_per_texel(), 4);
        assert_eq!(Format::Rgba32Float.bytes_per_texel(), 16);
    }
}
