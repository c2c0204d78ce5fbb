// Fallback texture bound to any unbound sampler slot
//
// Vulkan disallows unbound descriptors; a bindgroup entry whose texture
// is left `None` at descriptor-set write time resolves to this instead.
//
// Austin Shafer - 2024
use std::sync::Arc;

use crate::device::Device;
use crate::format::Format;
use crate::texture::{Texture, TextureParams, TextureType, TextureUsage};
use crate::Result;

/// A single 1x1 RGBA8 all-zero texture, usable as both a sampled and a
/// storage image.
pub struct DummyTexture {
    d_texture: Texture,
}

impl DummyTexture {
    pub fn new(dev: Arc<Device>) -> Result<Self> {
        let params = TextureParams {
            ty: TextureType::D2,
            format: Format::Rgba8Unorm,
            width: 1,
            height: 1,
            depth: 1,
            samples: 1,
            usage: TextureUsage::SAMPLED | TextureUsage::STORAGE | TextureUsage::TRANSFER_DST,
            ..TextureParams::default()
        };

        let texture = Texture::new(dev, params)?;
        texture.upload(&[0u8, 0, 0, 0], 0)?;

        Ok(Self { d_texture: texture })
    }

    pub fn texture(&self) -> &Texture {
        &self.d_texture
    }
}
