// Render-pass / RTT driver: walks a scene subtree, decides renderpass
// boundaries, and drives begin/end render pass plus the interruption
// heuristic that governs the depth attachment's store op.
//
// Austin Shafer - 2024
use ash::vk;

extern crate utils as cat5_utils;
use cat5_utils::log;

use std::sync::Arc;

use crate::device::Device;
use crate::rendertarget::{Attachment, ClearValue, LoadOp, Rendertarget, StoreOp};
use crate::texture::TextureUsage;
use crate::{GpuError, Result};

/// A node in the subtree being scanned for renderpass interruptions.
/// This mirrors the shape of the scene's render nodes as far as the
/// pass driver cares: either a plain draw, or something that forces the
/// current renderpass to end (a compute dispatch or a nested
/// render-to-texture subtree).
pub enum PassNode {
    Draw,
    Compute,
    Rtt(Vec<PassNode>),
}

/// Counts how many times a render streak in `nodes` is interrupted by a
/// compute dispatch or an RTT subtree. Nested RTT (an `Rtt` node
/// containing another `Rtt` node) is explicitly unsupported.
pub fn count_interruptions(nodes: &[PassNode]) -> Result<u32> {
    let mut interruptions = 0;
    for node in nodes {
        match node {
            PassNode::Draw => {}
            PassNode::Compute => interruptions += 1,
            PassNode::Rtt(children) => {
                interruptions += 1;
                if children.iter().any(|c| matches!(c, PassNode::Rtt(_))) {
                    return Err(GpuError::UNSUPPORTED);
                }
            }
        }
    }
    Ok(interruptions)
}

/// The depth attachment store-op decision derived from an interruption
/// count, applied to the first renderpass in the streak and to the
/// renderpass(es) resumed after each interruption.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepthStoreOps {
    pub first: StoreOp,
    pub resumed: StoreOp,
}

pub fn depth_store_ops(interruptions: u32) -> DepthStoreOps {
    match interruptions {
        0 => DepthStoreOps {
            first: StoreOp::DontCare,
            resumed: StoreOp::DontCare,
        },
        1 => DepthStoreOps {
            first: StoreOp::Store,
            resumed: StoreOp::DontCare,
        },
        _ => DepthStoreOps {
            first: StoreOp::Store,
            resumed: StoreOp::Store,
        },
    }
}

/// Clamps a requested sample count to the device's advertised maximum,
/// logging a warning on downgrade. Used for both color- and
/// depth-stencil-resolve requests per the RTT driver's silent-downgrade
/// rule.
pub fn clamp_samples(requested: u32, max_samples: u32) -> u32 {
    if requested > 1 && requested > max_samples {
        log::error!(
            "requested {}x MSAA but the device only supports up to {}x; downgrading to samples=0",
            requested,
            max_samples
        );
        0
    } else {
        requested
    }
}

/// Extends a color/depth texture's usage with the attachment bit the RTT
/// driver requires, per the automatic usage-extension rule.
pub fn extend_color_usage(usage: TextureUsage) -> TextureUsage {
    usage | TextureUsage::COLOR_ATTACHMENT
}

pub fn extend_depth_usage(usage: TextureUsage) -> TextureUsage {
    usage | TextureUsage::DEPTH_STENCIL_ATTACHMENT
}

/// Whether this is the first time the subtree is rendering into `rt`
/// this pass (load_op=CLEAR) or a resumption after an interruption
/// (load_op=LOAD).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassEntry {
    First,
    Resumed,
}

impl PassEntry {
    pub fn color_load_op(&self) -> LoadOp {
        match self {
            PassEntry::First => LoadOp::Clear,
            PassEntry::Resumed => LoadOp::Load,
        }
    }
}

/// Drives `vkCmdBeginRenderPass`/`vkCmdEndRenderPass` for one rendertarget,
/// and the post-draw mipmap-regen + uv-matrix-rewrite bookkeeping that
/// follows a render-to-texture subtree.
pub struct PassDriver {
    dev: Arc<Device>,
}

impl PassDriver {
    pub fn new(dev: Arc<Device>) -> Self {
        Self { dev }
    }

    /// Begins a renderpass over `rt`. The color load op, depth store op,
    /// and final layout this entry needs are already baked into `rt`'s
    /// own renderpass at `Rendertarget::new` time (see
    /// `depth_store_ops`/`PassEntry::color_load_op`, which the caller
    /// consults when building that rendertarget's attachments).
    pub fn begin_render_pass(&self, cbuf: vk::CommandBuffer, rt: &Rendertarget) {
        let mut clears = Vec::new();
        for c in rt.colors().iter() {
            clears.push(clear_value_to_vk(&c.clear_value));
        }
        if let Some(d) = rt.depth() {
            clears.push(clear_value_to_vk(&d.clear_value));
        }

        let render_area = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent: rt.extent(),
        };

        let begin_info = vk::RenderPassBeginInfo::builder()
            .render_pass(rt.renderpass())
            .framebuffer(rt.framebuffer())
            .render_area(render_area)
            .clear_values(&clears);

        unsafe {
            self.dev
                .dev
                .cmd_begin_render_pass(cbuf, &begin_info, vk::SubpassContents::INLINE);
        }
    }

    pub fn end_render_pass(&self, cbuf: vk::CommandBuffer) {
        unsafe { self.dev.dev.cmd_end_render_pass(cbuf) };
    }

    /// Runs the post-draw bookkeeping for a subtree that rendered into
    /// `colors`: regenerates mipmaps for any color attachment with a
    /// mipmap filter, then rewrites each written texture's uv matrix so
    /// later samplers read it correctly.
    pub fn finish_rtt_subtree(&self, colors: &[Attachment], uv_matrix: [[f32; 4]; 4]) -> Result<Vec<[[f32; 4]; 4]>> {
        let mut matrices = Vec::new();
        for c in colors.iter() {
            if c.texture.mip_levels() > 1 {
                c.texture.generate_mipmap()?;
            }
            matrices.push(uv_matrix);
        }
        Ok(matrices)
    }
}

fn clear_value_to_vk(v: &ClearValue) -> vk::ClearValue {
    match v {
        ClearValue::Color(c) => vk::ClearValue {
            color: vk::ClearColorValue { float32: *c },
        },
        ClearValue::DepthStencil(depth, stencil) => vk::ClearValue {
            depth_stencil: vk::ClearDepthStencilValue {
                depth: *depth,
                stencil: *stencil,
            },
        },
    }
}

/// The context's rendertarget-uv matrix: flips the v axis when sampling
/// from an offscreen rendertarget vs. the default framebuffer, since
/// Vulkan's clip space and image-space v axis run opposite directions.
pub fn rendertarget_uv_matrix(flip_y: bool) -> [[f32; 4]; 4] {
    if flip_y {
        [
            [1.0, 0.0, 0.0, 0.0],
            [0.0, -1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
            [0.0, 1.0, 0.0, 1.0],
        ]
    } else {
        [
            [1.0, 0.0, 0.0, 0.0],
            [0.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_interruptions_for_plain_draws() {
        let nodes = [PassNode::Draw, PassNode::Draw, PassNode::Draw];
        assert_eq!(count_interruptions(&nodes).unwrap(), 0);
    }

    #[test]
    fn compute_and_rtt_each_count_as_one_interruption() {
        let nodes = [PassNode::Draw, PassNode::Compute, PassNode::Rtt(vec![PassNode::Draw]), PassNode::Draw];
        assert_eq!(count_interruptions(&nodes).unwrap(), 2);
    }

    #[test]
    fn nested_rtt_is_unsupported() {
        let nested = PassNode::Rtt(vec![PassNode::Rtt(vec![PassNode::Draw])]);
        assert_eq!(count_interruptions(&[nested]), Err(GpuError::UNSUPPORTED));
    }

    #[test]
    fn depth_store_op_follows_interruption_count() {
        assert_eq!(depth_store_ops(0), DepthStoreOps { first: StoreOp::DontCare, resumed: StoreOp::DontCare });
        assert_eq!(depth_store_ops(1), DepthStoreOps { first: StoreOp::Store, resumed: StoreOp::DontCare });
        assert_eq!(depth_store_ops(2), DepthStoreOps { first: StoreOp::Store, resumed: StoreOp::Store });
        assert_eq!(depth_store_ops(7), DepthStoreOps { first: StoreOp::Store, resumed: StoreOp::Store });
    }

    #[test]
    fn sample_count_within_limit_is_unchanged() {
        assert_eq!(clamp_samples(4, 8), 4);
        assert_eq!(clamp_samples(1, 1), 1);
    }

    #[test]
    fn sample_count_above_limit_downgrades_to_no_msaa() {
        assert_eq!(clamp_samples(8, 4), 0);
    }

    #[test]
    fn usage_extension_adds_the_attachment_bit_without_dropping_existing_ones() {
        let color = extend_color_usage(TextureUsage::SAMPLED);
        assert!(color.contains(TextureUsage::SAMPLED));
        assert!(color.contains(TextureUsage::COLOR_ATTACHMENT));

        let depth = extend_depth_usage(TextureUsage::TRANSFER_SRC);
        assert!(depth.contains(TextureUsage::TRANSFER_SRC));
        assert!(depth.contains(TextureUsage::DEPTH_STENCIL_ATTACHMENT));
    }

    #[test]
    fn uv_matrix_flips_only_the_v_row() {
        let flipped = rendertarget_uv_matrix(true);
        let plain = rendertarget_uv_matrix(false);
        assert_eq!(flipped[1][1], -1.0);
        assert_eq!(plain[1][1], 1.0);
        assert_eq!(flipped[0], plain[0]);
    }
}
