// Graphics or compute PSO: ties program + bindgroup layout + fixed
// function state together.
//
// Austin Shafer - 2024
use ash::vk;

use std::sync::Arc;

use crate::bindgroup::BindGroupLayout;
use crate::device::Device;
use crate::program::Program;
use crate::rendertarget::{RenderpassCache, RendertargetLayout};
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineKind {
    Graphics,
    Compute,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topology {
    PointList,
    LineList,
    LineStrip,
    TriangleList,
    TriangleStrip,
}

impl Topology {
    fn to_vk(&self) -> vk::PrimitiveTopology {
        match self {
            Topology::PointList => vk::PrimitiveTopology::POINT_LIST,
            Topology::LineList => vk::PrimitiveTopology::LINE_LIST,
            Topology::LineStrip => vk::PrimitiveTopology::LINE_STRIP,
            Topology::TriangleList => vk::PrimitiveTopology::TRIANGLE_LIST,
            Topology::TriangleStrip => vk::PrimitiveTopology::TRIANGLE_STRIP,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputRate {
    Vertex,
    Instance,
}

#[derive(Debug, Clone, Copy)]
pub struct VertexAttribute {
    pub location: u32,
    pub format: vk::Format,
    pub offset: u32,
}

#[derive(Clone)]
pub struct VertexBufferLayout {
    pub stride: u32,
    pub input_rate: InputRate,
    pub attributes: Vec<VertexAttribute>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendFactor {
    Zero,
    One,
    SrcAlpha,
    OneMinusSrcAlpha,
    DstAlpha,
    OneMinusDstAlpha,
}

impl BlendFactor {
    fn to_vk(&self) -> vk::BlendFactor {
        match self {
            BlendFactor::Zero => vk::BlendFactor::ZERO,
            BlendFactor::One => vk::BlendFactor::ONE,
            BlendFactor::SrcAlpha => vk::BlendFactor::SRC_ALPHA,
            BlendFactor::OneMinusSrcAlpha => vk::BlendFactor::ONE_MINUS_SRC_ALPHA,
            BlendFactor::DstAlpha => vk::BlendFactor::DST_ALPHA,
            BlendFactor::OneMinusDstAlpha => vk::BlendFactor::ONE_MINUS_DST_ALPHA,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendOp {
    Add,
    Subtract,
    ReverseSubtract,
}

impl BlendOp {
    fn to_vk(&self) -> vk::BlendOp {
        match self {
            BlendOp::Add => vk::BlendOp::ADD,
            BlendOp::Subtract => vk::BlendOp::SUBTRACT,
            BlendOp::ReverseSubtract => vk::BlendOp::REVERSE_SUBTRACT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Never,
    Less,
    Equal,
    LessOrEqual,
    Greater,
    NotEqual,
    GreaterOrEqual,
    Always,
}

impl CompareOp {
    fn to_vk(&self) -> vk::CompareOp {
        match self {
            CompareOp::Never => vk::CompareOp::NEVER,
            CompareOp::Less => vk::CompareOp::LESS,
            CompareOp::Equal => vk::CompareOp::EQUAL,
            CompareOp::LessOrEqual => vk::CompareOp::LESS_OR_EQUAL,
            CompareOp::Greater => vk::CompareOp::GREATER,
            CompareOp::NotEqual => vk::CompareOp::NOT_EQUAL,
            CompareOp::GreaterOrEqual => vk::CompareOp::GREATER_OR_EQUAL,
            CompareOp::Always => vk::CompareOp::ALWAYS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StencilOp {
    Keep,
    Zero,
    Replace,
    IncrementClamp,
    DecrementClamp,
    Invert,
    IncrementWrap,
    DecrementWrap,
}

impl StencilOp {
    fn to_vk(&self) -> vk::StencilOp {
        match self {
            StencilOp::Keep => vk::StencilOp::KEEP,
            StencilOp::Zero => vk::StencilOp::ZERO,
            StencilOp::Replace => vk::StencilOp::REPLACE,
            StencilOp::IncrementClamp => vk::StencilOp::INCREMENT_AND_CLAMP,
            StencilOp::DecrementClamp => vk::StencilOp::DECREMENT_AND_CLAMP,
            StencilOp::Invert => vk::StencilOp::INVERT,
            StencilOp::IncrementWrap => vk::StencilOp::INCREMENT_AND_WRAP,
            StencilOp::DecrementWrap => vk::StencilOp::DECREMENT_AND_WRAP,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct StencilFaceState {
    pub fail: StencilOp,
    pub depth_pass: StencilOp,
    pub depth_fail: StencilOp,
    pub compare: CompareOp,
    pub read_mask: u32,
    pub write_mask: u32,
    pub reference: u32,
}

impl Default for StencilFaceState {
    fn default() -> Self {
        Self {
            fail: StencilOp::Keep,
            depth_pass: StencilOp::Keep,
            depth_fail: StencilOp::Keep,
            compare: CompareOp::Always,
            read_mask: 0xff,
            write_mask: 0xff,
            reference: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CullMode {
    None,
    Front,
    Back,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrontFace {
    Cw,
    Ccw,
}

#[derive(Debug, Clone, Copy)]
pub struct BlendState {
    pub enable: bool,
    pub src_color: BlendFactor,
    pub dst_color: BlendFactor,
    pub color_op: BlendOp,
    pub src_alpha: BlendFactor,
    pub dst_alpha: BlendFactor,
    pub alpha_op: BlendOp,
}

impl Default for BlendState {
    fn default() -> Self {
        Self {
            enable: false,
            src_color: BlendFactor::One,
            dst_color: BlendFactor::Zero,
            color_op: BlendOp::Add,
            src_alpha: BlendFactor::One,
            dst_alpha: BlendFactor::Zero,
            alpha_op: BlendOp::Add,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DepthState {
    pub test: bool,
    pub write: bool,
    pub compare: CompareOp,
}

impl Default for DepthState {
    fn default() -> Self {
        Self {
            test: true,
            write: true,
            compare: CompareOp::Less,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct StencilState {
    pub test: bool,
    pub front: StencilFaceState,
    pub back: StencilFaceState,
}

impl Default for StencilState {
    fn default() -> Self {
        Self {
            test: false,
            front: StencilFaceState::default(),
            back: StencilFaceState::default(),
        }
    }
}

/// Fixed-function pipeline state, applied either baked into the PSO
/// (Vulkan) or replayed as `gl*` state calls before each draw (OpenGL).
#[derive(Clone)]
pub struct FixedFunctionState {
    pub blend: BlendState,
    pub color_write_mask: vk::ColorComponentFlags,
    pub depth: DepthState,
    pub stencil: StencilState,
    pub cull_mode: CullMode,
    pub front_face: FrontFace,
}

impl Default for FixedFunctionState {
    fn default() -> Self {
        Self {
            blend: BlendState::default(),
            color_write_mask: vk::ColorComponentFlags::R
                | vk::ColorComponentFlags::G
                | vk::ColorComponentFlags::B
                | vk::ColorComponentFlags::A,
            depth: DepthState::default(),
            stencil: StencilState::default(),
            cull_mode: CullMode::None,
            front_face: FrontFace::Ccw,
        }
    }
}

pub struct GraphicsState {
    pub vertex_buffers: Vec<VertexBufferLayout>,
    pub rt_layout: RendertargetLayout,
    pub topology: Topology,
    pub fixed_function: FixedFunctionState,
}

/// A graphics or compute pipeline state object. Immutable once
/// initialized, aside from bound resources and dynamic state (viewport,
/// scissor, line width).
pub struct Pipeline {
    p_dev: Arc<Device>,
    p_kind: PipelineKind,
    p_layout: vk::PipelineLayout,
    p_pipeline: vk::Pipeline,
}

impl Pipeline {
    pub(crate) fn handle(&self) -> vk::Pipeline {
        self.p_pipeline
    }

    pub(crate) fn bind_point(&self) -> vk::PipelineBindPoint {
        match self.p_kind {
            PipelineKind::Graphics => vk::PipelineBindPoint::GRAPHICS,
            PipelineKind::Compute => vk::PipelineBindPoint::COMPUTE,
        }
    }

    pub(crate) fn layout(&self) -> vk::PipelineLayout {
        self.p_layout
    }

    pub fn kind(&self) -> PipelineKind {
        self.p_kind
    }

    pub fn new_graphics(
        dev: Arc<Device>,
        program: &Program,
        bindgroup_layout: &BindGroupLayout,
        state: &GraphicsState,
        renderpass_cache: &RenderpassCache,
    ) -> Result<Self> {
        let set_layouts = [bindgroup_layout.set_layout()];
        let layout_info = vk::PipelineLayoutCreateInfo::builder().set_layouts(&set_layouts);
        let layout = unsafe {
            dev.dev
                .create_pipeline_layout(&layout_info, None)
                .map_err(crate::error::map_vk_result)?
        };

        let mut bindings = Vec::new();
        let mut attributes = Vec::new();
        for (i, vb) in state.vertex_buffers.iter().enumerate() {
            bindings.push(vk::VertexInputBindingDescription {
                binding: i as u32,
                stride: vb.stride,
                input_rate: match vb.input_rate {
                    InputRate::Vertex => vk::VertexInputRate::VERTEX,
                    InputRate::Instance => vk::VertexInputRate::INSTANCE,
                },
            });
            for attr in vb.attributes.iter() {
                attributes.push(vk::VertexInputAttributeDescription {
                    location: attr.location,
                    binding: i as u32,
                    format: attr.format,
                    offset: attr.offset,
                });
            }
        }

        let vertex_input = vk::PipelineVertexInputStateCreateInfo::builder()
            .vertex_binding_descriptions(&bindings)
            .vertex_attribute_descriptions(&attributes);

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::builder()
            .topology(state.topology.to_vk())
            .primitive_restart_enable(false);

        let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
            .viewport_count(1)
            .scissor_count(1);

        let raster = vk::PipelineRasterizationStateCreateInfo::builder()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(vk::PolygonMode::FILL)
            .line_width(1.0)
            .cull_mode(match state.fixed_function.cull_mode {
                CullMode::None => vk::CullModeFlags::NONE,
                CullMode::Front => vk::CullModeFlags::FRONT,
                CullMode::Back => vk::CullModeFlags::BACK,
            })
            .front_face(match state.fixed_function.front_face {
                FrontFace::Cw => vk::FrontFace::CLOCKWISE,
                FrontFace::Ccw => vk::FrontFace::COUNTER_CLOCKWISE,
            });

        let multisample = vk::PipelineMultisampleStateCreateInfo::builder()
            .rasterization_samples(crate::texture::samples_to_vk(state.rt_layout.samples))
            .sample_shading_enable(false);

        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::builder()
            .depth_test_enable(state.fixed_function.depth.test)
            .depth_write_enable(state.fixed_function.depth.write)
            .depth_compare_op(state.fixed_function.depth.compare.to_vk())
            .stencil_test_enable(state.fixed_function.stencil.test)
            .front(stencil_op_state(&state.fixed_function.stencil.front))
            .back(stencil_op_state(&state.fixed_function.stencil.back));

        let blend = &state.fixed_function.blend;
        let attachment = vk::PipelineColorBlendAttachmentState::builder()
            .blend_enable(blend.enable)
            .src_color_blend_factor(blend.src_color.to_vk())
            .dst_color_blend_factor(blend.dst_color.to_vk())
            .color_blend_op(blend.color_op.to_vk())
            .src_alpha_blend_factor(blend.src_alpha.to_vk())
            .dst_alpha_blend_factor(blend.dst_alpha.to_vk())
            .alpha_blend_op(blend.alpha_op.to_vk())
            .color_write_mask(state.fixed_function.color_write_mask)
            .build();
        let attachments = vec![attachment; state.rt_layout.colors.len().max(1)];
        let color_blend = vk::PipelineColorBlendStateCreateInfo::builder().attachments(&attachments);

        let dynamic_states = [
            vk::DynamicState::VIEWPORT,
            vk::DynamicState::SCISSOR,
            vk::DynamicState::LINE_WIDTH,
        ];
        let dynamic_state = vk::PipelineDynamicStateCreateInfo::builder().dynamic_states(&dynamic_states);

        let renderpass = renderpass_cache.get_or_create(&dev, &state.rt_layout)?;
        let stages = program.stage_create_infos(&dev);

        let create_info = vk::GraphicsPipelineCreateInfo::builder()
            .stages(&stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&raster)
            .multisample_state(&multisample)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blend)
            .dynamic_state(&dynamic_state)
            .layout(layout)
            .render_pass(renderpass)
            .subpass(0);

        let pipeline = unsafe {
            dev.dev
                .create_graphics_pipelines(vk::PipelineCache::null(), &[create_info.build()], None)
                .map_err(|(_, e)| crate::error::map_vk_result(e))?[0]
        };

        Ok(Self {
            p_dev: dev,
            p_kind: PipelineKind::Graphics,
            p_layout: layout,
            p_pipeline: pipeline,
        })
    }

    pub fn new_compute(dev: Arc<Device>, program: &Program, bindgroup_layout: &BindGroupLayout) -> Result<Self> {
        let set_layouts = [bindgroup_layout.set_layout()];
        let layout_info = vk::PipelineLayoutCreateInfo::builder().set_layouts(&set_layouts);
        let layout = unsafe {
            dev.dev
                .create_pipeline_layout(&layout_info, None)
                .map_err(crate::error::map_vk_result)?
        };

        let stages = program.stage_create_infos(&dev);
        let create_info = vk::ComputePipelineCreateInfo::builder().stage(stages[0]).layout(layout);

        let pipeline = unsafe {
            dev.dev
                .create_compute_pipelines(vk::PipelineCache::null(), &[create_info.build()], None)
                .map_err(|(_, e)| crate::error::map_vk_result(e))?[0]
        };

        Ok(Self {
            p_dev: dev,
            p_kind: PipelineKind::Compute,
            p_layout: layout,
            p_pipeline: pipeline,
        })
    }
}

fn stencil_op_state(face: &StencilFaceState) -> vk::StencilOpState {
    vk::StencilOpState {
        fail_op: face.fail.to_vk(),
        pass_op: face.depth_pass.to_vk(),
        depth_fail_op: face.depth_fail.to_vk(),
        compare_op: face.compare.to_vk(),
        compare_mask: face.read_mask,
        write_mask: face.write_mask,
        reference: face.reference,
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        unsafe {
            self.p_dev.dev.destroy_pipeline(self.p_pipeline, None);
            self.p_dev.dev.destroy_pipeline_layout(self.p_layout, None);
        }
    }
}
