// Compiled shader stages (vert/frag or compute)
//
// Austin Shafer - 2024
use ash::vk;

use std::ffi::CString;
use std::sync::Arc;

use crate::device::Device;
use crate::Result;

/// The compiled payload for one shader stage.
///
/// SPIR-V words in, a `VkShaderModule` out. The OpenGL backend skips the
/// module step entirely and keeps the GLSL source around for its own
/// compile-at-pipeline-creation path.
enum StagePayload {
    SpirV(vk::ShaderModule),
    Glsl(String),
}

struct Stage {
    payload: StagePayload,
    entry_point: CString,
}

/// An immutable compiled shader payload, either a graphics program
/// (vertex + fragment) or a compute program.
pub enum Program {
    Graphics { vertex: Stage, fragment: Stage },
    Compute { compute: Stage },
}

impl Program {
    /// Builds a graphics program from SPIR-V words.
    pub fn graphics_spirv(dev: &Device, vertex_spirv: &[u32], fragment_spirv: &[u32]) -> Result<Self> {
        let vertex = Stage {
            payload: StagePayload::SpirV(create_module(dev, vertex_spirv)?),
            entry_point: CString::new("main").unwrap(),
        };
        let fragment = Stage {
            payload: StagePayload::SpirV(create_module(dev, fragment_spirv)?),
            entry_point: CString::new("main").unwrap(),
        };
        Ok(Program::Graphics { vertex, fragment })
    }

    /// Builds a compute program from SPIR-V words.
    pub fn compute_spirv(dev: &Device, compute_spirv: &[u32]) -> Result<Self> {
        let compute = Stage {
            payload: StagePayload::SpirV(create_module(dev, compute_spirv)?),
            entry_point: CString::new("main").unwrap(),
        };
        Ok(Program::Compute { compute })
    }

    /// Builds a graphics program from GLSL 450 source, for the OpenGL
    /// backend. Compilation is deferred to pipeline creation, since GL
    /// has no separate shader-module object.
    pub fn graphics_glsl(vertex_src: String, fragment_src: String) -> Self {
        Program::Graphics {
            vertex: Stage {
                payload: StagePayload::Glsl(vertex_src),
                entry_point: CString::new("main").unwrap(),
            },
            fragment: Stage {
                payload: StagePayload::Glsl(fragment_src),
                entry_point: CString::new("main").unwrap(),
            },
        }
    }

    pub(crate) fn stage_create_infos(&self, dev: &Device) -> Vec<vk::PipelineShaderStageCreateInfo> {
        let mut infos = Vec::new();
        match self {
            Program::Graphics { vertex, fragment } => {
                infos.push(stage_info(vertex, vk::ShaderStageFlags::VERTEX));
                infos.push(stage_info(fragment, vk::ShaderStageFlags::FRAGMENT));
            }
            Program::Compute { compute } => {
                infos.push(stage_info(compute, vk::ShaderStageFlags::COMPUTE));
            }
        }
        let _ = dev;
        infos
    }

    pub fn is_compute(&self) -> bool {
        matches!(self, Program::Compute { .. })
    }

    pub(crate) fn destroy(&self, dev: &Device) {
        let stages: Vec<&Stage> = match self {
            Program::Graphics { vertex, fragment } => vec![vertex, fragment],
            Program::Compute { compute } => vec![compute],
        };
        for stage in stages {
            if let StagePayload::SpirV(module) = stage.payload {
                unsafe { dev.dev.destroy_shader_module(module, None) };
            }
        }
    }
}

fn stage_info(stage: &Stage, flag: vk::ShaderStageFlags) -> vk::PipelineShaderStageCreateInfo {
    let module = match stage.payload {
        StagePayload::SpirV(m) => m,
        StagePayload::Glsl(_) => vk::ShaderModule::null(),
    };
    vk::PipelineShaderStageCreateInfo::builder()
        .stage(flag)
        .module(module)
        .name(stage.entry_point.as_c_str())
        .build()
}

fn create_module(dev: &Device, spirv: &[u32]) -> Result<vk::ShaderModule> {
    let info = vk::ShaderModuleCreateInfo::builder().code(spirv);
    unsafe {
        dev.dev
            .create_shader_module(&info, None)
            .map_err(crate::error::map_vk_result)
    }
}

/// A program owned and destroyed alongside the device that created it.
pub struct OwnedProgram {
    p_dev: Arc<Device>,
    pub program: Program,
}

impl OwnedProgram {
    pub fn new(dev: Arc<Device>, program: Program) -> Self {
        Self { p_dev: dev, program }
    }
}

impl Drop for OwnedProgram {
    fn drop(&mut self) {
        self.program.destroy(&self.p_dev);
    }
}
