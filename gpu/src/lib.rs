// A GPU abstraction layer multiplexing Vulkan and OpenGL/ES behind one
// object model, plus the render-pass/RTT orchestration layer that
// drives it.
//
// Austin Shafer - 2024

#[macro_use]
extern crate memoffset;
extern crate utils;

pub mod bindgroup;
pub mod buffer;
pub mod command_buffer;
pub mod config;
pub mod context;
pub mod damage;
pub mod deletion_queue;
pub mod device;
pub mod dummy_texture;
pub mod error;
pub mod format;
pub mod instance;
pub mod limits;
pub mod opengl;
pub mod pass;
pub mod pipeline;
pub mod platform;
pub mod program;
pub mod rendertarget;
pub mod rnode;
pub mod texture;

mod display;

pub use bindgroup::{BindGroup, BindGroupEntry, BindGroupLayout, BindGroupLayoutEntry};
pub use buffer::{Buffer, BufferUsage};
pub use command_buffer::CommandBuffer;
pub use config::{Backend, CreateInfo, CreateInfoBuilder, WindowHandles};
pub use context::GpuContext;
pub use damage::{Damage, DamageRegion};
pub use deletion_queue::DeletionQueue;
pub use device::Device;
pub use error::{map_vk_result, GpuError, Result};
pub use format::{Aspect, Format};
pub use instance::Instance;
pub use limits::{Features, Limits};
pub use opengl::GlContext;
pub use pipeline::{FixedFunctionState, Pipeline, PipelineKind};
pub use program::Program;
pub use rendertarget::{Rendertarget, RendertargetLayout};
pub use rnode::Rnode;
pub use texture::{Texture, TextureType, TextureUsage};

/// Marker trait for any resource a [`DeletionQueue`] can hold a lifetime
/// extension on. A command buffer or deletion queue only needs to be
/// able to drop the object at the right time, so this is blanket
/// implemented for everything rather than requiring resource types to
/// opt in individually.
pub trait Droppable {}
impl<T> Droppable for T {}
