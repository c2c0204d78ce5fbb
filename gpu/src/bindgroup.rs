// Shader resource bindings: uniform/storage buffers, sampled/storage
// textures, and the descriptor pool chain backing their allocation.
//
// Austin Shafer - 2024
use ash::vk;

use std::sync::{Arc, Mutex};

use crate::buffer::Buffer;
use crate::device::Device;
use crate::dummy_texture::DummyTexture;
use crate::texture::Texture;
use crate::{GpuError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingKind {
    UniformBuffer,
    UniformBufferDynamic,
    StorageBuffer,
    StorageBufferDynamic,
    SampledTexture,
    StorageImage,
}

impl BindingKind {
    fn to_vk(&self) -> vk::DescriptorType {
        match self {
            BindingKind::UniformBuffer => vk::DescriptorType::UNIFORM_BUFFER,
            BindingKind::UniformBufferDynamic => vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC,
            BindingKind::StorageBuffer => vk::DescriptorType::STORAGE_BUFFER,
            BindingKind::StorageBufferDynamic => vk::DescriptorType::STORAGE_BUFFER_DYNAMIC,
            BindingKind::SampledTexture => vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            BindingKind::StorageImage => vk::DescriptorType::STORAGE_IMAGE,
        }
    }

    fn is_buffer(&self) -> bool {
        matches!(
            self,
            BindingKind::UniformBuffer
                | BindingKind::UniformBufferDynamic
                | BindingKind::StorageBuffer
                | BindingKind::StorageBufferDynamic
        )
    }
}

#[derive(Clone, Copy)]
pub struct BindGroupLayoutEntry {
    pub binding: u32,
    pub kind: BindingKind,
    pub stage_mask: vk::ShaderStageFlags,
    pub immutable_sampler: Option<vk::Sampler>,
}

/// Starts with `max_sets = 32`; each pool's per-type sizes are
/// `nb_in_flight_frames * 32` per distinct descriptor type in the layout.
/// On `OUT_OF_POOL_MEMORY`/`FRAGMENTED_POOL` the chain doubles `max_sets`
/// and allocates a new pool, capped so the cumulative set count never
/// exceeds `MAX_TOTAL_SETS` (see DESIGN.md for why this cap exists: the
/// source this was ported from doesn't enforce one).
const MAX_TOTAL_SETS: u32 = 8192;

struct DescriptorPoolChain {
    pools: Vec<vk::DescriptorPool>,
    pool_sizes: Vec<vk::DescriptorPoolSize>,
    max_sets: u32,
    total_sets: u32,
    next_pool: usize,
}

impl DescriptorPoolChain {
    fn new(dev: &Device, entries: &[BindGroupLayoutEntry], nb_in_flight_frames: u32) -> Result<Self> {
        let mut sizes: Vec<vk::DescriptorPoolSize> = Vec::new();
        for e in entries.iter() {
            let ty = e.kind.to_vk();
            if let Some(s) = sizes.iter_mut().find(|s: &&mut vk::DescriptorPoolSize| s.ty == ty) {
                s.descriptor_count += nb_in_flight_frames * 32;
            } else {
                sizes.push(vk::DescriptorPoolSize {
                    ty,
                    descriptor_count: nb_in_flight_frames * 32,
                });
            }
        }

        let mut chain = Self {
            pools: Vec::new(),
            pool_sizes: sizes,
            max_sets: 32,
            total_sets: 0,
            next_pool: 0,
        };
        chain.add_pool(dev)?;
        Ok(chain)
    }

    fn add_pool(&mut self, dev: &Device) -> Result<()> {
        let info = vk::DescriptorPoolCreateInfo::builder()
            .max_sets(self.max_sets)
            .pool_sizes(&self.pool_sizes)
            .flags(vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET);

        let pool = unsafe { dev.dev.create_descriptor_pool(&info, None).map_err(crate::error::map_vk_result)? };
        self.pools.push(pool);
        self.total_sets += self.max_sets;
        Ok(())
    }

    fn alloc(&mut self, dev: &Device, set_layout: vk::DescriptorSetLayout) -> Result<vk::DescriptorSet> {
        let layouts = [set_layout];

        for _ in 0..2 {
            let pool = self.pools[self.next_pool % self.pools.len()];
            self.next_pool = (self.next_pool + 1) % self.pools.len();

            let info = vk::DescriptorSetAllocateInfo::builder()
                .descriptor_pool(pool)
                .set_layouts(&layouts);

            match unsafe { dev.dev.allocate_descriptor_sets(&info) } {
                Ok(sets) => return Ok(sets[0]),
                Err(vk::Result::ERROR_OUT_OF_POOL_MEMORY) | Err(vk::Result::ERROR_FRAGMENTED_POOL) => {
                    if self.total_sets >= MAX_TOTAL_SETS {
                        return Err(GpuError::OUT_OF_POOL_MEMORY);
                    }
                    self.max_sets *= 2;
                    self.add_pool(dev)?;
                    continue;
                }
                Err(e) => return Err(crate::error::map_vk_result(e)),
            }
        }

        Err(GpuError::OUT_OF_POOL_MEMORY)
    }

    fn destroy(&mut self, dev: &Device) {
        for pool in self.pools.drain(..) {
            unsafe { dev.dev.destroy_descriptor_pool(pool, None) };
        }
    }
}

/// Ordered list of entries describing the shader resources a bindgroup
/// built from this layout can bind.
pub struct BindGroupLayout {
    l_dev: Arc<Device>,
    l_entries: Vec<BindGroupLayoutEntry>,
    l_set_layout: vk::DescriptorSetLayout,
    l_pool_chain: Mutex<DescriptorPoolChain>,
}

impl BindGroupLayout {
    pub fn new(dev: Arc<Device>, entries: Vec<BindGroupLayoutEntry>, nb_in_flight_frames: u32) -> Result<Self> {
        let bindings: Vec<vk::DescriptorSetLayoutBinding> = entries
            .iter()
            .map(|e| {
                let mut b = vk::DescriptorSetLayoutBinding::builder()
                    .binding(e.binding)
                    .descriptor_type(e.kind.to_vk())
                    .descriptor_count(1)
                    .stage_flags(e.stage_mask);
                if let Some(sampler) = &e.immutable_sampler {
                    b = b.immutable_samplers(std::slice::from_ref(sampler));
                }
                b.build()
            })
            .collect();

        let info = vk::DescriptorSetLayoutCreateInfo::builder().bindings(&bindings);
        let set_layout = unsafe {
            dev.dev
                .create_descriptor_set_layout(&info, None)
                .map_err(crate::error::map_vk_result)?
        };

        let pool_chain = DescriptorPoolChain::new(&dev, &entries, nb_in_flight_frames)?;

        Ok(Self {
            l_dev: dev,
            l_entries: entries,
            l_set_layout: set_layout,
            l_pool_chain: Mutex::new(pool_chain),
        })
    }

    pub(crate) fn set_layout(&self) -> vk::DescriptorSetLayout {
        self.l_set_layout
    }

    pub fn entries(&self) -> &[BindGroupLayoutEntry] {
        &self.l_entries
    }
}

impl Drop for BindGroupLayout {
    fn drop(&mut self) {
        self.l_pool_chain.lock().unwrap().destroy(&self.l_dev);
        unsafe { self.l_dev.dev.destroy_descriptor_set_layout(self.l_set_layout, None) };
    }
}

/// A resource bound to one entry of a bindgroup.
pub enum BindGroupEntry {
    Buffer { buffer: Arc<Buffer>, offset: u64, size: u64 },
    Texture(Option<Arc<Texture>>),
    Empty,
}

/// An instance of a [`BindGroupLayout`] bound to concrete resources.
pub struct BindGroup {
    g_dev: Arc<Device>,
    g_layout: Arc<BindGroupLayout>,
    g_set: vk::DescriptorSet,
    g_entries: Vec<BindGroupEntry>,
    g_dirty: bool,
}

impl BindGroup {
    pub fn new(dev: Arc<Device>, layout: Arc<BindGroupLayout>) -> Result<Self> {
        let set = layout.l_pool_chain.lock().unwrap().alloc(&dev, layout.l_set_layout)?;
        let entries = layout.l_entries.iter().map(|_| BindGroupEntry::Empty).collect();

        Ok(Self {
            g_dev: dev,
            g_layout: layout,
            g_set: set,
            g_entries: entries,
            g_dirty: true,
        })
    }

    pub(crate) fn descriptor_set(&self) -> vk::DescriptorSet {
        self.g_set
    }

    pub fn layout(&self) -> &Arc<BindGroupLayout> {
        &self.g_layout
    }

    pub fn update_buffer(&mut self, index: usize, buffer: Arc<Buffer>, offset: u64, size: u64) {
        self.g_entries[index] = BindGroupEntry::Buffer { buffer, offset, size };
        self.g_dirty = true;
    }

    pub fn update_texture(&mut self, index: usize, texture: Option<Arc<Texture>>) {
        self.g_entries[index] = BindGroupEntry::Texture(texture);
        self.g_dirty = true;
    }

    /// Rewrites only the dirty entries of the descriptor set. Called
    /// lazily from the context's `set_bindgroup` before a draw/dispatch
    /// that references this bindgroup.
    pub(crate) fn update_descriptor_set(&mut self, dummy: &DummyTexture) {
        if !self.g_dirty {
            return;
        }

        // Reserved up front and never reallocated: the `WriteDescriptorSet`
        // builders below hold raw pointers into these vectors, which a
        // `push`-triggered reallocation would dangle.
        let n = self.g_entries.len();
        let mut buffer_infos = Vec::with_capacity(n);
        let mut image_infos = Vec::with_capacity(n);
        let mut writes = Vec::new();

        for (i, entry) in self.g_entries.iter().enumerate() {
            let layout_entry = &self.g_layout.l_entries[i];

            match entry {
                BindGroupEntry::Buffer { buffer, offset, size } => {
                    buffer_infos.push(vk::DescriptorBufferInfo {
                        buffer: buffer.handle(),
                        offset: *offset,
                        range: *size,
                    });
                    let info_ref = buffer_infos.last().unwrap();
                    writes.push(
                        vk::WriteDescriptorSet::builder()
                            .dst_set(self.g_set)
                            .dst_binding(layout_entry.binding)
                            .descriptor_type(layout_entry.kind.to_vk())
                            .buffer_info(std::slice::from_ref(info_ref))
                            .build(),
                    );
                }
                BindGroupEntry::Texture(tex) => {
                    let tex = tex.as_ref().map(|t| t.as_ref()).unwrap_or(dummy.texture());
                    image_infos.push(vk::DescriptorImageInfo {
                        sampler: tex.sampler(),
                        image_view: tex.view(),
                        image_layout: tex.resting_layout(),
                    });
                    let info_ref = image_infos.last().unwrap();
                    writes.push(
                        vk::WriteDescriptorSet::builder()
                            .dst_set(self.g_set)
                            .dst_binding(layout_entry.binding)
                            .descriptor_type(layout_entry.kind.to_vk())
                            .image_info(std::slice::from_ref(info_ref))
                            .build(),
                    );
                }
                BindGroupEntry::Empty => {
                    if layout_entry.kind.is_buffer() {
                        continue;
                    }
                    image_infos.push(vk::DescriptorImageInfo {
                        sampler: dummy.texture().sampler(),
                        image_view: dummy.texture().view(),
                        image_layout: dummy.texture().resting_layout(),
                    });
                    let info_ref = image_infos.last().unwrap();
                    writes.push(
                        vk::WriteDescriptorSet::builder()
                            .dst_set(self.g_set)
                            .dst_binding(layout_entry.binding)
                            .descriptor_type(layout_entry.kind.to_vk())
                            .image_info(std::slice::from_ref(info_ref))
                            .build(),
                    );
                }
            }
        }

        unsafe { self.g_dev.dev.update_descriptor_sets(&writes, &[]) };
        self.g_dirty = false;
    }
}
