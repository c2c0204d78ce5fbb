// A recorded, submittable batch of GPU work, and the primary mechanism
// by which referenced resources have their lifetimes extended until the
// work that reads them has retired.
//
// Austin Shafer - 2024
use ash::vk;

use std::sync::Arc;

use crate::device::Device;
use crate::{Droppable, Result};

/// A single submittable command buffer plus its synchronization state.
///
/// `refs` exists purely to keep `Arc`-held resources alive: pushing a
/// clone of a resource's `Arc` here means it cannot be dropped until
/// `wait()` (or the deletion queue, for resources scheduled at the
/// submission's timeline point) releases it. This is the command-buffer-
/// as-refcounting-trick: the reference list is never read, only held.
pub struct CommandBuffer {
    c_dev: Arc<Device>,
    c_pool: vk::CommandPool,
    c_cbuf: vk::CommandBuffer,
    c_fence: vk::Fence,
    c_wait_semas: Vec<vk::Semaphore>,
    c_signal_semas: Vec<vk::Semaphore>,
    c_refs: Vec<Box<dyn Droppable + Send + Sync>>,
    c_recording: bool,
    c_pending: bool,
}

impl CommandBuffer {
    pub(crate) fn handle(&self) -> vk::CommandBuffer {
        self.c_cbuf
    }

    pub fn new(dev: Arc<Device>, queue_family: u32) -> Self {
        let pool = dev.create_command_pool(queue_family);
        let cbuf = dev.create_command_buffers(pool, 1)[0];

        let fence_info = vk::FenceCreateInfo::builder().flags(vk::FenceCreateFlags::SIGNALED);
        let fence = unsafe { dev.dev.create_fence(&fence_info, None).expect("Could not create fence") };

        Self {
            c_dev: dev,
            c_pool: pool,
            c_cbuf: cbuf,
            c_fence: fence,
            c_wait_semas: Vec::new(),
            c_signal_semas: Vec::new(),
            c_refs: Vec::new(),
            c_recording: false,
            c_pending: false,
        }
    }

    /// Waits for any previous submission to retire, then clears the
    /// reference/semaphore lists and begins recording.
    pub fn begin(&mut self) -> Result<()> {
        if self.c_pending {
            self.wait();
        }

        self.c_wait_semas.clear();
        self.c_signal_semas.clear();
        self.c_refs.clear();

        self.c_dev
            .cbuf_begin_recording(self.c_cbuf, vk::CommandBufferUsageFlags::SIMULTANEOUS_USE);
        self.c_recording = true;
        Ok(())
    }

    pub fn add_wait_sem(&mut self, sema: vk::Semaphore) {
        self.c_wait_semas.push(sema);
    }

    pub fn add_signal_sem(&mut self, sema: vk::Semaphore) {
        self.c_signal_semas.push(sema);
    }

    /// Extends the lifetime of `rc` until this command buffer's submission
    /// retires. Called once for every resource bound into the recording
    /// (pipeline, bindgroup, vertex/index buffers, render targets).
    pub fn ref_resource<T: Droppable + Send + Sync + 'static>(&mut self, rc: T) {
        self.c_refs.push(Box::new(rc));
    }

    /// Convenience wrapper for the common case of referencing a buffer by
    /// `Arc`, used for vertex/index/uniform buffers bound by a draw call.
    pub fn ref_buffer(&mut self, buf: Arc<crate::buffer::Buffer>) {
        self.ref_resource(buf);
    }

    pub(crate) fn raw(&self) -> vk::CommandBuffer {
        self.c_cbuf
    }

    /// Ends recording and submits, signalling `c_fence` and bumping the
    /// device's main timeline. Returns the timeline point this submission
    /// will signal, so callers can record it against referenced resources.
    pub fn submit(&mut self, queue: vk::Queue) -> u64 {
        self.c_dev.cbuf_end_recording(self.c_cbuf);
        self.c_recording = false;

        unsafe {
            self.c_dev
                .dev
                .reset_fences(&[self.c_fence])
                .expect("Could not reset fence");
        }

        let point = self.c_dev.current_timeline_point() + 1;
        self.c_dev
            .cbuf_submit_async(self.c_cbuf, queue, &self.c_wait_semas, &self.c_signal_semas);

        self.c_pending = true;
        point
    }

    /// Blocks until this command buffer's submission has retired, then
    /// drops every referenced resource and resets the pending state.
    pub fn wait(&mut self) {
        if !self.c_pending {
            return;
        }

        self.c_dev.wait_for_latest_timeline();
        self.c_refs.clear();
        self.c_pending = false;
    }

    /// Runs `record` against a fresh one-shot recording, submits it, and
    /// blocks until it retires. Used for setup work (layout transitions,
    /// one-off uploads) that doesn't need to interleave with frame work.
    pub fn begin_transient<F: FnOnce(vk::CommandBuffer)>(dev: &Device, pool: vk::CommandPool, record: F) {
        let cbuf = dev.create_command_buffers(pool, 1)[0];
        dev.cbuf_begin_recording(cbuf, vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        record(cbuf);
        dev.cbuf_end_recording(cbuf);
    }
}

impl Drop for CommandBuffer {
    fn drop(&mut self) {
        self.wait();
        unsafe {
            self.c_dev.dev.destroy_fence(self.c_fence, None);
            self.c_dev.dev.destroy_command_pool(self.c_pool, None);
        }
    }
}
