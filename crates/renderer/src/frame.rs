//! Per-slot frame resources.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use renderer_rhi::buffer::{Buffer, BufferUsage, BufferView};
use renderer_rhi::command::{CommandBuffer, CommandPool};
use renderer_rhi::device::Device;
use renderer_rhi::sync::{Fence, Semaphore};

use crate::MAX_FRAMES_IN_FLIGHT;
use crate::deletion_queue::DeletionQueue;
use crate::descriptors::{DescriptorManager, FrameSets};
use crate::error::RenderResult;
use crate::ubo::{GpuCameraData, GpuObjectData};

/// Slot used by frame `frame_number`.
#[inline]
pub fn frame_slot(frame_number: u64) -> usize {
    (frame_number % MAX_FRAMES_IN_FLIGHT as u64) as usize
}

/// Resources of one frame slot.
///
/// # Synchronization Flow
///
/// ```text
/// 1. Wait on render_fence (previous use of this slot is done)
/// 2. Acquire a swapchain image, signaling present_semaphore
/// 3. Reset render_fence, record command_buffer
/// 4. Submit: wait present_semaphore, signal render_semaphore and render_fence
/// 5. Present, waiting on render_semaphore
/// ```
pub struct FrameData {
    command_buffer: CommandBuffer,
    present_semaphore: vk::Semaphore,
    render_semaphore: vk::Semaphore,
    render_fence: vk::Fence,
    camera_buffer: BufferView,
    object_buffer: BufferView,
    sets: FrameSets,
}

impl FrameData {
    /// Creates a slot. Every Vulkan object is registered with
    /// `deletion_queue`.
    ///
    /// # Arguments
    ///
    /// * `device` - The logical device
    /// * `deletion_queue` - Receives the slot's objects for teardown
    /// * `descriptors` - Allocates the slot's global and object sets
    /// * `object_capacity` - Number of [`GpuObjectData`] the object buffer holds
    ///
    /// # Errors
    ///
    /// Returns an error if any resource creation fails.
    pub(crate) fn new(
        device: Arc<Device>,
        deletion_queue: &mut DeletionQueue,
        descriptors: &DescriptorManager,
        object_capacity: usize,
    ) -> RenderResult<Self> {
        let pool = CommandPool::new(device.clone(), device.graphics_family())?;
        let command_buffer = CommandBuffer::from_handle(device.clone(), pool.allocate_command_buffer()?);
        deletion_queue.track(pool);

        // Signaled so the first wait on this slot returns immediately.
        let render_fence = deletion_queue.track(Fence::new(device.clone(), true)?);
        let present_semaphore = deletion_queue.track(Semaphore::new(device.clone())?);
        let render_semaphore = deletion_queue.track(Semaphore::new(device.clone())?);

        let camera_buffer = deletion_queue.track(Buffer::new(
            device.clone(),
            BufferUsage::Uniform,
            GpuCameraData::SIZE as u64,
        )?);
        let object_buffer = deletion_queue.track(Buffer::new(
            device,
            BufferUsage::Storage,
            (GpuObjectData::SIZE * object_capacity) as u64,
        )?);

        let sets = descriptors.allocate_frame_sets(&camera_buffer, &object_buffer)?;

        Ok(Self {
            command_buffer,
            present_semaphore,
            render_semaphore,
            render_fence,
            camera_buffer,
            object_buffer,
            sets,
        })
    }

    #[inline]
    pub fn command_buffer(&self) -> &CommandBuffer {
        &self.command_buffer
    }

    #[inline]
    pub fn present_semaphore(&self) -> vk::Semaphore {
        self.present_semaphore
    }

    #[inline]
    pub fn render_semaphore(&self) -> vk::Semaphore {
        self.render_semaphore
    }

    #[inline]
    pub fn render_fence(&self) -> vk::Fence {
        self.render_fence
    }

    #[inline]
    pub fn sets(&self) -> FrameSets {
        self.sets
    }

    /// Copies the camera uniform into this slot's buffer.
    ///
    /// # Errors
    ///
    /// Returns an error if the buffer is not mapped.
    pub fn write_camera(&self, camera: &GpuCameraData) -> RenderResult<()> {
        // SAFETY: the buffer lives until the deletion queue is flushed, and
        // callers only write after waiting on this slot's fence.
        unsafe { self.camera_buffer.write_pod(0, camera)? };
        Ok(())
    }

    /// Copies per-object data into this slot's storage buffer, element `i`
    /// at index `i`.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::OutOfBounds`](renderer_rhi::RhiError::OutOfBounds)
    /// when `objects` holds more elements than the slot was created for;
    /// nothing is written in that case.
    pub fn write_objects(&self, objects: &[GpuObjectData]) -> RenderResult<()> {
        // SAFETY: as in `write_camera`.
        unsafe {
            self.object_buffer
                .write_data(0, bytemuck::cast_slice(objects))?
        };
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_slot_parity() {
        for frame in (0..20).step_by(2) {
            assert_eq!(frame_slot(frame), 0);
            assert_eq!(frame_slot(frame + 1), 1);
        }
        assert_eq!(frame_slot(u64::MAX), 1);
    }

    #[test]
    fn test_frame_data_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<FrameData>();
    }
}
