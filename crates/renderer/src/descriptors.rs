//! Descriptor layouts, the shared pool and the scene uniform buffer.
//!
//! Three set layouts are created once and shared by every frame slot and
//! material:
//!
//! | set | binding | contents                                    |
//! |-----|---------|---------------------------------------------|
//! | 0   | 0       | camera uniform ([`GpuCameraData`])          |
//! | 0   | 1       | scene uniform, dynamic ([`GpuSceneData`])   |
//! | 1   | 0       | object storage buffer ([`GpuObjectData`])   |
//! | 2   | 0       | combined image sampler (textured materials) |
//!
//! The scene uniform for every frame slot lives in one buffer. Each copy
//! starts at a multiple of the padded stride, and the active one is selected
//! with a dynamic offset of `stride * (frame % MAX_FRAMES_IN_FLIGHT)`.
//!
//! [`GpuCameraData`]: crate::ubo::GpuCameraData
//! [`GpuObjectData`]: crate::ubo::GpuObjectData

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use renderer_rhi::buffer::{Buffer, BufferUsage, BufferView};
use renderer_rhi::descriptor::{
    DescriptorPool, DescriptorSetLayout, allocate_set, layout_binding, write_buffer,
    write_combined_image,
};
use renderer_rhi::device::Device;

use crate::MAX_FRAMES_IN_FLIGHT;
use crate::deletion_queue::DeletionQueue;
use crate::error::RenderResult;
use crate::ubo::{GpuCameraData, GpuSceneData};

/// Sets the pool can hand out.
pub const POOL_MAX_SETS: u32 = 10;

/// Descriptors of each type the pool can hand out.
pub const POOL_DESCRIPTORS_PER_TYPE: u32 = 10;

/// Rounds `size` up to the next multiple of `alignment`. An alignment of zero
/// leaves the size unchanged.
///
/// # Example
///
/// ```
/// use renderer_renderer::descriptors::pad_uniform_size;
///
/// assert_eq!(pad_uniform_size(176, 256), 256);
/// assert_eq!(pad_uniform_size(80, 0), 80);
/// ```
#[inline]
pub const fn pad_uniform_size(size: u64, alignment: u64) -> u64 {
    if alignment == 0 {
        size
    } else {
        size.div_ceil(alignment) * alignment
    }
}

/// Dynamic offset selecting frame `frame_number`'s copy of a uniform whose
/// padded stride is `stride`.
#[inline]
pub fn dynamic_offset(stride: u64, frame_number: u64) -> u32 {
    (stride * (frame_number % MAX_FRAMES_IN_FLIGHT as u64)) as u32
}

/// Pool capacity: [`POOL_DESCRIPTORS_PER_TYPE`] of every type the engine uses.
pub fn pool_sizes() -> [vk::DescriptorPoolSize; 4] {
    [
        vk::DescriptorType::UNIFORM_BUFFER,
        vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC,
        vk::DescriptorType::STORAGE_BUFFER,
        vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
    ]
    .map(|ty| {
        vk::DescriptorPoolSize::default()
            .ty(ty)
            .descriptor_count(POOL_DESCRIPTORS_PER_TYPE)
    })
}

/// The three set layouts.
#[derive(Clone, Copy, Debug)]
pub struct SetLayouts {
    pub global: vk::DescriptorSetLayout,
    pub object: vk::DescriptorSetLayout,
    pub texture: vk::DescriptorSetLayout,
}

/// Global and per-object sets of one frame slot.
#[derive(Clone, Copy, Debug)]
pub struct FrameSets {
    pub global: vk::DescriptorSet,
    pub object: vk::DescriptorSet,
}

/// Owns the layouts, the pool and the shared scene buffer.
pub struct DescriptorManager {
    device: Arc<Device>,
    layouts: SetLayouts,
    pool: vk::DescriptorPool,
    scene_buffer: BufferView,
    scene_stride: u64,
}

impl DescriptorManager {
    /// Creates the layouts, the pool and the scene buffer, registering all of
    /// them with `deletion_queue`.
    ///
    /// # Errors
    ///
    /// Returns an error if any Vulkan object or the buffer cannot be created.
    pub fn new(device: Arc<Device>, deletion_queue: &mut DeletionQueue) -> RenderResult<Self> {
        let vertex_fragment = vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT;

        let global = DescriptorSetLayout::new(
            device.clone(),
            &[
                layout_binding(0, vk::DescriptorType::UNIFORM_BUFFER, vk::ShaderStageFlags::VERTEX),
                layout_binding(1, vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC, vertex_fragment),
            ],
        )?;
        let object = DescriptorSetLayout::new(
            device.clone(),
            &[layout_binding(
                0,
                vk::DescriptorType::STORAGE_BUFFER,
                vk::ShaderStageFlags::VERTEX,
            )],
        )?;
        let texture = DescriptorSetLayout::new(
            device.clone(),
            &[layout_binding(
                0,
                vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                vk::ShaderStageFlags::FRAGMENT,
            )],
        )?;
        let layouts = SetLayouts {
            global: deletion_queue.track(global),
            object: deletion_queue.track(object),
            texture: deletion_queue.track(texture),
        };

        let pool = deletion_queue.track(DescriptorPool::new(
            device.clone(),
            POOL_MAX_SETS,
            &pool_sizes(),
        )?);

        let scene_stride = pad_uniform_size(
            GpuSceneData::SIZE as u64,
            device.min_uniform_buffer_offset_alignment(),
        );
        let scene_buffer = deletion_queue.track(Buffer::new(
            device.clone(),
            BufferUsage::Uniform,
            scene_stride * MAX_FRAMES_IN_FLIGHT as u64,
        )?);

        info!(
            "Descriptor manager ready: scene uniform {} bytes padded to {}",
            GpuSceneData::SIZE,
            scene_stride
        );

        Ok(Self {
            device,
            layouts,
            pool,
            scene_buffer,
            scene_stride,
        })
    }

    #[inline]
    pub fn layouts(&self) -> SetLayouts {
        self.layouts
    }

    /// Dynamic offset of the scene uniform for `frame_number`.
    #[inline]
    pub fn scene_offset(&self, frame_number: u64) -> u32 {
        dynamic_offset(self.scene_stride, frame_number)
    }

    /// Copies `scene` into the slot of `frame_number`.
    ///
    /// # Errors
    ///
    /// Returns an error if the scene buffer is not mapped.
    pub fn write_scene(&self, frame_number: u64, scene: &GpuSceneData) -> RenderResult<()> {
        let offset = u64::from(self.scene_offset(frame_number));
        // SAFETY: the buffer lives until the deletion queue is flushed, and
        // the slot being written belongs to a frame whose fence has signaled.
        unsafe { self.scene_buffer.write_pod(offset, scene)? };
        Ok(())
    }

    /// Allocates and writes the global and per-object sets of one frame slot.
    pub fn allocate_frame_sets(
        &self,
        camera_buffer: &BufferView,
        object_buffer: &BufferView,
    ) -> RenderResult<FrameSets> {
        let global = allocate_set(&self.device, self.pool, self.layouts.global)?;
        let object = allocate_set(&self.device, self.pool, self.layouts.object)?;

        write_buffer(
            &self.device,
            global,
            0,
            vk::DescriptorType::UNIFORM_BUFFER,
            camera_buffer.handle,
            GpuCameraData::SIZE as u64,
        );
        // The dynamic offset picks the slot, so the range covers one copy.
        write_buffer(
            &self.device,
            global,
            1,
            vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC,
            self.scene_buffer.handle,
            GpuSceneData::SIZE as u64,
        );
        write_buffer(
            &self.device,
            object,
            0,
            vk::DescriptorType::STORAGE_BUFFER,
            object_buffer.handle,
            object_buffer.size,
        );

        debug!("Allocated frame descriptor sets");
        Ok(FrameSets { global, object })
    }

    /// Allocates a set 2 instance pointing at `view` through `sampler`.
    pub fn allocate_texture_set(
        &self,
        sampler: vk::Sampler,
        view: vk::ImageView,
    ) -> RenderResult<vk::DescriptorSet> {
        let set = allocate_set(&self.device, self.pool, self.layouts.texture)?;
        write_combined_image(&self.device, set, 0, sampler, view);
        Ok(set)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pad_rounds_up_to_alignment() {
        assert_eq!(pad_uniform_size(176, 256), 256);
        assert_eq!(pad_uniform_size(256, 256), 256);
        assert_eq!(pad_uniform_size(257, 256), 512);
        assert_eq!(pad_uniform_size(80, 64), 128);
    }

    #[test]
    fn test_pad_zero_alignment_is_identity() {
        assert_eq!(pad_uniform_size(176, 0), 176);
        assert_eq!(pad_uniform_size(0, 0), 0);
    }

    #[test]
    fn test_pad_is_idempotent() {
        for size in [1u64, 63, 64, 80, 176, 300] {
            for alignment in [0u64, 16, 64, 256] {
                let once = pad_uniform_size(size, alignment);
                assert_eq!(pad_uniform_size(once, alignment), once);
                assert!(once >= size);
            }
        }
    }

    #[test]
    fn test_dynamic_offset_per_slot() {
        let stride = pad_uniform_size(176, 256);
        assert_eq!(dynamic_offset(stride, 0), 0);
        assert_eq!(dynamic_offset(stride, 1), 256);
        assert_eq!(dynamic_offset(stride, 2), 0);
        assert_eq!(dynamic_offset(stride, 7), 256);
    }

    #[test]
    fn test_pool_sizes_cover_every_type() {
        let sizes = pool_sizes();
        assert!(sizes.iter().all(|s| s.descriptor_count == POOL_DESCRIPTORS_PER_TYPE));
        assert!(
            sizes
                .iter()
                .any(|s| s.ty == vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC)
        );
    }
}
