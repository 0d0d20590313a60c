//! GPU buffers backed by gpu-allocator.
//!
//! - [`BufferUsage`] picks the Vulkan usage flags and a default memory location.
//! - [`Buffer`] owns a VkBuffer and its allocation, and frees both on drop.
//! - [`BufferView`] is a copyable, non-owning view used once a buffer has been
//!   handed to the engine's deletion queue via [`Buffer::into_parts`].
//!
//! Writes through a mapped pointer are bounds-checked; writing past the end of
//! a buffer returns [`RhiError::OutOfBounds`] instead of touching memory.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use renderer_rhi::device::Device;
//! use renderer_rhi::buffer::{Buffer, BufferUsage};
//!
//! # fn example(device: Arc<Device>) -> Result<(), renderer_rhi::RhiError> {
//! let vertices: [f32; 6] = [0.0, 0.5, -0.5, -0.5, 0.5, -0.5];
//! let vertex_buffer = Buffer::new_with_data(
//!     device,
//!     BufferUsage::Vertex,
//!     bytemuck::cast_slice(&vertices),
//! )?;
//! # Ok(())
//! # }
//! ```

use std::mem::ManuallyDrop;
use std::ptr::NonNull;
use std::sync::Arc;

use ash::vk;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use tracing::{debug, error};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Buffer usage type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferUsage {
    /// Vertex data, either uploaded directly or copied from staging
    Vertex,
    /// Per-frame uniform data (camera, scene parameters)
    Uniform,
    /// Per-object storage data rewritten every frame
    Storage,
    /// CPU-writable source for transfers
    Staging,
}

impl BufferUsage {
    /// Converts to Vulkan buffer usage flags.
    pub fn to_vk_usage(self) -> vk::BufferUsageFlags {
        match self {
            BufferUsage::Vertex => {
                vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST
            }
            BufferUsage::Uniform => vk::BufferUsageFlags::UNIFORM_BUFFER,
            BufferUsage::Storage => vk::BufferUsageFlags::STORAGE_BUFFER,
            BufferUsage::Staging => vk::BufferUsageFlags::TRANSFER_SRC,
        }
    }

    /// Default memory location. Everything the CPU rewrites each frame lives in
    /// host-visible memory.
    pub fn memory_location(self) -> MemoryLocation {
        match self {
            BufferUsage::Vertex
            | BufferUsage::Uniform
            | BufferUsage::Storage
            | BufferUsage::Staging => MemoryLocation::CpuToGpu,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            BufferUsage::Vertex => "vertex",
            BufferUsage::Uniform => "uniform",
            BufferUsage::Storage => "storage",
            BufferUsage::Staging => "staging",
        }
    }
}

/// Checks that `len` bytes at `offset` fit in a buffer of `size` bytes.
fn check_bounds(offset: vk::DeviceSize, len: usize, size: vk::DeviceSize) -> RhiResult<()> {
    let len = len as u64;
    match offset.checked_add(len) {
        Some(end) if end <= size => Ok(()),
        _ => Err(RhiError::OutOfBounds { offset, len, size }),
    }
}

/// Non-owning view of a buffer.
///
/// Holds the handle, the size and, for host-visible memory, the persistent
/// mapping. The memory it points at is owned by whoever took the parts out of
/// the [`Buffer`]; the view must not outlive that owner's flush.
#[derive(Clone, Copy, Debug)]
pub struct BufferView {
    pub handle: vk::Buffer,
    pub size: vk::DeviceSize,
    mapped: Option<NonNull<u8>>,
}

// The mapping is plain host memory; synchronisation with the GPU is done with
// fences by the caller.
unsafe impl Send for BufferView {}
unsafe impl Sync for BufferView {}

impl BufferView {
    /// Returns true if the buffer memory is host-visible and mapped.
    #[inline]
    pub fn is_mapped(&self) -> bool {
        self.mapped.is_some()
    }

    /// Copies `data` into the buffer at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::OutOfBounds`] if the write would pass the end of the
    /// buffer, or [`RhiError::InvalidHandle`] if the memory is not mapped.
    ///
    /// # Safety
    ///
    /// The underlying allocation must still be alive and the GPU must not be
    /// reading the written range.
    pub unsafe fn write_data(&self, offset: vk::DeviceSize, data: &[u8]) -> RhiResult<()> {
        if data.is_empty() {
            return Ok(());
        }
        check_bounds(offset, data.len(), self.size)?;

        let mapped = self
            .mapped
            .ok_or_else(|| RhiError::InvalidHandle("Buffer memory is not mapped".to_string()))?;

        unsafe {
            let dst = mapped.as_ptr().add(offset as usize);
            std::ptr::copy_nonoverlapping(data.as_ptr(), dst, data.len());
        }
        Ok(())
    }

    /// Writes a single plain-old-data value at `offset`.
    ///
    /// # Safety
    ///
    /// Same as [`BufferView::write_data`].
    pub unsafe fn write_pod<T: bytemuck::Pod>(
        &self,
        offset: vk::DeviceSize,
        value: &T,
    ) -> RhiResult<()> {
        unsafe { self.write_data(offset, bytemuck::bytes_of(value)) }
    }
}

/// GPU buffer with managed memory.
pub struct Buffer {
    device: Arc<Device>,
    buffer: vk::Buffer,
    allocation: ManuallyDrop<Allocation>,
    size: vk::DeviceSize,
    usage: BufferUsage,
}

impl Buffer {
    /// Creates a buffer in the default memory location for `usage`.
    ///
    /// # Errors
    ///
    /// Returns an error if `size` is zero or buffer/memory allocation fails.
    pub fn new(device: Arc<Device>, usage: BufferUsage, size: vk::DeviceSize) -> RhiResult<Self> {
        Self::with_location(device, usage, size, usage.memory_location())
    }

    /// Creates a buffer in an explicit memory location.
    ///
    /// # Arguments
    ///
    /// * `device` - The logical device
    /// * `usage` - The intended buffer usage
    /// * `size` - Buffer size in bytes
    /// * `location` - Where gpu-allocator should place the memory
    ///
    /// # Errors
    ///
    /// Returns an error if `size` is zero or buffer/memory allocation fails.
    pub fn with_location(
        device: Arc<Device>,
        usage: BufferUsage,
        size: vk::DeviceSize,
        location: MemoryLocation,
    ) -> RhiResult<Self> {
        if size == 0 {
            return Err(RhiError::InvalidHandle(
                "Buffer size must be greater than 0".to_string(),
            ));
        }

        let buffer_info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(usage.to_vk_usage())
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { device.handle().create_buffer(&buffer_info, None)? };
        let requirements = unsafe { device.handle().get_buffer_memory_requirements(buffer) };

        let allocation = device.allocator().allocate(&AllocationCreateDesc {
            name: usage.name(),
            requirements,
            location,
            linear: true,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        });
        let allocation = match allocation {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { device.handle().destroy_buffer(buffer, None) };
                return Err(e.into());
            }
        };

        if let Err(e) = unsafe {
            device
                .handle()
                .bind_buffer_memory(buffer, allocation.memory(), allocation.offset())
        } {
            unsafe { device.handle().destroy_buffer(buffer, None) };
            if let Err(free_err) = device.allocator().free(allocation) {
                error!("Failed to free buffer allocation: {:?}", free_err);
            }
            return Err(e.into());
        }

        debug!(
            "Created {} buffer: {} bytes ({:?})",
            usage.name(),
            size,
            location
        );

        Ok(Self {
            device,
            buffer,
            allocation: ManuallyDrop::new(allocation),
            size,
            usage,
        })
    }

    /// Creates a host-visible buffer and copies `data` into it.
    ///
    /// # Errors
    ///
    /// Returns an error if buffer creation or the write fails.
    pub fn new_with_data(device: Arc<Device>, usage: BufferUsage, data: &[u8]) -> RhiResult<Self> {
        let buffer = Self::new(device, usage, data.len() as vk::DeviceSize)?;
        buffer.write_data(0, data)?;
        Ok(buffer)
    }

    /// Returns a view of this buffer. The view is valid while `self` lives.
    pub fn view(&self) -> BufferView {
        BufferView {
            handle: self.buffer,
            size: self.size,
            mapped: self.allocation.mapped_ptr().map(|p| p.cast::<u8>()),
        }
    }

    /// Copies `data` into the buffer at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::OutOfBounds`] if the write would exceed the buffer,
    /// or an error if the memory is not host-visible.
    pub fn write_data(&self, offset: vk::DeviceSize, data: &[u8]) -> RhiResult<()> {
        // SAFETY: the allocation is owned by `self` and therefore alive.
        unsafe { self.view().write_data(offset, data) }
    }

    #[inline]
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    #[inline]
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    #[inline]
    pub fn usage(&self) -> BufferUsage {
        self.usage
    }

    /// Splits the buffer into a view and its allocation without destroying
    /// anything. The caller becomes responsible for destroying the handle and
    /// freeing the allocation.
    pub fn into_parts(self) -> (BufferView, Allocation) {
        let view = self.view();
        let mut this = ManuallyDrop::new(self);
        // SAFETY: `this` is never dropped, so the Arc and the allocation are
        // each moved out exactly once.
        let allocation = unsafe { ManuallyDrop::take(&mut this.allocation) };
        drop(unsafe { std::ptr::read(&this.device) });
        (view, allocation)
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_buffer(self.buffer, None);
        }

        // SAFETY: Drop runs once and the field is not touched afterwards.
        let allocation = unsafe { ManuallyDrop::take(&mut self.allocation) };
        if let Err(e) = self.device.allocator().free(allocation) {
            error!("Failed to free buffer allocation: {:?}", e);
        }

        debug!("Destroyed {} buffer", self.usage.name());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_usage_to_vk_usage() {
        assert!(
            BufferUsage::Vertex
                .to_vk_usage()
                .contains(vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST)
        );
        assert!(
            BufferUsage::Uniform
                .to_vk_usage()
                .contains(vk::BufferUsageFlags::UNIFORM_BUFFER)
        );
        assert!(
            BufferUsage::Storage
                .to_vk_usage()
                .contains(vk::BufferUsageFlags::STORAGE_BUFFER)
        );
        assert_eq!(
            BufferUsage::Staging.to_vk_usage(),
            vk::BufferUsageFlags::TRANSFER_SRC
        );
    }

    #[test]
    fn test_per_frame_buffers_are_host_visible() {
        assert_eq!(
            BufferUsage::Uniform.memory_location(),
            MemoryLocation::CpuToGpu
        );
        assert_eq!(
            BufferUsage::Storage.memory_location(),
            MemoryLocation::CpuToGpu
        );
    }

    #[test]
    fn test_bounds_check() {
        assert!(check_bounds(0, 64, 64).is_ok());
        assert!(check_bounds(60, 4, 64).is_ok());
        assert!(matches!(
            check_bounds(61, 4, 64),
            Err(RhiError::OutOfBounds {
                offset: 61,
                len: 4,
                size: 64
            })
        ));
        assert!(check_bounds(u64::MAX, 1, 64).is_err());
    }

    #[test]
    fn test_view_writes_through_mapping() {
        let mut backing = [0u8; 16];
        let view = BufferView {
            handle: vk::Buffer::null(),
            size: backing.len() as u64,
            mapped: NonNull::new(backing.as_mut_ptr()),
        };

        unsafe {
            view.write_pod(4, &0xAABB_CCDDu32).unwrap();
            assert!(view.write_data(14, &[1, 2, 3]).is_err());
        }

        assert_eq!(&backing[4..8], &0xAABB_CCDDu32.to_ne_bytes());
        assert_eq!(&backing[14..], &[0, 0]);
    }

    #[test]
    fn test_unmapped_view_rejects_writes() {
        let view = BufferView {
            handle: vk::Buffer::null(),
            size: 16,
            mapped: None,
        };
        let result = unsafe { view.write_data(0, &[1]) };
        assert!(matches!(result, Err(RhiError::InvalidHandle(_))));
    }
}
