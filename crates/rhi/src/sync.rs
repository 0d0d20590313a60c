//! Synchronization primitives for Vulkan.
//!
//! - [`Semaphore`] orders work between queue operations on the GPU
//!   (image acquired -> rendering -> present).
//! - [`Fence`] lets the CPU block until a submission has finished.
//!
//! Frame slots and the upload context hand their fences and semaphores to the
//! engine's deletion queue, so both wrappers can give up ownership of the raw
//! handle with `into_raw`. The free functions [`wait_for_fence`] and
//! [`reset_fence`] then operate on those raw handles.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use renderer_rhi::device::Device;
//! use renderer_rhi::sync::{Fence, Semaphore};
//!
//! # fn example(device: Arc<Device>) -> Result<(), renderer_rhi::RhiError> {
//! let image_available = Semaphore::new(device.clone())?;
//!
//! // Signaled so the very first wait returns immediately
//! let render_fence = Fence::new(device.clone(), true)?;
//! render_fence.wait(1_000_000_000)?;
//! render_fence.reset()?;
//! # Ok(())
//! # }
//! ```

use std::mem::ManuallyDrop;
use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Blocks until `fence` is signaled or `timeout_ns` elapses.
///
/// # Errors
///
/// Returns [`RhiError::Timeout`] when the timeout expires and
/// [`RhiError::VulkanError`] for any other failure.
pub fn wait_for_fence(device: &Device, fence: vk::Fence, timeout_ns: u64) -> RhiResult<()> {
    let result = unsafe { device.handle().wait_for_fences(&[fence], true, timeout_ns) };
    match result {
        Ok(()) => Ok(()),
        Err(vk::Result::TIMEOUT) => Err(RhiError::Timeout(timeout_ns)),
        Err(e) => Err(e.into()),
    }
}

/// Returns `fence` to the unsignaled state.
pub fn reset_fence(device: &Device, fence: vk::Fence) -> RhiResult<()> {
    unsafe { device.handle().reset_fences(&[fence])? };
    Ok(())
}

/// Binary semaphore for GPU-GPU ordering.
pub struct Semaphore {
    device: Arc<Device>,
    semaphore: vk::Semaphore,
}

impl Semaphore {
    /// Creates a new unsignaled semaphore.
    ///
    /// # Errors
    ///
    /// Returns an error if semaphore creation fails.
    pub fn new(device: Arc<Device>) -> RhiResult<Self> {
        let create_info = vk::SemaphoreCreateInfo::default();
        let semaphore = unsafe { device.handle().create_semaphore(&create_info, None)? };

        debug!("Created semaphore");

        Ok(Self { device, semaphore })
    }

    #[inline]
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }

    /// Gives up ownership of the raw handle. The caller becomes responsible
    /// for destroying it.
    pub fn into_raw(self) -> vk::Semaphore {
        let this = ManuallyDrop::new(self);
        // SAFETY: `this` is never dropped, so the Arc is released exactly once here.
        drop(unsafe { std::ptr::read(&this.device) });
        this.semaphore
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_semaphore(self.semaphore, None);
        }
        debug!("Destroyed semaphore");
    }
}

/// CPU-observable completion signal.
pub struct Fence {
    device: Arc<Device>,
    fence: vk::Fence,
}

impl Fence {
    /// Creates a new fence.
    ///
    /// # Arguments
    ///
    /// * `device` - The logical device
    /// * `signaled` - Create the fence in the signaled state. Frame fences
    ///   start signaled so the first wait on a fresh slot does not block.
    ///
    /// # Errors
    ///
    /// Returns an error if fence creation fails.
    pub fn new(device: Arc<Device>, signaled: bool) -> RhiResult<Self> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };

        let create_info = vk::FenceCreateInfo::default().flags(flags);
        let fence = unsafe { device.handle().create_fence(&create_info, None)? };

        debug!(
            "Created fence ({})",
            if signaled { "signaled" } else { "unsignaled" }
        );

        Ok(Self { device, fence })
    }

    #[inline]
    pub fn handle(&self) -> vk::Fence {
        self.fence
    }

    /// Waits for the fence. See [`wait_for_fence`].
    pub fn wait(&self, timeout_ns: u64) -> RhiResult<()> {
        wait_for_fence(&self.device, self.fence, timeout_ns)
    }

    /// Resets the fence to unsignaled.
    pub fn reset(&self) -> RhiResult<()> {
        reset_fence(&self.device, self.fence)
    }

    /// Non-blocking status query.
    pub fn is_signaled(&self) -> bool {
        let result = unsafe { self.device.handle().get_fence_status(self.fence) };
        matches!(result, Ok(true))
    }

    /// Gives up ownership of the raw handle. The caller becomes responsible
    /// for destroying it.
    pub fn into_raw(self) -> vk::Fence {
        let this = ManuallyDrop::new(self);
        // SAFETY: `this` is never dropped, so the Arc is released exactly once here.
        drop(unsafe { std::ptr::read(&this.device) });
        this.fence
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_fence(self.fence, None);
        }
        debug!("Destroyed fence");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_wrappers_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Semaphore>();
        assert_send_sync::<Fence>();
    }

    #[test]
    fn test_timeout_error_reports_duration() {
        let err = RhiError::Timeout(1_000_000_000);
        assert!(err.to_string().contains("1000000000"));
    }
}
