//! Synchronous one-shot GPU submissions.
//!
//! [`UploadContext`] owns a command pool, one command buffer and a fence that
//! are never shared with the frame slots. [`UploadContext::begin`] starts
//! recording and returns an [`UploadScope`]; the scope submits and blocks on
//! the fence when it is finished, either explicitly through
//! [`UploadScope::submit`] (which reports errors) or implicitly when it goes
//! out of scope (which logs them).
//!
//! Uploads must not run while a frame is being recorded.
//!
//! # Example
//!
//! ```no_run
//! use ash::vk;
//! use renderer_renderer::upload::UploadContext;
//!
//! # fn example(upload: &mut UploadContext, src: vk::Buffer, dst: vk::Buffer) -> renderer_renderer::RenderResult<()> {
//! let scope = upload.begin()?;
//! scope.cmd().copy_buffer(src, dst, &[vk::BufferCopy::default().size(256)]);
//! scope.submit()?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::{debug, error, info};

use renderer_rhi::command::{CommandBuffer, CommandPool, reset_command_pool};
use renderer_rhi::device::Device;
use renderer_rhi::sync::{Fence, reset_fence, wait_for_fence};

use crate::deletion_queue::DeletionQueue;
use crate::error::RenderResult;

/// The steps of a blocking one-shot submission.
///
/// [`UploadContext`] runs them against the device. [`UploadScope`] decides
/// when they run, so the order lives in one place.
pub trait ImmediateSubmit {
    /// Starts recording into the one-shot command buffer.
    fn begin_recording(&mut self) -> RenderResult<()>;

    fn end_recording(&mut self) -> RenderResult<()>;

    /// Submits the recorded commands, signaling the fence on completion.
    fn submit_recorded(&mut self) -> RenderResult<()>;

    /// Blocks until the fence signals.
    fn wait_complete(&mut self) -> RenderResult<()>;

    /// Makes the fence and command buffer reusable.
    fn reset(&mut self) -> RenderResult<()>;
}

/// Dedicated command buffer and fence for blocking transfers.
pub struct UploadContext {
    device: Arc<Device>,
    pool: vk::CommandPool,
    command_buffer: CommandBuffer,
    fence: vk::Fence,
    timeout_ns: u64,
}

impl UploadContext {
    /// Creates the pool, command buffer and fence, registering the pool and
    /// fence with `deletion_queue`.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the objects cannot be created.
    pub fn new(
        device: Arc<Device>,
        deletion_queue: &mut DeletionQueue,
        timeout_ns: u64,
    ) -> RenderResult<Self> {
        let pool = CommandPool::new(device.clone(), device.graphics_family())?;
        let command_buffer = CommandBuffer::from_handle(device.clone(), pool.allocate_command_buffer()?);
        let pool = deletion_queue.track(pool);
        let fence = deletion_queue.track(Fence::new(device.clone(), false)?);

        info!("Upload context created (timeout {} ns)", timeout_ns);

        Ok(Self {
            device,
            pool,
            command_buffer,
            fence,
            timeout_ns,
        })
    }

    /// Begins recording a one-shot submission.
    ///
    /// The returned scope borrows the context mutably, so at most one upload
    /// is recorded or in flight at a time.
    ///
    /// # Errors
    ///
    /// Returns an error if the command buffer cannot begin recording.
    pub fn begin(&mut self) -> RenderResult<UploadScope<'_>> {
        UploadScope::begin(self)
    }
}

impl ImmediateSubmit for UploadContext {
    fn begin_recording(&mut self) -> RenderResult<()> {
        self.command_buffer.begin()?;
        Ok(())
    }

    fn end_recording(&mut self) -> RenderResult<()> {
        self.command_buffer.end()?;
        Ok(())
    }

    fn submit_recorded(&mut self) -> RenderResult<()> {
        let command_buffers = [self.command_buffer.handle()];
        let submit_info = vk::SubmitInfo::default().command_buffers(&command_buffers);

        // SAFETY: the command buffer has been ended and the fence is
        // unsignaled; it is reset after every completed wait.
        unsafe { self.device.submit_graphics(&[submit_info], self.fence)? };
        Ok(())
    }

    fn wait_complete(&mut self) -> RenderResult<()> {
        wait_for_fence(&self.device, self.fence, self.timeout_ns)?;
        Ok(())
    }

    fn reset(&mut self) -> RenderResult<()> {
        reset_fence(&self.device, self.fence)?;
        reset_command_pool(&self.device, self.pool)?;
        debug!("Upload submission completed");
        Ok(())
    }
}

fn finish<S: ImmediateSubmit + ?Sized>(submitter: &mut S) -> RenderResult<()> {
    submitter.end_recording()?;
    submitter.submit_recorded()?;
    submitter.wait_complete()?;
    submitter.reset()
}

/// Recording in progress on the upload command buffer.
///
/// Submits and waits exactly once: on [`submit`](Self::submit) or on drop.
pub struct UploadScope<'a, S: ImmediateSubmit = UploadContext> {
    submitter: &'a mut S,
    finished: bool,
}

impl<'a, S: ImmediateSubmit> UploadScope<'a, S> {
    /// Starts recording on `submitter`.
    ///
    /// # Errors
    ///
    /// Returns an error if recording cannot begin; nothing is submitted in
    /// that case.
    pub fn begin(submitter: &'a mut S) -> RenderResult<Self> {
        submitter.begin_recording()?;
        Ok(Self {
            submitter,
            finished: false,
        })
    }

    /// Ends recording, submits, and blocks until the GPU is done.
    ///
    /// # Errors
    ///
    /// Returns an error if submission fails or the fence wait times out. The
    /// submission is not retried when the scope drops.
    pub fn submit(mut self) -> RenderResult<()> {
        self.finished = true;
        finish(&mut *self.submitter)
    }
}

impl UploadScope<'_, UploadContext> {
    /// The command buffer to record transfer commands into.
    #[inline]
    pub fn cmd(&self) -> &CommandBuffer {
        &self.submitter.command_buffer
    }
}

impl<S: ImmediateSubmit> Drop for UploadScope<'_, S> {
    fn drop(&mut self) {
        if !self.finished
            && let Err(e) = finish(&mut *self.submitter)
        {
            error!("Upload submission failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RenderError;
    use renderer_rhi::RhiError;

    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    enum Step {
        Begin,
        End,
        Submit,
        Wait,
        Reset,
    }

    const ONE_SUBMISSION: [Step; 5] = [Step::Begin, Step::End, Step::Submit, Step::Wait, Step::Reset];

    #[derive(Default)]
    struct StepLog {
        steps: Vec<Step>,
        fail_begin: bool,
        fail_wait: bool,
    }

    impl ImmediateSubmit for StepLog {
        fn begin_recording(&mut self) -> RenderResult<()> {
            self.steps.push(Step::Begin);
            if self.fail_begin {
                return Err(RhiError::VulkanError(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY).into());
            }
            Ok(())
        }

        fn end_recording(&mut self) -> RenderResult<()> {
            self.steps.push(Step::End);
            Ok(())
        }

        fn submit_recorded(&mut self) -> RenderResult<()> {
            self.steps.push(Step::Submit);
            Ok(())
        }

        fn wait_complete(&mut self) -> RenderResult<()> {
            self.steps.push(Step::Wait);
            if self.fail_wait {
                return Err(RhiError::Timeout(1_000).into());
            }
            Ok(())
        }

        fn reset(&mut self) -> RenderResult<()> {
            self.steps.push(Step::Reset);
            Ok(())
        }
    }

    #[test]
    fn test_submit_finishes_once() {
        let mut log = StepLog::default();
        let scope = UploadScope::begin(&mut log).unwrap();
        scope.submit().unwrap();

        assert_eq!(log.steps, ONE_SUBMISSION);
    }

    #[test]
    fn test_drop_finishes_once() {
        let mut log = StepLog::default();
        {
            let _scope = UploadScope::begin(&mut log).unwrap();
        }

        assert_eq!(log.steps, ONE_SUBMISSION);
    }

    #[test]
    fn test_failed_submit_is_not_retried_on_drop() {
        let mut log = StepLog {
            fail_wait: true,
            ..Default::default()
        };
        let result = UploadScope::begin(&mut log).unwrap().submit();

        assert!(matches!(result, Err(RenderError::Rhi(RhiError::Timeout(1_000)))));
        assert_eq!(log.steps, [Step::Begin, Step::End, Step::Submit, Step::Wait]);
    }

    #[test]
    fn test_failed_begin_submits_nothing() {
        let mut log = StepLog {
            fail_begin: true,
            ..Default::default()
        };
        assert!(UploadScope::begin(&mut log).is_err());
        assert_eq!(log.steps, [Step::Begin]);
    }

    #[test]
    fn test_sequential_uploads_do_not_overlap() {
        let mut log = StepLog::default();
        UploadScope::begin(&mut log).unwrap().submit().unwrap();
        {
            let _scope = UploadScope::begin(&mut log).unwrap();
        }

        let expected: Vec<Step> = ONE_SUBMISSION.iter().chain(ONE_SUBMISSION.iter()).copied().collect();
        assert_eq!(log.steps, expected);
    }

    #[test]
    fn test_upload_context_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<UploadContext>();
    }
}
