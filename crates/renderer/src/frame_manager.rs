//! Frame pacing over [`MAX_FRAMES_IN_FLIGHT`] rotating slots.
//!
//! The frame manager implements a "frames in flight" pattern: while the GPU
//! renders frame N, the CPU records frame N+1 into the other slot. The slot of
//! frame `f` is `f % MAX_FRAMES_IN_FLIGHT`, and a slot is never re-recorded
//! before its fence has signaled.
//!
//! [`run_frame`] drives one frame through the [`FrameSync`] steps in a fixed
//! order; [`SwapchainFrames`] carries those steps out on the GPU.
//!
//! # Example
//!
//! ```no_run
//! use renderer_rhi::swapchain::Swapchain;
//! use renderer_renderer::frame_manager::{FrameManager, FrameOutcome, SwapchainFrames, run_frame};
//!
//! # fn example(frames: &FrameManager, swapchain: &Swapchain) -> renderer_renderer::RenderResult<()> {
//! let frame_number = 0;
//! let sync = SwapchainFrames::new(frames, swapchain);
//! let outcome = run_frame(&sync, frame_number, |image_index| {
//!     let cmd = frames.frame(frame_number).command_buffer();
//!     // Record the render pass for `image_index` into `cmd`...
//!     Ok(())
//! })?;
//! if outcome == FrameOutcome::Skipped {
//!     // rebuild the swapchain and try again
//! }
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info, warn};

use renderer_rhi::command::CommandBuffer;
use renderer_rhi::device::Device;
use renderer_rhi::swapchain::{Acquired, Swapchain};
use renderer_rhi::sync::{reset_fence, wait_for_fence};

use crate::MAX_FRAMES_IN_FLIGHT;
use crate::deletion_queue::DeletionQueue;
use crate::descriptors::DescriptorManager;
use crate::error::RenderResult;
use crate::frame::{FrameData, frame_slot};

/// Owns the frame slots and drives the per-frame protocol.
///
/// # Thread Safety
///
/// The frame manager is not thread-safe. It should only be accessed
/// from the thread that owns the engine.
pub struct FrameManager {
    device: Arc<Device>,
    frames: Vec<FrameData>,
    timeout_ns: u64,
}

impl FrameManager {
    /// Creates [`MAX_FRAMES_IN_FLIGHT`] slots.
    ///
    /// # Arguments
    ///
    /// * `device` - The logical device
    /// * `deletion_queue` - Receives every slot object for teardown
    /// * `descriptors` - Allocates each slot's descriptor sets
    /// * `object_capacity` - Per-slot object buffer capacity
    /// * `timeout_ns` - Bound for fence waits and image acquisition
    ///
    /// # Errors
    ///
    /// Returns an error if any resource creation fails.
    pub fn new(
        device: Arc<Device>,
        deletion_queue: &mut DeletionQueue,
        descriptors: &DescriptorManager,
        object_capacity: usize,
        timeout_ns: u64,
    ) -> RenderResult<Self> {
        let mut frames = Vec::with_capacity(MAX_FRAMES_IN_FLIGHT);

        for i in 0..MAX_FRAMES_IN_FLIGHT {
            frames.push(FrameData::new(
                device.clone(),
                deletion_queue,
                descriptors,
                object_capacity,
            )?);
            debug!("Created frame slot {}", i);
        }

        info!(
            "Frame manager created with {} frames in flight, {} objects per frame",
            MAX_FRAMES_IN_FLIGHT, object_capacity
        );

        Ok(Self {
            device,
            frames,
            timeout_ns,
        })
    }

    /// The slot used by `frame_number`.
    #[inline]
    pub fn frame(&self, frame_number: u64) -> &FrameData {
        &self.frames[frame_slot(frame_number)]
    }

    /// Blocks until the slot's previous submission has completed.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::Timeout`](renderer_rhi::RhiError::Timeout) if the
    /// GPU does not finish within the configured timeout.
    pub fn wait(&self, frame_number: u64) -> RenderResult<()> {
        let frame = self.frame(frame_number);
        wait_for_fence(&self.device, frame.render_fence(), self.timeout_ns)?;
        Ok(())
    }

    /// Acquires the next swapchain image, signaling the slot's present
    /// semaphore.
    ///
    /// The fence is not reset here: a frame skipped on
    /// [`Acquired::OutOfDate`] leaves the slot signaled for the next attempt.
    pub fn acquire(&self, frame_number: u64, swapchain: &Swapchain) -> RenderResult<Acquired> {
        let frame = self.frame(frame_number);
        let acquired = swapchain.acquire_next_image(frame.present_semaphore(), self.timeout_ns)?;
        if acquired == Acquired::OutOfDate {
            debug!("Swapchain out of date during acquire");
        }
        Ok(acquired)
    }

    /// Unsignals the slot's fence ahead of its next submission.
    ///
    /// Must be called after [`wait`](Self::wait) and a successful
    /// [`acquire`](Self::acquire).
    pub fn reset_fence(&self, frame_number: u64) -> RenderResult<()> {
        reset_fence(&self.device, self.frame(frame_number).render_fence())?;
        Ok(())
    }

    /// Resets the slot's command buffer and begins recording.
    pub fn begin(&self, frame_number: u64) -> RenderResult<&CommandBuffer> {
        let cmd = self.frame(frame_number).command_buffer();
        cmd.reset()?;
        cmd.begin()?;
        Ok(cmd)
    }

    /// Ends recording and submits the slot's commands.
    ///
    /// The submission waits on the present semaphore at color output, and
    /// signals the render semaphore and the slot's fence.
    pub fn submit(&self, frame_number: u64) -> RenderResult<()> {
        let frame = self.frame(frame_number);
        frame.command_buffer().end()?;

        let wait_semaphores = [frame.present_semaphore()];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let signal_semaphores = [frame.render_semaphore()];
        let command_buffers = [frame.command_buffer().handle()];

        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        // SAFETY: the command buffer was just ended and the fence was reset
        // after the last wait.
        unsafe { self.device.submit_graphics(&[submit_info], frame.render_fence())? };
        Ok(())
    }

    /// Presents `image_index` once rendering has finished.
    ///
    /// Returns `true` if the swapchain is out of date or suboptimal and
    /// should be rebuilt.
    pub fn present(
        &self,
        frame_number: u64,
        swapchain: &Swapchain,
        image_index: u32,
    ) -> RenderResult<bool> {
        let frame = self.frame(frame_number);
        let rebuild = swapchain.present(
            self.device.present_queue(),
            image_index,
            frame.render_semaphore(),
        )?;
        if rebuild {
            debug!("Swapchain needs rebuilding after present");
        }
        Ok(rebuild)
    }

    /// Waits on every slot's fence, each bounded by the frame timeout.
    ///
    /// # Errors
    ///
    /// Returns the first failed wait.
    pub fn wait_for_all_frames(&self) -> RenderResult<()> {
        for frame in &self.frames {
            wait_for_fence(&self.device, frame.render_fence(), self.timeout_ns)?;
        }
        Ok(())
    }

    /// Returns the number of frames in flight.
    #[inline]
    pub fn frames_in_flight(&self) -> usize {
        self.frames.len()
    }
}

/// The per-frame steps, addressed by frame number.
pub trait FrameSync {
    /// Blocks until the slot's previous submission has completed.
    fn wait(&self, frame_number: u64) -> RenderResult<()>;

    fn acquire(&self, frame_number: u64) -> RenderResult<Acquired>;

    fn reset_fence(&self, frame_number: u64) -> RenderResult<()>;

    /// Starts recording the slot's command buffer.
    fn begin(&self, frame_number: u64) -> RenderResult<()>;

    /// Ends recording and submits, signaling the slot's fence on completion.
    fn submit(&self, frame_number: u64) -> RenderResult<()>;

    /// Returns `true` if the swapchain should be rebuilt.
    fn present(&self, frame_number: u64, image_index: u32) -> RenderResult<bool>;
}

/// A [`FrameManager`] paired with the swapchain it renders to.
pub struct SwapchainFrames<'a> {
    frames: &'a FrameManager,
    swapchain: &'a Swapchain,
}

impl<'a> SwapchainFrames<'a> {
    pub fn new(frames: &'a FrameManager, swapchain: &'a Swapchain) -> Self {
        Self { frames, swapchain }
    }
}

impl FrameSync for SwapchainFrames<'_> {
    fn wait(&self, frame_number: u64) -> RenderResult<()> {
        self.frames.wait(frame_number)
    }

    fn acquire(&self, frame_number: u64) -> RenderResult<Acquired> {
        self.frames.acquire(frame_number, self.swapchain)
    }

    fn reset_fence(&self, frame_number: u64) -> RenderResult<()> {
        self.frames.reset_fence(frame_number)
    }

    fn begin(&self, frame_number: u64) -> RenderResult<()> {
        self.frames.begin(frame_number).map(|_| ())
    }

    fn submit(&self, frame_number: u64) -> RenderResult<()> {
        self.frames.submit(frame_number)
    }

    fn present(&self, frame_number: u64, image_index: u32) -> RenderResult<bool> {
        self.frames.present(frame_number, self.swapchain, image_index)
    }
}

/// How a frame ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameOutcome<T> {
    /// Submitted and presented. `rebuild` is set when the acquire or the
    /// present reported a suboptimal or out-of-date swapchain.
    Presented { recorded: T, rebuild: bool },
    /// The swapchain was out of date at acquire. Nothing was submitted and
    /// the slot's fence is still signaled.
    Skipped,
}

/// Runs one frame: wait, acquire, reset the fence, begin, record, submit,
/// present.
///
/// `record` receives the acquired image index while the slot's command
/// buffer is recording.
///
/// # Errors
///
/// Returns the first failing step. If `record` fails, whatever it recorded
/// is still submitted so the slot's fence signals again, the image is not
/// presented, and the recording error is returned.
pub fn run_frame<S, T>(
    sync: &S,
    frame_number: u64,
    record: impl FnOnce(u32) -> RenderResult<T>,
) -> RenderResult<FrameOutcome<T>>
where
    S: FrameSync + ?Sized,
{
    sync.wait(frame_number)?;

    let (image_index, suboptimal) = match sync.acquire(frame_number)? {
        Acquired::Image { index, suboptimal } => (index, suboptimal),
        Acquired::OutOfDate => return Ok(FrameOutcome::Skipped),
    };

    sync.reset_fence(frame_number)?;
    sync.begin(frame_number)?;

    let recorded = match record(image_index) {
        Ok(recorded) => recorded,
        Err(e) => {
            warn!("Recording frame {} failed; submitting what was recorded", frame_number);
            sync.submit(frame_number)?;
            return Err(e);
        }
    };

    sync.submit(frame_number)?;
    let stale = sync.present(frame_number, image_index)?;

    Ok(FrameOutcome::Presented {
        recorded,
        rebuild: suboptimal || stale,
    })
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};

    use super::*;
    use crate::error::RenderError;
    use renderer_rhi::RhiError;

    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    enum Op {
        Wait(usize),
        Acquire(usize),
        ResetFence(usize),
        Begin(usize),
        Record(u32),
        Submit(usize),
        Present(usize, u32),
    }

    /// Slots whose GPU work completes as soon as it is submitted.
    struct FakeSlots {
        ops: RefCell<Vec<Op>>,
        signaled: RefCell<[bool; MAX_FRAMES_IN_FLIGHT]>,
        acquire: Cell<Acquired>,
        stale_on_present: Cell<bool>,
    }

    impl FakeSlots {
        fn new() -> Self {
            Self {
                ops: RefCell::new(Vec::new()),
                signaled: RefCell::new([true; MAX_FRAMES_IN_FLIGHT]),
                acquire: Cell::new(Acquired::Image {
                    index: 0,
                    suboptimal: false,
                }),
                stale_on_present: Cell::new(false),
            }
        }

        fn log(&self, op: Op) {
            self.ops.borrow_mut().push(op);
        }

        fn ops(&self) -> Vec<Op> {
            self.ops.borrow().clone()
        }
    }

    impl FrameSync for FakeSlots {
        fn wait(&self, frame_number: u64) -> RenderResult<()> {
            let slot = frame_slot(frame_number);
            self.log(Op::Wait(slot));
            if !self.signaled.borrow()[slot] {
                return Err(RhiError::Timeout(1_000).into());
            }
            Ok(())
        }

        fn acquire(&self, frame_number: u64) -> RenderResult<Acquired> {
            self.log(Op::Acquire(frame_slot(frame_number)));
            Ok(self.acquire.get())
        }

        fn reset_fence(&self, frame_number: u64) -> RenderResult<()> {
            let slot = frame_slot(frame_number);
            self.log(Op::ResetFence(slot));
            self.signaled.borrow_mut()[slot] = false;
            Ok(())
        }

        fn begin(&self, frame_number: u64) -> RenderResult<()> {
            self.log(Op::Begin(frame_slot(frame_number)));
            Ok(())
        }

        fn submit(&self, frame_number: u64) -> RenderResult<()> {
            let slot = frame_slot(frame_number);
            self.log(Op::Submit(slot));
            self.signaled.borrow_mut()[slot] = true;
            Ok(())
        }

        fn present(&self, frame_number: u64, image_index: u32) -> RenderResult<bool> {
            self.log(Op::Present(frame_slot(frame_number), image_index));
            Ok(self.stale_on_present.get())
        }
    }

    #[test]
    fn test_max_frames_in_flight_constant() {
        assert_eq!(MAX_FRAMES_IN_FLIGHT, 2);
    }

    #[test]
    fn test_frame_steps_run_in_order() {
        let slots = FakeSlots::new();
        slots.acquire.set(Acquired::Image {
            index: 2,
            suboptimal: false,
        });

        let outcome = run_frame(&slots, 0, |image_index| {
            slots.log(Op::Record(image_index));
            Ok(7)
        })
        .unwrap();

        assert_eq!(
            outcome,
            FrameOutcome::Presented {
                recorded: 7,
                rebuild: false
            }
        );
        assert_eq!(
            slots.ops(),
            vec![
                Op::Wait(0),
                Op::Acquire(0),
                Op::ResetFence(0),
                Op::Begin(0),
                Op::Record(2),
                Op::Submit(0),
                Op::Present(0, 2),
            ]
        );
    }

    #[test]
    fn test_consecutive_frames_alternate_slots() {
        let slots = FakeSlots::new();
        for frame_number in 0..4 {
            run_frame(&slots, frame_number, |_| Ok(())).unwrap();
        }

        let waits: Vec<Op> = slots
            .ops()
            .into_iter()
            .filter(|op| matches!(op, Op::Wait(_)))
            .collect();
        assert_eq!(waits, vec![Op::Wait(0), Op::Wait(1), Op::Wait(0), Op::Wait(1)]);
    }

    #[test]
    fn test_busy_slot_is_not_rerecorded() {
        let slots = FakeSlots::new();
        slots.signaled.borrow_mut()[1] = false;

        let result = run_frame(&slots, 1, |_| Ok(()));

        assert!(matches!(result, Err(RenderError::Rhi(RhiError::Timeout(_)))));
        assert_eq!(slots.ops(), vec![Op::Wait(1)]);
    }

    #[test]
    fn test_out_of_date_skips_without_resetting_fence() {
        let slots = FakeSlots::new();
        slots.acquire.set(Acquired::OutOfDate);

        let outcome = run_frame(&slots, 0, |_| Ok(())).unwrap();
        assert_eq!(outcome, FrameOutcome::Skipped);
        assert_eq!(slots.ops(), vec![Op::Wait(0), Op::Acquire(0)]);
        assert!(slots.signaled.borrow()[0]);

        // The retry on the same slot does not block.
        slots.acquire.set(Acquired::Image {
            index: 0,
            suboptimal: false,
        });
        assert!(run_frame(&slots, 0, |_| Ok(())).is_ok());
    }

    #[test]
    fn test_failed_recording_still_signals_fence() {
        let slots = FakeSlots::new();

        let result: RenderResult<FrameOutcome<()>> = run_frame(&slots, 0, |_| {
            Err(RenderError::UnknownHandle {
                kind: "mesh",
                index: 3,
            })
        });

        assert!(matches!(
            result,
            Err(RenderError::UnknownHandle { kind: "mesh", index: 3 })
        ));
        assert_eq!(
            slots.ops(),
            vec![
                Op::Wait(0),
                Op::Acquire(0),
                Op::ResetFence(0),
                Op::Begin(0),
                Op::Submit(0),
            ]
        );
        assert!(slots.signaled.borrow()[0]);
    }

    #[test]
    fn test_suboptimal_or_stale_swapchain_requests_rebuild() {
        let slots = FakeSlots::new();
        slots.acquire.set(Acquired::Image {
            index: 1,
            suboptimal: true,
        });
        let outcome = run_frame(&slots, 0, |_| Ok(())).unwrap();
        assert_eq!(
            outcome,
            FrameOutcome::Presented {
                recorded: (),
                rebuild: true
            }
        );

        slots.acquire.set(Acquired::Image {
            index: 1,
            suboptimal: false,
        });
        slots.stale_on_present.set(true);
        let outcome = run_frame(&slots, 1, |_| Ok(())).unwrap();
        assert_eq!(
            outcome,
            FrameOutcome::Presented {
                recorded: (),
                rebuild: true
            }
        );
    }

    #[test]
    fn test_frame_manager_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<FrameManager>();
    }
}
