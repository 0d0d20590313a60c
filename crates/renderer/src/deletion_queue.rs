//! Reverse-order teardown of engine-lifetime GPU objects.
//!
//! Objects that live as long as the engine are handed to the
//! [`DeletionQueue`] right after creation. The queue stores a tagged record per
//! object (the raw handle plus its [`ResourceKind`], or a memory allocation)
//! and [`DeletionQueue::flush`] hands the records back to a [`Disposer`] in the
//! exact reverse of registration order. Registering things in creation order
//! therefore destroys views before images, memory after the buffer that used
//! it, and the descriptor pool after the layouts created before it.
//!
//! Flushing must only happen once the device is idle.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use renderer_rhi::device::Device;
//! use renderer_rhi::sync::Fence;
//! use renderer_renderer::deletion_queue::{DeletionQueue, DeviceDisposer};
//!
//! # fn example(device: Arc<Device>) -> Result<(), renderer_rhi::RhiError> {
//! let mut queue = DeletionQueue::new();
//! let fence = queue.track(Fence::new(device.clone(), true)?);
//!
//! device.wait_idle()?;
//! queue.flush(&mut DeviceDisposer::new(&device));
//! # let _ = fence;
//! # Ok(())
//! # }
//! ```

use ash::vk;
use ash::vk::Handle;
use tracing::{debug, error, warn};

use renderer_rhi::Allocation;
use renderer_rhi::buffer::{Buffer, BufferView};
use renderer_rhi::command::CommandPool;
use renderer_rhi::descriptor::{DescriptorPool, DescriptorSetLayout};
use renderer_rhi::device::Device;
use renderer_rhi::image::{Image, ImageParts, Sampler};
use renderer_rhi::pipeline::PipelineLayout;
use renderer_rhi::render_pass::RenderPass;
use renderer_rhi::sync::{Fence, Semaphore};

/// Kind tag stored next to a raw handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Fence,
    Semaphore,
    CommandPool,
    Buffer,
    Image,
    ImageView,
    Sampler,
    DescriptorSetLayout,
    DescriptorPool,
    PipelineLayout,
    Pipeline,
    RenderPass,
}

/// One deferred teardown.
#[derive(Debug)]
pub enum Disposal {
    Handle { kind: ResourceKind, raw: u64 },
    Memory(Allocation),
}

/// Vulkan handle types the queue knows how to destroy.
pub trait Disposable: Handle + Copy {
    const KIND: ResourceKind;
}

macro_rules! disposable {
    ($($ty:ident),* $(,)?) => {
        $(
            impl Disposable for vk::$ty {
                const KIND: ResourceKind = ResourceKind::$ty;
            }
        )*
    };
}

disposable!(
    Fence,
    Semaphore,
    CommandPool,
    Buffer,
    Image,
    ImageView,
    Sampler,
    DescriptorSetLayout,
    DescriptorPool,
    PipelineLayout,
    Pipeline,
    RenderPass,
);

/// Owning wrappers that can hand their handles over to the queue.
///
/// `retire` releases ownership, registers whatever must later be destroyed,
/// and returns the handle(s) the caller keeps using.
pub trait Retire {
    type Handle;

    fn retire(self, queue: &mut DeletionQueue) -> Self::Handle;
}

macro_rules! retire_raw {
    ($($wrapper:ty => $handle:ty),* $(,)?) => {
        $(
            impl Retire for $wrapper {
                type Handle = $handle;

                fn retire(self, queue: &mut DeletionQueue) -> $handle {
                    let raw = self.into_raw();
                    queue.push(raw);
                    raw
                }
            }
        )*
    };
}

retire_raw!(
    Fence => vk::Fence,
    Semaphore => vk::Semaphore,
    CommandPool => vk::CommandPool,
    Sampler => vk::Sampler,
    DescriptorSetLayout => vk::DescriptorSetLayout,
    DescriptorPool => vk::DescriptorPool,
    PipelineLayout => vk::PipelineLayout,
    RenderPass => vk::RenderPass,
);

impl Retire for Buffer {
    type Handle = BufferView;

    fn retire(self, queue: &mut DeletionQueue) -> BufferView {
        let (view, allocation) = self.into_parts();
        retire_buffer_parts(queue, view.handle, allocation);
        view
    }
}

impl Retire for Image {
    type Handle = ImageParts;

    fn retire(self, queue: &mut DeletionQueue) -> ImageParts {
        let (parts, allocation) = self.into_parts();
        retire_image_parts(queue, &parts, allocation);
        parts
    }
}

// Memory is pushed first so the flush destroys the buffer before freeing it.
fn retire_buffer_parts(queue: &mut DeletionQueue, buffer: vk::Buffer, allocation: Allocation) {
    queue.push_memory(allocation);
    queue.push(buffer);
}

// Flushed as view, image, memory.
fn retire_image_parts(queue: &mut DeletionQueue, parts: &ImageParts, allocation: Allocation) {
    queue.push_memory(allocation);
    queue.push(parts.image);
    queue.push(parts.view);
}

/// Carries out disposals.
pub trait Disposer {
    fn dispose(&mut self, disposal: Disposal);
}

/// Destroys records through the device, dispatching on their kind.
pub struct DeviceDisposer<'a> {
    device: &'a Device,
}

impl<'a> DeviceDisposer<'a> {
    pub fn new(device: &'a Device) -> Self {
        Self { device }
    }
}

impl Disposer for DeviceDisposer<'_> {
    fn dispose(&mut self, disposal: Disposal) {
        let (kind, raw) = match disposal {
            Disposal::Handle { kind, raw } => (kind, raw),
            Disposal::Memory(allocation) => {
                if let Err(e) = self.device.allocator().free(allocation) {
                    error!("Failed to free allocation: {:?}", e);
                }
                return;
            }
        };

        let device = self.device.handle();
        // SAFETY: every record was registered exactly once by its owner, and
        // flushing only happens once the device is idle.
        unsafe {
            match kind {
                ResourceKind::Fence => device.destroy_fence(vk::Fence::from_raw(raw), None),
                ResourceKind::Semaphore => {
                    device.destroy_semaphore(vk::Semaphore::from_raw(raw), None)
                }
                ResourceKind::CommandPool => {
                    device.destroy_command_pool(vk::CommandPool::from_raw(raw), None)
                }
                ResourceKind::Buffer => device.destroy_buffer(vk::Buffer::from_raw(raw), None),
                ResourceKind::Image => device.destroy_image(vk::Image::from_raw(raw), None),
                ResourceKind::ImageView => {
                    device.destroy_image_view(vk::ImageView::from_raw(raw), None)
                }
                ResourceKind::Sampler => device.destroy_sampler(vk::Sampler::from_raw(raw), None),
                ResourceKind::DescriptorSetLayout => device
                    .destroy_descriptor_set_layout(vk::DescriptorSetLayout::from_raw(raw), None),
                ResourceKind::DescriptorPool => {
                    device.destroy_descriptor_pool(vk::DescriptorPool::from_raw(raw), None)
                }
                ResourceKind::PipelineLayout => {
                    device.destroy_pipeline_layout(vk::PipelineLayout::from_raw(raw), None)
                }
                ResourceKind::Pipeline => {
                    device.destroy_pipeline(vk::Pipeline::from_raw(raw), None)
                }
                ResourceKind::RenderPass => {
                    device.destroy_render_pass(vk::RenderPass::from_raw(raw), None)
                }
            }
        }
    }
}

/// LIFO list of deferred teardowns.
#[derive(Debug, Default)]
pub struct DeletionQueue {
    entries: Vec<Disposal>,
}

impl DeletionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a raw handle. Null handles are ignored.
    pub fn push<H: Disposable>(&mut self, handle: H) {
        if handle.is_null() {
            debug!("Ignoring null {:?} handle", H::KIND);
            return;
        }
        self.entries.push(Disposal::Handle {
            kind: H::KIND,
            raw: handle.as_raw(),
        });
    }

    /// Registers an allocation to be returned to the allocator.
    pub fn push_memory(&mut self, allocation: Allocation) {
        self.entries.push(Disposal::Memory(allocation));
    }

    /// Takes ownership of `object` and returns the handle to keep using.
    pub fn track<T: Retire>(&mut self, object: T) -> T::Handle {
        object.retire(self)
    }

    /// Runs every registered disposal once, newest first, and empties the
    /// queue.
    pub fn flush(&mut self, disposer: &mut impl Disposer) {
        let count = self.entries.len();
        while let Some(disposal) = self.entries.pop() {
            disposer.dispose(disposal);
        }
        if count > 0 {
            debug!("Deletion queue flushed {} record(s)", count);
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Drop for DeletionQueue {
    fn drop(&mut self) {
        if !self.entries.is_empty() {
            warn!(
                "Deletion queue dropped with {} record(s) never flushed",
                self.entries.len()
            );
        }
    }
}
