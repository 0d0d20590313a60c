//! Vulkan abstraction layer (Render Hardware Interface).
//!
//! RAII wrappers over `ash`: instance, GPU selection, device and allocator,
//! swapchain, render pass, commands, buffers, images, descriptors, shaders,
//! pipelines and synchronization. Objects the engine keeps for its whole
//! lifetime can give up ownership (`into_raw` / `into_parts`) so their
//! destruction is ordered by the renderer's deletion queue instead.

mod error;

pub mod buffer;
pub mod command;
pub mod descriptor;
pub mod device;
pub mod image;
pub mod instance;
pub mod physical_device;
pub mod pipeline;
pub mod render_pass;
pub mod shader;
pub mod swapchain;
pub mod sync;
pub mod vertex;

pub use error::{RhiError, RhiResult};

pub use ash::vk;
pub use gpu_allocator::vulkan::Allocation;
