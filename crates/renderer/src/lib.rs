//! Rendering core of the engine.
//!
//! This crate owns everything between the RHI wrappers and the application:
//! - Deferred teardown through a LIFO deletion queue
//! - Double-buffered frame slots and the synchronous upload path
//! - The three-set descriptor scheme and dynamic uniform offsets
//! - Pipelines, materials and GPU meshes
//! - Sorting and dispatching the render batch
//! - The [`Engine`] that ties them together

pub mod batch;
pub mod deletion_queue;
pub mod demo_scene;
pub mod descriptors;
pub mod engine;
mod error;
pub mod frame;
pub mod frame_manager;
pub mod material;
pub mod mesh;
pub mod overlay;
pub mod pipelines;
pub mod render_targets;
pub mod texture;
pub mod ubo;
pub mod upload;

pub use engine::Engine;
pub use error::{RenderError, RenderResult};
pub use frame_manager::FrameManager;
pub use overlay::{NoOverlay, UiOverlay};

/// Maximum number of frames that can be in flight simultaneously.
pub const MAX_FRAMES_IN_FLIGHT: usize = 2;
