//! Asset decoding.
//!
//! Turns files on disk into CPU-side data the renderer uploads: meshes become
//! flat [`Vertex`](renderer_rhi::vertex::Vertex) arrays and images become
//! RGBA8 pixel buffers.

mod error;
pub mod mesh;
pub mod texture;

pub use error::{ResourceError, ResourceResult};
pub use mesh::MeshData;
pub use texture::TextureData;
