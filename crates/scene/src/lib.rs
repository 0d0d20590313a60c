//! Scene-side data: the camera and handle-addressed registries.

pub mod arena;
pub mod camera;

pub use arena::{Arena, Handle};
pub use camera::{Camera, Projection};
