//! Error type for the renderer crate.

use renderer_resources::ResourceError;
use renderer_rhi::RhiError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RenderError {
    #[error(transparent)]
    Rhi(#[from] RhiError),

    #[error(transparent)]
    Resource(#[from] ResourceError),

    #[error(transparent)]
    Core(#[from] renderer_core::Error),

    /// A render object refers to a mesh or material that is not registered.
    #[error("Unknown {kind} handle #{index}")]
    UnknownHandle { kind: &'static str, index: u32 },

    /// More render objects than the per-frame object buffer can hold.
    #[error("{count} render objects exceed the object buffer capacity of {capacity}")]
    TooManyObjects { count: usize, capacity: usize },
}

pub type RenderResult<T> = Result<T, RenderError>;
