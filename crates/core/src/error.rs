//! Error types shared by the engine crates.

use thiserror::Error;

/// Top-level error type for engine-wide concerns.
///
/// GPU-level failures live in `renderer_rhi::RhiError`; this type covers the
/// window, configuration and I/O concerns that sit around the GPU core.
#[derive(Error, Debug)]
pub enum Error {
    /// Vulkan-related errors raised outside the RHI (e.g. surface creation)
    #[error("Vulkan error: {0}")]
    Vulkan(String),

    /// Window creation or management errors
    #[error("Window error: {0}")]
    Window(String),

    /// Resource loading errors
    #[error("Resource error: {0}")]
    Resource(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A configuration value could not be parsed
    #[error("Config error: {0}")]
    Config(String),
}

/// Result type alias using the engine's Error type.
pub type Result<T> = std::result::Result<T, Error>;
