//! Error types for asset decoding.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ResourceError {
    #[error("Failed to load glTF file '{path}': {message}")]
    GltfLoad { path: PathBuf, message: String },

    #[error("Failed to parse OBJ file '{path}': {message}")]
    ObjLoad { path: PathBuf, message: String },

    #[error("Unsupported mesh format: {0}")]
    UnsupportedFormat(PathBuf),

    #[error("'{0}' contains no triangles")]
    NoGeometry(PathBuf),

    /// A mesh primitive has no position data.
    #[error("Mesh primitive has no position data")]
    NoPositionData,

    #[error("Face in '{path}' references missing {attribute} index {index}")]
    BadIndex {
        path: PathBuf,
        attribute: &'static str,
        index: usize,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),
}

pub type ResourceResult<T> = Result<T, ResourceError>;
