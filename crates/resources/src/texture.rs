//! Texture decoding into tightly packed RGBA8 pixels.

use std::path::Path;

use tracing::info;

use crate::error::{ResourceError, ResourceResult};

/// Decoded image, four bytes per pixel, rows top to bottom.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureData {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl TextureData {
    /// Loads any PNG or JPEG and converts it to RGBA8.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::FileNotFound`] if the file is missing and
    /// [`ResourceError::Image`] if it cannot be decoded.
    pub fn load(path: &Path) -> ResourceResult<Self> {
        if !path.exists() {
            return Err(ResourceError::FileNotFound(path.to_path_buf()));
        }

        let rgba = image::open(path)?.to_rgba8();
        let (width, height) = rgba.dimensions();
        info!("Loaded texture {:?}: {}x{}", path, width, height);

        Ok(Self {
            width,
            height,
            pixels: rgba.into_raw(),
        })
    }

    /// Wraps already-decoded RGBA8 pixels. Returns `None` if the buffer size
    /// does not match the dimensions.
    pub fn from_rgba8(width: u32, height: u32, pixels: Vec<u8>) -> Option<Self> {
        let expected = width as usize * height as usize * 4;
        (pixels.len() == expected && expected > 0).then_some(Self {
            width,
            height,
            pixels,
        })
    }

    #[inline]
    pub fn size_bytes(&self) -> u64 {
        self.pixels.len() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_rgba8_checks_size() {
        assert!(TextureData::from_rgba8(2, 2, vec![0; 16]).is_some());
        assert!(TextureData::from_rgba8(2, 2, vec![0; 12]).is_none());
        assert!(TextureData::from_rgba8(0, 0, Vec::new()).is_none());
    }

    #[test]
    fn test_size_bytes() {
        let texture = TextureData::from_rgba8(4, 2, vec![255; 32]).unwrap();
        assert_eq!(texture.size_bytes(), 32);
    }
}
