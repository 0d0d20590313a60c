//! Engine configuration.
//!
//! [`EngineConfig`] carries every tunable the engine reads at startup. The
//! defaults reproduce the reference scene; [`EngineConfig::from_env`] layers
//! `ENGINE_*` environment variables on top of them.
//!
//! # Example
//!
//! ```
//! use renderer_core::EngineConfig;
//!
//! let config = EngineConfig::default();
//! assert_eq!(config.window_width, 1700);
//! assert_eq!(config.max_objects, 10_000);
//! ```

use std::path::PathBuf;
use std::str::FromStr;

use crate::error::{Error, Result};

/// How the swapchain should pace presentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PresentModePreference {
    /// Present as fast as possible, falling back to FIFO when unsupported.
    #[default]
    Immediate,
    /// Vsync.
    Fifo,
}

impl FromStr for PresentModePreference {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "immediate" => Ok(Self::Immediate),
            "fifo" | "vsync" => Ok(Self::Fifo),
            other => Err(Error::Config(format!("unknown present mode '{}'", other))),
        }
    }
}

/// Startup configuration for the engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Initial window width in pixels.
    pub window_width: u32,
    /// Initial window height in pixels.
    pub window_height: u32,
    /// Window title.
    pub title: String,
    /// Enable the Khronos validation layer when available.
    pub enable_validation: bool,
    /// Preferred presentation mode.
    pub present_mode: PresentModePreference,
    /// Timeout for the per-frame fence wait and swapchain acquire, in nanoseconds.
    pub frame_timeout_ns: u64,
    /// Timeout for the upload fence wait, in nanoseconds.
    pub upload_timeout_ns: u64,
    /// Capacity of each per-frame object storage buffer.
    pub max_objects: usize,
    /// Upload vertex data into device-local memory through a staging buffer.
    pub gpu_only_mesh_buffers: bool,
    /// Directory holding compiled `.spv` shader binaries.
    pub shader_dir: PathBuf,
    /// Directory holding mesh and texture assets.
    pub asset_dir: PathBuf,
    /// Draw the hardcoded debug triangle before the batch.
    pub debug_triangle: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            window_width: 1700,
            window_height: 900,
            title: "Vulkan Engine".to_string(),
            enable_validation: cfg!(debug_assertions),
            present_mode: PresentModePreference::Immediate,
            frame_timeout_ns: 1_000_000_000,
            upload_timeout_ns: 9_999_999_999,
            max_objects: 10_000,
            gpu_only_mesh_buffers: true,
            shader_dir: PathBuf::from("shaders/spirv"),
            asset_dir: PathBuf::from("assets"),
            debug_triangle: false,
        }
    }
}

impl EngineConfig {
    /// Builds a configuration from the defaults plus `ENGINE_*` overrides.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when a variable is set but cannot be parsed.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) but reads values through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(v) = lookup("ENGINE_WIDTH") {
            config.window_width = parse_value("ENGINE_WIDTH", &v)?;
        }
        if let Some(v) = lookup("ENGINE_HEIGHT") {
            config.window_height = parse_value("ENGINE_HEIGHT", &v)?;
        }
        if let Some(v) = lookup("ENGINE_PRESENT_MODE") {
            config.present_mode = v.parse()?;
        }
        if let Some(v) = lookup("ENGINE_VALIDATION") {
            config.enable_validation = parse_flag("ENGINE_VALIDATION", &v)?;
        }
        if let Some(v) = lookup("ENGINE_MAX_OBJECTS") {
            config.max_objects = parse_value("ENGINE_MAX_OBJECTS", &v)?;
        }
        if let Some(v) = lookup("ENGINE_DEBUG_TRIANGLE") {
            config.debug_triangle = parse_flag("ENGINE_DEBUG_TRIANGLE", &v)?;
        }
        if let Some(v) = lookup("ENGINE_SHADER_DIR") {
            config.shader_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("ENGINE_ASSET_DIR") {
            config.asset_dir = PathBuf::from(v);
        }

        if config.window_width == 0 || config.window_height == 0 {
            return Err(Error::Config("window dimensions must be non-zero".into()));
        }
        if config.max_objects == 0 {
            return Err(Error::Config("ENGINE_MAX_OBJECTS must be non-zero".into()));
        }

        Ok(config)
    }
}

fn parse_value<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::Config(format!("{}: invalid value '{}'", key, value)))
}

fn parse_flag(key: &str, value: &str) -> Result<bool> {
    match value.trim() {
        "1" | "true" | "on" => Ok(true),
        "0" | "false" | "off" => Ok(false),
        _ => Err(Error::Config(format!("{}: expected 0 or 1, got '{}'", key, value))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!((config.window_width, config.window_height), (1700, 900));
        assert_eq!(config.frame_timeout_ns, 1_000_000_000);
        assert_eq!(config.upload_timeout_ns, 9_999_999_999);
        assert_eq!(config.present_mode, PresentModePreference::Immediate);
        assert!(config.gpu_only_mesh_buffers);
    }

    #[test]
    fn test_env_overrides() {
        let config = EngineConfig::from_lookup(lookup_from(&[
            ("ENGINE_WIDTH", "800"),
            ("ENGINE_HEIGHT", "600"),
            ("ENGINE_PRESENT_MODE", "FIFO"),
            ("ENGINE_VALIDATION", "0"),
            ("ENGINE_MAX_OBJECTS", "64"),
        ]))
        .unwrap();

        assert_eq!(config.window_width, 800);
        assert_eq!(config.window_height, 600);
        assert_eq!(config.present_mode, PresentModePreference::Fifo);
        assert!(!config.enable_validation);
        assert_eq!(config.max_objects, 64);
    }

    #[test]
    fn test_invalid_value_is_config_error() {
        let result = EngineConfig::from_lookup(lookup_from(&[("ENGINE_WIDTH", "wide")]));
        assert!(matches!(result, Err(Error::Config(_))));

        let result = EngineConfig::from_lookup(lookup_from(&[("ENGINE_PRESENT_MODE", "mailbox")]));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let result = EngineConfig::from_lookup(lookup_from(&[("ENGINE_MAX_OBJECTS", "0")]));
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
