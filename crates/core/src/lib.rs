//! Core utilities for the Vulkan engine.
//!
//! This crate provides foundational types and utilities used across the engine:
//! - Error types and result aliases
//! - Logging initialization
//! - Timer and frame-rate reporting
//! - Configuration management

mod config;
mod error;
mod logging;
mod timer;

pub use config::{EngineConfig, PresentModePreference};
pub use error::{Error, Result};
pub use logging::{DEFAULT_FILTER, init_logging};
pub use timer::{FpsCounter, Timer};
