//! # PCM Feeder Common Library
//!
//! Shared code for the pcm-feeder workspace:
//! - Error types
//! - Configuration file resolution and TOML loading
//! - Logging configuration

pub mod config;
pub mod error;

pub use config::{LoggingConfig, TomlConfig};
pub use error::{Error, Result};
