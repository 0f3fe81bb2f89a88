//! CuraPost Settings Crate
//!
//! Loads and saves pipeline descriptions: the printer configuration and the
//! ordered list of transform configurations.

pub mod config;
pub mod error;

pub use config::{default_config_path, PipelineConfig, DEFAULT_FILE_NAME};
pub use error::{SettingsError, SettingsResult};
