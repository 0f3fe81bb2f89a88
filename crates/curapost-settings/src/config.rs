//! Pipeline configuration files
//!
//! A pipeline file holds the printer description and the ordered list of
//! transforms to run. Files are TOML or JSON, chosen by extension:
//!
//! ```toml
//! annotate_header = true
//!
//! [printer]
//! machine_width = 235.0
//! machine_depth = 235.0
//!
//! [[transforms]]
//! kind = "pause_at_layer"
//! layers = "12"
//!
//! [[transforms]]
//! kind = "final_z"
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use curapost_core::PrinterConfig;
use curapost_transforms::{Pipeline, TransformConfig};

use crate::error::{SettingsError, SettingsResult};

/// File name used under the user configuration directory
pub const DEFAULT_FILE_NAME: &str = "pipeline.toml";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Json,
    Toml,
}

impl Format {
    fn from_path(path: &Path) -> SettingsResult<Self> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Ok(Self::Json),
            Some("toml") => Ok(Self::Toml),
            other => Err(SettingsError::UnsupportedFormat(
                other.unwrap_or("<none>").to_string(),
            )),
        }
    }
}

/// Printer description plus the ordered transform list
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Write diagnostics as comments at the end of the header block
    pub annotate_header: bool,
    pub printer: PrinterConfig,
    pub transforms: Vec<TransformConfig>,
}

impl PipelineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pipeline file with every transform at its default settings
    pub fn with_all_transforms() -> Self {
        Self {
            annotate_header: true,
            printer: PrinterConfig::default(),
            transforms: TransformConfig::all_defaults(),
        }
    }

    /// Load config from file (JSON or TOML)
    pub fn load_from_file(path: &Path) -> SettingsResult<Self> {
        let format = Format::from_path(path)?;
        let content = std::fs::read_to_string(path)?;
        let config: Self = match format {
            Format::Json => serde_json::from_str(&content)?,
            Format::Toml => toml::from_str(&content)?,
        };
        config.validate()?;
        tracing::debug!(
            path = %path.display(),
            transforms = config.transforms.len(),
            "loaded pipeline config"
        );
        Ok(config)
    }

    /// Save config to file (JSON or TOML)
    pub fn save_to_file(&self, path: &Path) -> SettingsResult<()> {
        self.validate()?;
        let content = match Format::from_path(path)? {
            Format::Json => serde_json::to_string_pretty(self)?,
            Format::Toml => toml::to_string_pretty(self)?,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        tracing::info!(path = %path.display(), "saved pipeline config");
        Ok(())
    }

    /// Reject printer values no transform can work with
    pub fn validate(&self) -> SettingsResult<()> {
        let printer = &self.printer;
        for (key, value) in [
            ("printer.machine_width", printer.machine_width),
            ("printer.machine_depth", printer.machine_depth),
            ("printer.machine_height", printer.machine_height),
            ("printer.layer_height", printer.layer_height),
            ("printer.layer_height_0", printer.layer_height_0),
            ("printer.max_feedrate_z", printer.max_feedrate_z),
        ] {
            if !positive(value) {
                return Err(SettingsError::invalid(key, format!("must be > 0, got {}", value)));
            }
        }

        if printer.extruders.is_empty() {
            return Err(SettingsError::invalid(
                "printer.extruders",
                "at least one extruder is required",
            ));
        }
        for (i, extruder) in printer.extruders.iter().enumerate() {
            if !positive(extruder.nozzle_size) {
                return Err(SettingsError::invalid(
                    format!("printer.extruders[{}].nozzle_size", i),
                    "must be > 0",
                ));
            }
            if !positive(extruder.material_diameter) {
                return Err(SettingsError::invalid(
                    format!("printer.extruders[{}].material_diameter", i),
                    "must be > 0",
                ));
            }
        }
        Ok(())
    }

    /// Build the runnable pipeline
    pub fn pipeline(&self) -> Pipeline {
        let mut pipeline = Pipeline::new().with_header_annotations(self.annotate_header);
        pipeline.register_all(self.transforms.iter().map(TransformConfig::build).collect());
        pipeline
    }
}

fn positive(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

/// `<config dir>/curapost/pipeline.toml`
pub fn default_config_path() -> SettingsResult<PathBuf> {
    let mut path = dirs::config_dir()
        .or_else(dirs::home_dir)
        .ok_or_else(|| SettingsError::ConfigDirectory("no config or home directory".to_string()))?;
    path.push("curapost");
    path.push(DEFAULT_FILE_NAME);
    Ok(path)
}
