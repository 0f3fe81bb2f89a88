//! # CuraPost
//!
//! Post-processing for sliced FDM G-code. A sliced file is split into
//! host-style blocks (header, start sequence, one block per layer, end
//! sequence), passed through an ordered pipeline of named transforms and
//! joined back together.
//!
//! ## Architecture
//!
//! 1. **curapost-core** - errors, diagnostics, printer configuration, number formatting
//! 2. **curapost-parser** - line tokenizer, command model, documents, block index,
//!    machine state and the block rewriter
//! 3. **curapost-transforms** - the transform trait, pipeline, registry and every transform
//! 4. **curapost-settings** - pipeline configuration files
//! 5. **curapost** - this crate: logging setup, file processing and the command line

use std::path::Path;

use anyhow::Context;

pub use curapost_core::{
    Diagnostic, DiagnosticLevel, Diagnostics, Error, PrinterConfig, Result, TransformError,
};
pub use curapost_parser::{Block, BlockIndex, CommandLine, Document};
pub use curapost_settings::{default_config_path, PipelineConfig, SettingsError};
pub use curapost_transforms::{
    Capability, Pipeline, Transform, TransformConfig, TransformContext, TransformRegistry,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Run `config`'s pipeline over the text of a whole G-code file
pub fn process_gcode(gcode: &str, config: &PipelineConfig) -> (String, Diagnostics) {
    let pipeline = config.pipeline();
    let mut ctx = TransformContext::new(config.printer.clone());
    let doc = Document::parse(gcode);
    tracing::info!(
        blocks = doc.len(),
        transforms = pipeline.transform_count(),
        "processing gcode"
    );
    let doc = pipeline.run(doc, &mut ctx);
    (doc.to_gcode(), ctx.diagnostics)
}

/// Read `input`, process it and write the result to `output`
pub fn process_file(
    input: &Path,
    output: &Path,
    config: &PipelineConfig,
) -> anyhow::Result<Diagnostics> {
    let gcode = std::fs::read_to_string(input)
        .with_context(|| format!("Failed to read {}", input.display()))?;
    let (processed, diagnostics) = process_gcode(&gcode, config);
    std::fs::write(output, processed)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    tracing::info!(output = %output.display(), "wrote processed gcode");
    Ok(diagnostics)
}

/// Initialize logging with the default configuration
///
/// Logs go to stderr at INFO unless `RUST_LOG` says otherwise. `json`
/// switches to one JSON object per line.
pub fn init_logging(json: bool) -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(tracing::Level::INFO.to_string()));

    let registry = tracing_subscriber::registry().with(env_filter);
    if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()?;
    } else {
        registry
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_level(true),
            )
            .try_init()?;
    }
    Ok(())
}
