use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};

use curapost::{
    default_config_path, init_logging, process_file, Diagnostics, PipelineConfig,
    TransformRegistry,
};

#[derive(Parser, Debug)]
#[command(name = "curapost", version, about = "Post-process sliced G-code files")]
struct Cli {
    /// Log as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the configured pipeline over a G-code file
    Run {
        input: PathBuf,
        /// Output file; defaults to overwriting the input
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Pipeline file (.toml or .json)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Report transform ordering conflicts in a pipeline file
    Check {
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Write a pipeline file listing every transform
    InitConfig {
        /// Destination; defaults to the user configuration directory
        path: Option<PathBuf>,
        #[arg(long)]
        force: bool,
    },
    /// List the available transforms
    List,
}

fn config_path(explicit: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    match explicit {
        Some(path) => Ok(path),
        None => Ok(default_config_path()?),
    }
}

fn load_config(path: &Path) -> anyhow::Result<PipelineConfig> {
    PipelineConfig::load_from_file(path)
        .with_context(|| format!("Failed to load pipeline {}", path.display()))
}

fn print_diagnostics(diagnostics: &Diagnostics) {
    for d in diagnostics.iter() {
        println!("{:>7} [{}] {}", d.level.to_string(), d.source, d.message);
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_json)?;

    match cli.command {
        Command::Run {
            input,
            output,
            config,
        } => {
            let config = load_config(&config_path(config)?)?;
            let output = output.unwrap_or_else(|| input.clone());
            let diagnostics = process_file(&input, &output, &config)?;
            print_diagnostics(&diagnostics);
        }
        Command::Check { config } => {
            let config = load_config(&config_path(config)?)?;
            let pipeline = config.pipeline();
            for (i, (name, description)) in pipeline.list_transforms().into_iter().enumerate() {
                println!("{:>3}. {:<34} {}", i + 1, name, description);
            }
            let conflicts = pipeline.check_order();
            if !conflicts.is_empty() {
                for conflict in &conflicts {
                    println!("conflict: {}", conflict);
                }
                bail!("{} ordering conflict(s)", conflicts.len());
            }
            println!("no ordering conflicts");
        }
        Command::InitConfig { path, force } => {
            let path = config_path(path)?;
            if path.exists() && !force {
                bail!("{} already exists, use --force to overwrite", path.display());
            }
            PipelineConfig::with_all_transforms().save_to_file(&path)?;
            println!("wrote {}", path.display());
        }
        Command::List => {
            let registry = TransformRegistry::with_defaults();
            for name in registry.list_registered() {
                if let Some(transform) = registry.create(&name) {
                    println!("{:<34} {}", name, transform.description());
                }
            }
        }
    }
    Ok(())
}
