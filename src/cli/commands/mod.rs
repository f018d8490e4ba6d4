//! CLI commands implementation.
//!
//! This module contains the CLI parser and dispatches to command-specific modules.

mod check;
mod extract;
mod template;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use formscrape::config::{Config, LoadOptions};
use formscrape::OcrBackendType;

/// How records are printed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// `field: value` lines
    #[default]
    Text,
    /// One JSON object per page
    Json,
    /// One YAML document per page
    Yaml,
}

#[derive(Parser)]
#[command(name = "formscrape")]
#[command(about = "Extract field values from scanned fixed-layout forms")]
#[command(version)]
pub struct Cli {
    /// Config file path (overrides auto-discovery)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Extract every template field from one or more page images
    Extract {
        /// Page images to process
        #[arg(required = true)]
        images: Vec<PathBuf>,
        /// Template file (defaults to the configured or built-in template)
        #[arg(short, long, env = "FORMSCRAPE_TEMPLATE")]
        template: Option<PathBuf>,
        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
        /// Number of fields processed concurrently
        #[arg(short, long)]
        workers: Option<usize>,
        /// OCR backend (tesseract, ocrs)
        #[arg(short, long)]
        backend: Option<String>,
    },

    /// Check if the OCR backends are installed
    Check,

    /// Validate a template and list its fields
    Template {
        /// Template file (defaults to the configured or built-in template)
        file: Option<PathBuf>,
    },
}

/// Run the CLI.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let options = LoadOptions {
        config_path: cli.config.clone(),
        search_dir: None,
    };
    let mut config = Config::load(&options)?;

    match cli.command {
        Commands::Extract {
            images,
            template,
            format,
            workers,
            backend,
        } => {
            if let Some(template) = template {
                config.template = Some(template);
            }
            if let Some(workers) = workers {
                config.extraction.workers = workers;
            }
            if let Some(backend) = backend {
                config.ocr.backend = OcrBackendType::from_str(&backend)
                    .ok_or_else(|| anyhow::anyhow!("Unknown OCR backend: {}", backend))?;
            }
            extract::cmd_extract(&config, &images, format).await
        }
        Commands::Check => check::cmd_check(&config),
        Commands::Template { file } => {
            if let Some(file) = file {
                config.template = Some(file);
            }
            template::cmd_template(&config)
        }
    }
}
