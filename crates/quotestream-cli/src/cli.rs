//! CLI argument definitions for quotestream.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `run` | Start the streaming loop until Ctrl+C |
//! | `validate` | Load and check a configuration file |
//! | `init` | Write the default configuration |
//!
//! # Examples
//!
//! ```bash
//! quotestream init --output quotestream.yaml
//! quotestream validate --config quotestream.yaml
//! quotestream run --config quotestream.yaml --log-format json
//! ```

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use quotestream_core::LogFormat;

pub const DEFAULT_CONFIG_PATH: &str = "quotestream.yaml";

/// Streams market quotes into storage and an event bus.
#[derive(Debug, Parser)]
#[command(name = "quotestream", author, version, about)]
pub struct Cli {
    /// Overrides `logging.format` from the configuration (pretty, json, compact).
    #[arg(long, global = true)]
    pub log_format: Option<LogFormat>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start polling and publishing until interrupted.
    Run(ConfigArgs),
    /// Check a configuration file and print a summary.
    Validate(ConfigArgs),
    /// Write the default configuration to a file.
    Init(InitArgs),
}

#[derive(Debug, Args)]
pub struct ConfigArgs {
    /// Path to the YAML configuration file.
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,
}

#[derive(Debug, Args)]
pub struct InitArgs {
    /// Where to write the configuration.
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    pub output: PathBuf,

    /// Overwrite an existing file.
    #[arg(long)]
    pub force: bool,
}
