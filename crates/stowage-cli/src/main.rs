//! Stowage CLI - Command-line interface for the data-movement engine
//!
//! Provides commands for:
//! - Writing snapshots to the document store in bounded batches
//! - Incrementally uploading a local tree to the object store
//! - Inspecting manifests and remote snapshot completeness
//! - Viewing and validating configuration

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use stowage_core::config::Config;
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

use commands::{
    config::ConfigCommand, status::StatusCommand, upload::UploadCommand, write::WriteCommand,
    CliContext,
};
use output::OutputFormat;

#[derive(Debug, Parser)]
#[command(name = "stowage", version, about = "Batched snapshot writes and incremental uploads")]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    /// Verbose output (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Use alternate config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Write a snapshot file to the document store
    Write(WriteCommand),
    /// Upload changed files to the object store
    Upload(UploadCommand),
    /// Show manifest and snapshot status
    Status(StatusCommand),
    /// View and validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

/// Level used when neither `RUST_LOG` nor `-v` decides
fn default_level(config_path: Option<&PathBuf>) -> String {
    let path = config_path.cloned().unwrap_or_else(Config::default_path);
    Config::load_or_default(&path).logging.level
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => default_level(cli.config.as_ref()),
        1 => "debug".to_string(),
        _ => "trace".to_string(),
    };
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let ctx = CliContext {
        format: if cli.json {
            OutputFormat::Json
        } else {
            OutputFormat::Human
        },
        config_path: cli.config,
    };

    let status = match cli.command {
        Commands::Write(cmd) => cmd.execute(&ctx).await,
        Commands::Upload(cmd) => cmd.execute(&ctx).await,
        Commands::Status(cmd) => cmd.execute(&ctx).await,
        Commands::Config(cmd) => cmd.execute(&ctx).await,
    };
    status.into()
}
