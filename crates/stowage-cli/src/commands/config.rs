//! Config command - View and validate configuration
//!
//! Provides the `stowage config` CLI command which:
//! 1. Shows the effective configuration (YAML or JSON)
//! 2. Validates the configuration file and reports errors

use anyhow::{Context, Result};
use clap::Subcommand;
use stowage_core::config::Config;
use tracing::info;

use super::{CliContext, ExitStatus};
use crate::output::plural;

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Display current configuration
    Show,
    /// Validate configuration file
    Validate,
}

impl ConfigCommand {
    pub async fn execute(&self, ctx: &CliContext) -> ExitStatus {
        let outcome = match self {
            ConfigCommand::Show => execute_show(ctx),
            ConfigCommand::Validate => Ok(execute_validate(ctx)),
        };
        outcome.unwrap_or_else(|e| {
            ctx.formatter().error(&format!("{:#}", e));
            ExitStatus::Usage
        })
    }
}

fn execute_show(ctx: &CliContext) -> Result<ExitStatus> {
    let formatter = ctx.formatter();
    let config_path = ctx.config_file();
    let config = ctx.load_config()?;

    info!(config_path = %config_path.display(), "Showing configuration");

    if ctx.is_json() {
        let json =
            serde_json::to_value(&config).context("Failed to serialize configuration to JSON")?;
        formatter.print_json(&json);
    } else {
        formatter.success(&format!("Configuration ({})", config_path.display()));
        formatter.info("");

        let yaml =
            serde_yaml::to_string(&config).context("Failed to serialize configuration to YAML")?;
        for line in yaml.lines() {
            formatter.info(line);
        }
    }
    Ok(ExitStatus::Success)
}

fn execute_validate(ctx: &CliContext) -> ExitStatus {
    let formatter = ctx.formatter();
    let config_path = ctx.config_file();

    let config = match Config::load(&config_path) {
        Ok(config) => config,
        Err(_) if !config_path.exists() && ctx.config_path.is_none() => {
            if ctx.is_json() {
                formatter.print_json(&serde_json::json!({
                    "valid": true,
                    "config_path": config_path.display().to_string(),
                    "errors": [],
                    "defaults": true,
                }));
            } else {
                formatter.info(&format!(
                    "Configuration file not found at {}",
                    config_path.display()
                ));
                formatter.info("Using default configuration.");
            }
            return ExitStatus::Success;
        }
        Err(e) => {
            if ctx.is_json() {
                formatter.print_json(&serde_json::json!({
                    "valid": false,
                    "config_path": config_path.display().to_string(),
                    "errors": [format!("Failed to parse configuration: {}", e)],
                }));
            } else {
                formatter.error(&format!("Failed to parse configuration: {}", e));
                formatter.info(&format!("File: {}", config_path.display()));
            }
            return ExitStatus::Usage;
        }
    };

    info!(config_path = %config_path.display(), "Validating configuration");

    let errors = config.validate();

    if ctx.is_json() {
        let error_strings: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
        formatter.print_json(&serde_json::json!({
            "valid": errors.is_empty(),
            "config_path": config_path.display().to_string(),
            "errors": error_strings,
        }));
    } else if errors.is_empty() {
        formatter.success("Configuration is valid");
        formatter.info(&format!("File: {}", config_path.display()));
    } else {
        formatter.error(&format!(
            "Configuration has {} error{}:",
            errors.len(),
            plural(errors.len())
        ));
        formatter.info(&format!("File: {}", config_path.display()));
        formatter.info("");
        for error in &errors {
            formatter.info(&format!("  {} - {}", error.field, error.message));
        }
    }

    if errors.is_empty() {
        ExitStatus::Success
    } else {
        ExitStatus::Usage
    }
}
