//! Upload command - incremental sync of a local tree
//!
//! Files whose size and mtime match the manifest are skipped without being
//! read; files whose content hash matches are skipped after hashing. With
//! `--full` every file is uploaded again.

use std::path::PathBuf;

use clap::Args;
use stowage_core::config::{Config, ConfigBuilder};
use stowage_core::domain::UploadResult;
use stowage_sync::{DateFilter, UploadOptions, Uploader};
use tracing::info;

use super::{breaker_registry, print_breaker_stats, remote_client, CliContext, ExitStatus};
use crate::output::{plural, OutputFormatter};

#[derive(Debug, Args)]
pub struct UploadCommand {
    /// Local directory to sync (defaults to upload.sync_root)
    #[arg(long)]
    pub root: Option<PathBuf>,

    /// Upload every file, ignoring the manifest
    #[arg(long)]
    pub full: bool,

    /// Report what would be uploaded without uploading
    #[arg(long)]
    pub dry_run: bool,

    /// Only files dated on or after this day (YYYY-MM-DD)
    #[arg(long)]
    pub since: Option<String>,

    /// Only files dated on or before this day (YYYY-MM-DD)
    #[arg(long)]
    pub until: Option<String>,

    /// Files uploaded concurrently (defaults to upload.concurrency)
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Manifest scope
    #[arg(long)]
    pub scope: Option<String>,

    /// Prefix prepended to every remote path
    #[arg(long)]
    pub prefix: Option<String>,
}

impl UploadCommand {
    pub async fn execute(&self, ctx: &CliContext) -> ExitStatus {
        let formatter = ctx.formatter();
        let Some(config) = ctx.load_with_overrides(|b| self.overrides(b)) else {
            return ExitStatus::Usage;
        };

        let options = match self.options(&config) {
            Ok(options) => options,
            Err(message) => {
                formatter.error(&message);
                return ExitStatus::Usage;
            }
        };
        let root = config.upload.sync_root.clone();

        let client = match remote_client(&config, !options.dry_run) {
            Ok(client) => client,
            Err(e) => {
                formatter.error(&format!("{:#}", e));
                return ExitStatus::Usage;
            }
        };
        let breakers = breaker_registry(&config);
        let uploader = Uploader::from_config(client, &config, &breakers);

        info!(root = %root.display(), scope = %options.scope, "Uploading");

        let result = match uploader.upload(&root, &options).await {
            Ok(result) => result,
            Err(e) => {
                formatter.error(&e.to_string());
                return ExitStatus::Failure;
            }
        };

        if ctx.is_json() {
            formatter.print_json(&serde_json::json!({
                "success": result.files_failed.is_empty() && !result.auth_error,
                "result": result,
                "breakers": breakers.stats(),
            }));
        } else {
            print_summary(formatter.as_ref(), &result);
            print_breaker_stats(formatter.as_ref(), &breakers);
        }
        ExitStatus::from_upload(&result)
    }

    /// Flags that override configuration values
    fn overrides(&self, mut builder: ConfigBuilder) -> ConfigBuilder {
        if let Some(root) = &self.root {
            builder = builder.sync_root(root.clone());
        }
        if let Some(n) = self.concurrency {
            builder = builder.upload_concurrency(n);
        }
        builder
    }

    /// Per-run options from the effective configuration and flags
    fn options(&self, config: &Config) -> Result<UploadOptions, String> {
        let mut options = UploadOptions::from_config(&config.upload);
        options.date_filter = DateFilter::parse(self.since.as_deref(), self.until.as_deref())
            .map_err(|e| e.to_string())?;
        if let (Some(since), Some(until)) = (options.date_filter.since, options.date_filter.until)
        {
            if since > until {
                return Err(format!("--since {since} is after --until {until}"));
            }
        }

        if self.full {
            options.incremental = false;
        }
        options.dry_run = self.dry_run;
        if let Some(scope) = &self.scope {
            options.scope = scope.clone();
        }
        if let Some(prefix) = &self.prefix {
            options.remote_prefix = prefix.clone();
        }
        Ok(options)
    }
}

fn print_summary(formatter: &dyn OutputFormatter, result: &UploadResult) {
    let uploaded = result.files_uploaded.len();
    let verb = if result.dry_run {
        "would be uploaded"
    } else {
        "uploaded"
    };
    let headline = format!(
        "{} file{} processed: {} {}, {} skipped, {} failed",
        result.files_processed.len(),
        plural(result.files_processed.len()),
        uploaded,
        verb,
        result.files_skipped.len(),
        result.files_failed.len()
    );

    if result.files_failed.is_empty() && !result.auth_error {
        formatter.success(&headline);
    } else {
        formatter.warn(&headline);
    }

    if result.dry_run {
        for path in &result.files_uploaded {
            formatter.info(&format!("  {}", path));
        }
    }
    for failure in &result.files_failed {
        formatter.info(&format!("  {}: {}", failure.remote_path, failure.error));
    }
    if result.auth_error {
        formatter.error("Authentication failed; remaining files were not attempted");
    }
}
