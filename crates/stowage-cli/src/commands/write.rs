//! Write command - batch-write a snapshot file
//!
//! Reads a `{"id", "root"?, "units": [...]}` document, writes the root first
//! and the remaining units in bounded concurrent batches, then reports the
//! aggregate together with the breaker stats.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use stowage_core::config::ConfigBuilder;
use stowage_core::domain::{SnapshotWrite, SnapshotWriteResult};
use stowage_sync::{BatchWriter, WriteError};
use tracing::info;

use super::{breaker_registry, print_breaker_stats, remote_client, CliContext, ExitStatus};
use crate::output::{format_duration_ms, plural, OutputFormatter};

#[derive(Debug, Args)]
pub struct WriteCommand {
    /// Snapshot JSON file
    pub file: PathBuf,

    /// Units per batch (defaults to writes.max_operations_per_batch)
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Batches in flight at once (defaults to writes.max_concurrent_batches)
    #[arg(long)]
    pub concurrency: Option<usize>,
}

impl WriteCommand {
    pub async fn execute(&self, ctx: &CliContext) -> ExitStatus {
        let formatter = ctx.formatter();
        let Some(config) = ctx.load_with_overrides(|b| self.overrides(b)) else {
            return ExitStatus::Usage;
        };

        let snapshot = match read_snapshot(&self.file) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                formatter.error(&format!("{:#}", e));
                return ExitStatus::Usage;
            }
        };
        let client = match remote_client(&config, true) {
            Ok(client) => client,
            Err(e) => {
                formatter.error(&format!("{:#}", e));
                return ExitStatus::Usage;
            }
        };

        let breakers = breaker_registry(&config);
        let writer = BatchWriter::from_config(client, &config, &breakers);

        info!(
            snapshot_id = %snapshot.id,
            units = snapshot.units.len(),
            has_root = snapshot.root.is_some(),
            "Writing snapshot"
        );

        match writer.write_snapshot(snapshot).await {
            Ok(result) => {
                if ctx.is_json() {
                    formatter.print_json(&serde_json::json!({
                        "success": result.complete,
                        "result": result,
                        "breakers": breakers.stats(),
                    }));
                } else {
                    print_summary(formatter.as_ref(), &result);
                    print_breaker_stats(formatter.as_ref(), &breakers);
                }
                ExitStatus::from_write(&result)
            }
            Err(e @ WriteError::RootWriteFailed { .. }) => {
                if ctx.is_json() {
                    formatter.print_json(&serde_json::json!({
                        "success": false,
                        "error": e.to_string(),
                        "breakers": breakers.stats(),
                    }));
                } else {
                    formatter.error(&e.to_string());
                    print_breaker_stats(formatter.as_ref(), &breakers);
                }
                ExitStatus::Failure
            }
        }
    }
}

impl WriteCommand {
    fn overrides(&self, mut builder: ConfigBuilder) -> ConfigBuilder {
        if let Some(n) = self.batch_size {
            builder = builder.max_operations_per_batch(n);
        }
        if let Some(n) = self.concurrency {
            builder = builder.max_concurrent_batches(n);
        }
        builder
    }
}

/// Reads and parses a snapshot file
fn read_snapshot(path: &Path) -> Result<SnapshotWrite> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read snapshot file {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Invalid snapshot file {}", path.display()))
}

fn print_summary(formatter: &dyn OutputFormatter, result: &SnapshotWriteResult) {
    let headline = format!(
        "Snapshot {}: {} unit{} written in {} batch{} ({})",
        result.id,
        result.units_written,
        plural(result.units_written),
        result.total_batches,
        if result.total_batches == 1 { "" } else { "es" },
        format_duration_ms(result.total_duration_ms)
    );
    if result.complete {
        formatter.success(&headline);
        return;
    }

    formatter.warn(&headline);
    formatter.info(&format!(
        "{} of {} batches failed, {} unit{} not written",
        result.failed_batches,
        result.total_batches,
        result.failed_unit_keys.len(),
        plural(result.failed_unit_keys.len())
    ));
    for batch in result.batch_results.iter().filter(|b| !b.success) {
        formatter.info(&format!(
            "  batch {} ({} op{}, {} retr{}): {}",
            batch.batch_index,
            batch.operation_count,
            plural(batch.operation_count),
            batch.retry_attempts,
            if batch.retry_attempts == 1 { "y" } else { "ies" },
            batch.error.as_deref().unwrap_or("unknown error")
        ));
    }
}
