//! Status command - manifest summary and snapshot completeness

use clap::Args;
use stowage_core::domain::Completeness;
use stowage_core::ports::IDocumentStore;
use stowage_sync::{Manifest, ManifestStore};
use tracing::info;

use super::{remote_client, CliContext, ExitStatus};
use crate::output::plural;

#[derive(Debug, Args)]
pub struct StatusCommand {
    /// Manifest scope to summarize
    #[arg(long, default_value = "default")]
    pub scope: String,

    /// Also fetch the completeness flag of this snapshot
    #[arg(long)]
    pub snapshot: Option<String>,
}

/// Aggregates over one manifest
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct ManifestSummary {
    scope: String,
    entries: usize,
    total_bytes: u64,
    last_upload: Option<chrono::DateTime<chrono::Utc>>,
}

impl ManifestSummary {
    fn of(scope: &str, manifest: &Manifest) -> Self {
        Self {
            scope: scope.to_string(),
            entries: manifest.len(),
            total_bytes: manifest.total_bytes(),
            last_upload: manifest.iter().map(|(_, e)| e.uploaded_at).max(),
        }
    }
}

impl StatusCommand {
    pub async fn execute(&self, ctx: &CliContext) -> ExitStatus {
        let formatter = ctx.formatter();
        let Some(config) = ctx.load_valid_config() else {
            return ExitStatus::Usage;
        };

        let manifests = ManifestStore::new(&config.upload.manifest_dir);
        let manifest = match manifests.load(&self.scope).await {
            Ok(manifest) => manifest,
            Err(e) => {
                formatter.error(&e.to_string());
                return ExitStatus::Usage;
            }
        };
        let summary = ManifestSummary::of(&self.scope, &manifest);
        info!(scope = %self.scope, entries = summary.entries, "Manifest loaded");

        let mut completeness = None;
        if let Some(snapshot_id) = &self.snapshot {
            let client = match remote_client(&config, true) {
                Ok(client) => client,
                Err(e) => {
                    formatter.error(&format!("{:#}", e));
                    return ExitStatus::Usage;
                }
            };
            match client.fetch_completeness(snapshot_id).await {
                Ok(state) => completeness = Some(state),
                Err(e) => {
                    formatter.error(&format!("Failed to fetch snapshot '{}': {}", snapshot_id, e));
                    return ExitStatus::Failure;
                }
            }
        }

        if ctx.is_json() {
            let mut json = serde_json::json!({ "manifest": summary });
            if let (Some(id), Some(state)) = (&self.snapshot, completeness) {
                json["snapshot"] = serde_json::json!({ "id": id, "completeness": state });
            }
            formatter.print_json(&json);
        } else {
            formatter.success(&format!("Manifest '{}'", summary.scope));
            formatter.info(&format!(
                "{} file{}, {} bytes",
                summary.entries,
                plural(summary.entries),
                summary.total_bytes
            ));
            match summary.last_upload {
                Some(at) => formatter.info(&format!("Last upload: {}", at.to_rfc3339())),
                None => formatter.info("Last upload: never"),
            }
            if let (Some(id), Some(state)) = (&self.snapshot, completeness) {
                let line = format!("Snapshot '{}': {}", id, state);
                match state {
                    Completeness::Complete => formatter.success(&line),
                    Completeness::Partial | Completeness::Unknown => formatter.warn(&line),
                }
            }
        }

        match completeness {
            Some(Completeness::Partial) => ExitStatus::Partial,
            _ => ExitStatus::Success,
        }
    }
}
