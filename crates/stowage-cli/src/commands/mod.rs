//! CLI commands
//!
//! Every command receives a [`CliContext`] and reports an [`ExitStatus`].

pub mod config;
pub mod status;
pub mod upload;
pub mod write;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use stowage_core::config::{Config, ConfigBuilder};
use stowage_core::domain::{SnapshotWriteResult, UploadResult};
use stowage_remote::{CircuitBreakerRegistry, RemoteClient};

use crate::output::{get_formatter, OutputFormat, OutputFormatter};

// ============================================================================
// Exit status
// ============================================================================

/// Process outcome, mapped to the exit code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    /// Everything succeeded
    Success,
    /// Some work failed
    Partial,
    /// Nothing succeeded
    Failure,
    /// Bad arguments or configuration
    Usage,
}

impl ExitStatus {
    pub fn code(self) -> u8 {
        match self {
            Self::Success => 0,
            Self::Partial => 1,
            Self::Failure => 2,
            Self::Usage => 3,
        }
    }

    /// Status of a snapshot write that reached the child batches
    pub fn from_write(result: &SnapshotWriteResult) -> Self {
        if result.complete {
            Self::Success
        } else if result.units_written == 0 {
            Self::Failure
        } else {
            Self::Partial
        }
    }

    /// Status of an upload run
    pub fn from_upload(result: &UploadResult) -> Self {
        let delivered = result.files_uploaded.len() + result.files_skipped.len();
        if result.auth_error && result.files_uploaded.is_empty() {
            Self::Failure
        } else if result.files_failed.is_empty() && !result.auth_error {
            Self::Success
        } else if delivered == 0 {
            Self::Failure
        } else {
            Self::Partial
        }
    }
}

impl From<ExitStatus> for ExitCode {
    fn from(status: ExitStatus) -> Self {
        ExitCode::from(status.code())
    }
}

// ============================================================================
// Shared context
// ============================================================================

/// Options shared by every command
#[derive(Debug, Clone)]
pub struct CliContext {
    pub format: OutputFormat,
    /// Explicit `--config` path, if any
    pub config_path: Option<PathBuf>,
}

impl CliContext {
    pub fn is_json(&self) -> bool {
        matches!(self.format, OutputFormat::Json)
    }

    pub fn formatter(&self) -> Box<dyn OutputFormatter> {
        get_formatter(self.is_json())
    }

    /// Path of the configuration file in effect
    pub fn config_file(&self) -> PathBuf {
        self.config_path.clone().unwrap_or_else(Config::default_path)
    }

    /// Loads the configuration.
    ///
    /// An explicit `--config` must exist and parse; the default location
    /// falls back to built-in defaults.
    pub fn load_config(&self) -> Result<Config> {
        match &self.config_path {
            Some(path) => Config::load(path)
                .with_context(|| format!("Failed to load configuration from {}", path.display())),
            None => Ok(Config::load_or_default(&Config::default_path())),
        }
    }

    /// Loads and validates the configuration, reporting problems.
    ///
    /// Returns `None` after printing the errors when it is unusable.
    pub fn load_valid_config(&self) -> Option<Config> {
        self.load_with_overrides(|builder| builder)
    }

    /// Loads the configuration, layers command-line overrides on top and
    /// validates the result.
    pub fn load_with_overrides(
        &self,
        apply: impl FnOnce(ConfigBuilder) -> ConfigBuilder,
    ) -> Option<Config> {
        let formatter = self.formatter();
        let config = match self.load_config() {
            Ok(config) => config,
            Err(e) => {
                formatter.error(&format!("{:#}", e));
                return None;
            }
        };

        match apply(ConfigBuilder::from_config(config)).build_validated() {
            Ok(config) => Some(config),
            Err(errors) => {
                formatter.error(&format!(
                    "Configuration has {} error{}",
                    errors.len(),
                    crate::output::plural(errors.len())
                ));
                for error in &errors {
                    formatter.info(&format!("  {} - {}", error.field, error.message));
                }
                None
            }
        }
    }
}

/// Builds the HTTP client shared by the document and object ports.
///
/// Without `require_token` a missing token is tolerated (dry runs never
/// reach the network).
pub fn remote_client(config: &Config, require_token: bool) -> Result<Arc<RemoteClient>> {
    let client = match RemoteClient::from_config(&config.remote) {
        Ok(client) => client,
        Err(e) if require_token => return Err(e),
        Err(_) => RemoteClient::new(&config.remote.base_url, "")
            .with_collection(&config.remote.document_collection)
            .with_object_prefix(&config.remote.object_prefix),
    };
    Ok(Arc::new(client))
}

/// Breaker registry built once per process
pub fn breaker_registry(config: &Config) -> CircuitBreakerRegistry {
    CircuitBreakerRegistry::new(config.circuit_breaker.clone())
}

/// Prints the stats of every breaker in human form
pub fn print_breaker_stats(formatter: &dyn OutputFormatter, registry: &CircuitBreakerRegistry) {
    for (name, stats) in registry.stats() {
        let mut line = format!(
            "Breaker {}: {} ({} requests, {} failures, {} rejected)",
            name, stats.state, stats.total_requests, stats.total_failures, stats.total_rejections
        );
        if let Some(retry_at) = stats.next_retry_time {
            line.push_str(&format!(", retry at {}", retry_at.to_rfc3339()));
        }
        formatter.info(&line);
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use stowage_core::domain::{BatchWriteResult, FileFailure};

    use super::*;

    fn write_result(complete: bool, units_written: usize) -> SnapshotWriteResult {
        let batch = |index, success, keys: &[&str]| BatchWriteResult {
            batch_index: index,
            operation_count: keys.len(),
            success,
            retry_attempts: 0,
            duration_ms: 1,
            error: None,
            unit_keys: keys.iter().map(|k| k.to_string()).collect(),
        };
        let mut batches = vec![batch(1, false, &["z"])];
        if complete {
            batches.clear();
        }
        if units_written > 0 {
            batches.push(batch(2, true, &["a"]));
        }
        SnapshotWriteResult::fold("s", batches, 1)
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(ExitStatus::Success.code(), 0);
        assert_eq!(ExitStatus::Partial.code(), 1);
        assert_eq!(ExitStatus::Failure.code(), 2);
        assert_eq!(ExitStatus::Usage.code(), 3);
    }

    #[test]
    fn test_status_from_write() {
        assert_eq!(ExitStatus::from_write(&write_result(true, 1)), ExitStatus::Success);
        assert_eq!(ExitStatus::from_write(&write_result(false, 1)), ExitStatus::Partial);
        assert_eq!(ExitStatus::from_write(&write_result(false, 0)), ExitStatus::Failure);
    }

    #[test]
    fn test_status_from_upload() {
        let mut result = UploadResult::default();
        assert_eq!(ExitStatus::from_upload(&result), ExitStatus::Success);

        result.record_skipped("a");
        result.record_uploaded("b");
        assert_eq!(ExitStatus::from_upload(&result), ExitStatus::Success);

        result.record_failed("c", "unavailable");
        assert_eq!(ExitStatus::from_upload(&result), ExitStatus::Partial);

        let mut all_failed = UploadResult::default();
        all_failed.files_failed.push(FileFailure {
            remote_path: "x".to_string(),
            error: "boom".to_string(),
        });
        all_failed.files_processed.push("x".to_string());
        assert_eq!(ExitStatus::from_upload(&all_failed), ExitStatus::Failure);

        let mut auth = UploadResult::default();
        auth.record_failed("x", "401");
        auth.auth_error = true;
        assert_eq!(ExitStatus::from_upload(&auth), ExitStatus::Failure);

        auth.record_uploaded("y");
        assert_eq!(ExitStatus::from_upload(&auth), ExitStatus::Partial);
    }

    #[test]
    fn test_explicit_config_must_exist() {
        let ctx = CliContext {
            format: OutputFormat::Json,
            config_path: Some(PathBuf::from("/nonexistent/stowage.yaml")),
        };
        assert!(ctx.load_config().is_err());
        assert!(ctx.load_valid_config().is_none());
    }

    #[test]
    fn test_explicit_config_is_loaded() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"writes:\n  max_operations_per_batch: 50\n")
            .unwrap();
        let ctx = CliContext {
            format: OutputFormat::Json,
            config_path: Some(tmp.path().to_path_buf()),
        };
        let config = ctx.load_valid_config().unwrap();
        assert_eq!(config.writes.max_operations_per_batch, 50);
    }

    #[test]
    fn test_overrides_are_validated() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"writes:\n  max_operations_per_batch: 50\n")
            .unwrap();
        let ctx = CliContext {
            format: OutputFormat::Json,
            config_path: Some(tmp.path().to_path_buf()),
        };

        let config = ctx
            .load_with_overrides(|b| b.max_concurrent_batches(5))
            .unwrap();
        assert_eq!(config.writes.max_operations_per_batch, 50);
        assert_eq!(config.writes.max_concurrent_batches, 5);

        assert!(ctx.load_with_overrides(|b| b.upload_concurrency(0)).is_none());
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"upload:\n  concurrency: 0\n").unwrap();
        let ctx = CliContext {
            format: OutputFormat::Json,
            config_path: Some(tmp.path().to_path_buf()),
        };
        assert!(ctx.load_valid_config().is_none());
    }
}
