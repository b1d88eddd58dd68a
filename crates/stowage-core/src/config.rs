//! Configuration module for Stowage.
//!
//! Provides typed configuration structs that map to the YAML configuration file,
//! with loading, validation, defaults, and a builder pattern for programmatic use.
//! The sections are consumed directly by the engine: [`RetryConfig`] by the
//! retry executor, [`CircuitBreakerConfig`] by the breaker registry,
//! [`WritesConfig`] by the batch writer and [`UploadConfig`] by the uploader.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for Stowage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub remote: RemoteConfig,
    pub writes: WritesConfig,
    pub retry: RetryConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub upload: UploadConfig,
    pub logging: LoggingConfig,
}

/// Remote endpoint settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Base URL of the remote API (document and object endpoints).
    pub base_url: String,
    /// Name of the environment variable holding the bearer token.
    pub access_token_env: String,
    /// Collection that receives snapshot documents.
    pub document_collection: String,
    /// Prefix prepended to every uploaded object path.
    pub object_prefix: String,
}

/// Batched document write settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WritesConfig {
    /// Upper bound on operations committed in one request.
    pub max_operations_per_batch: usize,
    /// Batches in flight at once.
    pub max_concurrent_batches: usize,
    /// Per-attempt timeout for a batch commit (milliseconds).
    pub batch_timeout_ms: u64,
    /// Budget for the whole write (milliseconds); later windows are not started past it.
    pub total_timeout_ms: u64,
    /// Maximum serialized size of a single write unit (bytes).
    pub max_unit_bytes: usize,
}

/// Retry and backoff settings shared by writes and uploads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    /// Relative jitter applied to each delay, in `0.0..=1.0`.
    pub jitter_factor: f64,
    /// Per-attempt timeout (milliseconds).
    pub attempt_timeout_ms: u64,
}

/// Circuit breaker settings, applied to every named breaker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that trip the breaker.
    pub failure_threshold: u32,
    /// How long an open breaker rejects calls before allowing a trial call (milliseconds).
    pub cooldown_ms: u64,
}

/// Incremental upload settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Local directory mirrored to the object store.
    pub sync_root: PathBuf,
    /// Files uploaded concurrently per window.
    pub concurrency: usize,
    /// Skip files whose fingerprint matches the manifest.
    pub incremental: bool,
    /// Directory holding the per-scope manifest files.
    pub manifest_dir: PathBuf,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
}

// ---------------------------------------------------------------------------
// Config::load()
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Try to load from `path`; fall back to [`Config::default`] on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// Typically `$XDG_CONFIG_HOME/stowage/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("stowage")
            .join("config.yaml")
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

fn data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("~/.local/share"))
        .join("stowage")
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            access_token_env: "STOWAGE_ACCESS_TOKEN".to_string(),
            document_collection: "snapshots".to_string(),
            object_prefix: String::new(),
        }
    }
}

impl Default for WritesConfig {
    fn default() -> Self {
        Self {
            max_operations_per_batch: 500,
            max_concurrent_batches: 3,
            batch_timeout_ms: 30_000,
            total_timeout_ms: 300_000,
            max_unit_bytes: 1024 * 1024,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_ms: 500,
            max_backoff_ms: 10_000,
            jitter_factor: 0.2,
            attempt_timeout_ms: 30_000,
        }
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown_ms: 60_000,
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            sync_root: data_dir().join("cache"),
            concurrency: 4,
            incremental: true,
            manifest_dir: data_dir().join("manifests"),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Duration accessors
// ---------------------------------------------------------------------------

impl WritesConfig {
    pub fn batch_timeout(&self) -> Duration {
        Duration::from_millis(self.batch_timeout_ms)
    }

    pub fn total_timeout(&self) -> Duration {
        Duration::from_millis(self.total_timeout_ms)
    }
}

impl RetryConfig {
    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.attempt_timeout_ms)
    }

    /// Same policy with a different per-attempt timeout
    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout_ms = timeout.as_millis() as u64;
        self
    }
}

impl CircuitBreakerConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }
}

// ---------------------------------------------------------------------------
// Config::validate()
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"writes.max_concurrent_batches"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Valid values for `logging.level`.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Hard cap the document API places on operations per commit.
pub const MAX_OPERATIONS_PER_COMMIT: usize = 500;

fn positive(errors: &mut Vec<ValidationError>, field: &str, value: u64) {
    if value == 0 {
        errors.push(ValidationError {
            field: field.into(),
            message: "must be greater than 0".into(),
        });
    }
}

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        // --- remote ---
        if !self.remote.base_url.starts_with("http://")
            && !self.remote.base_url.starts_with("https://")
        {
            errors.push(ValidationError {
                field: "remote.base_url".into(),
                message: format!("must be an http(s) URL, got '{}'", self.remote.base_url),
            });
        }
        if self.remote.document_collection.trim().is_empty() {
            errors.push(ValidationError {
                field: "remote.document_collection".into(),
                message: "must not be empty".into(),
            });
        }

        // --- writes ---
        let batch = self.writes.max_operations_per_batch;
        if batch == 0 || batch > MAX_OPERATIONS_PER_COMMIT {
            errors.push(ValidationError {
                field: "writes.max_operations_per_batch".into(),
                message: format!("must be in range 1..={MAX_OPERATIONS_PER_COMMIT}"),
            });
        }
        positive(
            &mut errors,
            "writes.max_concurrent_batches",
            self.writes.max_concurrent_batches as u64,
        );
        positive(&mut errors, "writes.batch_timeout_ms", self.writes.batch_timeout_ms);
        positive(&mut errors, "writes.total_timeout_ms", self.writes.total_timeout_ms);
        positive(&mut errors, "writes.max_unit_bytes", self.writes.max_unit_bytes as u64);
        if self.writes.batch_timeout_ms > self.writes.total_timeout_ms {
            errors.push(ValidationError {
                field: "writes.batch_timeout_ms".into(),
                message: format!(
                    "batch_timeout_ms ({}) must not exceed total_timeout_ms ({})",
                    self.writes.batch_timeout_ms, self.writes.total_timeout_ms
                ),
            });
        }

        // --- retry ---
        positive(&mut errors, "retry.initial_backoff_ms", self.retry.initial_backoff_ms);
        positive(&mut errors, "retry.attempt_timeout_ms", self.retry.attempt_timeout_ms);
        if self.retry.initial_backoff_ms > self.retry.max_backoff_ms {
            errors.push(ValidationError {
                field: "retry.max_backoff_ms".into(),
                message: format!(
                    "max_backoff_ms ({}) must not be below initial_backoff_ms ({})",
                    self.retry.max_backoff_ms, self.retry.initial_backoff_ms
                ),
            });
        }
        if !(0.0..=1.0).contains(&self.retry.jitter_factor) {
            errors.push(ValidationError {
                field: "retry.jitter_factor".into(),
                message: "must be in range 0.0..=1.0".into(),
            });
        }

        // --- circuit_breaker ---
        positive(
            &mut errors,
            "circuit_breaker.failure_threshold",
            self.circuit_breaker.failure_threshold as u64,
        );
        positive(
            &mut errors,
            "circuit_breaker.cooldown_ms",
            self.circuit_breaker.cooldown_ms,
        );

        // --- upload ---
        positive(&mut errors, "upload.concurrency", self.upload.concurrency as u64);

        // --- logging ---
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            errors.push(ValidationError {
                field: "logging.level".into(),
                message: format!(
                    "invalid level '{}'; valid options: {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            });
        }

        errors
    }
}

// ---------------------------------------------------------------------------
// ConfigBuilder
// ---------------------------------------------------------------------------

/// Builder applying overrides on top of a [`Config`].
///
/// The CLI uses it to layer command-line flags over the loaded file and
/// validate the result once.
///
/// # Example
///
/// ```rust
/// use stowage_core::config::{Config, ConfigBuilder};
///
/// let config = ConfigBuilder::from_config(Config::default())
///     .max_operations_per_batch(50)
///     .max_concurrent_batches(3)
///     .build_validated()
///     .expect("valid overrides");
/// assert_eq!(config.writes.max_operations_per_batch, 50);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Starts from [`Config::default`]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts from an already loaded configuration
    pub fn from_config(config: Config) -> Self {
        Self { config }
    }

    // --- writes ---

    pub fn max_operations_per_batch(mut self, n: usize) -> Self {
        self.config.writes.max_operations_per_batch = n;
        self
    }

    pub fn max_concurrent_batches(mut self, n: usize) -> Self {
        self.config.writes.max_concurrent_batches = n;
        self
    }

    // --- upload ---

    pub fn sync_root(mut self, root: PathBuf) -> Self {
        self.config.upload.sync_root = root;
        self
    }

    pub fn upload_concurrency(mut self, n: usize) -> Self {
        self.config.upload.concurrency = n;
        self
    }

    // --- build ---

    /// Consume the builder and return the finished [`Config`].
    pub fn build(self) -> Config {
        self.config
    }

    /// Build and validate in one step. Returns `Err` with the list of
    /// validation errors if the configuration is invalid.
    pub fn build_validated(self) -> Result<Config, Vec<ValidationError>> {
        let config = self.build();
        let errors = config.validate();
        if errors.is_empty() {
            Ok(config)
        } else {
            Err(errors)
        }
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    // -- Defaults --

    #[test]
    fn default_config_has_sensible_values() {
        let cfg = Config::default();
        assert_eq!(cfg.writes.max_operations_per_batch, 500);
        assert_eq!(cfg.writes.max_concurrent_batches, 3);
        assert_eq!(cfg.writes.batch_timeout_ms, 30_000);
        assert_eq!(cfg.writes.total_timeout_ms, 300_000);
        assert_eq!(cfg.retry.max_retries, 3);
        assert_eq!(cfg.retry.initial_backoff_ms, 500);
        assert_eq!(cfg.retry.max_backoff_ms, 10_000);
        assert!((cfg.retry.jitter_factor - 0.2).abs() < f64::EPSILON);
        assert_eq!(cfg.circuit_breaker.failure_threshold, 5);
        assert_eq!(cfg.circuit_breaker.cooldown(), Duration::from_secs(60));
        assert_eq!(cfg.upload.concurrency, 4);
        assert!(cfg.upload.incremental);
        assert_eq!(cfg.logging.level, "info");
        assert_eq!(cfg.remote.access_token_env, "STOWAGE_ACCESS_TOKEN");
    }

    #[test]
    fn default_config_passes_validation() {
        let errors = Config::default().validate();
        assert!(errors.is_empty(), "unexpected validation errors: {errors:?}");
    }

    // -- Loading --

    #[test]
    fn load_from_yaml_file() {
        let yaml = r#"
remote:
  base_url: https://store.example.com/v1
  access_token_env: MY_TOKEN
  document_collection: district_snapshots
  object_prefix: analytics
writes:
  max_operations_per_batch: 50
  max_concurrent_batches: 2
  batch_timeout_ms: 5000
  total_timeout_ms: 60000
  max_unit_bytes: 4096
retry:
  max_retries: 5
  initial_backoff_ms: 100
  max_backoff_ms: 2000
  jitter_factor: 0.1
  attempt_timeout_ms: 5000
circuit_breaker:
  failure_threshold: 3
  cooldown_ms: 1000
upload:
  sync_root: /tmp/stowage-cache
  concurrency: 8
  incremental: false
  manifest_dir: /tmp/stowage-manifests
logging:
  level: debug
"#;
        let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
        tmp.write_all(yaml.as_bytes()).unwrap();
        tmp.flush().unwrap();

        let cfg = Config::load(tmp.path()).expect("load config");
        assert_eq!(cfg.remote.base_url, "https://store.example.com/v1");
        assert_eq!(cfg.remote.document_collection, "district_snapshots");
        assert_eq!(cfg.remote.object_prefix, "analytics");
        assert_eq!(cfg.writes.max_operations_per_batch, 50);
        assert_eq!(cfg.writes.max_concurrent_batches, 2);
        assert_eq!(cfg.writes.batch_timeout(), Duration::from_secs(5));
        assert_eq!(cfg.writes.max_unit_bytes, 4096);
        assert_eq!(cfg.retry.max_retries, 5);
        assert_eq!(cfg.circuit_breaker.failure_threshold, 3);
        assert_eq!(cfg.upload.sync_root, PathBuf::from("/tmp/stowage-cache"));
        assert!(!cfg.upload.incremental);
        assert_eq!(cfg.logging.level, "debug");
        assert!(cfg.validate().is_empty());
    }

    #[test]
    fn load_partial_yaml_fills_defaults() {
        let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
        tmp.write_all(b"writes:\n  max_concurrent_batches: 7\n").unwrap();
        tmp.flush().unwrap();

        let cfg = Config::load(tmp.path()).expect("load config");
        assert_eq!(cfg.writes.max_concurrent_batches, 7);
        assert_eq!(cfg.writes.max_operations_per_batch, 500);
        assert_eq!(cfg.retry, RetryConfig::default());
    }

    #[test]
    fn load_or_default_returns_default_on_missing_file() {
        let cfg = Config::load_or_default(Path::new("/nonexistent/config.yaml"));
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn load_returns_error_on_invalid_yaml() {
        let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
        tmp.write_all(b"not: [valid: yaml: {{{").unwrap();
        tmp.flush().unwrap();

        assert!(Config::load(tmp.path()).is_err());
    }

    // -- Validation --

    #[test]
    fn validate_catches_batch_size_out_of_range() {
        let mut cfg = Config::default();
        cfg.writes.max_operations_per_batch = 0;
        assert!(cfg
            .validate()
            .iter()
            .any(|e| e.field == "writes.max_operations_per_batch"));

        cfg.writes.max_operations_per_batch = MAX_OPERATIONS_PER_COMMIT + 1;
        assert!(cfg
            .validate()
            .iter()
            .any(|e| e.field == "writes.max_operations_per_batch"));
    }

    #[test]
    fn validate_catches_zero_values() {
        let mut cfg = Config::default();
        cfg.writes.max_concurrent_batches = 0;
        cfg.circuit_breaker.failure_threshold = 0;
        cfg.upload.concurrency = 0;
        let errors = cfg.validate();
        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
        assert!(fields.contains(&"writes.max_concurrent_batches"));
        assert!(fields.contains(&"circuit_breaker.failure_threshold"));
        assert!(fields.contains(&"upload.concurrency"));
    }

    #[test]
    fn validate_catches_inverted_timeouts_and_backoff() {
        let mut cfg = Config::default();
        cfg.writes.batch_timeout_ms = 10_000;
        cfg.writes.total_timeout_ms = 1_000;
        cfg.retry.initial_backoff_ms = 5_000;
        cfg.retry.max_backoff_ms = 100;
        let fields: Vec<String> = cfg.validate().into_iter().map(|e| e.field).collect();
        assert!(fields.contains(&"writes.batch_timeout_ms".to_string()));
        assert!(fields.contains(&"retry.max_backoff_ms".to_string()));
    }

    #[test]
    fn validate_catches_bad_jitter_url_and_level() {
        let mut cfg = Config::default();
        cfg.retry.jitter_factor = 1.5;
        cfg.remote.base_url = "ftp://nope".to_string();
        cfg.logging.level = "verbose".to_string();
        let errors = cfg.validate();
        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
        assert!(fields.contains(&"retry.jitter_factor"));
        assert!(fields.contains(&"remote.base_url"));
        assert!(fields.contains(&"logging.level"));
    }

    #[test]
    fn validation_error_display() {
        let err = ValidationError {
            field: "upload.concurrency".into(),
            message: "must be greater than 0".into(),
        };
        assert_eq!(err.to_string(), "upload.concurrency: must be greater than 0");
    }

    // -- Builder --

    #[test]
    fn builder_overrides_and_validates() {
        let mut loaded = Config::default();
        loaded.retry.max_retries = 7;

        let cfg = ConfigBuilder::from_config(loaded)
            .max_operations_per_batch(50)
            .max_concurrent_batches(3)
            .sync_root(PathBuf::from("/data/cache"))
            .upload_concurrency(2)
            .build_validated()
            .expect("valid config");

        assert_eq!(cfg.writes.max_operations_per_batch, 50);
        assert_eq!(cfg.writes.max_concurrent_batches, 3);
        assert_eq!(cfg.upload.sync_root, PathBuf::from("/data/cache"));
        assert_eq!(cfg.upload.concurrency, 2);
        // Untouched sections keep the loaded values
        assert_eq!(cfg.retry.max_retries, 7);
    }

    #[test]
    fn builder_build_validated_reports_errors() {
        let result = ConfigBuilder::new().max_concurrent_batches(0).build_validated();
        let errors = result.expect_err("zero concurrency must be rejected");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "writes.max_concurrent_batches");

        let errors = ConfigBuilder::new()
            .max_operations_per_batch(501)
            .build_validated()
            .expect_err("oversized batches must be rejected");
        assert_eq!(errors[0].field, "writes.max_operations_per_batch");
    }

    #[test]
    fn retry_with_attempt_timeout() {
        let retry = RetryConfig::default().with_attempt_timeout(Duration::from_millis(750));
        assert_eq!(retry.attempt_timeout(), Duration::from_millis(750));
    }
}
