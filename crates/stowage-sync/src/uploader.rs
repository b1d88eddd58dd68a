//! Incremental sync coordinator
//!
//! Mirrors a local directory tree to the object store, uploading only files
//! whose content changed since the last successful upload.
//!
//! ## Flow
//!
//! 1. Enumerate regular files under the root, apply the date filter.
//! 2. Per file: fast-path check (size + mtime) against the manifest, then a
//!    SHA-256 comparison, then upload through breaker and retry.
//! 3. Files run in windows of `concurrency`. The manifest is updated once a
//!    window settles and saved at most once per window.
//! 4. An authentication failure stops the run after its window; files not
//!    yet visited are not reported at all.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use futures_util::future::join_all;
use stowage_core::config::{Config, UploadConfig};
use stowage_core::domain::{LocalFile, ManifestEntry, UploadResult};
use stowage_core::ports::IObjectStore;
use stowage_remote::{CircuitBreaker, CircuitBreakerRegistry, CircuitError, RetryExecutor};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::manifest::{self, Manifest, ManifestError, ManifestStore};
use crate::walker::{self, DateFilter};

/// Scope used when none is given
pub const DEFAULT_SCOPE: &str = "default";

// ============================================================================
// Options and errors
// ============================================================================

/// Per-run upload settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOptions {
    /// Manifest scope (one manifest file per scope)
    pub scope: String,
    /// Prefix prepended to every relative path to form the remote path
    pub remote_prefix: String,
    /// Skip unchanged files; `false` re-uploads everything
    pub incremental: bool,
    /// Report what would be uploaded without writing anything
    pub dry_run: bool,
    /// Files in flight per window
    pub concurrency: usize,
    pub date_filter: DateFilter,
}

impl UploadOptions {
    pub fn from_config(upload: &UploadConfig) -> Self {
        Self {
            incremental: upload.incremental,
            concurrency: upload.concurrency,
            ..Self::default()
        }
    }
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            scope: DEFAULT_SCOPE.to_string(),
            remote_prefix: String::new(),
            incremental: true,
            dry_run: false,
            concurrency: 4,
            date_filter: DateFilter::default(),
        }
    }
}

/// Errors that prevent an upload run from starting
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("Failed to enumerate sync root {root}: {source}")]
    Enumerate {
        root: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Manifest(#[from] ManifestError),
}

/// What happened to one file
#[derive(Debug)]
enum FileOutcome {
    /// Size and mtime matched the manifest
    Unchanged,
    /// Content hash matched; the entry's mtime should be refreshed
    SameContent { mtime_ms: i64 },
    /// Would be uploaded (dry run)
    Pending,
    Uploaded(ManifestEntry),
    Failed { error: String, auth: bool },
}

// ============================================================================
// Uploader
// ============================================================================

/// Uploads changed files from a local tree to the object store
pub struct Uploader {
    store: Arc<dyn IObjectStore>,
    manifests: ManifestStore,
    retry: RetryExecutor,
    breaker: Arc<CircuitBreaker>,
}

impl Uploader {
    pub fn new(
        store: Arc<dyn IObjectStore>,
        manifests: ManifestStore,
        retry: RetryExecutor,
        breaker: Arc<CircuitBreaker>,
    ) -> Self {
        Self {
            store,
            manifests,
            retry,
            breaker,
        }
    }

    /// Builds an uploader from application configuration
    pub fn from_config(
        store: Arc<dyn IObjectStore>,
        config: &Config,
        breakers: &CircuitBreakerRegistry,
    ) -> Self {
        let retry = RetryExecutor::new(config.retry.clone(), store.backend_name());
        let breaker = breakers.get_or_create(store.backend_name());
        let manifests = ManifestStore::new(&config.upload.manifest_dir);
        Self::new(store, manifests, retry, breaker)
    }

    pub fn manifests(&self) -> &ManifestStore {
        &self.manifests
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    /// Syncs `root` to the object store.
    ///
    /// Per-file failures are reported in the [`UploadResult`]; only failures
    /// that prevent the run from starting are errors.
    #[instrument(skip(self, options), fields(root = %root.display(), scope = %options.scope))]
    pub async fn upload(
        &self,
        root: &Path,
        options: &UploadOptions,
    ) -> Result<UploadResult, UploadError> {
        let mut manifest = self.manifests.load(&options.scope).await?;

        let walk = walker::enumerate_files(root)
            .await
            .map_err(|source| UploadError::Enumerate {
                root: root.to_path_buf(),
                source,
            })?;
        let files: Vec<LocalFile> = walk
            .files
            .into_iter()
            .filter(|f| options.date_filter.contains(&f.relative_path))
            .collect();

        info!(
            files = files.len(),
            manifest_entries = manifest.len(),
            incremental = options.incremental,
            dry_run = options.dry_run,
            "Starting upload"
        );

        let mut result = UploadResult {
            dry_run: options.dry_run,
            ..UploadResult::default()
        };
        for lossy in walk
            .invalid_names
            .iter()
            .filter(|name| options.date_filter.contains(name))
        {
            result.record_failed(
                walker::remote_path(&options.remote_prefix, lossy),
                "file name is not valid UTF-8",
            );
        }
        let total = result.files_processed.len() + files.len();

        for window in files.chunks(options.concurrency.max(1)) {
            let outcomes = join_all(
                window
                    .iter()
                    .map(|file| self.process_file(file, &manifest, options)),
            )
            .await;

            let mut dirty = false;
            for (remote_path, outcome) in outcomes {
                match outcome {
                    FileOutcome::Unchanged => result.record_skipped(remote_path),
                    FileOutcome::SameContent { mtime_ms } => {
                        dirty |= manifest.refresh_mtime(&remote_path, mtime_ms);
                        result.record_skipped(remote_path);
                    }
                    FileOutcome::Pending => result.record_uploaded(remote_path),
                    FileOutcome::Uploaded(entry) => {
                        manifest.insert(remote_path.clone(), entry);
                        dirty = true;
                        result.record_uploaded(remote_path);
                    }
                    FileOutcome::Failed { error, auth } => {
                        result.auth_error |= auth;
                        result.record_failed(remote_path, error);
                    }
                }
            }

            if dirty && !options.dry_run {
                self.save_manifest(&options.scope, &manifest).await;
            }

            if result.auth_error {
                warn!(
                    processed = result.files_processed.len(),
                    remaining = total - result.files_processed.len(),
                    "Authentication failure, stopping upload"
                );
                break;
            }
        }

        info!(
            processed = result.files_processed.len(),
            uploaded = result.files_uploaded.len(),
            skipped = result.files_skipped.len(),
            failed = result.files_failed.len(),
            auth_error = result.auth_error,
            "Upload finished"
        );
        Ok(result)
    }

    async fn process_file(
        &self,
        file: &LocalFile,
        manifest: &Manifest,
        options: &UploadOptions,
    ) -> (String, FileOutcome) {
        let remote_path = walker::remote_path(&options.remote_prefix, &file.relative_path);
        let outcome = self.check_and_upload(file, &remote_path, manifest, options).await;
        (remote_path, outcome)
    }

    async fn check_and_upload(
        &self,
        file: &LocalFile,
        remote_path: &str,
        manifest: &Manifest,
        options: &UploadOptions,
    ) -> FileOutcome {
        let entry = manifest.get(remote_path);

        if options.incremental && manifest::should_skip_fast_path(file, entry) {
            debug!(remote_path, "Unchanged size and mtime, skipping");
            return FileOutcome::Unchanged;
        }

        let content = match tokio::fs::read(&file.path).await {
            Ok(content) => content,
            Err(e) => {
                warn!(path = %file.path.display(), error = %e, "Failed to read file");
                return FileOutcome::Failed {
                    error: format!("read failed: {e}"),
                    auth: false,
                };
            }
        };
        let checksum = manifest::sha256_hex(&content);

        if options.incremental && entry.is_some_and(|e| e.checksum == checksum) {
            debug!(remote_path, "Content unchanged, skipping");
            return FileOutcome::SameContent {
                mtime_ms: file.mtime_ms,
            };
        }

        if options.dry_run {
            return FileOutcome::Pending;
        }

        let content_type = content_type_for(remote_path);
        let result = self
            .breaker
            .execute(|| async {
                self.retry
                    .execute("upload_object", || {
                        self.store.upload_object(remote_path, &content, content_type)
                    })
                    .await
                    .into_result()
            })
            .await;

        match result {
            Ok(()) => {
                debug!(remote_path, bytes = content.len(), "Uploaded");
                FileOutcome::Uploaded(ManifestEntry {
                    checksum,
                    size: file.size,
                    mtime_ms: file.mtime_ms,
                    uploaded_at: Utc::now(),
                })
            }
            Err(CircuitError::Open { name, retry_at }) => FileOutcome::Failed {
                error: format!("circuit '{name}' is open until {retry_at}"),
                auth: false,
            },
            Err(CircuitError::Inner(error)) => {
                warn!(remote_path, error = %error, "Upload failed");
                FileOutcome::Failed {
                    auth: error.remote_error().is_auth(),
                    error: error.to_string(),
                }
            }
        }
    }

    /// Saves the manifest; a failure only costs re-uploads on the next run
    async fn save_manifest(&self, scope: &str, manifest: &Manifest) {
        if let Err(e) = self.manifests.save(scope, manifest).await {
            warn!(scope, error = %e, "Failed to save manifest");
        }
    }
}

/// MIME type for an object, from its file extension
pub fn content_type_for(path: &str) -> &'static str {
    let extension = path
        .rsplit('/')
        .next()
        .and_then(|name| name.rsplit_once('.'))
        .map(|(_, ext)| ext.to_ascii_lowercase());

    match extension.as_deref() {
        Some("json") => "application/json",
        Some("geojson") => "application/geo+json",
        Some("ndjson" | "jsonl") => "application/x-ndjson",
        Some("csv") => "text/csv",
        Some("txt" | "log") => "text/plain",
        Some("html" | "htm") => "text/html",
        Some("xml") => "application/xml",
        Some("parquet") => "application/vnd.apache.parquet",
        Some("gz") => "application/gzip",
        Some("zip") => "application/zip",
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("svg") => "image/svg+xml",
        _ => "application/octet-stream",
    }
}
