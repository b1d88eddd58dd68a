//! Fingerprint store
//!
//! Persists, per sync scope, the fingerprint of every file as it was last
//! uploaded. The manifest lives at `<dir>/<scope>.manifest.json` and maps
//! remote-relative paths to [`ManifestEntry`] values.
//!
//! ## Design Notes
//!
//! - **Atomic saves**: write to `<file>.tmp`, fsync, then rename over the
//!   target, so a crash leaves either the old or the new manifest.
//! - **Fail open to re-upload**: a missing manifest and an unreadable one both
//!   load as empty. A lost manifest costs bandwidth, never a skipped file.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use stowage_core::domain::{LocalFile, ManifestEntry};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument, warn};

/// Errors raised by the fingerprint store
#[derive(Debug, Error)]
pub enum ManifestError {
    /// Scope names become file names and must be a single plain component
    #[error("Invalid manifest scope: '{0}'")]
    InvalidScope(String),

    #[error("Manifest I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize manifest: {0}")]
    Serialize(#[from] serde_json::Error),
}

// ============================================================================
// Manifest
// ============================================================================

/// Remote-relative path -> fingerprint of the last successful upload
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Manifest {
    entries: BTreeMap<String, ManifestEntry>,
}

impl Manifest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, remote_path: &str) -> Option<&ManifestEntry> {
        self.entries.get(remote_path)
    }

    pub fn insert(&mut self, remote_path: impl Into<String>, entry: ManifestEntry) {
        self.entries.insert(remote_path.into(), entry);
    }

    /// Updates the stored mtime of an entry whose content is unchanged
    pub fn refresh_mtime(&mut self, remote_path: &str, mtime_ms: i64) -> bool {
        match self.entries.get_mut(remote_path) {
            Some(entry) => {
                entry.mtime_ms = mtime_ms;
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ManifestEntry)> {
        self.entries.iter()
    }

    /// Sum of the recorded sizes
    pub fn total_bytes(&self) -> u64 {
        self.entries.values().map(|e| e.size).sum()
    }
}

// ============================================================================
// Fingerprints
// ============================================================================

/// Lowercase hex SHA-256 of `content`
pub fn sha256_hex(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    format!("{:x}", hasher.finalize())
}

/// Fast-path test: true iff an entry exists and both size and mtime match.
///
/// A match means the content is assumed unchanged without hashing it.
pub fn should_skip_fast_path(file: &LocalFile, entry: Option<&ManifestEntry>) -> bool {
    entry.is_some_and(|e| e.size == file.size && e.mtime_ms == file.mtime_ms)
}

// ============================================================================
// ManifestStore
// ============================================================================

/// Loads and saves per-scope manifests under one directory
#[derive(Debug, Clone)]
pub struct ManifestStore {
    dir: PathBuf,
}

impl ManifestStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// File backing the manifest of `scope`
    pub fn path_for(&self, scope: &str) -> Result<PathBuf, ManifestError> {
        let valid = !scope.is_empty()
            && scope != "."
            && scope != ".."
            && !scope.contains(['/', '\\', '\0']);
        if !valid {
            return Err(ManifestError::InvalidScope(scope.to_string()));
        }
        Ok(self.dir.join(format!("{scope}.manifest.json")))
    }

    /// Loads the manifest of `scope`.
    ///
    /// A missing file yields an empty manifest. So does an unreadable or
    /// corrupt one, after logging a warning.
    #[instrument(skip(self))]
    pub async fn load(&self, scope: &str) -> Result<Manifest, ManifestError> {
        let path = self.path_for(scope)?;

        let content = match tokio::fs::read(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "No manifest yet, starting empty");
                return Ok(Manifest::new());
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Unreadable manifest, starting empty");
                return Ok(Manifest::new());
            }
        };

        match serde_json::from_slice::<Manifest>(&content) {
            Ok(manifest) => {
                debug!(entries = manifest.len(), "Manifest loaded");
                Ok(manifest)
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Corrupt manifest, starting empty");
                Ok(Manifest::new())
            }
        }
    }

    /// Atomically replaces the manifest of `scope`
    #[instrument(skip(self, manifest), fields(entries = manifest.len()))]
    pub async fn save(&self, scope: &str, manifest: &Manifest) -> Result<(), ManifestError> {
        let path = self.path_for(scope)?;
        let data = serde_json::to_vec_pretty(manifest)?;
        let io_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source: std::io::Error| ManifestError::Io { path, source }
        };

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(io_err(&self.dir))?;

        let tmp_path = {
            let mut p = path.as_os_str().to_owned();
            p.push(".tmp");
            PathBuf::from(p)
        };

        let mut file = tokio::fs::File::create(&tmp_path)
            .await
            .map_err(io_err(&tmp_path))?;
        file.write_all(&data).await.map_err(io_err(&tmp_path))?;
        file.sync_all().await.map_err(io_err(&tmp_path))?;
        drop(file);

        tokio::fs::rename(&tmp_path, &path)
            .await
            .map_err(io_err(&path))?;

        debug!(path = %path.display(), bytes = data.len(), "Manifest saved");
        Ok(())
    }
}
