//! Incremental file sync types
//!
//! [`ManifestEntry`] is the durable "already synced" record for one remote
//! path; [`LocalFile`] describes a file found under the sync root;
//! [`UploadResult`] partitions every visited file into uploaded, failed or
//! skipped.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Fingerprint of a file as it was last uploaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestEntry {
    /// Lowercase hex SHA-256 of the content
    pub checksum: String,
    /// Size in bytes
    pub size: u64,
    /// Modification time in milliseconds since the Unix epoch
    pub mtime_ms: i64,
    /// When the upload completed
    pub uploaded_at: DateTime<Utc>,
}

/// A regular file found under the sync root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFile {
    /// Absolute path on disk
    pub path: PathBuf,
    /// Path relative to the sync root, `/`-separated
    pub relative_path: String,
    pub size: u64,
    pub mtime_ms: i64,
}

/// A file that could not be uploaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileFailure {
    pub remote_path: String,
    pub error: String,
}

/// Aggregate outcome of an upload run.
///
/// Every visited file appears in `files_processed` and in exactly one of the
/// three outcome lists. Files never visited (after an auth abort) appear in
/// none of them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResult {
    pub files_processed: Vec<String>,
    /// Uploaded files (would-be uploads when `dry_run` is set)
    pub files_uploaded: Vec<String>,
    pub files_failed: Vec<FileFailure>,
    pub files_skipped: Vec<String>,
    /// Set when an authentication/authorization failure aborted the run
    pub auth_error: bool,
    pub dry_run: bool,
}

impl UploadResult {
    pub fn record_uploaded(&mut self, remote_path: impl Into<String>) {
        let remote_path = remote_path.into();
        self.files_processed.push(remote_path.clone());
        self.files_uploaded.push(remote_path);
    }

    pub fn record_skipped(&mut self, remote_path: impl Into<String>) {
        let remote_path = remote_path.into();
        self.files_processed.push(remote_path.clone());
        self.files_skipped.push(remote_path);
    }

    pub fn record_failed(&mut self, remote_path: impl Into<String>, error: impl Into<String>) {
        let remote_path = remote_path.into();
        self.files_processed.push(remote_path.clone());
        self.files_failed.push(FileFailure {
            remote_path,
            error: error.into(),
        });
    }

    /// Checks `|processed| == |uploaded| + |failed| + |skipped|`
    pub fn is_consistent(&self) -> bool {
        self.files_processed.len()
            == self.files_uploaded.len() + self.files_failed.len() + self.files_skipped.len()
    }
}
