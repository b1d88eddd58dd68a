//! Stowage Sync - snapshot writes and incremental uploads
//!
//! Provides:
//! - Chunking of oversized writes into bounded batches
//! - A batch write coordinator with bounded concurrency and partial-failure
//!   reporting
//! - A per-scope fingerprint manifest
//! - An incremental upload coordinator for local directory trees
//!
//! ## Modules
//!
//! - [`chunk`] - Batch planning
//! - [`batch_writer`] - Snapshot write coordinator
//! - [`manifest`] - Fingerprint store
//! - [`walker`] - File enumeration and date filtering
//! - [`uploader`] - Incremental sync coordinator

pub mod batch_writer;
pub mod chunk;
pub mod manifest;
pub mod uploader;
pub mod walker;

#[cfg(test)]
pub(crate) mod testing;

pub use batch_writer::{BatchWriteConfig, BatchWriter, WriteError};
pub use manifest::{Manifest, ManifestError, ManifestStore};
pub use uploader::{UploadError, UploadOptions, Uploader};
pub use walker::DateFilter;
