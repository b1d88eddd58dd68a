//! Domain types
//!
//! - Write units, batches and batch/snapshot results
//! - Manifest entries, local file descriptors and upload results
//! - Domain-specific error types

pub mod errors;
pub mod sync;
pub mod write;

pub use errors::DomainError;
pub use sync::{FileFailure, LocalFile, ManifestEntry, UploadResult};
pub use write::{
    Batch, BatchWriteResult, Completeness, SnapshotWrite, SnapshotWriteResult, WriteUnit,
};
