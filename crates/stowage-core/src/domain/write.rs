//! Batched document write types
//!
//! A snapshot is written as one optional root document plus an ordered list
//! of [`WriteUnit`]s. The planner groups units into [`Batch`]es, the batch
//! writer produces one [`BatchWriteResult`] per batch and folds them into a
//! [`SnapshotWriteResult`].

use serde::{Deserialize, Serialize};

use super::errors::DomainError;

// ============================================================================
// WriteUnit
// ============================================================================

/// One atomic document write.
///
/// `key` is the stable attribution key (a district id, a station code...)
/// used to report which units failed; `path` is the document path inside the
/// target collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteUnit {
    /// Stable attribution key
    pub key: String,
    /// Document path relative to the collection
    pub path: String,
    /// Document body
    pub payload: serde_json::Value,
}

impl WriteUnit {
    /// Creates a new write unit
    pub fn new(
        key: impl Into<String>,
        path: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            key: key.into(),
            path: path.into(),
            payload,
        }
    }

    /// Checks the unit is well formed and its serialized payload fits in
    /// `max_bytes`.
    pub fn validate(&self, max_bytes: usize) -> Result<(), DomainError> {
        if self.key.trim().is_empty() {
            return Err(DomainError::EmptyKey);
        }
        if self.path.trim().is_empty() {
            return Err(DomainError::EmptyPath(self.key.clone()));
        }

        let size = serde_json::to_vec(&self.payload)
            .map_err(|e| DomainError::UnserializablePayload {
                key: self.key.clone(),
                reason: e.to_string(),
            })?
            .len();
        if size > max_bytes {
            return Err(DomainError::PayloadTooLarge {
                key: self.key.clone(),
                size,
                limit: max_bytes,
            });
        }
        Ok(())
    }
}

// ============================================================================
// SnapshotWrite - input of a batch write
// ============================================================================

/// A full snapshot to be written: the root document and its children.
///
/// The root must be visible before any child, so it is always written in a
/// dedicated batch ahead of the others.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotWrite {
    /// Snapshot identifier (also the root document id)
    pub id: String,
    /// Root document, if the snapshot has one
    #[serde(default)]
    pub root: Option<WriteUnit>,
    /// Child documents in write order
    #[serde(default)]
    pub units: Vec<WriteUnit>,
}

// ============================================================================
// Batch
// ============================================================================

/// An ordered group of write units committed as one remote request.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    /// Position of the batch within the write (root batch is 0)
    pub index: usize,
    /// Units in original order
    pub units: Vec<WriteUnit>,
}

impl Batch {
    /// Number of write operations in this batch
    pub fn len(&self) -> usize {
        self.units.len()
    }

    /// Returns true if the batch holds no units
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Attribution keys of every unit, in order
    pub fn keys(&self) -> Vec<String> {
        self.units.iter().map(|u| u.key.clone()).collect()
    }
}

// ============================================================================
// Results
// ============================================================================

/// Outcome of a single batch commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchWriteResult {
    pub batch_index: usize,
    pub operation_count: usize,
    pub success: bool,
    /// Retries performed beyond the first attempt
    pub retry_attempts: u32,
    pub duration_ms: u64,
    pub error: Option<String>,
    /// Attribution keys of the units in this batch (empty for the root batch)
    pub unit_keys: Vec<String>,
}

/// Aggregate outcome of a snapshot write.
///
/// Partial failure is reported here, never as an `Err`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotWriteResult {
    pub id: String,
    /// True iff no batch failed
    pub complete: bool,
    pub total_batches: usize,
    pub successful_batches: usize,
    pub failed_batches: usize,
    pub units_written: usize,
    pub failed_unit_keys: Vec<String>,
    pub total_duration_ms: u64,
    pub batch_results: Vec<BatchWriteResult>,
}

impl SnapshotWriteResult {
    /// Folds per-batch results into the aggregate.
    ///
    /// Unit counts come strictly from each batch's own outcome.
    pub fn fold(
        id: impl Into<String>,
        batch_results: Vec<BatchWriteResult>,
        total_duration_ms: u64,
    ) -> Self {
        let mut successful_batches = 0;
        let mut failed_batches = 0;
        let mut units_written = 0;
        let mut failed_unit_keys = Vec::new();

        for result in &batch_results {
            if result.success {
                successful_batches += 1;
                units_written += result.unit_keys.len();
            } else {
                failed_batches += 1;
                failed_unit_keys.extend(result.unit_keys.iter().cloned());
            }
        }

        Self {
            id: id.into(),
            complete: failed_batches == 0,
            total_batches: batch_results.len(),
            successful_batches,
            failed_batches,
            units_written,
            failed_unit_keys,
            total_duration_ms,
            batch_results,
        }
    }

    /// True when batches were attempted and none of them succeeded
    pub fn is_total_failure(&self) -> bool {
        self.total_batches > 0 && self.successful_batches == 0
    }
}

// ============================================================================
// Completeness
// ============================================================================

/// Completeness flag of a snapshot as stored remotely.
///
/// Snapshots written before the flag existed carry no value; that is kept as
/// [`Completeness::Unknown`] rather than read as complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Completeness {
    Complete,
    Partial,
    Unknown,
}

impl Completeness {
    /// Maps an optional stored flag onto the three states
    pub fn from_flag(flag: Option<bool>) -> Self {
        match flag {
            Some(true) => Self::Complete,
            Some(false) => Self::Partial,
            None => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Complete => "complete",
            Self::Partial => "partial",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for Completeness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
