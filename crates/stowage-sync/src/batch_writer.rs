//! Batch write coordinator
//!
//! Writes a snapshot (root document plus child units) to the document store
//! in bounded batches.
//!
//! ## Flow
//!
//! 1. The root batch runs alone, before anything else. If it fails the write
//!    stops with [`WriteError::RootWriteFailed`].
//! 2. The remaining units are planned into batches of at most
//!    `max_operations_per_batch`.
//! 3. Batches run in windows of `max_concurrent_batches`; a window fully
//!    settles before the next one starts. Once `total_timeout` has elapsed no
//!    further window is launched and the rest are recorded as failed.
//! 4. Per-batch results fold into a [`SnapshotWriteResult`]. If it is not
//!    complete, the snapshot is flagged partial on a best-effort basis.
//!
//! Every batch commit runs inside the document store's circuit breaker, with
//! the retry executor inside the breaker.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use stowage_core::config::{Config, WritesConfig};
use stowage_core::domain::{Batch, BatchWriteResult, SnapshotWrite, SnapshotWriteResult};
use stowage_core::ports::IDocumentStore;
use stowage_remote::{CircuitBreaker, CircuitBreakerRegistry, CircuitError, RetryExecutor};
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::chunk;

const COMMIT_ROOT: &str = "commit_root";
const COMMIT_BATCH: &str = "commit_batch";

// ============================================================================
// Configuration and errors
// ============================================================================

/// Runtime settings of the batch writer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchWriteConfig {
    pub max_operations_per_batch: usize,
    pub max_concurrent_batches: usize,
    /// Per-attempt timeout of a single commit
    pub batch_timeout: Duration,
    /// Budget after which no new window is started
    pub total_timeout: Duration,
    pub max_unit_bytes: usize,
}

impl BatchWriteConfig {
    pub fn from_config(writes: &WritesConfig) -> Self {
        Self {
            max_operations_per_batch: writes.max_operations_per_batch,
            max_concurrent_batches: writes.max_concurrent_batches,
            batch_timeout: writes.batch_timeout(),
            total_timeout: writes.total_timeout(),
            max_unit_bytes: writes.max_unit_bytes,
        }
    }
}

impl Default for BatchWriteConfig {
    fn default() -> Self {
        Self::from_config(&WritesConfig::default())
    }
}

/// Errors that abort a snapshot write.
///
/// Failures of child batches are not errors; they are reported in the
/// [`SnapshotWriteResult`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WriteError {
    /// The root document could not be written, so no child was attempted
    #[error(
        "root write of snapshot '{snapshot_id}' failed ({operation} on {backend}, \
         {attempts} attempt(s), retried: {retried}): {message}"
    )]
    RootWriteFailed {
        snapshot_id: String,
        operation: String,
        backend: String,
        attempts: u32,
        retried: bool,
        message: String,
    },
}

// ============================================================================
// BatchWriter
// ============================================================================

/// Coordinates chunked, concurrent, retried writes of a snapshot
pub struct BatchWriter {
    store: Arc<dyn IDocumentStore>,
    retry: RetryExecutor,
    breaker: Arc<CircuitBreaker>,
    config: BatchWriteConfig,
}

impl BatchWriter {
    /// Creates a writer from its collaborators.
    ///
    /// The retry executor's per-attempt timeout should match
    /// `config.batch_timeout`; [`BatchWriter::from_config`] takes care of it.
    pub fn new(
        store: Arc<dyn IDocumentStore>,
        retry: RetryExecutor,
        breaker: Arc<CircuitBreaker>,
        config: BatchWriteConfig,
    ) -> Self {
        Self {
            store,
            retry,
            breaker,
            config,
        }
    }

    /// Builds a writer from application configuration.
    ///
    /// The breaker is taken from `breakers` under the store's backend name.
    pub fn from_config(
        store: Arc<dyn IDocumentStore>,
        config: &Config,
        breakers: &CircuitBreakerRegistry,
    ) -> Self {
        let write_config = BatchWriteConfig::from_config(&config.writes);
        let retry = RetryExecutor::new(
            config
                .retry
                .clone()
                .with_attempt_timeout(write_config.batch_timeout),
            store.backend_name(),
        );
        let breaker = breakers.get_or_create(store.backend_name());
        Self::new(store, retry, breaker, write_config)
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    /// Writes `snapshot` and reports the outcome of every batch.
    #[instrument(
        skip(self, snapshot),
        fields(snapshot_id = %snapshot.id, units = snapshot.units.len())
    )]
    pub async fn write_snapshot(
        &self,
        snapshot: SnapshotWrite,
    ) -> Result<SnapshotWriteResult, WriteError> {
        let started = Instant::now();
        let deadline = started + self.config.total_timeout;
        let SnapshotWrite { id, root, units } = snapshot;

        let mut batch_results = Vec::new();
        let mut next_index = 0;

        // Root first: children must never be visible without it.
        if let Some(root) = root {
            let batch = Batch {
                index: 0,
                units: vec![root],
            };
            let (mut result, attempts) = self.run_batch(&batch, COMMIT_ROOT).await;
            if !result.success {
                warn!(snapshot_id = %id, attempts, "Root write failed, aborting snapshot");
                return Err(WriteError::RootWriteFailed {
                    snapshot_id: id,
                    operation: COMMIT_ROOT.to_string(),
                    backend: self.store.backend_name().to_string(),
                    attempts,
                    retried: attempts > 1,
                    message: result.error.take().unwrap_or_default(),
                });
            }
            // The root document is not a unit.
            result.unit_keys.clear();
            batch_results.push(result);
            next_index = 1;
        }

        let batches = chunk::plan(units, self.config.max_operations_per_batch, next_index);
        debug!(batches = batches.len(), "Planned child batches");

        let mut windows = batches.chunks(self.config.max_concurrent_batches.max(1));
        while let Some(window) = windows.next() {
            if Instant::now() >= deadline {
                let remaining: Vec<&Batch> =
                    window.iter().chain(windows.by_ref().flatten()).collect();
                warn!(
                    remaining = remaining.len(),
                    total_timeout_ms = self.config.total_timeout.as_millis() as u64,
                    "Total timeout elapsed, remaining batches not started"
                );
                batch_results.extend(remaining.into_iter().map(|b| self.timed_out(b)));
                break;
            }

            let outcomes = join_all(window.iter().map(|b| self.run_batch(b, COMMIT_BATCH))).await;
            batch_results.extend(outcomes.into_iter().map(|(result, _)| result));
        }

        let total_duration_ms = started.elapsed().as_millis() as u64;
        let result = SnapshotWriteResult::fold(id, batch_results, total_duration_ms);

        if result.complete {
            info!(
                batches = result.total_batches,
                units_written = result.units_written,
                duration_ms = total_duration_ms,
                "Snapshot written"
            );
        } else {
            warn!(
                failed_batches = result.failed_batches,
                successful_batches = result.successful_batches,
                units_written = result.units_written,
                failed_units = result.failed_unit_keys.len(),
                "Snapshot written partially"
            );
            self.mark_partial_best_effort(&result.id, &result.failed_unit_keys)
                .await;
        }

        Ok(result)
    }

    /// Commits one batch through breaker and retry.
    ///
    /// Returns the batch result and the number of attempts made (0 when the
    /// batch never reached the remote).
    async fn run_batch(&self, batch: &Batch, operation: &str) -> (BatchWriteResult, u32) {
        let started = Instant::now();

        if let Some(error) = batch
            .units
            .iter()
            .find_map(|u| u.validate(self.config.max_unit_bytes).err())
        {
            warn!(batch = batch.index, error = %error, "Malformed unit, batch not sent");
            let outcome = Err(format!("malformed input: {error}"));
            return (self.batch_result(batch, started, 0, outcome), 0);
        }

        let mut attempts = 0;
        let attempts_seen = &mut attempts;
        let outcome = self
            .breaker
            .execute(|| async move {
                let outcome = self
                    .retry
                    .execute(operation, || self.store.commit_batch(&batch.units))
                    .await;
                *attempts_seen = outcome.attempts;
                outcome.into_result()
            })
            .await;

        let outcome = match outcome {
            Ok(()) => {
                debug!(batch = batch.index, ops = batch.len(), attempts, "Batch committed");
                Ok(())
            }
            Err(CircuitError::Open { name, retry_at }) => {
                warn!(batch = batch.index, breaker = %name, "Circuit open, batch rejected");
                Err(format!("circuit '{name}' is open until {retry_at}"))
            }
            Err(CircuitError::Inner(error)) => {
                warn!(batch = batch.index, attempts, error = %error, "Batch failed");
                Err(error.to_string())
            }
        };

        (self.batch_result(batch, started, attempts, outcome), attempts)
    }

    fn batch_result(
        &self,
        batch: &Batch,
        started: Instant,
        attempts: u32,
        outcome: Result<(), String>,
    ) -> BatchWriteResult {
        BatchWriteResult {
            batch_index: batch.index,
            operation_count: batch.len(),
            success: outcome.is_ok(),
            retry_attempts: attempts.saturating_sub(1),
            duration_ms: started.elapsed().as_millis() as u64,
            error: outcome.err(),
            unit_keys: batch.keys(),
        }
    }

    fn timed_out(&self, batch: &Batch) -> BatchWriteResult {
        BatchWriteResult {
            batch_index: batch.index,
            operation_count: batch.len(),
            success: false,
            retry_attempts: 0,
            duration_ms: 0,
            error: Some(format!(
                "total timeout of {}ms elapsed before batch started",
                self.config.total_timeout.as_millis()
            )),
            unit_keys: batch.keys(),
        }
    }

    /// Flags the snapshot as partial. Failures are logged and swallowed.
    pub async fn mark_partial_best_effort(&self, snapshot_id: &str, failed_keys: &[String]) {
        let call = self.store.mark_partial(snapshot_id, failed_keys);
        match tokio::time::timeout(self.config.batch_timeout, call).await {
            Ok(Ok(())) => {
                info!(snapshot_id, failed = failed_keys.len(), "Snapshot flagged partial");
            }
            Ok(Err(error)) => {
                warn!(snapshot_id, error = %error, "Could not flag snapshot as partial");
            }
            Err(_) => {
                warn!(snapshot_id, "Timed out flagging snapshot as partial");
            }
        }
    }
}
