//! Chunk planner
//!
//! Splits an ordered list of write units into batches no larger than the
//! remote's per-request operation cap.

use stowage_core::domain::{Batch, WriteUnit};

/// Partitions `units` into `ceil(N / max_per_batch)` batches, preserving
/// order.
///
/// Every batch holds exactly `max_per_batch` units except possibly the last.
/// Batch indexes start at `start_index`. A `max_per_batch` of 0 is treated
/// as 1.
pub fn plan(units: Vec<WriteUnit>, max_per_batch: usize, start_index: usize) -> Vec<Batch> {
    let size = max_per_batch.max(1);
    let mut batches = Vec::with_capacity(units.len().div_ceil(size));
    let mut iter = units.into_iter().peekable();

    while iter.peek().is_some() {
        let chunk: Vec<WriteUnit> = iter.by_ref().take(size).collect();
        batches.push(Batch {
            index: start_index + batches.len(),
            units: chunk,
        });
    }

    batches
}
