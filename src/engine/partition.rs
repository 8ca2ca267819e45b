//! Chunk sizing for the worker pool

use crate::config::WorkerConfig;
use std::ops::Range;

/// Split `0..total_items` into at most `max_chunks` contiguous ranges whose
/// lengths differ by at most one. Empty input yields no chunks.
pub fn partition(total_items: usize, max_chunks: usize) -> Vec<Range<usize>> {
    if total_items == 0 || max_chunks == 0 {
        return Vec::new();
    }

    let chunks = max_chunks.min(total_items);
    let base = total_items / chunks;
    let remainder = total_items % chunks;

    let mut ranges = Vec::with_capacity(chunks);
    let mut start = 0;
    for index in 0..chunks {
        let len = base + usize::from(index < remainder);
        ranges.push(start..start + len);
        start += len;
    }
    ranges
}

/// Worker count for a pass: one per `contracts_per_worker`, clamped to
/// `[min_workers, max_workers]` and never more than there are contracts.
pub fn worker_count(total_items: usize, config: &WorkerConfig) -> usize {
    if total_items == 0 {
        return 0;
    }
    let per_worker = config.contracts_per_worker.max(1);
    let wanted = (total_items + per_worker - 1) / per_worker;
    let upper = config.max_workers.max(1);
    let lower = config.min_workers.clamp(1, upper);
    wanted.clamp(lower, upper).min(total_items)
}
