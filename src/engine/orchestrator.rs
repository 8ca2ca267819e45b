//! Parallel orchestrator
//!
//! Fans a pass's contract list out to blocking workers over one shared
//! snapshot and merges their partial outputs at a single reduction point.

use super::{
    analyzer::{ContractAnalyzer, ContractOutcome, SkipReason},
    partition::{partition, worker_count},
    snapshot::PassSnapshot,
};
use crate::{
    config::WorkerConfig,
    model::{AnomalyResult, ContractKey},
    EngineError,
};
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error};

/// Output of one worker
#[derive(Debug, Clone, Default)]
pub struct ChunkOutcome {
    /// Rows to upsert
    pub results: Vec<AnomalyResult>,
    /// Skips by reason
    pub skipped: HashMap<SkipReason, usize>,
    /// Per-contract failures
    pub errors: usize,
}

impl ChunkOutcome {
    /// Total skipped contracts
    pub fn skipped_total(&self) -> usize {
        self.skipped.values().sum()
    }

    fn absorb(&mut self, other: ChunkOutcome) {
        self.results.extend(other.results);
        for (reason, count) in other.skipped {
            *self.skipped.entry(reason).or_insert(0) += count;
        }
        self.errors += other.errors;
    }
}

/// Merged output of a pass's compute phase
#[derive(Debug, Clone, Default)]
pub struct OrchestrationOutcome {
    /// Merged results and counters
    pub merged: ChunkOutcome,
    /// Number of chunks launched
    pub chunks: usize,
    /// Chunks whose worker failed as a whole
    pub failed_chunks: usize,
    /// Wall time of the compute phase
    pub elapsed: Duration,
}

/// Counts skipped by reason, for reports
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkipCounts {
    /// No history in the window
    pub no_history: usize,
    /// Below the minimum sample count
    pub insufficient_samples: usize,
    /// A series was unusable
    pub unusable_series: usize,
}

impl From<&HashMap<SkipReason, usize>> for SkipCounts {
    fn from(map: &HashMap<SkipReason, usize>) -> Self {
        let get = |reason| map.get(&reason).copied().unwrap_or(0);
        Self {
            no_history: get(SkipReason::NoHistory),
            insufficient_samples: get(SkipReason::InsufficientSamples),
            unusable_series: get(SkipReason::UnusableSeries),
        }
    }
}

/// Analyse one chunk sequentially. This is the body each worker runs.
pub fn compute_chunk(analyzer: &dyn ContractAnalyzer, snapshot: &PassSnapshot, keys: &[ContractKey]) -> ChunkOutcome {
    let mut outcome = ChunkOutcome::default();
    for key in keys {
        match analyzer.analyze(snapshot, key) {
            ContractOutcome::Computed(result) => outcome.results.push(result),
            ContractOutcome::Skipped(reason) => *outcome.skipped.entry(reason).or_insert(0) += 1,
            ContractOutcome::Failed(reason) => {
                debug!(contract = %key, reason = %reason, "Contract analysis failed");
                outcome.errors += 1;
            }
        }
    }
    outcome
}

/// Runs chunks of contracts concurrently against a shared snapshot
#[derive(Clone)]
pub struct ParallelOrchestrator {
    config: WorkerConfig,
    analyzer: Arc<dyn ContractAnalyzer>,
}

impl ParallelOrchestrator {
    /// Create an orchestrator with the given analyzer
    pub fn new(config: WorkerConfig, analyzer: Arc<dyn ContractAnalyzer>) -> Self {
        Self { config, analyzer }
    }

    /// Compute every contract in `keys`.
    ///
    /// A worker that panics has its whole chunk counted as errors; the other
    /// chunks are still merged.
    pub async fn run(&self, snapshot: Arc<PassSnapshot>, keys: Vec<ContractKey>) -> OrchestrationOutcome {
        let started = Instant::now();
        let keys = Arc::new(keys);
        let ranges = partition(keys.len(), worker_count(keys.len(), &self.config));
        let chunks = ranges.len();

        let handles = ranges.into_iter().map(|range| {
            let analyzer = Arc::clone(&self.analyzer);
            let snapshot = Arc::clone(&snapshot);
            let keys = Arc::clone(&keys);
            let len = range.len();
            let handle = tokio::task::spawn_blocking(move || {
                compute_chunk(analyzer.as_ref(), &snapshot, &keys[range])
            });
            async move { (len, handle.await) }
        });

        let mut merged = ChunkOutcome::default();
        let mut failed_chunks = 0;
        for (index, (len, joined)) in join_all(handles).await.into_iter().enumerate() {
            match joined {
                Ok(outcome) => merged.absorb(outcome),
                Err(e) => {
                    let failure = EngineError::WorkerFailure(format!("chunk {} lost {} contracts: {}", index, len, e));
                    error!(chunk = index, error = %failure, "Worker chunk failed");
                    failed_chunks += 1;
                    merged.errors += len;
                }
            }
        }

        OrchestrationOutcome {
            merged,
            chunks,
            failed_chunks,
            elapsed: started.elapsed(),
        }
    }
}
