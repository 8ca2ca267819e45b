//! Batch writer: one atomic upsert per pass

use crate::{model::AnomalyResult, store::AnomalyResultStore, EngineError, Result};
use std::time::Instant;
use tracing::{debug, info};

/// Flushes a pass's merged results to the result store
#[derive(Debug, Clone, Copy, Default)]
pub struct BatchWriter;

impl BatchWriter {
    /// Upsert all results in one transaction. An empty batch does not touch
    /// the store. Any store error means nothing from this batch was applied.
    pub async fn flush<S>(&self, store: &S, results: &[AnomalyResult]) -> Result<usize>
    where
        S: AnomalyResultStore + ?Sized,
    {
        if results.is_empty() {
            debug!("No results to write");
            return Ok(0);
        }

        let started = Instant::now();
        let written = store
            .upsert_results(results)
            .await
            .map_err(|e| EngineError::WriteFailure(format!("batch of {} rolled back: {}", results.len(), e)))?;

        info!(
            rows = written,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Flushed anomaly results"
        );
        Ok(written)
    }
}
