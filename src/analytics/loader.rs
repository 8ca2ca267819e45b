//! Batch data loader
//!
//! One bulk read of the trailing window for every contract, grouped in memory.
//! A failed read yields an empty snapshot so the pass degrades to "no history"
//! instead of aborting.

use crate::{
    model::{effective_interval, funding_apr, ContractKey},
    store::{ObservationRow, ObservationStore},
};
use chrono::{DateTime, Duration, Utc};
use indexmap::IndexMap;
use std::time::Instant;
use tracing::{debug, error, info};

/// Window series of one contract, newest first
#[derive(Debug, Clone, PartialEq)]
pub struct ContractSeries {
    /// Funding rates, newest first
    pub rates: Vec<f64>,
    /// APR of each rate, derived with that sample's interval
    pub aprs: Vec<f64>,
    /// Interval of the most recent sample
    pub interval_hours: u32,
    /// Timestamp of the most recent sample
    pub latest_observed_at: DateTime<Utc>,
}

impl ContractSeries {
    /// Number of loaded samples
    pub fn count(&self) -> usize {
        self.rates.len()
    }

    /// Most recent rate and APR, if any
    pub fn latest(&self) -> Option<(f64, f64)> {
        Some((*self.rates.first()?, *self.aprs.first()?))
    }
}

/// All loaded series, in query order
pub type HistorySnapshot = IndexMap<ContractKey, ContractSeries>;

/// Loads the observation window for all contracts in one query
#[derive(Debug, Clone, Copy)]
pub struct BatchDataLoader {
    window_days: u32,
}

impl BatchDataLoader {
    /// Create a loader for a window of `window_days`
    pub fn new(window_days: u32) -> Self {
        Self { window_days }
    }

    /// Start of the window ending at `now`
    pub fn window_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - Duration::days(i64::from(self.window_days))
    }

    /// Load and group the window. Never fails: store errors are logged and
    /// produce an empty snapshot.
    pub async fn load<S>(&self, store: &S, now: DateTime<Utc>) -> HistorySnapshot
    where
        S: ObservationStore + ?Sized,
    {
        let started = Instant::now();
        let since = self.window_start(now);

        match store.fetch_observations_since(since).await {
            Ok(rows) => {
                let row_count = rows.len();
                let snapshot = Self::group(rows);
                info!(
                    rows = row_count,
                    contracts = snapshot.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Loaded funding history window"
                );
                snapshot
            }
            Err(e) => {
                error!(
                    error = %e,
                    window_days = self.window_days,
                    "History load failed; continuing with empty snapshot"
                );
                HistorySnapshot::new()
            }
        }
    }

    /// Group rows (ordered by contract, newest first) into per-contract series
    pub fn group(rows: Vec<ObservationRow>) -> HistorySnapshot {
        let mut snapshot = HistorySnapshot::new();
        let mut dropped = 0usize;

        for ObservationRow { key, observation } in rows {
            if !observation.funding_rate.is_finite() {
                dropped += 1;
                continue;
            }

            let interval = effective_interval(observation.funding_interval_hours);
            let apr = funding_apr(observation.funding_rate, interval);

            let series = snapshot.entry(key).or_insert_with(|| ContractSeries {
                rates: Vec::new(),
                aprs: Vec::new(),
                interval_hours: interval,
                latest_observed_at: observation.observed_at,
            });
            series.rates.push(observation.funding_rate);
            series.aprs.push(apr);
        }

        if dropped > 0 {
            debug!(dropped, "Dropped non-finite funding rates during load");
        }
        snapshot
    }
}
