//! Core domain types shared by the loader, analytics and stores

pub mod result;

pub use result::*;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Funding interval assumed when neither metadata nor observations carry one
pub const DEFAULT_FUNDING_INTERVAL_HOURS: u32 = 8;

/// Hours in a day, used by the APR and expected-points formulas
pub const HOURS_PER_DAY: f64 = 24.0;

/// Days per year used for annualisation
pub const DAYS_PER_YEAR: f64 = 365.0;

/// Unique identity of a funding contract: (exchange, symbol)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContractKey {
    /// Exchange identifier (lowercase, e.g. "binance")
    pub exchange: String,
    /// Contract symbol on that exchange
    pub symbol: String,
}

impl ContractKey {
    /// Create a new contract key
    pub fn new(exchange: impl Into<String>, symbol: impl Into<String>) -> Self {
        Self {
            exchange: exchange.into(),
            symbol: symbol.into(),
        }
    }
}

impl fmt::Display for ContractKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.exchange, self.symbol)
    }
}

/// A single recorded funding observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalObservation {
    /// Funding rate for the interval
    pub funding_rate: f64,
    /// When the rate was observed
    pub observed_at: DateTime<Utc>,
    /// Funding interval reported with the sample
    pub funding_interval_hours: Option<u32>,
    /// Mark price at observation time
    pub mark_price: Option<f64>,
}

/// Externally owned contract registry entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractMetadata {
    /// Funding interval in hours
    pub funding_interval_hours: u32,
    /// When the contract was first listed
    pub created_at: DateTime<Utc>,
    /// Quality score assigned by upstream validators
    pub data_quality_score: Option<f64>,
}

/// Latest funding snapshot for a contract
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CurrentFunding {
    /// Current funding rate
    pub rate: f64,
    /// Funding interval in hours
    pub interval_hours: u32,
}

impl CurrentFunding {
    /// Annualised percentage rate of the current snapshot
    pub fn apr(&self) -> f64 {
        funding_apr(self.rate, effective_interval(Some(self.interval_hours)))
    }
}

/// Annualise a funding rate: `rate * (24 / interval_hours) * 365 * 100`.
///
/// `interval_hours` must be non-zero; run it through [`effective_interval`] first.
pub fn funding_apr(rate: f64, interval_hours: u32) -> f64 {
    rate * (HOURS_PER_DAY / interval_hours as f64) * DAYS_PER_YEAR * 100.0
}

/// Replace a missing or zero interval with [`DEFAULT_FUNDING_INTERVAL_HOURS`]
pub fn effective_interval(interval_hours: Option<u32>) -> u32 {
    match interval_hours {
        Some(hours) if hours > 0 => hours,
        _ => DEFAULT_FUNDING_INTERVAL_HOURS,
    }
}
