//! Per-contract analysis outputs

use super::ContractKey;
use crate::EngineError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Qualitative confidence derived from the number of samples backing a statistic
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceLevel {
    /// Too few samples; the contract is skipped
    None,
    /// 10..30 samples
    Low,
    /// 30..90 samples
    Medium,
    /// 90..180 samples
    High,
    /// 180 or more samples
    VeryHigh,
}

impl ConfidenceLevel {
    /// Storage representation
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfidenceLevel::None => "none",
            ConfidenceLevel::Low => "low",
            ConfidenceLevel::Medium => "medium",
            ConfidenceLevel::High => "high",
            ConfidenceLevel::VeryHigh => "very_high",
        }
    }
}

impl fmt::Display for ConfidenceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ConfidenceLevel {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(ConfidenceLevel::None),
            "low" => Ok(ConfidenceLevel::Low),
            "medium" => Ok(ConfidenceLevel::Medium),
            "high" => Ok(ConfidenceLevel::High),
            "very_high" => Ok(ConfidenceLevel::VeryHigh),
            _ => Err(EngineError::QueryFailure(format!("Unknown confidence level: {}", s))),
        }
    }
}

/// Refresh cadence a contract is scheduled under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateZone {
    /// Anomalous contracts, refreshed on the fast timer
    Active,
    /// Everything else, refreshed on the slow timer
    Stable,
}

impl UpdateZone {
    /// Storage representation
    pub fn as_str(&self) -> &'static str {
        match self {
            UpdateZone::Active => "active",
            UpdateZone::Stable => "stable",
        }
    }
}

impl fmt::Display for UpdateZone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for UpdateZone {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(UpdateZone::Active),
            "stable" => Ok(UpdateZone::Stable),
            _ => Err(EngineError::QueryFailure(format!("Unknown update zone: {}", s))),
        }
    }
}

/// Descriptive statistics over one clean series
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeriesSummary {
    /// Arithmetic mean
    pub mean: f64,
    /// Sample standard deviation (N-1)
    pub std_dev: f64,
    /// Smallest value
    pub min: f64,
    /// Largest value
    pub max: f64,
    /// Number of clean values
    pub count: usize,
}

/// Baseline statistics for the rate and APR series of one contract
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StatisticalSummary {
    /// Raw funding rate series
    pub rate: SeriesSummary,
    /// Annualised series
    pub apr: SeriesSummary,
}

/// Current anomaly snapshot for one contract, upserted each pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyResult {
    /// Contract identity
    pub key: ContractKey,
    /// Current funding rate the scores were computed for
    pub current_rate: f64,
    /// Current APR
    pub current_apr: f64,
    /// Z-score of the current rate; `None` when the baseline has zero variance
    pub z_score: Option<f64>,
    /// Z-score of the current APR
    pub z_score_apr: Option<f64>,
    /// Rank percentile (0-100) of the current rate within the window
    pub percentile: Option<u8>,
    /// Rank percentile (0-100) of the current APR within the window
    pub percentile_apr: Option<u8>,
    /// Baseline statistics
    pub summary: StatisticalSummary,
    /// Sample-count confidence
    pub confidence_level: ConfidenceLevel,
    /// Observed / expected samples, in percent
    pub completeness_percentage: f64,
    /// Observed clean samples
    pub data_points: usize,
    /// Samples expected given contract age and interval
    pub expected_points: u64,
    /// Zone that decides the next refresh
    pub update_zone: UpdateZone,
    /// When the pass computed this row
    pub calculated_at: DateTime<Utc>,
}
