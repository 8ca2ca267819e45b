//! Per-contract analysis run inside workers

use super::snapshot::PassSnapshot;
use crate::{
    analytics::{
        assess_confidence, classify_zone, confidence::MIN_DATA_POINTS, metadata::MetadataSource,
        percentile_rank, statistics::{clean_series, summarize_pair}, z_score, ResolvedMetadata,
    },
    log_contract,
    model::{AnomalyResult, ConfidenceLevel, ContractKey},
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a contract produced no result this pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// No observations in the window
    NoHistory,
    /// Fewer than the minimum clean samples
    InsufficientSamples,
    /// A series had fewer than two clean values
    UnusableSeries,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::NoHistory => write!(f, "no_history"),
            SkipReason::InsufficientSamples => write!(f, "insufficient_samples"),
            SkipReason::UnusableSeries => write!(f, "unusable_series"),
        }
    }
}

/// Outcome of analysing one contract
#[derive(Debug, Clone, PartialEq)]
pub enum ContractOutcome {
    /// A result row to upsert
    Computed(AnomalyResult),
    /// Nothing to write; the previous row stays
    Skipped(SkipReason),
    /// Unexpected per-contract failure; counted as an error
    Failed(String),
}

/// Computes a contract's result from the shared snapshot.
///
/// Implementations must only read `snapshot` and must not depend on other
/// contracts' outcomes; the orchestrator runs them concurrently.
pub trait ContractAnalyzer: Send + Sync {
    /// Analyse a single contract
    fn analyze(&self, snapshot: &PassSnapshot, key: &ContractKey) -> ContractOutcome;
}

/// Confidence, statistics and zone classification in sequence
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardAnalyzer;

impl ContractAnalyzer for StandardAnalyzer {
    fn analyze(&self, snapshot: &PassSnapshot, key: &ContractKey) -> ContractOutcome {
        let Some(series) = snapshot.history.get(key) else {
            return ContractOutcome::Skipped(SkipReason::NoHistory);
        };

        let data_points = clean_series(&series.rates).len();
        if data_points < MIN_DATA_POINTS {
            return ContractOutcome::Skipped(SkipReason::InsufficientSamples);
        }

        let metadata = snapshot.metadata.get(key).copied().unwrap_or(ResolvedMetadata {
            interval_hours: series.interval_hours,
            age_days: f64::from(snapshot.window_days),
            source: MetadataSource::Observations,
        });
        let assessment = assess_confidence(data_points, metadata.interval_hours, metadata.age_days);
        if assessment.level == ConfidenceLevel::None {
            return ContractOutcome::Skipped(SkipReason::InsufficientSamples);
        }

        let Some(summary) = summarize_pair(&series.rates, &series.aprs) else {
            return ContractOutcome::Skipped(SkipReason::UnusableSeries);
        };

        let current = snapshot
            .current
            .get(key)
            .map(|current| (current.rate, current.apr()))
            .or_else(|| series.latest());
        let Some((current_rate, current_apr)) = current else {
            return ContractOutcome::Skipped(SkipReason::NoHistory);
        };
        if !current_rate.is_finite() || !current_apr.is_finite() {
            return ContractOutcome::Failed(format!("non-finite current value for {}", key));
        }

        let z = z_score(current_rate, &summary.rate);
        let z_apr = z_score(current_apr, &summary.apr);
        let update_zone = classify_zone(z);

        log_contract!(
            trace,
            key,
            z.unwrap_or(f64::NAN),
            update_zone,
            confidence = %assessment.level,
            data_points
        );

        ContractOutcome::Computed(AnomalyResult {
            key: key.clone(),
            current_rate,
            current_apr,
            z_score: z,
            z_score_apr: z_apr,
            percentile: Some(percentile_rank(current_rate, &series.rates)),
            percentile_apr: Some(percentile_rank(current_apr, &series.aprs)),
            summary,
            confidence_level: assessment.level,
            completeness_percentage: assessment.completeness_percentage,
            data_points,
            expected_points: assessment.expected_points,
            update_zone,
            calculated_at: snapshot.calculated_at,
        })
    }
}
