//! Confidence classifier

use crate::model::{ConfidenceLevel, HOURS_PER_DAY};
use serde::{Deserialize, Serialize};

/// Minimum clean samples for any result to be produced
pub const MIN_DATA_POINTS: usize = 10;
/// Lower bound of the medium tier
pub const MEDIUM_DATA_POINTS: usize = 30;
/// Lower bound of the high tier
pub const HIGH_DATA_POINTS: usize = 90;
/// Lower bound of the very-high tier
pub const VERY_HIGH_DATA_POINTS: usize = 180;

/// Confidence tier plus completeness of the observed window
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceAssessment {
    /// Sample-count tier
    pub level: ConfidenceLevel,
    /// Observed clean samples
    pub data_points: usize,
    /// Samples expected for the contract's age and interval
    pub expected_points: u64,
    /// `data_points / expected_points * 100`, or 0 when nothing is expected
    pub completeness_percentage: f64,
}

/// Tier for a sample count
pub fn classify_confidence(data_points: usize) -> ConfidenceLevel {
    match data_points {
        n if n < MIN_DATA_POINTS => ConfidenceLevel::None,
        n if n < MEDIUM_DATA_POINTS => ConfidenceLevel::Low,
        n if n < HIGH_DATA_POINTS => ConfidenceLevel::Medium,
        n if n < VERY_HIGH_DATA_POINTS => ConfidenceLevel::High,
        _ => ConfidenceLevel::VeryHigh,
    }
}

/// `floor(age_days * 24 / interval_hours)`
pub fn expected_points(age_days: f64, interval_hours: u32) -> u64 {
    if interval_hours == 0 || age_days <= 0.0 {
        return 0;
    }
    (age_days * HOURS_PER_DAY / f64::from(interval_hours)).floor() as u64
}

/// Classify a contract from its sample count, interval and age
pub fn assess_confidence(data_points: usize, interval_hours: u32, age_days: f64) -> ConfidenceAssessment {
    let expected = expected_points(age_days, interval_hours);
    let completeness_percentage = if expected == 0 {
        0.0
    } else {
        data_points as f64 / expected as f64 * 100.0
    };

    ConfidenceAssessment {
        level: classify_confidence(data_points),
        data_points,
        expected_points: expected,
        completeness_percentage,
    }
}
