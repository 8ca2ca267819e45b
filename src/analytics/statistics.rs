//! Statistics computer
//!
//! Baseline summary, Z-score and rank percentile for a single series.

use crate::model::{SeriesSummary, StatisticalSummary};
use statrs::statistics::Statistics;

/// Fewest clean values a series needs for a usable summary
pub const MIN_CLEAN_VALUES: usize = 2;

/// Percentile reported against an empty series
pub const EMPTY_SERIES_PERCENTILE: u8 = 50;

/// Drop non-finite entries without interpolating
pub fn clean_series(values: &[f64]) -> Vec<f64> {
    values.iter().copied().filter(|v| v.is_finite()).collect()
}

/// Mean, sample standard deviation, min and max of the clean values.
/// `None` when fewer than [`MIN_CLEAN_VALUES`] remain.
pub fn summarize(values: &[f64]) -> Option<SeriesSummary> {
    let clean = clean_series(values);
    if clean.len() < MIN_CLEAN_VALUES {
        return None;
    }

    let min = Statistics::min(clean.iter());
    let max = Statistics::max(clean.iter());
    // The streaming variance can leave rounding residue on a constant series
    let std_dev = if min == max {
        0.0
    } else {
        Statistics::std_dev(clean.iter())
    };

    Some(SeriesSummary {
        mean: Statistics::mean(clean.iter()),
        std_dev,
        min,
        max,
        count: clean.len(),
    })
}

/// Summaries of both series; `None` if either is unusable
pub fn summarize_pair(rates: &[f64], aprs: &[f64]) -> Option<StatisticalSummary> {
    Some(StatisticalSummary {
        rate: summarize(rates)?,
        apr: summarize(aprs)?,
    })
}

/// `(value - mean) / std_dev`; `None` for zero variance or a non-finite result
pub fn z_score(value: f64, summary: &SeriesSummary) -> Option<f64> {
    if summary.std_dev == 0.0 || !summary.std_dev.is_finite() {
        return None;
    }
    let z = (value - summary.mean) / summary.std_dev;
    z.is_finite().then_some(z)
}

/// Rank percentile of `value` within `series`: the mean of the strictly-less
/// and less-or-equal shares, scaled to 0-100 and truncated.
pub fn percentile_rank(value: f64, series: &[f64]) -> u8 {
    let clean = clean_series(series);
    if clean.is_empty() {
        return EMPTY_SERIES_PERCENTILE;
    }

    let below = clean.iter().filter(|&&v| v < value).count();
    let at_or_below = clean.iter().filter(|&&v| v <= value).count();
    let pct = (below + at_or_below) as f64 * 50.0 / clean.len() as f64;

    pct.clamp(0.0, 100.0) as u8
}
