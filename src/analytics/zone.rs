//! Zone classification

use crate::model::UpdateZone;

/// |z| above this moves a contract onto the active timer
pub const ZONE_THRESHOLD: f64 = 2.0;

/// Active iff `|z_score| > 2.0`; a missing score is stable
pub fn classify_zone(z_score: Option<f64>) -> UpdateZone {
    match z_score {
        Some(z) if z.abs() > ZONE_THRESHOLD => UpdateZone::Active,
        _ => UpdateZone::Stable,
    }
}
