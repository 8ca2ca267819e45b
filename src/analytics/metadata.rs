//! Metadata resolver
//!
//! The contract registry is the source of truth for funding interval and age.
//! Contracts missing from it take their interval from the current snapshot
//! (or, failing that, from their latest observation) and are assumed to be old
//! enough to expect a full window.

use crate::model::{effective_interval, ContractKey, ContractMetadata, CurrentFunding};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Where a resolved interval came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetadataSource {
    /// Contract registry entry
    Registry,
    /// Current funding snapshot fallback
    CurrentSnapshot,
    /// Latest loaded observation fallback
    Observations,
}

/// Interval and age used for expected-point calculations
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResolvedMetadata {
    /// Funding interval in hours, never zero
    pub interval_hours: u32,
    /// Contract age in days, clipped to `[0, window_days]`
    pub age_days: f64,
    /// Source of the interval
    pub source: MetadataSource,
}

/// Resolves interval and age for every contract in a pass
pub struct MetadataResolver<'a> {
    registry: &'a HashMap<ContractKey, ContractMetadata>,
    current: &'a HashMap<ContractKey, CurrentFunding>,
    window_days: u32,
    now: DateTime<Utc>,
}

impl<'a> MetadataResolver<'a> {
    /// Create a resolver over the registry and current snapshots
    pub fn new(
        registry: &'a HashMap<ContractKey, ContractMetadata>,
        current: &'a HashMap<ContractKey, CurrentFunding>,
        window_days: u32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            registry,
            current,
            window_days,
            now,
        }
    }

    /// Resolve one contract. `observed_interval` is the interval of its most
    /// recent loaded sample, if any.
    pub fn resolve(&self, key: &ContractKey, observed_interval: Option<u32>) -> ResolvedMetadata {
        let window = f64::from(self.window_days);

        if let Some(meta) = self.registry.get(key) {
            let age_secs = (self.now - meta.created_at).num_seconds() as f64;
            return ResolvedMetadata {
                interval_hours: effective_interval(Some(meta.funding_interval_hours)),
                age_days: (age_secs / SECONDS_PER_DAY).clamp(0.0, window),
                source: MetadataSource::Registry,
            };
        }

        let (interval, source) = match self.current.get(key) {
            Some(current) => (Some(current.interval_hours), MetadataSource::CurrentSnapshot),
            None => (observed_interval, MetadataSource::Observations),
        };

        ResolvedMetadata {
            interval_hours: effective_interval(interval),
            age_days: window,
            source,
        }
    }

    /// Resolve every key, using the observed intervals where known
    pub fn resolve_all<'k, I>(&self, keys: I) -> HashMap<ContractKey, ResolvedMetadata>
    where
        I: IntoIterator<Item = (&'k ContractKey, Option<u32>)>,
    {
        keys.into_iter()
            .map(|(key, observed)| (key.clone(), self.resolve(key, observed)))
            .collect()
    }
}
