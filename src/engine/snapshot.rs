//! Read-only per-pass snapshot shared by all workers

use crate::{
    analytics::{BatchDataLoader, HistorySnapshot, MetadataResolver, ResolvedMetadata},
    model::{ContractKey, CurrentFunding},
    store::FundingDataStore,
    EngineError, Result,
};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tracing::debug;

/// Everything a worker may read during a pass
#[derive(Debug, Clone)]
pub struct PassSnapshot {
    /// Window series per contract
    pub history: HistorySnapshot,
    /// Current funding per contract
    pub current: HashMap<ContractKey, CurrentFunding>,
    /// Resolved interval and age per contract
    pub metadata: HashMap<ContractKey, ResolvedMetadata>,
    /// Window length the snapshot was loaded with
    pub window_days: u32,
    /// Timestamp stamped on every result of the pass
    pub calculated_at: DateTime<Utc>,
}

impl PassSnapshot {
    /// Load history, current funding and metadata in three bulk reads.
    ///
    /// A failed history read degrades to an empty history; failed current or
    /// metadata reads abort the pass.
    pub async fn load<S>(store: &S, window_days: u32, now: DateTime<Utc>) -> Result<Self>
    where
        S: FundingDataStore + ?Sized,
    {
        let history = BatchDataLoader::new(window_days).load(store, now).await;

        let current = store
            .fetch_current_funding()
            .await
            .map_err(|e| EngineError::QueryFailure(format!("current funding load failed: {}", e)))?;

        let registry = store
            .fetch_contract_metadata()
            .await
            .map_err(|e| EngineError::QueryFailure(format!("contract metadata load failed: {}", e)))?;

        Ok(Self::assemble(history, current, &registry, window_days, now))
    }

    /// Build a snapshot from already-loaded parts
    pub fn assemble(
        history: HistorySnapshot,
        current: HashMap<ContractKey, CurrentFunding>,
        registry: &HashMap<ContractKey, crate::model::ContractMetadata>,
        window_days: u32,
        now: DateTime<Utc>,
    ) -> Self {
        let resolver = MetadataResolver::new(registry, &current, window_days, now);
        let mut metadata = resolver.resolve_all(
            history
                .iter()
                .map(|(key, series)| (key, Some(series.interval_hours))),
        );
        for key in current.keys() {
            if !metadata.contains_key(key) {
                metadata.insert(key.clone(), resolver.resolve(key, None));
            }
        }

        debug!(
            history = history.len(),
            current = current.len(),
            registry = registry.len(),
            "Assembled pass snapshot"
        );

        Self {
            history,
            current,
            metadata,
            window_days,
            calculated_at: now,
        }
    }

    /// Every contract known to the snapshot: loaded history first, then
    /// contracts that only have a current snapshot
    pub fn all_contracts(&self) -> Vec<ContractKey> {
        let mut keys: Vec<ContractKey> = self.history.keys().cloned().collect();
        let mut extra: Vec<ContractKey> = self
            .current
            .keys()
            .filter(|key| !self.history.contains_key(*key))
            .cloned()
            .collect();
        extra.sort();
        keys.extend(extra);
        keys
    }
}
