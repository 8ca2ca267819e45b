//! Store traits consumed by the engine
//!
//! The historical, current-snapshot and metadata stores are owned by upstream
//! collectors and read in bulk once per pass. The result store is the only thing
//! the engine writes to.

use crate::{
    model::{AnomalyResult, ContractKey, ContractMetadata, CurrentFunding, HistoricalObservation, UpdateZone},
    Result,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A historical observation tagged with its contract
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationRow {
    /// Owning contract
    pub key: ContractKey,
    /// Recorded observation
    pub observation: HistoricalObservation,
}

/// Append-only store of historical funding observations
#[async_trait]
pub trait ObservationStore: Send + Sync {
    /// Every observation with a non-null rate at or after `since`,
    /// ordered by contract, then by time descending
    async fn fetch_observations_since(&self, since: DateTime<Utc>) -> Result<Vec<ObservationRow>>;
}

/// Latest funding snapshot per contract
#[async_trait]
pub trait CurrentFundingStore: Send + Sync {
    /// Current rate and interval for every tracked contract
    async fn fetch_current_funding(&self) -> Result<HashMap<ContractKey, CurrentFunding>>;
}

/// Contract registry
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Interval and listing time for every registered contract
    async fn fetch_contract_metadata(&self) -> Result<HashMap<ContractKey, ContractMetadata>>;
}

/// Per-contract anomaly snapshot table
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AnomalyResultStore: Send + Sync {
    /// Upsert every result in a single transaction; all-or-nothing.
    /// Returns the number of rows written.
    async fn upsert_results(&self, results: &[AnomalyResult]) -> Result<usize>;

    /// Current zone of every contract with a stored result
    async fn zone_membership(&self) -> Result<HashMap<ContractKey, UpdateZone>>;

    /// Stored result for one contract
    async fn fetch_result(&self, key: &ContractKey) -> Result<Option<AnomalyResult>>;
}

/// Everything the engine needs from storage
pub trait FundingDataStore: ObservationStore + CurrentFundingStore + MetadataStore + AnomalyResultStore {}

impl<T> FundingDataStore for T where T: ObservationStore + CurrentFundingStore + MetadataStore + AnomalyResultStore {}
