//! Integration tests for the funding anomaly engine

pub mod test_pass_pipeline;
pub mod test_zone_scheduling;

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use funding_anomaly_engine::{
    config::EngineConfig,
    model::{AnomalyResult, ContractKey, ContractMetadata, CurrentFunding, HistoricalObservation, UpdateZone},
    store::{AnomalyResultStore, CurrentFundingStore, MetadataStore, ObservationRow, ObservationStore, SqliteStore},
    EngineError, Result,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

/// Test utilities for integration tests
pub struct TestUtils;

impl TestUtils {
    /// Fixed pass time so results are reproducible
    pub fn now() -> DateTime<Utc> {
        Utc.timestamp_millis_opt(1_700_000_000_000).unwrap()
    }

    /// Small worker pool so a handful of contracts spreads over several chunks
    pub fn create_test_config() -> EngineConfig {
        let mut config = EngineConfig::default();
        config.workers.min_workers = 2;
        config.workers.max_workers = 4;
        config.workers.contracts_per_worker = 2;
        config
    }

    /// 85 samples around 0.0001 with a sample standard deviation of 0.00005
    pub fn bimodal_rates() -> Vec<f64> {
        let mut rates = vec![0.00005; 42];
        rates.extend(vec![0.00015; 42]);
        rates.push(0.0001);
        rates
    }

    /// 40 samples alternating 0.0001 and 0.0002
    pub fn alternating_rates() -> Vec<f64> {
        (0..40).map(|i| if i % 2 == 0 { 0.0001 } else { 0.0002 }).collect()
    }

    /// One observation every eight hours, newest first, ending before `now`
    pub fn observations(key: &ContractKey, rates: &[f64], now: DateTime<Utc>) -> Vec<ObservationRow> {
        rates
            .iter()
            .enumerate()
            .map(|(i, rate)| ObservationRow {
                key: key.clone(),
                observation: HistoricalObservation {
                    funding_rate: *rate,
                    observed_at: now - Duration::hours(8 * (i as i64 + 1)),
                    funding_interval_hours: Some(8),
                    mark_price: Some(100.0),
                },
            })
            .collect()
    }

    /// Seed history and, optionally, a current snapshot for one contract
    pub async fn seed_contract(
        store: &SqliteStore,
        key: &ContractKey,
        rates: &[f64],
        current: Option<f64>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        store.record_observations(&Self::observations(key, rates, now)).await?;
        if let Some(rate) = current {
            Self::set_current(store, key, rate, now).await?;
        }
        Ok(())
    }

    /// Replace the current rate of a contract
    pub async fn set_current(store: &SqliteStore, key: &ContractKey, rate: f64, now: DateTime<Utc>) -> Result<()> {
        store
            .upsert_current_funding(
                key,
                CurrentFunding {
                    rate,
                    interval_hours: 8,
                },
                now,
            )
            .await
    }
}

/// Which store call a [`FlakyStore`] should fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreCall {
    /// `fetch_current_funding`
    CurrentFunding,
    /// `fetch_contract_metadata`
    Metadata,
    /// `upsert_results`
    Upsert,
    /// `zone_membership`
    ZoneMembership,
}

/// Store wrapper whose individual calls can be switched to fail
pub struct FlakyStore {
    /// Backing store
    pub inner: SqliteStore,
    fail_current: AtomicBool,
    fail_metadata: AtomicBool,
    fail_writes: AtomicBool,
    fail_membership: AtomicBool,
}

impl FlakyStore {
    /// Wrap a store with every call succeeding
    pub fn new(inner: SqliteStore) -> Self {
        Self {
            inner,
            fail_current: AtomicBool::new(false),
            fail_metadata: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
            fail_membership: AtomicBool::new(false),
        }
    }

    fn switch(&self, call: StoreCall) -> &AtomicBool {
        match call {
            StoreCall::CurrentFunding => &self.fail_current,
            StoreCall::Metadata => &self.fail_metadata,
            StoreCall::Upsert => &self.fail_writes,
            StoreCall::ZoneMembership => &self.fail_membership,
        }
    }

    /// Make subsequent calls of one kind fail or succeed
    pub fn set_failing(&self, call: StoreCall, fail: bool) {
        self.switch(call).store(fail, Ordering::SeqCst);
    }

    /// Make subsequent result writes fail or succeed
    pub fn set_fail_writes(&self, fail: bool) {
        self.set_failing(StoreCall::Upsert, fail);
    }

    fn check(&self, call: StoreCall) -> Result<()> {
        if self.switch(call).load(Ordering::SeqCst) {
            return Err(anyhow::anyhow!("database is locked ({:?})", call));
        }
        Ok(())
    }
}

#[async_trait]
impl ObservationStore for FlakyStore {
    async fn fetch_observations_since(&self, since: DateTime<Utc>) -> Result<Vec<ObservationRow>> {
        self.inner.fetch_observations_since(since).await
    }
}

#[async_trait]
impl CurrentFundingStore for FlakyStore {
    async fn fetch_current_funding(&self) -> Result<HashMap<ContractKey, CurrentFunding>> {
        self.check(StoreCall::CurrentFunding)?;
        self.inner.fetch_current_funding().await
    }
}

#[async_trait]
impl MetadataStore for FlakyStore {
    async fn fetch_contract_metadata(&self) -> Result<HashMap<ContractKey, ContractMetadata>> {
        self.check(StoreCall::Metadata)?;
        self.inner.fetch_contract_metadata().await
    }
}

#[async_trait]
impl AnomalyResultStore for FlakyStore {
    async fn upsert_results(&self, results: &[AnomalyResult]) -> Result<usize> {
        if self.switch(StoreCall::Upsert).load(Ordering::SeqCst) {
            return Err(EngineError::WriteFailure("database is locked".to_string()).into());
        }
        self.inner.upsert_results(results).await
    }

    async fn zone_membership(&self) -> Result<HashMap<ContractKey, UpdateZone>> {
        self.check(StoreCall::ZoneMembership)?;
        self.inner.zone_membership().await
    }

    async fn fetch_result(&self, key: &ContractKey) -> Result<Option<AnomalyResult>> {
        self.inner.fetch_result(key).await
    }
}
