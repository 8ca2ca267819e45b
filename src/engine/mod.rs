//! Anomaly engine: snapshot load, parallel compute, batch write

pub mod analyzer;
pub mod health;
pub mod orchestrator;
pub mod partition;
pub mod scheduler;
pub mod snapshot;
pub mod writer;

pub use analyzer::{ContractAnalyzer, ContractOutcome, SkipReason, StandardAnalyzer};
pub use health::{EngineHealth, HealthSnapshot, SchedulerState};
pub use orchestrator::{ParallelOrchestrator, SkipCounts};
pub use partition::{partition, worker_count};
pub use scheduler::{PassScheduler, SchedulerHandle};
pub use snapshot::PassSnapshot;
pub use writer::BatchWriter;

use crate::{
    config::EngineConfig,
    log_pass,
    model::{ContractKey, UpdateZone},
    store::FundingDataStore,
    utils::metrics,
    EngineError, Result,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn, Instrument};
use uuid::Uuid;

/// Which contracts a pass covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PassKind {
    /// Every known contract; establishes zone membership
    Bootstrap,
    /// Active-zone contracts plus contracts never classified
    Active,
    /// Stable-zone contracts
    Stable,
}

impl PassKind {
    /// Label used in logs and metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            PassKind::Bootstrap => "bootstrap",
            PassKind::Active => "active",
            PassKind::Stable => "stable",
        }
    }

    /// Zone whose members this pass refreshes
    pub fn zone(&self) -> Option<UpdateZone> {
        match self {
            PassKind::Bootstrap => None,
            PassKind::Active => Some(UpdateZone::Active),
            PassKind::Stable => Some(UpdateZone::Stable),
        }
    }
}

impl fmt::Display for PassKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PassKind {
    type Err = EngineError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "all" | "bootstrap" => Ok(PassKind::Bootstrap),
            "active" => Ok(PassKind::Active),
            "stable" => Ok(PassKind::Stable),
            _ => Err(EngineError::Config(format!("Unknown pass kind: {}", s))),
        }
    }
}

/// Summary of one completed pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PassReport {
    /// Correlates log lines of one pass
    pub pass_id: Uuid,
    /// Pass kind
    pub kind: PassKind,
    /// Timestamp stamped on the written rows
    pub calculated_at: DateTime<Utc>,
    /// Contracts selected for the pass
    pub contracts_selected: usize,
    /// Contracts with a computed result
    pub computed: usize,
    /// Skipped contracts by reason
    pub skipped: SkipCounts,
    /// Contracts that failed, including those in failed chunks
    pub errors: usize,
    /// Worker chunks launched
    pub chunks: usize,
    /// Worker chunks that failed outright
    pub failed_chunks: usize,
    /// Rows upserted
    pub written: usize,
    /// Computed contracts now in the active zone
    pub active_after: usize,
    /// Computed contracts now in the stable zone
    pub stable_after: usize,
    /// Snapshot load time
    pub load_ms: u64,
    /// Parallel compute time
    pub compute_ms: u64,
    /// Batch write time
    pub write_ms: u64,
    /// Whether the whole pass finished within the latency budget
    pub within_budget: bool,
}

impl PassReport {
    /// Report for a pass that had nothing to do
    pub fn empty(kind: PassKind, calculated_at: DateTime<Utc>) -> Self {
        Self {
            pass_id: Uuid::new_v4(),
            kind,
            calculated_at,
            contracts_selected: 0,
            computed: 0,
            skipped: SkipCounts::default(),
            errors: 0,
            chunks: 0,
            failed_chunks: 0,
            written: 0,
            active_after: 0,
            stable_after: 0,
            load_ms: 0,
            compute_ms: 0,
            write_ms: 0,
            within_budget: true,
        }
    }

    /// End-to-end pass time
    pub fn total_ms(&self) -> u64 {
        self.load_ms + self.compute_ms + self.write_ms
    }
}

/// The statistical anomaly engine
pub struct AnomalyEngine<S: ?Sized> {
    store: Arc<S>,
    config: EngineConfig,
    orchestrator: ParallelOrchestrator,
    writer: BatchWriter,
    health: EngineHealth,
}

impl<S> AnomalyEngine<S>
where
    S: FundingDataStore + ?Sized + 'static,
{
    /// Engine with the standard per-contract analyzer
    pub fn new(store: Arc<S>, config: EngineConfig, health: EngineHealth) -> Self {
        Self::with_analyzer(store, config, health, Arc::new(StandardAnalyzer))
    }

    /// Engine with a custom analyzer
    pub fn with_analyzer(
        store: Arc<S>,
        config: EngineConfig,
        health: EngineHealth,
        analyzer: Arc<dyn ContractAnalyzer>,
    ) -> Self {
        let orchestrator = ParallelOrchestrator::new(config.workers.clone(), analyzer);
        Self {
            store,
            config,
            orchestrator,
            writer: BatchWriter,
            health,
        }
    }

    /// Shared health tracker
    pub fn health(&self) -> &EngineHealth {
        &self.health
    }

    /// Engine configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Underlying store
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Run one pass now
    pub async fn run_pass(&self, kind: PassKind) -> Result<PassReport> {
        self.run_pass_at(kind, Utc::now()).await
    }

    /// Run one pass as of `now`. Failures abort only this pass and are
    /// recorded in health before being returned.
    pub async fn run_pass_at(&self, kind: PassKind, now: DateTime<Utc>) -> Result<PassReport> {
        let pass_id = Uuid::new_v4();
        let span = tracing::info_span!("pass", %pass_id, kind = %kind);

        match self.execute_pass(pass_id, kind, now).instrument(span).await {
            Ok(report) => {
                metrics::record_pass(&report);
                self.health.record_success(&report).await;
                Ok(report)
            }
            Err(e) => {
                warn!(%pass_id, kind = %kind, error = %e, "Pass aborted");
                metrics::record_pass_failure(kind);
                self.health.record_failure(kind, &e.to_string()).await;
                Err(e)
            }
        }
    }

    async fn execute_pass(&self, pass_id: Uuid, kind: PassKind, now: DateTime<Utc>) -> Result<PassReport> {
        let load_started = Instant::now();
        let snapshot = PassSnapshot::load(self.store.as_ref(), self.config.analysis.window_days, now).await?;
        let keys = self.select_contracts(kind, &snapshot).await?;
        let load_ms = load_started.elapsed().as_millis() as u64;

        info!(contracts = keys.len(), "Starting {} pass", kind);

        let contracts_selected = keys.len();
        let outcome = self.orchestrator.run(Arc::new(snapshot), keys).await;
        let compute_ms = outcome.elapsed.as_millis() as u64;

        let write_started = Instant::now();
        let written = self.writer.flush(self.store.as_ref(), &outcome.merged.results).await?;
        let write_ms = write_started.elapsed().as_millis() as u64;

        let active_after = outcome
            .merged
            .results
            .iter()
            .filter(|r| r.update_zone == UpdateZone::Active)
            .count();

        let mut report = PassReport {
            pass_id,
            kind,
            calculated_at: now,
            contracts_selected,
            computed: outcome.merged.results.len(),
            skipped: SkipCounts::from(&outcome.merged.skipped),
            errors: outcome.merged.errors,
            chunks: outcome.chunks,
            failed_chunks: outcome.failed_chunks,
            written,
            active_after,
            stable_after: outcome.merged.results.len() - active_after,
            load_ms,
            compute_ms,
            write_ms,
            within_budget: true,
        };
        report.within_budget = report.total_ms() <= self.config.analysis.latency_budget_ms;

        if !report.within_budget {
            warn!(
                total_ms = report.total_ms(),
                budget_ms = self.config.analysis.latency_budget_ms,
                "Pass exceeded latency budget"
            );
        }

        log_pass!(
            info,
            kind,
            report.contracts_selected,
            report.computed,
            outcome.merged.skipped_total(),
            report.errors,
            written = report.written,
            active = report.active_after,
            total_ms = report.total_ms()
        );

        Ok(report)
    }

    /// Contracts a pass of `kind` should cover.
    ///
    /// Zone passes read membership from the result store; contracts with data
    /// but no stored row yet ride along with the active pass.
    pub async fn select_contracts(&self, kind: PassKind, snapshot: &PassSnapshot) -> Result<Vec<ContractKey>> {
        let Some(zone) = kind.zone() else {
            return Ok(snapshot.all_contracts());
        };

        let membership = self
            .store
            .zone_membership()
            .await
            .map_err(|e| EngineError::QueryFailure(format!("zone membership load failed: {}", e)))?;

        let mut keys: Vec<ContractKey> = membership
            .iter()
            .filter(|(_, member_zone)| **member_zone == zone)
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();

        if zone == UpdateZone::Active {
            let known: HashSet<&ContractKey> = membership.keys().collect();
            keys.extend(
                snapshot
                    .all_contracts()
                    .into_iter()
                    .filter(|key| !known.contains(key)),
            );
        }

        Ok(keys)
    }
}
