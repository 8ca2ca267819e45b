//! Engine health tracker
//!
//! Constructed once by the host and shared by reference with the engine and
//! the scheduler; there is no process-global tracker.

use super::{PassKind, PassReport};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Scheduler lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerState {
    /// Not started
    Idle,
    /// Running the initial full pass
    Bootstrapping,
    /// Waiting for the next timer
    Waiting,
    /// Running an active-zone pass
    RunningActive,
    /// Running a stable-zone pass
    RunningStable,
    /// Stopped by the host
    Stopped,
}

/// Point-in-time copy of the tracked health
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthSnapshot {
    /// Scheduler state
    pub state: SchedulerState,
    /// Whether a bootstrap pass has succeeded
    pub bootstrapped: bool,
    /// Successful passes
    pub passes_succeeded: u64,
    /// Failed passes
    pub passes_failed: u64,
    /// Failures since the last success
    pub consecutive_failures: u32,
    /// Most recent successful report per pass kind
    pub last_reports: HashMap<PassKind, PassReport>,
    /// Most recent failure message
    pub last_error: Option<String>,
    /// When the last failure happened
    pub last_error_at: Option<DateTime<Utc>>,
}

impl Default for HealthSnapshot {
    fn default() -> Self {
        Self {
            state: SchedulerState::Idle,
            bootstrapped: false,
            passes_succeeded: 0,
            passes_failed: 0,
            consecutive_failures: 0,
            last_reports: HashMap::new(),
            last_error: None,
            last_error_at: None,
        }
    }
}

/// Shared health state
#[derive(Debug, Clone, Default)]
pub struct EngineHealth {
    inner: Arc<RwLock<HealthSnapshot>>,
}

impl EngineHealth {
    /// Fresh tracker in the idle state
    pub fn new() -> Self {
        Self::default()
    }

    /// Update the scheduler state
    pub async fn set_state(&self, state: SchedulerState) {
        self.inner.write().await.state = state;
    }

    /// Record a successful pass
    pub async fn record_success(&self, report: &PassReport) {
        let mut health = self.inner.write().await;
        health.passes_succeeded += 1;
        health.consecutive_failures = 0;
        if report.kind == PassKind::Bootstrap {
            health.bootstrapped = true;
        }
        health.last_reports.insert(report.kind, report.clone());
    }

    /// Record a failed pass
    pub async fn record_failure(&self, kind: PassKind, error: &str) {
        let mut health = self.inner.write().await;
        health.passes_failed += 1;
        health.consecutive_failures += 1;
        health.last_error = Some(format!("{} pass: {}", kind, error));
        health.last_error_at = Some(Utc::now());
    }

    /// Copy of the current health
    pub async fn snapshot(&self) -> HealthSnapshot {
        self.inner.read().await.clone()
    }

    /// Whether the initial full pass has completed
    pub async fn is_bootstrapped(&self) -> bool {
        self.inner.read().await.bootstrapped
    }
}
