//! Pass scheduler
//!
//! `idle -> bootstrap -> waiting`, then two independent timers. Each timer
//! elapsing runs a pass over its zone's current membership and resets that
//! timer. A stop request prevents new passes; a pass already running finishes
//! its write first.

use super::{AnomalyEngine, PassKind, SchedulerState};
use crate::{store::FundingDataStore, EngineError, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{error, info, warn};

/// Host-side handle used to stop a running scheduler
#[derive(Debug, Clone)]
pub struct SchedulerHandle {
    stop_tx: Arc<watch::Sender<bool>>,
}

impl SchedulerHandle {
    /// Ask the scheduler to stop after any in-flight pass
    pub fn stop(&self) {
        let _ = self.stop_tx.send(true);
    }
}

/// Control loop driving bootstrap, active and stable passes
pub struct PassScheduler<S: ?Sized> {
    engine: Arc<AnomalyEngine<S>>,
    active_interval: Duration,
    stable_interval: Duration,
    stop_rx: watch::Receiver<bool>,
}

impl<S> PassScheduler<S>
where
    S: FundingDataStore + ?Sized + 'static,
{
    /// Scheduler using the engine's configured intervals.
    /// Dropping every handle also stops the scheduler.
    pub fn new(engine: Arc<AnomalyEngine<S>>) -> Result<(Self, SchedulerHandle)> {
        let active = engine.config().active_interval();
        let stable = engine.config().stable_interval();
        Self::with_intervals(engine, active, stable)
    }

    /// Scheduler with explicit intervals; both must be non-zero
    pub fn with_intervals(
        engine: Arc<AnomalyEngine<S>>,
        active_interval: Duration,
        stable_interval: Duration,
    ) -> Result<(Self, SchedulerHandle)> {
        if active_interval.is_zero() || stable_interval.is_zero() {
            return Err(EngineError::Config("Pass intervals must be greater than 0".to_string()).into());
        }

        let (stop_tx, stop_rx) = watch::channel(false);
        let scheduler = Self {
            engine,
            active_interval,
            stable_interval,
            stop_rx,
        };
        Ok((
            scheduler,
            SchedulerHandle {
                stop_tx: Arc::new(stop_tx),
            },
        ))
    }

    /// Run until stopped
    pub async fn run(mut self) -> Result<()> {
        let health = self.engine.health().clone();

        if self.stop_requested() {
            health.set_state(SchedulerState::Stopped).await;
            return Ok(());
        }

        info!(
            active_secs = self.active_interval.as_secs_f64(),
            stable_secs = self.stable_interval.as_secs_f64(),
            "Pass scheduler starting"
        );
        self.bootstrap().await;

        let start = Instant::now();
        let mut active = interval_at(start + self.active_interval, self.active_interval);
        active.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut stable = interval_at(start + self.stable_interval, self.stable_interval);
        stable.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                changed = self.stop_rx.changed() => {
                    if changed.is_err() || *self.stop_rx.borrow() {
                        break;
                    }
                }
                _ = active.tick() => {
                    self.on_timer(PassKind::Active).await;
                    active.reset();
                }
                _ = stable.tick() => {
                    self.on_timer(PassKind::Stable).await;
                    stable.reset();
                }
            }
        }

        health.set_state(SchedulerState::Stopped).await;
        info!("Pass scheduler stopped");
        Ok(())
    }

    fn stop_requested(&self) -> bool {
        *self.stop_rx.borrow()
    }

    async fn bootstrap(&self) {
        let health = self.engine.health();
        health.set_state(SchedulerState::Bootstrapping).await;
        match self.engine.run_pass(PassKind::Bootstrap).await {
            Ok(report) => info!(
                computed = report.computed,
                active = report.active_after,
                stable = report.stable_after,
                "Bootstrap pass complete"
            ),
            Err(e) => error!(error = %e, "Bootstrap pass failed; retrying on next timer"),
        }
        health.set_state(SchedulerState::Waiting).await;
    }

    async fn on_timer(&self, kind: PassKind) {
        if self.stop_requested() {
            return;
        }

        // Zone membership is meaningless until a full pass has classified everything
        if !self.engine.health().is_bootstrapped().await {
            self.bootstrap().await;
            return;
        }

        let health = self.engine.health();
        let running = match kind {
            PassKind::Active => SchedulerState::RunningActive,
            _ => SchedulerState::RunningStable,
        };
        health.set_state(running).await;
        if let Err(e) = self.engine.run_pass(kind).await {
            warn!(kind = %kind, error = %e, "Scheduled pass failed; next timer will retry");
        }
        health.set_state(SchedulerState::Waiting).await;
    }
}
