//! Configuration management module

pub mod settings;

pub use settings::*;

use crate::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Main configuration structure for the anomaly engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Statistical analysis configuration
    pub analysis: AnalysisConfig,
    /// Pass scheduling configuration
    pub scheduler: SchedulerConfig,
    /// Worker pool configuration
    pub workers: WorkerConfig,
    /// Storage configuration
    pub storage: StorageConfig,
    /// Monitoring configuration
    pub monitoring: MonitoringConfig,
}

/// Statistical analysis configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Rolling baseline window in days
    pub window_days: u32,
    /// Compute budget for a single pass in milliseconds
    pub latency_budget_ms: u64,
}

/// Scheduling configuration for the two zone timers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Seconds between active-zone passes
    pub active_interval_secs: u64,
    /// Seconds between stable-zone passes
    pub stable_interval_secs: u64,
}

/// Worker pool sizing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Lower bound on parallel chunks
    pub min_workers: usize,
    /// Upper bound on parallel chunks
    pub max_workers: usize,
    /// Target contracts handled by one worker before another is added
    pub contracts_per_worker: usize,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// SQLite database path; `${VAR}` references are expanded on load
    pub database_path: String,
}

/// Monitoring configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringConfig {
    /// Install the Prometheus exporter in the host process
    pub enable_metrics: bool,
    /// Listen address for the exporter
    pub metrics_listen_addr: String,
}

impl EngineConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)
            .map_err(|e| EngineError::Config(format!("Failed to read config file: {}", e)))?;

        let mut config: EngineConfig = toml::from_str(&content)
            .map_err(|e| EngineError::Config(format!("Failed to parse config: {}", e)))?;

        config.expand_env_vars()?;

        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.analysis.window_days == 0 {
            return Err(EngineError::Config("Window must be at least one day".to_string()).into());
        }

        if self.analysis.latency_budget_ms == 0 {
            return Err(EngineError::Config("Latency budget must be greater than 0".to_string()).into());
        }

        if self.scheduler.active_interval_secs == 0 || self.scheduler.stable_interval_secs == 0 {
            return Err(EngineError::Config("Pass intervals must be greater than 0".to_string()).into());
        }

        if self.scheduler.active_interval_secs > self.scheduler.stable_interval_secs {
            return Err(EngineError::Config(
                "Active interval must not exceed stable interval".to_string(),
            )
            .into());
        }

        if self.workers.min_workers == 0 {
            return Err(EngineError::Config("At least one worker is required".to_string()).into());
        }

        if self.workers.min_workers > self.workers.max_workers {
            return Err(EngineError::Config(
                "min_workers must not exceed max_workers".to_string(),
            )
            .into());
        }

        if self.workers.contracts_per_worker == 0 {
            return Err(EngineError::Config(
                "contracts_per_worker must be greater than 0".to_string(),
            )
            .into());
        }

        ConfigValidator::validate_path(&self.storage.database_path, "database_path")?;

        if self.monitoring.enable_metrics {
            ConfigValidator::validate_socket_addr(&self.monitoring.metrics_listen_addr, "metrics_listen_addr")?;
        }

        Ok(())
    }

    /// Active-zone timer period
    pub fn active_interval(&self) -> Duration {
        Duration::from_secs(self.scheduler.active_interval_secs)
    }

    /// Stable-zone timer period
    pub fn stable_interval(&self) -> Duration {
        Duration::from_secs(self.scheduler.stable_interval_secs)
    }

    /// Expand environment variables in string fields
    fn expand_env_vars(&mut self) -> Result<()> {
        self.storage.database_path = EnvExpander::expand(&self.storage.database_path)?;
        self.monitoring.metrics_listen_addr = EnvExpander::expand(&self.monitoring.metrics_listen_addr)?;
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            analysis: AnalysisConfig {
                window_days: ConfigDefaults::WINDOW_DAYS,
                latency_budget_ms: ConfigDefaults::LATENCY_BUDGET_MS,
            },
            scheduler: SchedulerConfig {
                active_interval_secs: ConfigDefaults::ACTIVE_INTERVAL_SECS,
                stable_interval_secs: ConfigDefaults::STABLE_INTERVAL_SECS,
            },
            workers: WorkerConfig {
                min_workers: ConfigDefaults::MIN_WORKERS,
                max_workers: ConfigDefaults::MAX_WORKERS,
                contracts_per_worker: ConfigDefaults::CONTRACTS_PER_WORKER,
            },
            storage: StorageConfig {
                database_path: "data/funding.db".to_string(),
            },
            monitoring: MonitoringConfig {
                enable_metrics: false,
                metrics_listen_addr: "127.0.0.1:9100".to_string(),
            },
        }
    }
}
