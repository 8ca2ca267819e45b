//! Funding Anomaly Engine
//!
//! Aggregates funding-rate observations from multiple derivatives exchanges and
//! computes per-contract anomaly signals (Z-scores, percentile ranks, confidence)
//! used to surface rate-arbitrage opportunities.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod analytics;
pub mod config;
pub mod engine;
pub mod model;
pub mod store;
pub mod utils;

// Re-export commonly used types
pub use config::EngineConfig;
pub use engine::{AnomalyEngine, EngineHealth, PassKind, PassReport, PassScheduler};
pub use model::{AnomalyResult, ConfidenceLevel, ContractKey, UpdateZone};
pub use store::{FundingDataStore, SqliteStore};

/// Result type used throughout the application
pub type Result<T> = anyhow::Result<T>;

/// Common error types for the anomaly engine
#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Store query failed while loading a snapshot
    #[error("Query failure: {0}")]
    QueryFailure(String),

    /// Batch write failed and was rolled back
    #[error("Write failure: {0}")]
    WriteFailure(String),

    /// A worker chunk failed
    #[error("Worker failure: {0}")]
    WorkerFailure(String),

    /// Scheduler error
    #[error("Scheduler error: {0}")]
    Scheduler(String),
}

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
