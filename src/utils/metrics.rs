//! Pass metrics recorded through the `metrics` facade

use crate::{engine::PassKind, engine::PassReport, EngineError, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

/// Record counters and timings for a completed pass
pub fn record_pass(report: &PassReport) {
    let kind = report.kind.as_str();
    let skipped = report.skipped.no_history + report.skipped.insufficient_samples + report.skipped.unusable_series;

    ::metrics::counter!("anomaly_pass_total", 1, "kind" => kind);
    ::metrics::counter!("anomaly_contracts_computed", report.computed as u64, "kind" => kind);
    ::metrics::counter!("anomaly_contracts_skipped", skipped as u64, "kind" => kind);
    ::metrics::counter!("anomaly_contracts_errors", report.errors as u64, "kind" => kind);
    ::metrics::histogram!("anomaly_pass_duration_ms", report.total_ms() as f64, "kind" => kind);
    ::metrics::gauge!("anomaly_active_contracts_last_pass", report.active_after as f64, "kind" => kind);

    if !report.within_budget {
        ::metrics::counter!("anomaly_latency_budget_overruns_total", 1, "kind" => kind);
    }
}

/// Record an aborted pass
pub fn record_pass_failure(kind: PassKind) {
    ::metrics::counter!("anomaly_pass_failures_total", 1, "kind" => kind.as_str());
}

/// Install the Prometheus exporter listening on `addr`
pub fn install_prometheus(addr: &str) -> Result<()> {
    let addr: SocketAddr = addr
        .parse()
        .map_err(|e| EngineError::Config(format!("Invalid metrics address '{}': {}", addr, e)))?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| EngineError::Config(format!("Failed to install metrics exporter: {}", e)))?;

    Ok(())
}
