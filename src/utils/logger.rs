//! Logging utilities

use crate::{EngineError, Result};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Initialize logging: console plus a daily-rolling file.
///
/// `RUST_LOG` overrides `log_level`. With `json` set, both sinks emit JSON
/// lines. Keep the returned guard alive for the life of the process or
/// buffered file output is lost.
pub fn init<P: AsRef<Path>>(log_level: &str, log_file: P, json: bool) -> Result<WorkerGuard> {
    let log_file = log_file.as_ref();
    let directory = match log_file.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(directory)?;

    let prefix = log_file
        .file_name()
        .unwrap_or_else(|| std::ffi::OsStr::new("anomaly-engine.log"));
    let (file_writer, guard) =
        tracing_appender::non_blocking(RollingFileAppender::new(Rotation::DAILY, directory, prefix));

    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(log_level)
            .map_err(|e| EngineError::Config(format!("Invalid log level '{}': {}", log_level, e)))?,
    };

    let console_pretty = (!json).then(|| fmt::layer().with_target(true).with_thread_names(true));
    let console_json = json.then(|| fmt::layer().json().with_current_span(true));
    let file_pretty = (!json).then(|| {
        fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .with_ansi(false)
            .with_writer(file_writer.clone())
    });
    let file_json = json.then(|| fmt::layer().json().with_ansi(false).with_writer(file_writer));

    Registry::default()
        .with(env_filter)
        .with(console_pretty)
        .with(console_json)
        .with(file_pretty)
        .with(file_json)
        .try_init()
        .map_err(|e| EngineError::Config(format!("Logging already initialised: {}", e)))?;

    Ok(guard)
}

/// Log a pass summary with structured fields
#[macro_export]
macro_rules! log_pass {
    ($level:ident, $kind:expr, $selected:expr, $computed:expr, $skipped:expr, $errors:expr, $($field:tt)*) => {
        tracing::$level!(
            kind = %$kind,
            selected = %$selected,
            computed = %$computed,
            skipped = %$skipped,
            errors = %$errors,
            $($field)*
        );
    };
}

/// Log a per-contract score with structured fields
#[macro_export]
macro_rules! log_contract {
    ($level:ident, $contract:expr, $z_score:expr, $zone:expr, $($field:tt)*) => {
        tracing::$level!(
            contract = %$contract,
            z_score = %$z_score,
            zone = %$zone,
            $($field)*
        );
    };
}
