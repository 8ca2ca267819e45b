//! Settings management utilities

use crate::{EngineError, Result};
use std::env;
use std::net::SocketAddr;

/// Environment variable expansion utility
pub struct EnvExpander;

impl EnvExpander {
    /// Expand environment variables in a string
    /// Supports the ${VAR_NAME} pattern
    pub fn expand(input: &str) -> Result<String> {
        let mut result = input.to_string();
        // Substituted values are never rescanned
        let mut cursor = 0;

        while let Some(offset) = result[cursor..].find("${") {
            let start = cursor + offset;
            if let Some(end) = result[start..].find('}') {
                let var_name = &result[start + 2..start + end];
                let var_value = env::var(var_name).map_err(|_| {
                    EngineError::Config(format!("Environment variable '{}' not found", var_name))
                })?;

                result.replace_range(start..start + end + 1, &var_value);
                cursor = start + var_value.len();
            } else {
                return Err(EngineError::Config(
                    "Unclosed environment variable reference".to_string(),
                )
                .into());
            }
        }

        Ok(result)
    }
}

/// Configuration validation utilities
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate a filesystem path setting
    pub fn validate_path(path: &str, name: &str) -> Result<()> {
        if path.trim().is_empty() {
            return Err(EngineError::Config(format!("{} cannot be empty", name)).into());
        }
        Ok(())
    }

    /// Validate a `host:port` listen address
    pub fn validate_socket_addr(addr: &str, name: &str) -> Result<()> {
        addr.parse::<SocketAddr>()
            .map_err(|_| EngineError::Config(format!("{} must be a host:port address", name)))?;
        Ok(())
    }
}

/// Configuration defaults
pub struct ConfigDefaults;

impl ConfigDefaults {
    /// Default rolling window in days
    pub const WINDOW_DAYS: u32 = 30;

    /// Default compute budget per pass in milliseconds
    pub const LATENCY_BUDGET_MS: u64 = 1000;

    /// Default active-zone pass interval in seconds
    pub const ACTIVE_INTERVAL_SECS: u64 = 60;

    /// Default stable-zone pass interval in seconds
    pub const STABLE_INTERVAL_SECS: u64 = 900;

    /// Default minimum worker count
    pub const MIN_WORKERS: usize = 4;

    /// Default maximum worker count
    pub const MAX_WORKERS: usize = 8;

    /// Default contracts per worker
    pub const CONTRACTS_PER_WORKER: usize = 200;
}
