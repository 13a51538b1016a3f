//! Observability configuration shared by Gatehouse binaries.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Default `EnvFilter` directive when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "gatehouse_service=debug,tower_http=debug";

/// Output format of the fmt layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable, multi-field lines.
    Pretty,
    /// One JSON object per event, for log shippers.
    Json,
}

/// Observability configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// `EnvFilter` directive (trace, debug, info, warn, error, or per-target).
    pub log_filter: String,
    /// Output format for log lines.
    pub log_format: LogFormat,
}

impl ObservabilityConfig {
    /// Read `RUST_LOG` and `LOG_FORMAT` from a variable map.
    ///
    /// Unknown `LOG_FORMAT` values fall back to pretty output; logging
    /// configuration is never a reason to refuse startup.
    #[must_use]
    pub fn from_vars(vars: &HashMap<String, String>) -> Self {
        let log_filter = vars
            .get("RUST_LOG")
            .cloned()
            .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());

        let log_format = match vars.get("LOG_FORMAT").map(|s| s.to_ascii_lowercase()) {
            Some(ref f) if f == "json" => LogFormat::Json,
            _ => LogFormat::Pretty,
        };

        Self {
            log_filter,
            log_format,
        }
    }
}
