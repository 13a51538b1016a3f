//! Metrics definitions for the gateway.
//!
//! All metrics follow Prometheus naming conventions:
//! - `gatehouse_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded:
//! - `method`: HTTP methods
//! - `endpoint`: known routes, everything else is `/other`
//! - `status`: success, error, timeout
//! - `outcome`: success or a `VerificationError` kind (9 values)
//! - `reason`: deny reasons (2 values)
//! - `cache`: keyset, credential

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Install the Prometheus recorder and return the handle for `/metrics`.
///
/// Must be called before any metrics are recorded.
///
/// # Errors
///
/// Returns error if the recorder fails to install (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Prefix("gatehouse_http_request".to_string()),
            &[
                0.005, 0.010, 0.025, 0.050, 0.100, 0.150, 0.200, 0.300, 0.500, 1.000, 2.000,
            ],
        )
        .map_err(|e| format!("Failed to set HTTP request buckets: {e}"))?
        // IdP round trips dominate these; timeouts default to 10s
        .set_buckets_for_metric(
            Matcher::Prefix("gatehouse_keyset_fetch".to_string()),
            &[0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000, 2.500, 5.000, 10.000],
        )
        .map_err(|e| format!("Failed to set key set fetch buckets: {e}"))?
        .set_buckets_for_metric(
            Matcher::Prefix("gatehouse_credential_fetch".to_string()),
            &[0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000, 2.500, 5.000, 10.000],
        )
        .map_err(|e| format!("Failed to set credential fetch buckets: {e}"))?
        .set_buckets_for_metric(
            Matcher::Prefix("gatehouse_directory_call".to_string()),
            &[0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000, 2.500, 5.000],
        )
        .map_err(|e| format!("Failed to set directory call buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {e}"))
}

// ============================================================================
// HTTP Request Metrics
// ============================================================================

/// Record HTTP request completion
///
/// Metric: `gatehouse_http_requests_total`, `gatehouse_http_request_duration_seconds`
/// Labels: `method`, `endpoint`, `status` / `status_code`
pub fn record_http_request(method: &str, endpoint: &str, status_code: u16, duration: Duration) {
    let normalized_endpoint = normalize_endpoint(endpoint);
    let status = categorize_status_code(status_code);

    histogram!("gatehouse_http_request_duration_seconds",
        "method" => method.to_string(),
        "endpoint" => normalized_endpoint,
        "status" => status
    )
    .record(duration.as_secs_f64());

    counter!("gatehouse_http_requests_total",
        "method" => method.to_string(),
        "endpoint" => normalized_endpoint,
        "status_code" => status_code.to_string()
    )
    .increment(1);
}

fn categorize_status_code(status_code: u16) -> &'static str {
    match status_code {
        200..=399 => "success",
        408 | 504 => "timeout",
        _ => "error",
    }
}

/// Collapse paths to the fixed route set.
fn normalize_endpoint(path: &str) -> &'static str {
    match path {
        "/" => "/",
        "/health" => "/health",
        "/metrics" => "/metrics",
        "/login" => "/login",
        "/callback" => "/callback",
        "/logout" => "/logout",
        "/me" => "/me",
        "/token" => "/token",
        "/refresh" => "/refresh",
        "/manager" => "/manager",
        "/ceo" => "/ceo",
        "/api/data" => "/api/data",
        "/api/data/scoped" => "/api/data/scoped",
        "/cache/info" => "/cache/info",
        "/cache/clear" => "/cache/clear",
        _ => "/other",
    }
}

// ============================================================================
// Authentication Metrics
// ============================================================================

/// Record a token verification outcome
///
/// Metric: `gatehouse_token_verifications_total`
/// Labels: `outcome` (success or the failure kind)
pub fn record_token_verification(outcome: &'static str) {
    counter!("gatehouse_token_verifications_total", "outcome" => outcome).increment(1);
}

/// Record an access decision
///
/// Metric: `gatehouse_access_decisions_total`
/// Labels: `decision` (allow, deny), `reason`
pub fn record_access_decision(decision: &'static str, reason: &'static str) {
    counter!("gatehouse_access_decisions_total",
        "decision" => decision,
        "reason" => reason
    )
    .increment(1);
}

// ============================================================================
// IdP Metrics
// ============================================================================

/// Record a key-set fetch from the certs endpoint
///
/// Metric: `gatehouse_keyset_fetch_duration_seconds`, `gatehouse_keyset_fetch_total`
/// Labels: `status`
pub fn record_keyset_fetch(status: &'static str, duration: Duration) {
    histogram!("gatehouse_keyset_fetch_duration_seconds", "status" => status)
        .record(duration.as_secs_f64());
    counter!("gatehouse_keyset_fetch_total", "status" => status).increment(1);
}

/// Record an admin credential grant
///
/// Metric: `gatehouse_credential_fetch_duration_seconds`, `gatehouse_credential_fetch_total`
/// Labels: `status`
pub fn record_credential_fetch(status: &'static str, duration: Duration) {
    histogram!("gatehouse_credential_fetch_duration_seconds", "status" => status)
        .record(duration.as_secs_f64());
    counter!("gatehouse_credential_fetch_total", "status" => status).increment(1);
}

/// Record an admin API call
///
/// Metric: `gatehouse_directory_call_duration_seconds`, `gatehouse_directory_calls_total`
/// Labels: `status`
pub fn record_directory_call(status: &'static str, duration: Duration) {
    histogram!("gatehouse_directory_call_duration_seconds", "status" => status)
        .record(duration.as_secs_f64());
    counter!("gatehouse_directory_calls_total", "status" => status).increment(1);
}

/// Record a cache invalidation
///
/// Metric: `gatehouse_cache_invalidations_total`
/// Labels: `cache` (keyset, credential)
pub fn record_cache_invalidation(cache: &'static str) {
    counter!("gatehouse_cache_invalidations_total", "cache" => cache).increment(1);
}
