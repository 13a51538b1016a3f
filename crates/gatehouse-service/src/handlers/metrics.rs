//! Prometheus metrics endpoint handler.
//!
//! Unauthenticated so Prometheus can scrape it. Labels are bounded and carry
//! no user identifiers.

use axum::{extract::State, response::IntoResponse};
use metrics_exporter_prometheus::PrometheusHandle;

/// Handler for GET /metrics
///
/// ```text
/// # TYPE gatehouse_http_requests_total counter
/// gatehouse_http_requests_total{method="GET",endpoint="/me",status_code="200"} 42
/// ```
#[tracing::instrument(skip_all, name = "gatehouse.metrics.scrape")]
pub async fn metrics_handler(State(handle): State<PrometheusHandle>) -> impl IntoResponse {
    handle.render()
}
