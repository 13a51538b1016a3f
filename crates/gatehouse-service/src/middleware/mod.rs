//! HTTP middleware.
//!
//! - `auth` - session/bearer authentication and route requirements
//! - `http_metrics` - request metrics for every response

pub mod auth;
pub mod http_metrics;

pub use auth::{require_access, AuthState, ClientIp};
pub use http_metrics::http_metrics_middleware;
