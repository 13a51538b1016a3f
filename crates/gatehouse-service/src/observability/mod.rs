//! Observability for the gateway: Prometheus metrics.
//!
//! Tracing setup lives in `main.rs`; audit records in [`crate::audit`].

pub mod metrics;
