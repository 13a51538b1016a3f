//! Gatehouse Service Library
//!
//! An authentication gateway in front of a Keycloak (OIDC) realm. Every
//! protected request is resolved to a `Principal` from either a signed
//! session cookie or a verified bearer token, then checked against the
//! route's role or scope requirement.
//!
//! # Architecture
//!
//! ```text
//! routes/mod.rs -> middleware/auth.rs -> auth::Gatekeeper -> handlers/*.rs
//!                                          |- ClaimsVerifier -> KeySetCache
//!                                          |- AdminCredentialCache -> idp::TokenClient
//! ```
//!
//! # Modules
//!
//! - `audit` - Structured security audit events
//! - `auth` - Verification, identity, policy and the gatekeeper
//! - `config` - Service configuration from environment
//! - `errors` - Error types with HTTP status code mapping
//! - `handlers` - HTTP request handlers
//! - `idp` - Token endpoint, admin credential and directory clients
//! - `middleware` - Auth and HTTP metrics middleware
//! - `observability` - Prometheus metrics
//! - `response` - Success envelope
//! - `routes` - Axum router setup
//! - `session` - Signed session cookies

pub mod audit;
pub mod auth;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod idp;
pub mod middleware;
pub mod observability;
pub mod response;
pub mod routes;
pub mod session;
