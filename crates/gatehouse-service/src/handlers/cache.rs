//! Cache administration (role `admin`).

use crate::audit::{AuditEvent, AuditRecord};
use crate::auth::{CacheStatusReport, Principal};
use crate::middleware::ClientIp;
use crate::response::ApiResponse;
use crate::routes::AppState;
use axum::{extract::State, Extension};
use serde::Serialize;
use std::sync::Arc;
use tracing::instrument;

#[derive(Debug, Clone, Serialize)]
pub struct CacheTtlConfig {
    pub jwks_ttl: u64,
    pub admin_token_ttl: u64,
    pub user_info_ttl: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheInfoResponse {
    #[serde(flatten)]
    pub caches: CacheStatusReport,
    pub ttl_config: CacheTtlConfig,
}

/// Handler for GET /cache/info
#[instrument(skip_all, name = "gatehouse.handlers.cache_info")]
pub async fn cache_info(State(state): State<Arc<AppState>>) -> ApiResponse<CacheInfoResponse> {
    let caches = state.gatekeeper.cache_status().await;
    let config = &state.config;

    ApiResponse::new(
        CacheInfoResponse {
            caches,
            ttl_config: CacheTtlConfig {
                jwks_ttl: config.jwks_cache_ttl.as_secs(),
                admin_token_ttl: config.admin_token_cache_ttl.as_secs(),
                user_info_ttl: config.user_info_cache_ttl.as_secs(),
            },
        },
        "Cache information retrieved successfully",
    )
    .with_ttl(config.jwks_cache_ttl)
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheClearResponse {
    pub cleared: [&'static str; 2],
}

/// Handler for POST /cache/clear
///
/// The next verification refetches the key set and the next admin API call
/// requests a new credential.
#[instrument(skip_all, name = "gatehouse.handlers.cache_clear")]
pub async fn cache_clear(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    ip: ClientIp,
) -> ApiResponse<CacheClearResponse> {
    state.gatekeeper.invalidate_all_caches().await;

    AuditRecord::new(AuditEvent::CacheCleared)
        .user(principal.subject_id(), principal.display_name())
        .ip_address(ip.0)
        .path("/cache/clear")
        .status_code(200)
        .emit();

    ApiResponse::new(
        CacheClearResponse {
            cleared: ["keyset", "credential"],
        },
        "Caches cleared successfully",
    )
}
