//! Role- and scope-protected endpoints.
//!
//! Access is decided by the route group's `require_access` layer before any
//! of these run. The CEO dashboard reads the group hierarchy from the
//! directory for display; it plays no part in the access decision.

use crate::auth::Principal;
use crate::errors::GatewayError;
use crate::idp::GroupNode;
use crate::response::ApiResponse;
use crate::routes::AppState;
use axum::{extract::State, Extension};
use serde::Serialize;
use std::sync::Arc;
use tracing::instrument;

#[derive(Debug, Clone, Serialize)]
pub struct ManagerDashboard {
    pub dashboard: &'static str,
    pub user: String,
    pub roles: Vec<String>,
}

/// Handler for GET /manager (role `manager`)
#[instrument(skip_all, name = "gatehouse.handlers.manager")]
pub async fn manager_dashboard(
    Extension(principal): Extension<Principal>,
) -> ApiResponse<ManagerDashboard> {
    ApiResponse::new(
        ManagerDashboard {
            dashboard: "manager",
            user: principal.display_name().to_string(),
            roles: principal.roles().iter().cloned().collect(),
        },
        "Manager dashboard",
    )
}

#[derive(Debug, Clone, Serialize)]
pub struct CeoInfo {
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CeoDashboard {
    pub ceo: CeoInfo,
    pub teams: Vec<GroupNode>,
    pub total_teams: usize,
    pub total_employees: usize,
}

impl CeoDashboard {
    fn new(principal: &Principal, teams: Vec<GroupNode>) -> Self {
        let total_employees = teams.iter().map(GroupNode::total_members).sum();
        Self {
            ceo: CeoInfo {
                username: principal.display_name().to_string(),
                email: principal.email().map(str::to_string),
                name: principal.raw_claims().name.clone(),
            },
            total_teams: teams.len(),
            total_employees,
            teams,
        }
    }
}

/// Handler for GET /ceo (role `ceo`)
///
/// # Response
///
/// - 200 with teams, members and totals
/// - 500 when the admin service account is not configured
/// - 502/503 when the admin API or token endpoint fails
#[instrument(skip_all, name = "gatehouse.handlers.ceo")]
pub async fn ceo_dashboard(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
) -> Result<ApiResponse<CeoDashboard>, GatewayError> {
    let teams = state.directory.group_hierarchy().await?;

    tracing::debug!(target: "gatehouse.handlers.ceo", teams = teams.len(), "Loaded group hierarchy");

    Ok(
        ApiResponse::new(CeoDashboard::new(&principal, teams), "Teams retrieved successfully")
            .with_ttl(state.config.jwks_cache_ttl),
    )
}

#[derive(Debug, Clone, Serialize)]
pub struct ApiData {
    pub data: &'static str,
    pub user: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<&'static str>,
}

/// Handler for GET /api/data (role `manager`)
pub async fn api_data(Extension(principal): Extension<Principal>) -> ApiResponse<ApiData> {
    ApiResponse::new(
        ApiData {
            data: "sensitive-data",
            user: principal.display_name().to_string(),
            scope: None,
        },
        "Data retrieved successfully",
    )
}

/// Handler for GET /api/data/scoped (scope `read:data`)
pub async fn api_data_scoped(Extension(principal): Extension<Principal>) -> ApiResponse<ApiData> {
    ApiResponse::new(
        ApiData {
            data: "scoped-data",
            user: principal.display_name().to_string(),
            scope: Some("read:data"),
        },
        "Data retrieved successfully",
    )
}
