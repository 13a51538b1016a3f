//! Liveness probe and landing endpoint.

use crate::auth::Principal;
use crate::response::ApiResponse;
use crate::routes::AppState;
use axum::extract::State;
use axum::http::HeaderMap;
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Liveness probe handler.
///
/// Does not touch the identity provider; failure means the process is hung.
pub async fn health_check() -> ApiResponse<HealthResponse> {
    ApiResponse::new(HealthResponse { status: "ok" }, "Service is running")
}

/// Landing payload: who is signed in and where they can go.
#[derive(Debug, Clone, Serialize)]
pub struct HomeResponse {
    pub authenticated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    pub roles: Vec<String>,
    pub links: Vec<&'static str>,
}

impl HomeResponse {
    fn for_principal(principal: Option<&Principal>) -> Self {
        let Some(principal) = principal else {
            return Self {
                authenticated: false,
                username: None,
                roles: Vec::new(),
                links: vec!["/login"],
            };
        };

        let mut links = vec!["/me", "/token"];
        if principal.has_role("manager") {
            links.push("/manager");
        }
        if principal.has_role("ceo") {
            links.push("/ceo");
        }
        links.push("/logout");

        Self {
            authenticated: true,
            username: Some(principal.display_name().to_string()),
            roles: principal.roles().iter().cloned().collect(),
            links,
        }
    }
}

/// Handler for GET /
///
/// Session-only; bearer callers should use `/me`.
pub async fn home(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> ApiResponse<HomeResponse> {
    let principal = state
        .sessions
        .read_cookie(&headers)
        .and_then(|session| Principal::from_session(session.user.as_ref()));

    let message = if principal.is_some() {
        "Signed in"
    } else {
        "Not signed in"
    };
    ApiResponse::new(HomeResponse::for_principal(principal.as_ref()), message)
}
