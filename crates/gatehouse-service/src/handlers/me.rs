//! Current user handlers.
//!
//! Both endpoints sit behind `require_access` with no requirement, so a
//! `Principal` is always present. `SessionData` is present only when the
//! caller authenticated with the session cookie.

use crate::auth::{ClaimMap, Principal, PrincipalSource};
use crate::response::ApiResponse;
use crate::routes::AppState;
use crate::session::SessionData;
use axum::{extract::State, Extension};
use serde::Serialize;
use std::sync::Arc;
use tracing::instrument;

/// Token metadata; never the token itself.
#[derive(Debug, Clone, Serialize)]
pub struct TokenInfo {
    pub token_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<i64>,
    pub has_refresh_token: bool,
}

impl TokenInfo {
    fn new(expires_at: Option<i64>, has_refresh_token: bool) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            token_type: "Bearer",
            expires_at,
            expires_in: expires_at.map(|at| at.saturating_sub(now).max(0)),
            has_refresh_token,
        }
    }
}

/// Response for `/me`.
#[derive(Debug, Clone, Serialize)]
pub struct MeResponse {
    pub sub: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preferred_username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub display_name: String,
    pub roles: Vec<String>,
    pub groups: Vec<String>,
    pub source: PrincipalSource,
    pub token_info: TokenInfo,
}

impl MeResponse {
    fn build(principal: &Principal, session: Option<&SessionData>) -> Self {
        let token_info = match session {
            Some(session) => TokenInfo::new(
                session.access_token_expires_at,
                session.refresh_token.is_some(),
            ),
            None => TokenInfo::new(principal.raw_claims().exp, false),
        };
        let claims = principal.raw_claims();

        Self {
            sub: principal.subject_id().to_string(),
            email: principal.email().map(str::to_string),
            preferred_username: claims.preferred_username.clone(),
            name: claims.name.clone(),
            display_name: principal.display_name().to_string(),
            roles: principal.roles().iter().cloned().collect(),
            groups: principal.groups().iter().cloned().collect(),
            source: principal.source(),
            token_info,
        }
    }
}

/// Handler for GET /me
///
/// Works for session and bearer callers alike. The envelope advertises
/// `USER_INFO_CACHE_TTL`.
#[instrument(skip_all, name = "gatehouse.handlers.me")]
pub async fn get_me(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    session: Option<Extension<SessionData>>,
) -> ApiResponse<MeResponse> {
    let session = session.map(|Extension(s)| s);
    ApiResponse::new(
        MeResponse::build(&principal, session.as_ref()),
        "User information retrieved successfully",
    )
    .with_ttl(state.config.user_info_cache_ttl)
}

#[derive(Debug, Clone, Serialize)]
pub struct TokenUser {
    pub sub: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preferred_username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub roles: Vec<String>,
}

/// Response for `/token`.
///
/// Session callers get the tokens stored at login. Bearer callers already
/// hold their token and get its verified claims instead.
#[derive(Debug, Clone, Serialize)]
pub struct TokenDataResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    pub token_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub claims: Option<ClaimMap>,
    pub user: TokenUser,
}

impl TokenDataResponse {
    fn build(principal: &Principal, session: Option<SessionData>) -> Self {
        let user = TokenUser {
            sub: principal.subject_id().to_string(),
            preferred_username: principal.raw_claims().preferred_username.clone(),
            email: principal.email().map(str::to_string),
            roles: principal.roles().iter().cloned().collect(),
        };

        match session {
            Some(session) => {
                let info = TokenInfo::new(session.access_token_expires_at, false);
                Self {
                    access_token: session.access_token,
                    refresh_token: session.refresh_token,
                    token_type: info.token_type,
                    expires_in: info.expires_in,
                    claims: None,
                    user,
                }
            }
            None => {
                let info = TokenInfo::new(principal.raw_claims().exp, false);
                Self {
                    access_token: None,
                    refresh_token: None,
                    token_type: info.token_type,
                    expires_in: info.expires_in,
                    claims: Some(principal.raw_claims().clone()),
                    user,
                }
            }
        }
    }
}

/// Handler for GET /token
#[instrument(skip_all, name = "gatehouse.handlers.token")]
pub async fn get_token(
    Extension(principal): Extension<Principal>,
    session: Option<Extension<SessionData>>,
) -> ApiResponse<TokenDataResponse> {
    let session = session.map(|Extension(s)| s);
    ApiResponse::new(
        TokenDataResponse::build(&principal, session),
        "Token information retrieved successfully",
    )
}
