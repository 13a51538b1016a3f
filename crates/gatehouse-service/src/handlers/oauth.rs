//! Authorization-code login, logout and token refresh.
//!
//! The gateway is a confidential client: the client secret stays here and
//! browsers only ever see the session cookie or, for `/refresh`, the
//! tokens they already hold.

use crate::audit::{AuditEvent, AuditRecord};
use crate::auth::{ClaimMap, Principal};
use crate::errors::GatewayError;
use crate::idp::{ClientCredentials, TokenResponse};
use crate::middleware::ClientIp;
use crate::response::ApiResponse;
use crate::routes::AppState;
use crate::session::{constant_time_eq, new_oauth_state, SessionData, SessionUser};
use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::{header, HeaderMap, HeaderValue},
    response::{IntoResponse, Redirect, Response},
    Json,
};
use common::secret::{ExposeSecret, SecretString};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::instrument;

const LOGIN_SCOPE: &str = "openid email profile";

fn login_client(state: &AppState) -> Result<ClientCredentials, GatewayError> {
    state
        .login_client()
        .ok_or_else(|| GatewayError::Configuration("KEYCLOAK_CLIENT_ID is not set".to_string()))
}

fn redirect_with_cookie(location: &str, cookie: HeaderValue) -> Response {
    ([(header::SET_COOKIE, cookie)], Redirect::to(location)).into_response()
}

/// Handler for GET /login
///
/// Stores a fresh CSRF `state` in the session cookie and redirects to the
/// IdP authorization endpoint.
#[instrument(skip_all, name = "gatehouse.handlers.login")]
pub async fn login(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response, GatewayError> {
    let client = login_client(&state)?;

    let oauth_state = new_oauth_state().map_err(|e| {
        tracing::error!(target: "gatehouse.handlers.login", error = %e, "Cannot generate OAuth state");
        GatewayError::Internal
    })?;

    let redirect_uri = state.config.redirect_uri();
    let authorize_url = Url::parse_with_params(
        &state.config.authorization_url(),
        &[
            ("client_id", client.client_id.as_str()),
            ("redirect_uri", redirect_uri.as_str()),
            ("response_type", "code"),
            ("scope", LOGIN_SCOPE),
            ("state", oauth_state.as_str()),
        ],
    )
    .map_err(|e| GatewayError::Configuration(format!("invalid authorization URL: {e}")))?;

    let mut session = state.sessions.read_cookie(&headers).unwrap_or_default();
    session.oauth_state = Some(oauth_state);
    let cookie = state.sessions.set_cookie(&session).map_err(|e| {
        tracing::error!(target: "gatehouse.handlers.login", error = %e, "Cannot write session cookie");
        GatewayError::Internal
    })?;

    Ok(redirect_with_cookie(authorize_url.as_str(), cookie))
}

/// Query parameters the IdP appends to the redirect URI.
#[derive(Debug, Default, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

fn login_failure(ip: &ClientIp, detail: &str, status: u16) {
    AuditRecord::new(AuditEvent::LoginFailure)
        .ip_address(ip.0.clone())
        .path("/callback")
        .status_code(status)
        .detail(detail)
        .emit();
}

/// Identity kept in the session, taken from verified claims only.
fn session_user(claims: &ClaimMap) -> SessionUser {
    SessionUser {
        sub: claims.sub.clone().unwrap_or_default(),
        email: claims.email.clone(),
        preferred_username: claims.preferred_username.clone(),
        name: claims.name.clone(),
        roles: claims.realm_roles().to_vec(),
        groups: claims.groups.clone().unwrap_or_default(),
        scope: claims.scope.clone(),
    }
}

/// Handler for GET /callback
///
/// # Response
///
/// - 303 to `/` with the signed-in session cookie
/// - 400 on state mismatch, a missing code, or an IdP-reported error
/// - 401 when the IdP rejects the code or the issued token fails verification
/// - 503 when the IdP cannot be reached
#[instrument(skip_all, name = "gatehouse.handlers.callback")]
pub async fn callback(
    State(state): State<Arc<AppState>>,
    ip: ClientIp,
    headers: HeaderMap,
    Query(params): Query<CallbackParams>,
) -> Result<Response, GatewayError> {
    let mut session = state.sessions.read_cookie(&headers).unwrap_or_default();
    let expected_state = session.oauth_state.take();

    let state_matches = match (params.state.as_deref(), expected_state.as_deref()) {
        (Some(received), Some(expected)) => {
            constant_time_eq(received.as_bytes(), expected.as_bytes())
        }
        _ => false,
    };
    if !state_matches {
        login_failure(&ip, "state_mismatch", 400);
        return Err(GatewayError::BadRequest(
            "Invalid state parameter".to_string(),
        ));
    }

    if let Some(error) = params.error.as_deref() {
        tracing::info!(
            target: "gatehouse.handlers.callback",
            error = %error,
            description = params.error_description.as_deref().unwrap_or(""),
            "Identity provider reported a login error"
        );
        login_failure(&ip, "idp_error", 400);
        return Err(GatewayError::BadRequest(
            "Login was not completed".to_string(),
        ));
    }

    let Some(code) = params.code.as_deref().filter(|c| !c.is_empty()) else {
        login_failure(&ip, "missing_code", 400);
        return Err(GatewayError::BadRequest(
            "No authorization code received".to_string(),
        ));
    };

    let client = login_client(&state)?;
    let tokens = state
        .token_client
        .exchange_code(&client, code, &state.config.redirect_uri())
        .await
        .map_err(|e| {
            let err = GatewayError::from(e);
            login_failure(&ip, "code_exchange_failed", err.status_code());
            err
        })?;

    let claims = match state
        .gatekeeper
        .verify_token(tokens.access_token.expose_secret())
        .await
    {
        Ok(claims) => claims,
        Err(e) if e.is_service_failure() => {
            return Err(GatewayError::ServiceUnavailable(e.to_string()));
        }
        Err(e) => {
            login_failure(&ip, e.kind(), 401);
            return Err(GatewayError::Unauthenticated(
                "Issued token failed verification".to_string(),
            ));
        }
    };

    let user = session_user(&claims);
    if user.sub.is_empty() {
        AuditRecord::new(AuditEvent::MissingSubject)
            .ip_address(ip.0.clone())
            .path("/callback")
            .detail("login token without sub")
            .emit();
        login_failure(&ip, "missing_subject", 401);
        return Err(GatewayError::Unauthenticated(
            "Issued token has no subject".to_string(),
        ));
    }

    let principal = Principal::from_claims(claims);
    AuditRecord::new(AuditEvent::LoginSuccess)
        .user(principal.subject_id(), principal.display_name())
        .ip_address(ip.0)
        .path("/callback")
        .status_code(303)
        .emit();

    session.user = Some(user);
    store_tokens(&mut session, &tokens);

    let cookie = state.sessions.set_cookie(&session).map_err(|e| {
        tracing::error!(target: "gatehouse.handlers.callback", error = %e, "Cannot write session cookie");
        GatewayError::Internal
    })?;

    Ok(redirect_with_cookie("/", cookie))
}

fn store_tokens(session: &mut SessionData, tokens: &TokenResponse) {
    session.access_token = Some(tokens.access_token.expose_secret().to_string());
    session.refresh_token = tokens
        .refresh_token
        .as_ref()
        .map(|t| t.expose_secret().to_string());
    session.access_token_expires_at = (tokens.expires_in > 0).then(|| {
        let expires_in = i64::try_from(tokens.expires_in).unwrap_or(i64::MAX);
        chrono::Utc::now().timestamp().saturating_add(expires_in)
    });
}

/// Handler for GET /logout
///
/// Clears the session cookie and sends the browser to the IdP logout
/// endpoint, which returns it to the landing page.
#[instrument(skip_all, name = "gatehouse.handlers.logout")]
pub async fn logout(
    State(state): State<Arc<AppState>>,
    ip: ClientIp,
    headers: HeaderMap,
) -> Result<Response, GatewayError> {
    if let Some(principal) = state
        .sessions
        .read_cookie(&headers)
        .and_then(|s| Principal::from_session(s.user.as_ref()))
    {
        AuditRecord::new(AuditEvent::Logout)
            .user(principal.subject_id(), principal.display_name())
            .ip_address(ip.0)
            .path("/logout")
            .emit();
    }

    let post_logout = format!("{}/", state.config.public_base_url);
    let mut params = vec![("post_logout_redirect_uri", post_logout.as_str())];
    if let Some(client_id) = state.config.client_id.as_deref() {
        params.push(("client_id", client_id));
    }
    let logout_url = Url::parse_with_params(&state.config.logout_url(), &params)
        .map_err(|e| GatewayError::Configuration(format!("invalid logout URL: {e}")))?;

    Ok(redirect_with_cookie(
        logout_url.as_str(),
        state.sessions.clear_cookie(),
    ))
}

#[derive(Debug, Default, Deserialize)]
pub struct RefreshRequest {
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// New tokens returned to the caller that presented the refresh token.
#[derive(Debug, Clone, Serialize)]
pub struct RefreshResponse {
    pub access_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    pub token_type: String,
    pub expires_in: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_expires_in: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

impl From<TokenResponse> for RefreshResponse {
    fn from(tokens: TokenResponse) -> Self {
        Self {
            access_token: tokens.access_token.expose_secret().to_string(),
            refresh_token: tokens
                .refresh_token
                .as_ref()
                .map(|t| t.expose_secret().to_string()),
            token_type: tokens.token_type,
            expires_in: tokens.expires_in,
            refresh_expires_in: tokens.refresh_expires_in,
            scope: tokens.scope,
        }
    }
}

/// Handler for POST /refresh
///
/// Body: `{"refresh_token": "..."}`.
///
/// # Response
///
/// - 200 with the new token fields
/// - 400 when the body is not JSON or lacks `refresh_token`
/// - 401 when the IdP rejects the refresh token
/// - 503 when the IdP cannot be reached
#[instrument(skip_all, name = "gatehouse.handlers.refresh")]
pub async fn refresh_token(
    State(state): State<Arc<AppState>>,
    ip: ClientIp,
    body: Result<Json<RefreshRequest>, JsonRejection>,
) -> Result<ApiResponse<RefreshResponse>, GatewayError> {
    let request = match body {
        Ok(Json(request)) => request,
        Err(rejection) => {
            tracing::debug!(target: "gatehouse.handlers.refresh", error = %rejection, "Unreadable refresh body");
            RefreshRequest::default()
        }
    };

    let refresh_token = request
        .refresh_token
        .filter(|t| !t.is_empty())
        .map(SecretString::from)
        .ok_or_else(|| {
            GatewayError::BadRequest("refresh_token is required in the request body".to_string())
        })?;

    let client = login_client(&state)?;
    let tokens = state.token_client.refresh(&client, &refresh_token).await?;

    AuditRecord::new(AuditEvent::TokenRefresh)
        .ip_address(ip.0)
        .path("/refresh")
        .status_code(200)
        .emit();

    Ok(ApiResponse::new(
        RefreshResponse::from(tokens),
        "Token refreshed successfully",
    ))
}
