//! Authentication and authorization middleware for protected routes.
//!
//! `require_access` resolves the caller from the session cookie or the
//! `Authorization: Bearer` header, asks the gatekeeper for a decision, and
//! either rejects the request or inserts the `Principal` (and the session,
//! when one was used) into request extensions for the handler.

use crate::audit::{AuditEvent, AuditRecord};
use crate::auth::{AccessRequirement, Decision, DenyReason, Gatekeeper, Principal};
use crate::errors::GatewayError;
use crate::session::SessionCodec;
use axum::{
    async_trait,
    extract::{ConnectInfo, FromRequestParts, Request, State},
    http::{header, request::Parts, Extensions, HeaderMap},
    middleware::Next,
    response::Response,
};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::instrument;

/// State for one protected route group.
#[derive(Clone)]
pub struct AuthState {
    pub gatekeeper: Arc<Gatekeeper>,
    pub sessions: Arc<SessionCodec>,
    /// `None` admits any authenticated caller.
    pub requirement: Option<AccessRequirement>,
}

impl AuthState {
    pub fn new(
        gatekeeper: Arc<Gatekeeper>,
        sessions: Arc<SessionCodec>,
        requirement: Option<AccessRequirement>,
    ) -> Self {
        Self {
            gatekeeper,
            sessions,
            requirement,
        }
    }
}

/// Token from `Authorization: Bearer <token>`. The scheme is case-insensitive.
pub fn extract_bearer_token(req: &Request) -> Option<&str> {
    let value = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())?;

    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        tracing::debug!(target: "gatehouse.middleware.auth", "Unsupported Authorization scheme");
        return None;
    }

    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// Client address: first `X-Forwarded-For` hop, else the socket peer.
pub fn client_ip(req: &Request) -> Option<String> {
    forwarded_or_peer(req.headers(), req.extensions())
}

/// Extractor form of [`client_ip`] for handlers that audit.
#[derive(Debug, Clone, Default)]
pub struct ClientIp(pub Option<String>);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for ClientIp {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(ClientIp(forwarded_or_peer(&parts.headers, &parts.extensions)))
    }
}

fn forwarded_or_peer(headers: &HeaderMap, extensions: &Extensions) -> Option<String> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    if let Some(ip) = forwarded {
        return Some(ip.to_string());
    }

    extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
}

/// Gate a route group on authentication and the group's requirement.
///
/// # Response
///
/// - 401 when no valid session or bearer token is present
/// - 403 when the caller lacks the required role or scope
/// - 503 when the IdP key set cannot be fetched
#[instrument(skip_all, name = "gatehouse.middleware.auth")]
pub async fn require_access(
    State(state): State<Arc<AuthState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, GatewayError> {
    let session = state.sessions.read_cookie(req.headers());
    let session_principal = session
        .as_ref()
        .and_then(|s| Principal::from_session(s.user.as_ref()));
    let used_session = session_principal.is_some();
    let bearer = extract_bearer_token(&req).map(str::to_string);

    let principal = state
        .gatekeeper
        .authenticate_request(session_principal, bearer.as_deref())
        .await?;

    let decision = state
        .gatekeeper
        .enforce(principal.as_ref(), state.requirement.as_ref());

    if let Decision::Deny(reason) = decision {
        let (event, status) = match reason {
            DenyReason::Unauthenticated => (AuditEvent::UnauthorizedAccess, 401),
            DenyReason::InsufficientPrivilege => (AuditEvent::ForbiddenAccess, 403),
        };

        let mut record = AuditRecord::new(event)
            .ip_address(client_ip(&req))
            .path(req.uri().path())
            .status_code(status);
        if let Some(p) = &principal {
            record = record.user(p.subject_id(), p.display_name());
        }
        if let Some(requirement) = &state.requirement {
            record = record.detail(requirement.to_string());
        }
        record.emit();

        return Err(reason.into());
    }

    if let Some(principal) = principal {
        tracing::debug!(
            target: "gatehouse.middleware.auth",
            username = %principal.display_name(),
            source = ?principal.source(),
            "Request authorized"
        );
        req.extensions_mut().insert(principal);
    }
    if used_session {
        if let Some(session) = session {
            req.extensions_mut().insert(session);
        }
    }

    Ok(next.run(req).await)
}
