//! Gatehouse error types.
//!
//! This is the single place where failures become HTTP status codes. Error
//! messages returned to clients are generic; actual causes are logged
//! server-side.

use crate::auth::gatekeeper::AuthenticationError;
use crate::auth::policy::DenyReason;
use crate::idp::{CredentialError, DirectoryError, TokenError};
use crate::response::Metadata;
use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Gatehouse error type.
///
/// Maps to HTTP status codes:
/// - BadRequest: 400
/// - Unauthenticated: 401 (with WWW-Authenticate)
/// - Forbidden: 403
/// - UpstreamFailure: 502
/// - ServiceUnavailable: 503
/// - Configuration, Internal: 500
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Upstream failure: {0}")]
    UpstreamFailure(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Internal server error")]
    Internal,
}

impl GatewayError {
    /// Returns the HTTP status code for this error (for metrics and audit).
    pub fn status_code(&self) -> u16 {
        match self {
            GatewayError::BadRequest(_) => 400,
            GatewayError::Unauthenticated(_) => 401,
            GatewayError::Forbidden(_) => 403,
            GatewayError::UpstreamFailure(_) => 502,
            GatewayError::ServiceUnavailable(_) => 503,
            GatewayError::Configuration(_) | GatewayError::Internal => 500,
        }
    }
}

impl From<DenyReason> for GatewayError {
    fn from(reason: DenyReason) -> Self {
        match reason {
            DenyReason::Unauthenticated => {
                GatewayError::Unauthenticated("Authentication required".to_string())
            }
            DenyReason::InsufficientPrivilege => {
                GatewayError::Forbidden("Insufficient permissions".to_string())
            }
        }
    }
}

impl From<AuthenticationError> for GatewayError {
    fn from(err: AuthenticationError) -> Self {
        GatewayError::ServiceUnavailable(err.to_string())
    }
}

impl From<TokenError> for GatewayError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Rejected { .. } => {
                GatewayError::Unauthenticated("Grant rejected by identity provider".to_string())
            }
            TokenError::Transport(_) => GatewayError::ServiceUnavailable(err.to_string()),
            TokenError::ServerError { .. }
            | TokenError::UnexpectedStatus(_)
            | TokenError::InvalidResponse(_) => GatewayError::UpstreamFailure(err.to_string()),
        }
    }
}

impl From<CredentialError> for GatewayError {
    fn from(err: CredentialError) -> Self {
        match err {
            CredentialError::NotConfigured => GatewayError::Configuration(err.to_string()),
            CredentialError::Unavailable(_) => GatewayError::ServiceUnavailable(err.to_string()),
        }
    }
}

impl From<DirectoryError> for GatewayError {
    fn from(err: DirectoryError) -> Self {
        match err {
            DirectoryError::Credential(e) => e.into(),
            DirectoryError::Transport(_) => GatewayError::ServiceUnavailable(err.to_string()),
            DirectoryError::Status(_) | DirectoryError::InvalidBody(_) => {
                GatewayError::UpstreamFailure(err.to_string())
            }
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    success: bool,
    error: ErrorDetail,
    metadata: Metadata,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<&'static str>,
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let (status, code, message, reason) = match self {
            GatewayError::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, "BAD_REQUEST", message, None)
            }
            GatewayError::Unauthenticated(message) => (
                StatusCode::UNAUTHORIZED,
                "UNAUTHENTICATED",
                message,
                Some(DenyReason::Unauthenticated.as_str()),
            ),
            GatewayError::Forbidden(message) => (
                StatusCode::FORBIDDEN,
                "INSUFFICIENT_PERMISSIONS",
                message,
                Some(DenyReason::InsufficientPrivilege.as_str()),
            ),
            GatewayError::ServiceUnavailable(cause) => {
                tracing::warn!(target: "gatehouse.availability", cause = %cause, "Service unavailable");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "SERVICE_UNAVAILABLE",
                    "Identity provider temporarily unavailable".to_string(),
                    None,
                )
            }
            GatewayError::UpstreamFailure(cause) => {
                tracing::warn!(target: "gatehouse.availability", cause = %cause, "Upstream call failed");
                (
                    StatusCode::BAD_GATEWAY,
                    "UPSTREAM_ERROR",
                    "Identity provider returned an error".to_string(),
                    None,
                )
            }
            GatewayError::Configuration(cause) => {
                tracing::error!(target: "gatehouse.config", cause = %cause, "Configuration error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "CONFIGURATION_ERROR",
                    "Service is not configured for this operation".to_string(),
                    None,
                )
            }
            GatewayError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "An internal error occurred".to_string(),
                None,
            ),
        };

        let body = ErrorResponse {
            success: false,
            error: ErrorDetail {
                code,
                message,
                reason,
            },
            metadata: Metadata::now(),
        };

        let mut response = (status, Json(body)).into_response();

        if status == StatusCode::UNAUTHORIZED {
            response.headers_mut().insert(
                header::WWW_AUTHENTICATE,
                HeaderValue::from_static("Bearer realm=\"gatehouse\""),
            );
        }

        response
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::body::Body;
    use http_body_util::BodyExt;

    async fn read_body_json(body: Body) -> serde_json::Value {
        let bytes = body.collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(GatewayError::BadRequest("x".into()).status_code(), 400);
        assert_eq!(GatewayError::Unauthenticated("x".into()).status_code(), 401);
        assert_eq!(GatewayError::Forbidden("x".into()).status_code(), 403);
        assert_eq!(GatewayError::UpstreamFailure("x".into()).status_code(), 502);
        assert_eq!(
            GatewayError::ServiceUnavailable("x".into()).status_code(),
            503
        );
        assert_eq!(GatewayError::Configuration("x".into()).status_code(), 500);
        assert_eq!(GatewayError::Internal.status_code(), 500);
    }

    #[test]
    fn test_deny_reasons_map_to_distinct_errors() {
        assert_eq!(
            GatewayError::from(DenyReason::Unauthenticated).status_code(),
            401
        );
        assert_eq!(
            GatewayError::from(DenyReason::InsufficientPrivilege).status_code(),
            403
        );
    }

    #[test]
    fn test_key_set_outage_is_service_unavailable() {
        let err = GatewayError::from(AuthenticationError::KeySetUnavailable(
            crate::auth::keyset::FetchError::Status(500),
        ));
        assert_eq!(err.status_code(), 503);
    }

    #[test]
    fn test_token_errors() {
        assert_eq!(
            GatewayError::from(TokenError::Rejected { status: 400 }).status_code(),
            401
        );
        assert_eq!(
            GatewayError::from(TokenError::Transport("timed out".into())).status_code(),
            503
        );
        assert_eq!(
            GatewayError::from(TokenError::ServerError { status: 500 }).status_code(),
            502
        );
        assert_eq!(
            GatewayError::from(TokenError::InvalidResponse("eof".into())).status_code(),
            502
        );
    }

    #[test]
    fn test_directory_errors() {
        assert_eq!(
            GatewayError::from(DirectoryError::Credential(CredentialError::NotConfigured))
                .status_code(),
            500
        );
        assert_eq!(
            GatewayError::from(DirectoryError::Credential(CredentialError::Unavailable(
                TokenError::Rejected { status: 401 }
            )))
            .status_code(),
            503
        );
        assert_eq!(
            GatewayError::from(DirectoryError::Transport("reset".into())).status_code(),
            503
        );
        assert_eq!(GatewayError::from(DirectoryError::Status(404)).status_code(), 502);
    }

    #[tokio::test]
    async fn test_unauthenticated_response() {
        let response = GatewayError::Unauthenticated("Authentication required".into())
            .into_response();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers().get(header::WWW_AUTHENTICATE).unwrap(),
            "Bearer realm=\"gatehouse\""
        );

        let body = read_body_json(response.into_body()).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["error"]["code"], "UNAUTHENTICATED");
        assert_eq!(body["error"]["reason"], "unauthenticated");
        assert_eq!(body["metadata"]["version"], "1.0");
    }

    #[tokio::test]
    async fn test_forbidden_response() {
        let response = GatewayError::Forbidden("Insufficient permissions".into()).into_response();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert!(response.headers().get(header::WWW_AUTHENTICATE).is_none());

        let body = read_body_json(response.into_body()).await;
        assert_eq!(body["error"]["code"], "INSUFFICIENT_PERMISSIONS");
        assert_eq!(body["error"]["reason"], "insufficient_privilege");
    }

    #[tokio::test]
    async fn test_service_unavailable_hides_cause() {
        let response =
            GatewayError::ServiceUnavailable("connect error: 10.0.0.5:8080".into()).into_response();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = read_body_json(response.into_body()).await;
        assert_eq!(body["error"]["code"], "SERVICE_UNAVAILABLE");
        assert!(!body.to_string().contains("10.0.0.5"));
    }

    #[tokio::test]
    async fn test_configuration_error_hides_cause() {
        let response =
            GatewayError::Configuration("KEYCLOAK_ADMIN_CLIENT_SECRET unset".into())
                .into_response();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = read_body_json(response.into_body()).await;
        assert_eq!(body["error"]["code"], "CONFIGURATION_ERROR");
        assert!(!body.to_string().contains("KEYCLOAK_ADMIN_CLIENT_SECRET"));
    }

    #[tokio::test]
    async fn test_bad_request_passes_message() {
        let response = GatewayError::BadRequest("refresh_token is required".into()).into_response();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = read_body_json(response.into_body()).await;
        assert_eq!(body["error"]["message"], "refresh_token is required");
        assert!(body["error"].get("reason").is_none());
    }
}
