//! OAuth 2.0 token endpoint client.
//!
//! Covers the three grants the gateway uses: `client_credentials` for the
//! admin API, `authorization_code` at login, and `refresh_token`. Every
//! token that comes back is wrapped in `SecretString` immediately.

use common::secret::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::fmt;
use thiserror::Error;
use tracing::instrument;

/// Token endpoint failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TokenError {
    /// Connection, TLS or timeout failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// Client or grant rejected (400/401).
    #[error("grant rejected with status {status}")]
    Rejected { status: u16 },

    /// IdP answered 5xx.
    #[error("identity provider error: status {status}")]
    ServerError { status: u16 },

    /// Any other non-2xx status.
    #[error("unexpected status {0}")]
    UnexpectedStatus(u16),

    /// 2xx response that is not a token response.
    #[error("invalid token response: {0}")]
    InvalidResponse(String),
}

/// OAuth client identity presented to the token endpoint.
#[derive(Debug, Clone)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: Option<SecretString>,
}

impl ClientCredentials {
    pub fn new(client_id: String, client_secret: Option<SecretString>) -> Self {
        Self {
            client_id,
            client_secret,
        }
    }
}

#[derive(Deserialize)]
struct RawTokenResponse {
    access_token: String,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    expires_in: u64,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    refresh_expires_in: Option<u64>,
    #[serde(default)]
    scope: Option<String>,
}

/// Successful token endpoint response.
pub struct TokenResponse {
    pub access_token: SecretString,
    pub refresh_token: Option<SecretString>,
    pub token_type: String,
    /// Seconds until `access_token` expires; 0 when the IdP omitted it.
    pub expires_in: u64,
    pub refresh_expires_in: Option<u64>,
    pub scope: Option<String>,
}

impl fmt::Debug for TokenResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenResponse")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[REDACTED]"))
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .field("refresh_expires_in", &self.refresh_expires_in)
            .field("scope", &self.scope)
            .finish()
    }
}

impl From<RawTokenResponse> for TokenResponse {
    fn from(raw: RawTokenResponse) -> Self {
        Self {
            access_token: SecretString::from(raw.access_token),
            refresh_token: raw.refresh_token.map(SecretString::from),
            token_type: raw.token_type.unwrap_or_else(|| "Bearer".to_string()),
            expires_in: raw.expires_in,
            refresh_expires_in: raw.refresh_expires_in,
            scope: raw.scope,
        }
    }
}

/// Client for `{realm}/protocol/openid-connect/token`.
#[derive(Clone)]
pub struct TokenClient {
    token_url: String,
    http_client: reqwest::Client,
}

impl TokenClient {
    pub fn new(token_url: String, http_client: reqwest::Client) -> Self {
        Self {
            token_url,
            http_client,
        }
    }

    pub fn token_url(&self) -> &str {
        &self.token_url
    }

    /// Service-account grant.
    #[instrument(skip_all, name = "gatehouse.idp.client_credentials")]
    pub async fn client_credentials(
        &self,
        client: &ClientCredentials,
    ) -> Result<TokenResponse, TokenError> {
        self.request(client, &[("grant_type", "client_credentials")])
            .await
    }

    /// Exchange an authorization code received at the callback.
    #[instrument(skip_all, name = "gatehouse.idp.exchange_code")]
    pub async fn exchange_code(
        &self,
        client: &ClientCredentials,
        code: &str,
        redirect_uri: &str,
    ) -> Result<TokenResponse, TokenError> {
        self.request(
            client,
            &[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", redirect_uri),
            ],
        )
        .await
    }

    #[instrument(skip_all, name = "gatehouse.idp.refresh")]
    pub async fn refresh(
        &self,
        client: &ClientCredentials,
        refresh_token: &SecretString,
    ) -> Result<TokenResponse, TokenError> {
        self.request(
            client,
            &[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token.expose_secret()),
            ],
        )
        .await
    }

    async fn request(
        &self,
        client: &ClientCredentials,
        grant: &[(&str, &str)],
    ) -> Result<TokenResponse, TokenError> {
        let mut form: Vec<(&str, &str)> = grant.to_vec();
        form.push(("client_id", client.client_id.as_str()));
        if let Some(secret) = &client.client_secret {
            form.push(("client_secret", secret.expose_secret()));
        }

        tracing::debug!(
            target: "gatehouse.idp.token",
            client_id = %client.client_id,
            grant_type = grant.first().map_or("", |(_, v)| *v),
            "Requesting token from IdP"
        );

        let response = self
            .http_client
            .post(&self.token_url)
            .form(&form)
            .send()
            .await
            .map_err(|e| {
                tracing::debug!(target: "gatehouse.idp.token", error = %e, "HTTP request failed");
                TokenError::Transport(e.to_string())
            })?;

        let status = response.status();

        if status.is_success() {
            let raw: RawTokenResponse = response.json().await.map_err(|e| {
                tracing::warn!(target: "gatehouse.idp.token", error = %e, "Failed to parse token response");
                TokenError::InvalidResponse(e.to_string())
            })?;
            tracing::debug!(
                target: "gatehouse.idp.token",
                expires_in_secs = raw.expires_in,
                "Token acquired"
            );
            return Ok(raw.into());
        }

        if status.as_u16() == 400 || status.as_u16() == 401 {
            // body only at trace; it can echo request parameters
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(target: "gatehouse.idp.token", status = %status, "Grant rejected by IdP");
            tracing::trace!(target: "gatehouse.idp.token", body = %body, "Rejection body");
            return Err(TokenError::Rejected {
                status: status.as_u16(),
            });
        }

        if status.is_server_error() {
            tracing::warn!(target: "gatehouse.idp.token", status = %status, "IdP returned server error");
            return Err(TokenError::ServerError {
                status: status.as_u16(),
            });
        }

        tracing::warn!(target: "gatehouse.idp.token", status = %status, "Unexpected response from IdP");
        Err(TokenError::UnexpectedStatus(status.as_u16()))
    }
}
