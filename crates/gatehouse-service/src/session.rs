//! Signed session cookies.
//!
//! The whole session lives in one cookie, `gatehouse_session`, formatted as
//! `base64url(json) "." base64url(HMAC-SHA256(json))`. There is no server
//! side store. A cookie that fails signature verification, does not parse,
//! or was issued longer ago than the configured max age is treated exactly
//! like no cookie.

use axum::http::{header, HeaderMap, HeaderValue};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use common::secret::{ExposeSecret, SecretString};
use ring::hmac;
use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

pub const SESSION_COOKIE: &str = "gatehouse_session";

/// Bytes of randomness in an OAuth `state` value.
const STATE_BYTES: usize = 32;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("session cookie is malformed")]
    Malformed,

    #[error("session signature is invalid")]
    InvalidSignature,

    #[error("session has expired")]
    Expired,

    #[error("session could not be serialized: {0}")]
    Serialization(String),

    #[error("random source unavailable")]
    Random,
}

/// Identity captured at login from a verified access token.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
    pub sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub groups: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

/// Contents of the session cookie.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<SessionUser>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// Unix seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token_expires_at: Option<i64>,

    /// CSRF state for an in-flight login.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oauth_state: Option<String>,

    /// Unix seconds; set by [`SessionCodec::encode`].
    #[serde(default)]
    pub issued_at: i64,
}

impl fmt::Debug for SessionData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionData")
            .field("user", &self.user.as_ref().map(|u| &u.preferred_username))
            .field("access_token", &self.access_token.as_ref().map(|_| "[REDACTED]"))
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[REDACTED]"))
            .field("access_token_expires_at", &self.access_token_expires_at)
            .field("oauth_state", &self.oauth_state.as_ref().map(|_| "[REDACTED]"))
            .field("issued_at", &self.issued_at)
            .finish()
    }
}

/// Signs, verifies and renders session cookies.
pub struct SessionCodec {
    key: hmac::Key,
    max_age: Duration,
    secure: bool,
}

impl SessionCodec {
    /// # Arguments
    ///
    /// * `secret` - HMAC key material
    /// * `max_age` - cookie lifetime and the bound on `issued_at`
    /// * `secure` - add the `Secure` attribute (production)
    pub fn new(secret: &SecretString, max_age: Duration, secure: bool) -> Self {
        Self {
            key: hmac::Key::new(hmac::HMAC_SHA256, secret.expose_secret().as_bytes()),
            max_age,
            secure,
        }
    }

    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    /// Stamp `issued_at` and produce the signed cookie value.
    pub fn encode(&self, session: &SessionData) -> Result<String, SessionError> {
        let mut session = session.clone();
        session.issued_at = chrono::Utc::now().timestamp();

        let payload =
            serde_json::to_vec(&session).map_err(|e| SessionError::Serialization(e.to_string()))?;
        let tag = hmac::sign(&self.key, &payload);

        Ok(format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(&payload),
            URL_SAFE_NO_PAD.encode(tag.as_ref())
        ))
    }

    /// Verify and parse a cookie value.
    pub fn decode(&self, value: &str) -> Result<SessionData, SessionError> {
        let (payload_b64, tag_b64) = value.split_once('.').ok_or(SessionError::Malformed)?;
        let payload = URL_SAFE_NO_PAD
            .decode(payload_b64)
            .map_err(|_| SessionError::Malformed)?;
        let tag = URL_SAFE_NO_PAD
            .decode(tag_b64)
            .map_err(|_| SessionError::Malformed)?;

        hmac::verify(&self.key, &payload, &tag).map_err(|_| SessionError::InvalidSignature)?;

        let session: SessionData =
            serde_json::from_slice(&payload).map_err(|_| SessionError::Malformed)?;

        let now = chrono::Utc::now().timestamp();
        let max_age = i64::try_from(self.max_age.as_secs()).unwrap_or(i64::MAX);
        if session.issued_at.saturating_add(max_age) < now {
            return Err(SessionError::Expired);
        }

        Ok(session)
    }

    /// Session from the request's `Cookie` headers, if a valid one is present.
    pub fn read_cookie(&self, headers: &HeaderMap) -> Option<SessionData> {
        let value = find_cookie(headers, SESSION_COOKIE)?;
        match self.decode(value) {
            Ok(session) => Some(session),
            Err(e) => {
                tracing::debug!(target: "gatehouse.session", error = %e, "Ignoring session cookie");
                None
            }
        }
    }

    /// `Set-Cookie` value carrying `session`.
    pub fn set_cookie(&self, session: &SessionData) -> Result<HeaderValue, SessionError> {
        let value = self.encode(session)?;
        let mut cookie = format!(
            "{SESSION_COOKIE}={value}; HttpOnly; SameSite=Lax; Path=/; Max-Age={}",
            self.max_age.as_secs()
        );
        if self.secure {
            cookie.push_str("; Secure");
        }
        HeaderValue::from_str(&cookie).map_err(|e| SessionError::Serialization(e.to_string()))
    }

    /// `Set-Cookie` value that removes the session.
    pub fn clear_cookie(&self) -> HeaderValue {
        let cookie = if self.secure {
            "gatehouse_session=; HttpOnly; SameSite=Lax; Path=/; Max-Age=0; Secure"
        } else {
            "gatehouse_session=; HttpOnly; SameSite=Lax; Path=/; Max-Age=0"
        };
        HeaderValue::from_static(cookie)
    }
}

/// Fresh OAuth `state`, 32 random bytes base64url-encoded.
pub fn new_oauth_state() -> Result<String, SessionError> {
    let mut bytes = [0u8; STATE_BYTES];
    SystemRandom::new()
        .fill(&mut bytes)
        .map_err(|_| SessionError::Random)?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

/// Compare two secrets without an early exit.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

fn find_cookie<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value)
}
