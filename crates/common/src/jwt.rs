//! JWT utilities shared across Gatehouse crates.
//!
//! This module holds the pieces of token handling that run BEFORE any
//! signature work:
//! - Size limits for DoS prevention
//! - Clock skew constants for iat validation
//! - Unverified header inspection (`alg` + `kid`) for key lookup
//! - iat validation logic
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE parsing
//! - Header values are only ever used to select a key from a trusted key set
//!   and to compare against the single configured algorithm; they never pick
//!   the algorithm
//! - Error messages are generic; details go to debug logs
//!
//! # Usage
//!
//! ```rust,ignore
//! use common::jwt::{inspect_header, validate_iat, DEFAULT_CLOCK_SKEW};
//!
//! let header = inspect_header(token)?;
//! let jwk = key_set.get(&header.kid)?;
//! // ... verify signature ...
//! validate_iat(claims.iat, DEFAULT_CLOCK_SKEW)?;
//! ```

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use std::time::Duration;
use thiserror::Error;

// =============================================================================
// Constants
// =============================================================================

/// Maximum allowed JWT size in bytes (8KB).
///
/// Keycloak access tokens with a handful of realm roles and groups are
/// typically 1-2KB. Anything larger than 8KB is rejected before base64
/// decoding or signature verification.
pub const MAX_JWT_SIZE_BYTES: usize = 8192;

/// Default JWT clock skew tolerance (5 minutes per NIST SP 800-63B).
///
/// Tokens with `iat` (issued-at) timestamps more than this amount in the
/// future are rejected.
pub const DEFAULT_CLOCK_SKEW: Duration = Duration::from_secs(300);

/// Maximum allowed JWT clock skew tolerance (10 minutes).
pub const MAX_CLOCK_SKEW: Duration = Duration::from_secs(600);

// =============================================================================
// Error Types
// =============================================================================

/// Errors from pre-verification token inspection.
///
/// Messages are intentionally generic to prevent information leakage.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JwtValidationError {
    /// Token size exceeds maximum allowed.
    #[error("The access token is invalid or expired")]
    TokenTooLarge,

    /// Token format is invalid (not a valid JWT structure).
    #[error("The access token is invalid or expired")]
    MalformedToken,

    /// Token header has no usable `kid`.
    #[error("The access token is invalid or expired")]
    MissingKid,

    /// Token header has no `alg`.
    #[error("The access token is invalid or expired")]
    MissingAlgorithm,

    /// Token `iat` claim is too far in the future.
    #[error("The access token is invalid or expired")]
    IatTooFarInFuture,
}

// =============================================================================
// Header Inspection
// =============================================================================

/// The two header fields needed before verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenHeader {
    /// Algorithm the token claims to be signed with, verbatim.
    pub alg: String,
    /// Key ID used to select the verification key.
    pub kid: String,
}

/// Read `alg` and `kid` from a JWT header without verifying anything.
///
/// The caller MUST still verify the signature with a key it trusts and MUST
/// compare `alg` against its own configured algorithm rather than use it.
///
/// # Errors
///
/// - `TokenTooLarge` - token exceeds [`MAX_JWT_SIZE_BYTES`]
/// - `MalformedToken` - not three segments, bad base64url, or header is not a JSON object
/// - `MissingAlgorithm` - header has no string `alg`
/// - `MissingKid` - header has no non-empty string `kid`
pub fn inspect_header(token: &str) -> Result<TokenHeader, JwtValidationError> {
    if token.len() > MAX_JWT_SIZE_BYTES {
        tracing::debug!(
            target: "common.jwt",
            token_size = token.len(),
            max_size = MAX_JWT_SIZE_BYTES,
            "Token rejected: size exceeds maximum allowed"
        );
        return Err(JwtValidationError::TokenTooLarge);
    }

    // header.payload.signature
    let mut parts = token.split('.');
    let (Some(header_part), Some(_), Some(_), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        tracing::debug!(target: "common.jwt", "Token rejected: invalid JWT format");
        return Err(JwtValidationError::MalformedToken);
    };

    let header_bytes = URL_SAFE_NO_PAD.decode(header_part).map_err(|e| {
        tracing::debug!(target: "common.jwt", error = %e, "Failed to decode JWT header base64");
        JwtValidationError::MalformedToken
    })?;

    let header: serde_json::Value = serde_json::from_slice(&header_bytes).map_err(|e| {
        tracing::debug!(target: "common.jwt", error = %e, "Failed to parse JWT header JSON");
        JwtValidationError::MalformedToken
    })?;

    if !header.is_object() {
        return Err(JwtValidationError::MalformedToken);
    }

    let alg = header
        .get("alg")
        .and_then(|v| v.as_str())
        .map(ToString::to_string)
        .ok_or(JwtValidationError::MissingAlgorithm)?;

    let kid = header
        .get("kid")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .ok_or(JwtValidationError::MissingKid)?;

    Ok(TokenHeader { alg, kid })
}

/// Validate the `iat` (issued-at) claim with clock skew tolerance.
///
/// # Errors
///
/// Returns `JwtValidationError::IatTooFarInFuture` if `iat` is more than
/// `clock_skew` in the future.
pub fn validate_iat(iat: i64, clock_skew: Duration) -> Result<(), JwtValidationError> {
    let now = chrono::Utc::now().timestamp();
    validate_iat_at(iat, clock_skew, now)
}

/// Deterministic `iat` validation against an explicit `now` timestamp.
pub(crate) fn validate_iat_at(
    iat: i64,
    clock_skew: Duration,
    now: i64,
) -> Result<(), JwtValidationError> {
    // Safe cast: clock_skew is bounded to MAX_CLOCK_SKEW by configuration
    #[allow(clippy::cast_possible_wrap)]
    let clock_skew_secs = clock_skew.as_secs() as i64;
    let max_iat = now.saturating_add(clock_skew_secs);

    if iat > max_iat {
        tracing::debug!(
            target: "common.jwt",
            iat = iat,
            now = now,
            max_allowed = max_iat,
            "Token rejected: iat too far in the future"
        );
        return Err(JwtValidationError::IatTooFarInFuture);
    }

    Ok(())
}

/// Decode an Ed25519 public key from a JWK `x` field (base64url, no padding).
///
/// # Errors
///
/// Returns `base64::DecodeError` if the value is not valid base64url.
pub fn decode_ed25519_public_key_jwk(x_b64url: &str) -> Result<Vec<u8>, base64::DecodeError> {
    URL_SAFE_NO_PAD.decode(x_b64url)
}

// =============================================================================
// Tests
// =============================================================================
