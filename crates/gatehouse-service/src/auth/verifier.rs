//! Token verification against the IdP key set.
//!
//! # Security Checks
//!
//! 1. Size and structure check before any decoding
//! 2. Header `alg` must equal the one configured algorithm; the token never
//!    chooses how it is verified
//! 3. Key lookup by `kid` in the cached key set (fetch failures propagate as
//!    `KeySetUnavailable`, never as an authentication result)
//! 4. Signature verification
//! 5. `exp` and `iss` always; `aud` only when the caller supplies one
//! 6. `nbf`, and `iat` with clock skew tolerance
//!
//! Every failure is a typed `VerificationError`; nothing here retries.

use crate::auth::claims::ClaimMap;
use crate::auth::keyset::{FetchError, Jwk, KeySetCache};
use crate::observability::metrics;
use common::jwt::{decode_ed25519_public_key_jwk, inspect_header, validate_iat, JwtValidationError};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::instrument;

/// Why a token was not accepted.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum VerificationError {
    #[error("token is malformed")]
    MalformedToken,

    #[error("token algorithm is not allowed")]
    DisallowedAlgorithm,

    #[error("no usable signing key for token")]
    UnknownSigningKey,

    #[error("token signature is invalid")]
    SignatureInvalid,

    #[error("token has expired")]
    TokenExpired,

    #[error("token is not yet valid")]
    TokenNotYetValid,

    #[error("token issuer does not match")]
    IssuerMismatch,

    #[error("token audience does not match")]
    AudienceMismatch,

    #[error("signing keys unavailable: {0}")]
    KeySetUnavailable(FetchError),
}

impl VerificationError {
    /// Stable label for metrics and audit records.
    pub fn kind(&self) -> &'static str {
        match self {
            VerificationError::MalformedToken => "malformed_token",
            VerificationError::DisallowedAlgorithm => "disallowed_algorithm",
            VerificationError::UnknownSigningKey => "unknown_signing_key",
            VerificationError::SignatureInvalid => "signature_invalid",
            VerificationError::TokenExpired => "token_expired",
            VerificationError::TokenNotYetValid => "token_not_yet_valid",
            VerificationError::IssuerMismatch => "issuer_mismatch",
            VerificationError::AudienceMismatch => "audience_mismatch",
            VerificationError::KeySetUnavailable(_) => "keyset_unavailable",
        }
    }

    /// True when the failure says nothing about the caller's token.
    pub fn is_service_failure(&self) -> bool {
        matches!(self, VerificationError::KeySetUnavailable(_))
    }
}

impl From<JwtValidationError> for VerificationError {
    fn from(err: JwtValidationError) -> Self {
        match err {
            JwtValidationError::IatTooFarInFuture => VerificationError::TokenNotYetValid,
            JwtValidationError::TokenTooLarge
            | JwtValidationError::MalformedToken
            | JwtValidationError::MissingKid
            | JwtValidationError::MissingAlgorithm => VerificationError::MalformedToken,
        }
    }
}

/// Verifies IdP-issued tokens.
pub struct ClaimsVerifier {
    key_sets: Arc<KeySetCache>,
    issuer: String,
    algorithm: Algorithm,
    clock_skew: Duration,
}

impl ClaimsVerifier {
    /// # Arguments
    ///
    /// * `key_sets` - cache of the IdP's signing keys
    /// * `issuer` - exact `iss` value to require
    /// * `algorithm` - the only accepted signing algorithm
    /// * `clock_skew` - tolerance for `iat` in the future
    pub fn new(
        key_sets: Arc<KeySetCache>,
        issuer: String,
        algorithm: Algorithm,
        clock_skew: Duration,
    ) -> Self {
        Self {
            key_sets,
            issuer,
            algorithm,
            clock_skew,
        }
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub fn key_sets(&self) -> &Arc<KeySetCache> {
        &self.key_sets
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Verify `token` and return its claims.
    ///
    /// `expected_audience` only adds the audience check; issuer and expiry
    /// are enforced either way.
    #[instrument(skip_all, name = "gatehouse.auth.verify")]
    pub async fn verify(
        &self,
        token: &str,
        expected_audience: Option<&str>,
    ) -> Result<ClaimMap, VerificationError> {
        let result = self.verify_inner(token, expected_audience).await;
        match &result {
            Ok(_) => metrics::record_token_verification("success"),
            Err(e) => {
                tracing::debug!(target: "gatehouse.auth.verifier", kind = e.kind(), "Token rejected");
                metrics::record_token_verification(e.kind());
            }
        }
        result
    }

    async fn verify_inner(
        &self,
        token: &str,
        expected_audience: Option<&str>,
    ) -> Result<ClaimMap, VerificationError> {
        let header = inspect_header(token)?;

        if header.alg != algorithm_name(self.algorithm) {
            tracing::debug!(
                target: "gatehouse.auth.verifier",
                alg = %header.alg,
                "Token algorithm does not match configured algorithm"
            );
            return Err(VerificationError::DisallowedAlgorithm);
        }

        let key_set = self
            .key_sets
            .get()
            .await
            .map_err(VerificationError::KeySetUnavailable)?;

        let jwk = key_set.get(&header.kid).ok_or_else(|| {
            tracing::debug!(target: "gatehouse.auth.verifier", kid = %header.kid, "Key ID not in key set");
            VerificationError::UnknownSigningKey
        })?;

        let decoding_key = decoding_key_for(jwk, self.algorithm)?;

        let mut validation = Validation::new(self.algorithm);
        validation.leeway = 0;
        validation.validate_exp = true;
        validation.validate_nbf = true;
        validation.set_required_spec_claims(&["exp", "iss"]);
        validation.set_issuer(&[self.issuer.as_str()]);
        match expected_audience {
            Some(audience) => validation.set_audience(&[audience]),
            None => validation.validate_aud = false,
        }

        let token_data =
            decode::<ClaimMap>(token, &decoding_key, &validation).map_err(map_jwt_error)?;
        let claims = token_data.claims;

        if let Some(iat) = claims.iat {
            validate_iat(iat, self.clock_skew)?;
        }

        Ok(claims)
    }
}

/// `alg` header value for an algorithm.
pub fn algorithm_name(algorithm: Algorithm) -> &'static str {
    match algorithm {
        Algorithm::HS256 => "HS256",
        Algorithm::HS384 => "HS384",
        Algorithm::HS512 => "HS512",
        Algorithm::ES256 => "ES256",
        Algorithm::ES384 => "ES384",
        Algorithm::RS256 => "RS256",
        Algorithm::RS384 => "RS384",
        Algorithm::RS512 => "RS512",
        Algorithm::PS256 => "PS256",
        Algorithm::PS384 => "PS384",
        Algorithm::PS512 => "PS512",
        Algorithm::EdDSA => "EdDSA",
    }
}

/// Build a decoding key from a JWK, checking it fits the algorithm.
///
/// A key of the wrong family, declaring a different `alg`, or with missing
/// material cannot verify this token and is treated as unknown.
fn decoding_key_for(jwk: &Jwk, algorithm: Algorithm) -> Result<DecodingKey, VerificationError> {
    if let Some(alg) = &jwk.alg {
        if alg != algorithm_name(algorithm) {
            tracing::warn!(target: "gatehouse.auth.verifier", kid = %jwk.kid, alg = %alg, "JWK declares a different algorithm");
            return Err(VerificationError::UnknownSigningKey);
        }
    }

    match algorithm {
        Algorithm::RS256
        | Algorithm::RS384
        | Algorithm::RS512
        | Algorithm::PS256
        | Algorithm::PS384
        | Algorithm::PS512 => {
            let (Some(n), Some(e)) = (jwk.n.as_deref(), jwk.e.as_deref()) else {
                tracing::warn!(target: "gatehouse.auth.verifier", kid = %jwk.kid, "RSA JWK missing n or e");
                return Err(VerificationError::UnknownSigningKey);
            };
            if jwk.kty != "RSA" {
                return Err(VerificationError::UnknownSigningKey);
            }
            DecodingKey::from_rsa_components(n, e).map_err(|e| {
                tracing::warn!(target: "gatehouse.auth.verifier", kid = %jwk.kid, error = %e, "Invalid RSA key material");
                VerificationError::UnknownSigningKey
            })
        }
        Algorithm::EdDSA => {
            if jwk.kty != "OKP" || jwk.crv.as_deref().is_some_and(|crv| crv != "Ed25519") {
                return Err(VerificationError::UnknownSigningKey);
            }
            let x = jwk.x.as_deref().ok_or_else(|| {
                tracing::warn!(target: "gatehouse.auth.verifier", kid = %jwk.kid, "OKP JWK missing x");
                VerificationError::UnknownSigningKey
            })?;
            let public_key = decode_ed25519_public_key_jwk(x).map_err(|e| {
                tracing::warn!(target: "gatehouse.auth.verifier", kid = %jwk.kid, error = %e, "Invalid public key encoding");
                VerificationError::UnknownSigningKey
            })?;
            Ok(DecodingKey::from_ed_der(&public_key))
        }
        _ => Err(VerificationError::UnknownSigningKey),
    }
}

fn map_jwt_error(err: jsonwebtoken::errors::Error) -> VerificationError {
    match err.kind() {
        ErrorKind::ExpiredSignature => VerificationError::TokenExpired,
        ErrorKind::ImmatureSignature => VerificationError::TokenNotYetValid,
        ErrorKind::InvalidIssuer => VerificationError::IssuerMismatch,
        ErrorKind::InvalidAudience => VerificationError::AudienceMismatch,
        ErrorKind::InvalidAlgorithm => VerificationError::DisallowedAlgorithm,
        ErrorKind::MissingRequiredClaim(claim) if claim == "iss" => {
            VerificationError::IssuerMismatch
        }
        ErrorKind::MissingRequiredClaim(claim) if claim == "aud" => {
            VerificationError::AudienceMismatch
        }
        ErrorKind::InvalidSignature | ErrorKind::Crypto(_) => VerificationError::SignatureInvalid,
        ErrorKind::InvalidRsaKey(_)
        | ErrorKind::InvalidEcdsaKey
        | ErrorKind::InvalidKeyFormat
        | ErrorKind::RsaFailedSigning => VerificationError::UnknownSigningKey,
        _ => VerificationError::MalformedToken,
    }
}
