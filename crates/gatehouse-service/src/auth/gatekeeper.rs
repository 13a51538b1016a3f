//! Request authentication and route enforcement.
//!
//! `Gatekeeper` is the one object protected routes talk to. It owns the
//! verifier (and through it the key-set cache) plus the admin credential
//! cache, so cache inspection and invalidation go through the same place
//! that consumes them.

use crate::audit::{AuditEvent, AuditRecord};
use crate::auth::claims::ClaimMap;
use crate::auth::identity::Principal;
use crate::auth::keyset::FetchError;
use crate::auth::policy::{self, AccessRequirement, Decision};
use crate::auth::verifier::{ClaimsVerifier, VerificationError};
use crate::idp::credential::AdminCredentialCache;
use crate::observability::metrics;
use common::cache::CacheStatus;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

/// Authentication could not be decided because the IdP is unreachable.
///
/// Token problems are never reported here; they yield "no principal".
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthenticationError {
    #[error("signing keys unavailable: {0}")]
    KeySetUnavailable(FetchError),
}

/// Snapshot of both caches for `/cache/info`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheStatusReport {
    pub keyset: CacheStatus,
    pub credential: CacheStatus,
}

pub struct Gatekeeper {
    verifier: ClaimsVerifier,
    credentials: Arc<AdminCredentialCache>,
    audience: Option<String>,
}

impl Gatekeeper {
    /// `audience`, when set, is required in every bearer token.
    pub fn new(
        verifier: ClaimsVerifier,
        credentials: Arc<AdminCredentialCache>,
        audience: Option<String>,
    ) -> Self {
        Self {
            verifier,
            credentials,
            audience,
        }
    }

    pub fn verifier(&self) -> &ClaimsVerifier {
        &self.verifier
    }

    pub fn credentials(&self) -> &Arc<AdminCredentialCache> {
        &self.credentials
    }

    /// Verify a token with the configured audience policy.
    pub async fn verify_token(&self, token: &str) -> Result<ClaimMap, VerificationError> {
        self.verifier.verify(token, self.audience.as_deref()).await
    }

    /// Resolve the caller of one request.
    ///
    /// A session principal wins and the bearer token is then not examined.
    /// An invalid bearer token yields `Ok(None)`; only an unreachable key
    /// set is an error.
    pub async fn authenticate_request(
        &self,
        session_principal: Option<Principal>,
        bearer_token: Option<&str>,
    ) -> Result<Option<Principal>, AuthenticationError> {
        if let Some(principal) = session_principal {
            return Ok(Some(principal));
        }

        let Some(token) = bearer_token else {
            return Ok(None);
        };

        match self.verify_token(token).await {
            Ok(claims) => {
                let principal = Principal::from_claims(claims);
                if !principal.has_subject() {
                    AuditRecord::new(AuditEvent::MissingSubject)
                        .detail("verified token without sub")
                        .emit();
                }
                Ok(Some(principal))
            }
            Err(VerificationError::KeySetUnavailable(e)) => {
                tracing::error!(target: "gatehouse.auth.gatekeeper", error = %e, "Cannot authenticate: key set unavailable");
                Err(AuthenticationError::KeySetUnavailable(e))
            }
            Err(e) => {
                AuditRecord::new(AuditEvent::TokenRejected)
                    .detail(e.kind())
                    .emit();
                Ok(None)
            }
        }
    }

    /// Route-level decision, counted in metrics.
    pub fn enforce(
        &self,
        principal: Option<&Principal>,
        requirement: Option<&AccessRequirement>,
    ) -> Decision {
        let decision = policy::enforce(principal, requirement);
        match decision {
            Decision::Allow => metrics::record_access_decision("allow", "none"),
            Decision::Deny(reason) => metrics::record_access_decision("deny", reason.as_str()),
        }
        decision
    }

    pub async fn cache_status(&self) -> CacheStatusReport {
        CacheStatusReport {
            keyset: self.verifier.key_sets().status().await,
            credential: self.credentials.status().await,
        }
    }

    /// Empty both caches; the next use of each refetches.
    pub async fn invalidate_all_caches(&self) {
        self.verifier.key_sets().invalidate().await;
        self.credentials.invalidate().await;
        tracing::info!(target: "gatehouse.auth.gatekeeper", "All caches invalidated");
    }
}
