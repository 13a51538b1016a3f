//! Cached admin API credential.
//!
//! The gateway's service account token is obtained with a
//! `client_credentials` grant and reused until the earlier of the configured
//! TTL and the token's own `expires_in`. Failures are never cached, and a
//! missing service account (client id or secret) is reported separately from
//! an IdP outage. Concurrent misses share one grant and its outcome.

use crate::idp::token_client::{ClientCredentials, TokenClient, TokenError};
use crate::observability::metrics;
use common::cache::{self, CacheStatus};
use common::secret::SecretString;
use moka::future::Cache;
use moka::Expiry;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::instrument;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CredentialError {
    /// Admin client id or secret not configured.
    #[error("admin credentials are not configured")]
    NotConfigured,

    /// The token endpoint could not issue a credential.
    #[error("admin credential unavailable: {0}")]
    Unavailable(TokenError),
}

#[derive(Clone)]
struct CachedCredential {
    token: SecretString,
    lifetime: Duration,
}

/// Each credential expires after its own `min(ttl, expires_in)` lifetime.
struct CredentialExpiry;

impl Expiry<String, CachedCredential> for CredentialExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &CachedCredential,
        _created_at: std::time::Instant,
    ) -> Option<Duration> {
        Some(value.lifetime)
    }
}

/// Time-bounded cache of the admin access token.
pub struct AdminCredentialCache {
    token_client: TokenClient,

    /// `None` unless both client id and secret are configured.
    credentials: Option<ClientCredentials>,

    cache: Cache<String, CachedCredential>,

    ttl: Duration,

    fetch_count: AtomicU64,
}

impl AdminCredentialCache {
    /// Credentials without a client secret count as not configured.
    pub fn new(
        token_client: TokenClient,
        credentials: Option<ClientCredentials>,
        ttl: Duration,
        max_entries: usize,
    ) -> Self {
        let credentials = credentials.filter(|c| c.client_secret.is_some());
        Self {
            token_client,
            credentials,
            cache: Cache::builder()
                .max_capacity(cache::capacity(max_entries))
                .expire_after(CredentialExpiry)
                .build(),
            ttl: ttl.min(cache::MAX_TTL),
            fetch_count: AtomicU64::new(0),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.credentials.is_some()
    }

    /// Current admin token, acquiring one if none is cached.
    ///
    /// # Errors
    ///
    /// `NotConfigured` without contacting the IdP when no service account is
    /// configured; `Unavailable` when the grant fails.
    pub async fn get(&self) -> Result<SecretString, CredentialError> {
        let Some(credentials) = &self.credentials else {
            return Err(CredentialError::NotConfigured);
        };

        if let Some(cached) = self.cache.get(&credentials.client_id).await {
            tracing::trace!(target: "gatehouse.idp.credential", "Admin credential cache hit");
            return Ok(cached.token);
        }

        self.cache
            .try_get_with(credentials.client_id.clone(), self.fetch(credentials))
            .await
            .map(|cached| cached.token)
            .map_err(|e| (*e).clone())
    }

    /// Drop the cached credential, e.g. after the admin API answers 401.
    pub async fn invalidate(&self) {
        self.cache.invalidate_all();
        self.cache.run_pending_tasks().await;
        metrics::record_cache_invalidation("credential");
        tracing::info!(target: "gatehouse.idp.credential", "Admin credential cache invalidated");
    }

    pub async fn status(&self) -> CacheStatus {
        cache::status_of(&self.cache, self.ttl).await
    }

    pub fn fetch_count(&self) -> u64 {
        self.fetch_count.load(Ordering::Relaxed)
    }

    #[instrument(skip_all, name = "gatehouse.idp.credential.fetch")]
    async fn fetch(
        &self,
        credentials: &ClientCredentials,
    ) -> Result<CachedCredential, CredentialError> {
        self.fetch_count.fetch_add(1, Ordering::Relaxed);
        let start = Instant::now();

        let result = self.token_client.client_credentials(credentials).await;
        metrics::record_credential_fetch(
            if result.is_ok() { "success" } else { "error" },
            start.elapsed(),
        );

        let response = result.map_err(|e| {
            tracing::error!(target: "gatehouse.idp.credential", error = %e, "Failed to acquire admin credential");
            CredentialError::Unavailable(e)
        })?;

        let lifetime = credential_lifetime(self.ttl, response.expires_in);
        tracing::info!(
            target: "gatehouse.idp.credential",
            lifetime_secs = lifetime.as_secs(),
            "Admin credential acquired"
        );

        Ok(CachedCredential {
            token: response.access_token,
            lifetime,
        })
    }
}

/// The cached lifetime never outlives the token itself.
fn credential_lifetime(ttl: Duration, expires_in: u64) -> Duration {
    if expires_in == 0 {
        return ttl;
    }
    ttl.min(Duration::from_secs(expires_in))
}
