//! Key-set cache for the identity provider's public signing keys.
//!
//! Fetches `{realm}/protocol/openid-connect/certs` and caches the resulting
//! key set for a configurable TTL.
//!
//! # Consistency
//!
//! - The cached value is an `Arc<KeySet>` replaced wholesale; a verification
//!   in flight keeps its own `Arc` and never sees a half-updated set.
//! - A failed fetch never falls back to an expired set, and is never cached.
//! - Refreshes are single-flight: concurrent misses share one fetch and its
//!   outcome, failures included.

use crate::observability::metrics;
use common::cache::{self, CacheStatus};
use moka::future::Cache;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::instrument;

/// JSON Web Key as published by the certs endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Jwk {
    /// Key type: "RSA" or "OKP".
    pub kty: String,

    /// Key ID - used to select the correct key for verification.
    pub kid: String,

    /// Algorithm the key is meant for, if declared.
    #[serde(default)]
    pub alg: Option<String>,

    /// Key use ("sig" or "enc").
    #[serde(default, rename = "use")]
    pub key_use: Option<String>,

    /// RSA modulus (base64url).
    #[serde(default)]
    pub n: Option<String>,

    /// RSA public exponent (base64url).
    #[serde(default)]
    pub e: Option<String>,

    /// OKP curve name ("Ed25519").
    #[serde(default)]
    pub crv: Option<String>,

    /// OKP public key (base64url).
    #[serde(default)]
    pub x: Option<String>,
}

/// Certs endpoint response body.
#[derive(Debug, Clone, Deserialize)]
pub struct JwksResponse {
    pub keys: Vec<Jwk>,
}

/// Immutable snapshot of the IdP's signing keys, indexed by key ID.
#[derive(Debug, Clone, Default)]
pub struct KeySet {
    keys: HashMap<String, Jwk>,
}

impl KeySet {
    /// Build from a certs response. Encryption keys are dropped.
    pub fn from_jwks(jwks: JwksResponse) -> Self {
        let keys = jwks
            .keys
            .into_iter()
            .filter(|key| key.key_use.as_deref().unwrap_or("sig") == "sig")
            .map(|key| (key.kid.clone(), key))
            .collect();
        Self { keys }
    }

    pub fn get(&self, kid: &str) -> Option<&Jwk> {
        self.keys.get(kid)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Key IDs, sorted.
    pub fn kids(&self) -> Vec<&str> {
        let mut kids: Vec<&str> = self.keys.keys().map(String::as_str).collect();
        kids.sort_unstable();
        kids
    }
}

/// Failure to obtain material from the identity provider.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    /// Connection, TLS or timeout failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// Non-2xx response.
    #[error("unexpected status {0}")]
    Status(u16),

    /// 2xx response whose body could not be parsed.
    #[error("invalid response body: {0}")]
    InvalidBody(String),
}

/// Build the shared IdP HTTP client with the configured timeout.
pub(crate) fn build_http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|e| {
            tracing::warn!(target: "gatehouse.idp", error = %e, "Failed to build HTTP client with custom config, using defaults");
            reqwest::Client::new()
        })
}

/// Time-bounded cache of the IdP key set.
pub struct KeySetCache {
    /// Certs endpoint URL; also the cache key.
    certs_url: String,

    http_client: reqwest::Client,

    cache: Cache<String, Arc<KeySet>>,

    ttl: Duration,

    fetch_count: AtomicU64,
}

impl KeySetCache {
    /// Create a key-set cache.
    ///
    /// # Arguments
    ///
    /// * `certs_url` - the IdP certs endpoint
    /// * `ttl` - how long a fetched key set stays valid
    /// * `max_entries` - cache capacity
    /// * `http_timeout` - per-request timeout for fetches
    pub fn new(
        certs_url: String,
        ttl: Duration,
        max_entries: usize,
        http_timeout: Duration,
    ) -> Self {
        Self::with_client(certs_url, ttl, max_entries, build_http_client(http_timeout))
    }

    pub fn with_client(
        certs_url: String,
        ttl: Duration,
        max_entries: usize,
        http_client: reqwest::Client,
    ) -> Self {
        let ttl = ttl.min(cache::MAX_TTL);
        Self {
            certs_url,
            http_client,
            cache: Cache::builder()
                .max_capacity(cache::capacity(max_entries))
                .time_to_live(ttl)
                .build(),
            ttl,
            fetch_count: AtomicU64::new(0),
        }
    }

    /// Current key set, fetching it if the slot is empty or expired.
    ///
    /// # Errors
    ///
    /// Returns `FetchError` when the IdP cannot be reached, answers non-2xx,
    /// or returns an unparseable body. No stale value is ever returned.
    pub async fn get(&self) -> Result<Arc<KeySet>, FetchError> {
        if let Some(key_set) = self.cache.get(&self.certs_url).await {
            tracing::trace!(target: "gatehouse.auth.jwks", "Key set cache hit");
            return Ok(key_set);
        }

        self.cache
            .try_get_with(self.certs_url.clone(), async { self.fetch().await.map(Arc::new) })
            .await
            .map_err(|e| (*e).clone())
    }

    /// Drop the cached key set; the next `get()` refetches.
    pub async fn invalidate(&self) {
        self.cache.invalidate_all();
        self.cache.run_pending_tasks().await;
        metrics::record_cache_invalidation("keyset");
        tracing::info!(target: "gatehouse.auth.jwks", "Key set cache invalidated");
    }

    pub async fn status(&self) -> CacheStatus {
        cache::status_of(&self.cache, self.ttl).await
    }

    /// Number of network fetches performed so far.
    pub fn fetch_count(&self) -> u64 {
        self.fetch_count.load(Ordering::Relaxed)
    }

    #[instrument(skip_all, name = "gatehouse.auth.jwks.fetch")]
    async fn fetch(&self) -> Result<KeySet, FetchError> {
        tracing::debug!(target: "gatehouse.auth.jwks", url = %self.certs_url, "Fetching key set from IdP");
        self.fetch_count.fetch_add(1, Ordering::Relaxed);
        let start = Instant::now();

        let result = self.fetch_inner().await;
        metrics::record_keyset_fetch(
            if result.is_ok() { "success" } else { "error" },
            start.elapsed(),
        );
        result
    }

    async fn fetch_inner(&self) -> Result<KeySet, FetchError> {
        let response = self
            .http_client
            .get(&self.certs_url)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(target: "gatehouse.auth.jwks", error = %e, "Failed to fetch key set");
                FetchError::Transport(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            tracing::error!(target: "gatehouse.auth.jwks", status = %status, "Certs endpoint returned error");
            return Err(FetchError::Status(status.as_u16()));
        }

        let jwks: JwksResponse = response.json().await.map_err(|e| {
            tracing::error!(target: "gatehouse.auth.jwks", error = %e, "Failed to parse key set response");
            FetchError::InvalidBody(e.to_string())
        })?;

        let key_set = KeySet::from_jwks(jwks);
        tracing::info!(
            target: "gatehouse.auth.jwks",
            key_count = key_set.len(),
            "Key set cache refreshed"
        );

        Ok(key_set)
    }
}
