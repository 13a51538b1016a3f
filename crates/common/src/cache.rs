//! Cache helpers shared by the key-set and admin-credential caches.
//!
//! Both caches are `moka::future::Cache` instances keyed by a string
//! (certs URL or admin client id). This module holds the lifetime clamp and
//! the status snapshot served by the operational endpoints.

use moka::future::Cache;
use serde::Serialize;
use std::time::Duration;

/// Upper bound on any entry lifetime; moka rejects lifetimes beyond 1000 years.
pub const MAX_TTL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Point-in-time view of a cache, for operational endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheStatus {
    /// Configured capacity.
    pub max_entries: usize,
    /// Default entry lifetime in seconds.
    pub ttl_seconds: u64,
    /// Number of live (unexpired) entries.
    pub size: usize,
    /// Keys of live entries, sorted.
    pub entries: Vec<String>,
}

/// Capacity argument for `Cache::builder().max_capacity`. Zero is treated as one.
#[must_use]
pub fn capacity(max_entries: usize) -> u64 {
    u64::try_from(max_entries.max(1)).unwrap_or(u64::MAX)
}

/// Snapshot a cache's live keys.
///
/// Pending maintenance runs first so invalidated and evicted entries are not
/// reported. Values are never read, so secrets stay out of the snapshot.
pub async fn status_of<V>(cache: &Cache<String, V>, ttl: Duration) -> CacheStatus
where
    V: Clone + Send + Sync + 'static,
{
    cache.run_pending_tasks().await;

    let mut entries: Vec<String> = cache.iter().map(|(key, _)| key.as_ref().clone()).collect();
    entries.sort();

    let max_entries = cache
        .policy()
        .max_capacity()
        .and_then(|max| usize::try_from(max).ok())
        .unwrap_or(usize::MAX);

    CacheStatus {
        max_entries,
        ttl_seconds: ttl.as_secs(),
        size: entries.len(),
        entries,
    }
}
