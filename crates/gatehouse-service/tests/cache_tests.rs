//! Key set and admin credential cache tests.
//!
//! Covers fetch counts against the mock IdP and the `/cache/*` endpoints.

// Test code is allowed to use expect/unwrap for assertions
#![allow(clippy::unwrap_used, clippy::expect_used)]

use gatehouse_service::auth::{FetchError, KeySetCache};
use gatehouse_service::idp::{AdminCredentialCache, ClientCredentials, CredentialError, TokenClient};
use gatehouse_test_utils::{
    MockIdp, TestGatewayServer, TestSigningKey, TestTokenBuilder, ADMIN_ACCESS_TOKEN,
};
use common::secret::{ExposeSecret, SecretString};
use reqwest::StatusCode;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

fn key_set_cache(idp: &MockIdp, ttl: Duration) -> KeySetCache {
    KeySetCache::new(
        format!("{}{}", idp.url(), idp.certs_path()),
        ttl,
        10,
        Duration::from_secs(2),
    )
}

fn credential_cache(idp: &MockIdp, configured: bool) -> AdminCredentialCache {
    let token_client = TokenClient::new(
        format!("{}{}", idp.url(), idp.token_path()),
        reqwest::Client::new(),
    );
    let credentials = configured.then(|| {
        ClientCredentials::new(
            "gatehouse-admin".to_string(),
            Some(SecretString::from("admin-secret")),
        )
    });
    AdminCredentialCache::new(token_client, credentials, Duration::from_secs(300), 10)
}

#[tokio::test]
async fn test_key_set_fetched_once_within_ttl() {
    let idp = MockIdp::start().await;
    let key = TestSigningKey::rsa_primary().unwrap();
    idp.mount_jwks_expecting(&[&key], 1).await;
    let cache = key_set_cache(&idp, Duration::from_secs(600));

    for _ in 0..5 {
        let keys = cache.get().await.unwrap();
        assert!(keys.get("rsa-key-1").is_some());
    }

    assert_eq!(cache.fetch_count(), 1);
    let status = cache.status().await;
    assert_eq!(status.size, 1);
}

#[tokio::test]
async fn test_key_set_refetched_after_ttl() {
    let idp = MockIdp::start().await;
    let key = TestSigningKey::rsa_primary().unwrap();
    idp.mount_jwks_expecting(&[&key], 2).await;
    let cache = key_set_cache(&idp, Duration::from_millis(200));

    cache.get().await.unwrap();
    cache.get().await.unwrap();
    tokio::time::sleep(Duration::from_millis(400)).await;
    cache.get().await.unwrap();

    assert_eq!(cache.fetch_count(), 2);
}

#[tokio::test]
async fn test_invalidate_forces_next_fetch() {
    let idp = MockIdp::start().await;
    let key = TestSigningKey::rsa_primary().unwrap();
    idp.mount_jwks_expecting(&[&key], 2).await;
    let cache = key_set_cache(&idp, Duration::from_secs(600));

    cache.get().await.unwrap();
    cache.invalidate().await;
    assert_eq!(cache.status().await.size, 0);
    cache.get().await.unwrap();

    assert_eq!(cache.fetch_count(), 2);
}

#[tokio::test]
async fn test_concurrent_misses_fetch_once() {
    let idp = MockIdp::start().await;
    let key = TestSigningKey::rsa_primary().unwrap();
    idp.mount_jwks_expecting(&[&key], 1).await;
    let cache = Arc::new(key_set_cache(&idp, Duration::from_secs(600)));

    let tasks: Vec<_> = (0..16)
        .map(|_| {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move { cache.get().await.map(|keys| keys.len()) })
        })
        .collect();

    for result in futures::future::join_all(tasks).await {
        assert_eq!(result.unwrap().unwrap(), 1);
    }
    assert_eq!(cache.fetch_count(), 1);
}

#[tokio::test]
async fn test_failed_fetch_is_not_cached() {
    let idp = MockIdp::start().await;
    idp.mount_jwks_failure(503).await;
    let cache = key_set_cache(&idp, Duration::from_secs(600));

    assert_eq!(cache.get().await.unwrap_err(), FetchError::Status(503));
    assert_eq!(cache.get().await.unwrap_err(), FetchError::Status(503));
    assert_eq!(cache.status().await.size, 0);
    assert_eq!(idp.requests_to(&idp.certs_path()).await, 2);
}

#[tokio::test]
async fn test_admin_credential_reused_within_ttl() {
    let idp = MockIdp::start().await;
    idp.mount_client_credentials(300, 1).await;
    let cache = credential_cache(&idp, true);

    for _ in 0..3 {
        let token = cache.get().await.unwrap();
        assert_eq!(token.expose_secret(), ADMIN_ACCESS_TOKEN);
    }
    assert_eq!(cache.fetch_count(), 1);
}

#[tokio::test]
async fn test_admin_credential_invalidate_refetches() {
    let idp = MockIdp::start().await;
    idp.mount_client_credentials(300, 2).await;
    let cache = credential_cache(&idp, true);

    cache.get().await.unwrap();
    cache.invalidate().await;
    cache.get().await.unwrap();

    assert_eq!(cache.fetch_count(), 2);
}

#[tokio::test]
async fn test_admin_credential_not_configured_skips_idp() {
    let idp = MockIdp::start().await;
    let cache = credential_cache(&idp, false);

    assert_eq!(cache.get().await.unwrap_err(), CredentialError::NotConfigured);
    assert_eq!(idp.requests_to(&idp.token_path()).await, 0);
}

#[tokio::test]
async fn test_admin_credential_rejected_grant() {
    let idp = MockIdp::start().await;
    idp.mount_token_error(401).await;
    let cache = credential_cache(&idp, true);

    let err = cache.get().await.unwrap_err();
    assert!(matches!(err, CredentialError::Unavailable(_)));
    assert_eq!(cache.status().await.size, 0);
}

async fn admin_server() -> (MockIdp, TestGatewayServer, TestSigningKey) {
    let idp = MockIdp::start().await;
    let key = TestSigningKey::rsa_primary().unwrap();
    idp.mount_jwks(&[&key]).await;
    let server = TestGatewayServer::spawn(&idp).await.unwrap();
    (idp, server, key)
}

#[tokio::test]
async fn test_cache_info_requires_admin() -> Result<(), anyhow::Error> {
    let (idp, server, key) = admin_server().await;
    let client = reqwest::Client::new();
    let url = format!("{}/cache/info", server.url());

    let response = client.get(&url).send().await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let user = TestTokenBuilder::new(&idp.issuer())
        .with_roles(&["manager"])
        .sign(&key)?;
    let response = client.get(&url).bearer_auth(user).send().await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let admin = TestTokenBuilder::new(&idp.issuer())
        .with_roles(&["admin"])
        .sign(&key)?;
    let response = client.get(&url).bearer_auth(admin).send().await?;
    assert_eq!(response.status(), StatusCode::OK);

    let body: Value = response.json().await?;
    // verifying the admin token populated the key set
    assert_eq!(body["data"]["keyset"]["size"], 1);
    assert_eq!(body["data"]["credential"]["size"], 0);
    assert_eq!(body["data"]["ttl_config"]["jwks_ttl"], 600);
    Ok(())
}

#[tokio::test]
async fn test_cache_clear_empties_key_set() -> Result<(), anyhow::Error> {
    let (idp, server, key) = admin_server().await;
    let client = reqwest::Client::new();
    let admin = TestTokenBuilder::new(&idp.issuer())
        .with_roles(&["admin"])
        .sign(&key)?;

    let response = client
        .post(format!("{}/cache/clear", server.url()))
        .bearer_auth(&admin)
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await?;
    assert_eq!(body["data"]["cleared"], serde_json::json!(["keyset", "credential"]));

    let key_sets = server.state().gatekeeper.verifier().key_sets();
    assert_eq!(key_sets.status().await.size, 0);

    // next verification goes back to the IdP
    let fetches_before = key_sets.fetch_count();
    let response = client
        .get(format!("{}/cache/info", server.url()))
        .bearer_auth(&admin)
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(key_sets.fetch_count(), fetches_before + 1);
    Ok(())
}

#[tokio::test]
async fn test_cache_clear_requires_admin() -> Result<(), anyhow::Error> {
    let (idp, server, key) = admin_server().await;
    let manager = TestTokenBuilder::new(&idp.issuer())
        .with_roles(&["manager"])
        .sign(&key)?;

    let response = reqwest::Client::new()
        .post(format!("{}/cache/clear", server.url()))
        .bearer_auth(manager)
        .send()
        .await?;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(
        server
            .state()
            .gatekeeper
            .verifier()
            .key_sets()
            .status()
            .await
            .size,
        1
    );
    Ok(())
}
