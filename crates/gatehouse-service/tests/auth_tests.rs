//! End-to-end authorization tests.
//!
//! Spawns a real gateway against a mock IdP and exercises the protected
//! routes with signed bearer tokens and session cookies.

// Test code is allowed to use expect/unwrap for assertions
#![allow(clippy::unwrap_used, clippy::expect_used)]

use gatehouse_service::session::{SessionData, SessionUser};
use gatehouse_test_utils::{MockIdp, TestGatewayServer, TestSigningKey, TestTokenBuilder};
use reqwest::StatusCode;
use serde_json::Value;

struct Harness {
    idp: MockIdp,
    key: TestSigningKey,
    server: TestGatewayServer,
    client: reqwest::Client,
}

impl Harness {
    async fn start() -> Self {
        let idp = MockIdp::start().await;
        let key = TestSigningKey::rsa_primary().unwrap();
        idp.mount_jwks(&[&key]).await;
        let server = TestGatewayServer::spawn(&idp).await.unwrap();
        Self {
            idp,
            key,
            server,
            client: reqwest::Client::new(),
        }
    }

    fn token(&self, username: &str, roles: &[&str]) -> String {
        TestTokenBuilder::new(&self.idp.issuer())
            .for_user(&format!("id-{username}"))
            .with_username(username)
            .with_roles(roles)
            .sign(&self.key)
            .unwrap()
    }

    async fn get_bearer(&self, path: &str, token: &str) -> reqwest::Response {
        self.client
            .get(format!("{}{}", self.server.url(), path))
            .bearer_auth(token)
            .send()
            .await
            .unwrap()
    }
}

fn session_for(username: &str, roles: &[&str]) -> SessionData {
    SessionData {
        user: Some(SessionUser {
            sub: format!("id-{username}"),
            preferred_username: Some(username.to_string()),
            roles: roles.iter().map(|r| (*r).to_string()).collect(),
            ..SessionUser::default()
        }),
        access_token: Some("stored-access-token".to_string()),
        refresh_token: Some("stored-refresh-token".to_string()),
        access_token_expires_at: Some(chrono::Utc::now().timestamp() + 300),
        ..SessionData::default()
    }
}

#[tokio::test]
async fn test_manager_token_opens_manager_routes() -> Result<(), anyhow::Error> {
    let h = Harness::start().await;
    let token = h.token("maria", &["manager", "user"]);

    let response = h.get_bearer("/manager", &token).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await?;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["user"], "maria");

    let response = h.get_bearer("/api/data", &token).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await?;
    assert_eq!(body["data"]["data"], "sensitive-data");

    Ok(())
}

#[tokio::test]
async fn test_missing_role_is_forbidden() -> Result<(), anyhow::Error> {
    let h = Harness::start().await;
    let token = h.token("maria", &["manager"]);

    for path in ["/ceo", "/cache/info"] {
        let response = h.get_bearer(path, &token).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN, "{path}");
        let body: Value = response.json().await?;
        assert_eq!(body["success"], false);
        assert_eq!(body["error"]["reason"], "insufficient_privilege");
    }
    Ok(())
}

#[tokio::test]
async fn test_no_credentials_is_unauthenticated() -> Result<(), anyhow::Error> {
    let h = Harness::start().await;

    let response = h
        .client
        .get(format!("{}/manager", h.server.url()))
        .send()
        .await?;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(response.headers().contains_key("www-authenticate"));
    let body: Value = response.json().await?;
    assert_eq!(body["error"]["reason"], "unauthenticated");
    Ok(())
}

#[tokio::test]
async fn test_any_authenticated_caller_reaches_me() -> Result<(), anyhow::Error> {
    let h = Harness::start().await;
    let token = h.token("plain", &[]);

    let response = h.get_bearer("/me", &token).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await?;
    assert_eq!(body["data"]["sub"], "id-plain");
    assert_eq!(body["data"]["source"], "bearer");
    assert_eq!(body["data"]["roles"], serde_json::json!([]));
    assert!(body["metadata"]["ttl"]["value"].is_u64());
    Ok(())
}

#[tokio::test]
async fn test_bad_tokens_are_unauthenticated() -> Result<(), anyhow::Error> {
    let h = Harness::start().await;
    let stranger = TestSigningKey::rsa_secondary()?;

    let expired = TestTokenBuilder::new(&h.idp.issuer())
        .with_roles(&["manager"])
        .issued_at(chrono::Utc::now().timestamp() - 7200)
        .expires_in(-3600)
        .sign(&h.key)?;
    let unknown_key = TestTokenBuilder::new(&h.idp.issuer())
        .with_roles(&["manager"])
        .sign(&stranger)?;
    let wrong_issuer = TestTokenBuilder::new("https://other.example.com/realms/test")
        .with_roles(&["manager"])
        .sign(&h.key)?;

    for (label, token) in [
        ("expired", expired.as_str()),
        ("unknown key", unknown_key.as_str()),
        ("wrong issuer", wrong_issuer.as_str()),
        ("garbage", "not.a.jwt"),
    ] {
        let response = h.get_bearer("/manager", token).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{label}");
    }
    Ok(())
}

#[tokio::test]
async fn test_key_set_outage_is_service_unavailable() -> Result<(), anyhow::Error> {
    let idp = MockIdp::start().await;
    idp.mount_jwks_failure(500).await;
    let server = TestGatewayServer::spawn(&idp).await?;
    let key = TestSigningKey::rsa_primary()?;
    let token = TestTokenBuilder::new(&idp.issuer())
        .with_roles(&["manager"])
        .sign(&key)?;

    let response = reqwest::Client::new()
        .get(format!("{}/manager", server.url()))
        .bearer_auth(token)
        .send()
        .await?;

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body: Value = response.json().await?;
    assert_eq!(body["error"]["code"], "SERVICE_UNAVAILABLE");
    Ok(())
}

#[tokio::test]
async fn test_scope_requirement() -> Result<(), anyhow::Error> {
    let h = Harness::start().await;

    let with_scope = TestTokenBuilder::new(&h.idp.issuer())
        .for_user("svc-reports")
        .with_scope("openid read:data profile")
        .sign(&h.key)?;
    let response = h.get_bearer("/api/data/scoped", &with_scope).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await?;
    assert_eq!(body["data"]["scope"], "read:data");

    // a role with the same name is not a scope
    let role_only = h.token("svc-reports", &["read:data"]);
    let response = h.get_bearer("/api/data/scoped", &role_only).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    Ok(())
}

#[tokio::test]
async fn test_session_cookie_authenticates() -> Result<(), anyhow::Error> {
    let h = Harness::start().await;
    let cookie = h.server.session_cookie(&session_for("carol", &["ceo", "manager"]))?;

    let response = h
        .client
        .get(format!("{}/manager", h.server.url()))
        .header("cookie", &cookie)
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let response = h
        .client
        .get(format!("{}/me", h.server.url()))
        .header("cookie", &cookie)
        .send()
        .await?;
    let body: Value = response.json().await?;
    assert_eq!(body["data"]["source"], "session");
    assert_eq!(body["data"]["token_info"]["has_refresh_token"], true);
    assert!(!body.to_string().contains("stored-access-token"));

    let response = h
        .client
        .get(format!("{}/token", h.server.url()))
        .header("cookie", &cookie)
        .send()
        .await?;
    let body: Value = response.json().await?;
    assert_eq!(body["data"]["access_token"], "stored-access-token");
    Ok(())
}

#[tokio::test]
async fn test_session_takes_precedence_over_bearer() -> Result<(), anyhow::Error> {
    let h = Harness::start().await;
    let cookie = h.server.session_cookie(&session_for("ursula", &["user"]))?;
    let manager_token = h.token("maria", &["manager"]);

    let response = h
        .client
        .get(format!("{}/manager", h.server.url()))
        .header("cookie", &cookie)
        .bearer_auth(&manager_token)
        .send()
        .await?;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    Ok(())
}

#[tokio::test]
async fn test_tampered_session_cookie_is_ignored() -> Result<(), anyhow::Error> {
    let h = Harness::start().await;
    let cookie = h.server.session_cookie(&session_for("carol", &["manager"]))?;
    let tampered = format!("{cookie}x");

    let response = h
        .client
        .get(format!("{}/manager", h.server.url()))
        .header("cookie", tampered)
        .send()
        .await?;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn test_home_reflects_session() -> Result<(), anyhow::Error> {
    let h = Harness::start().await;

    let body: Value = h
        .client
        .get(format!("{}/", h.server.url()))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(body["data"]["authenticated"], false);
    assert_eq!(body["data"]["links"], serde_json::json!(["/login"]));

    let cookie = h.server.session_cookie(&session_for("carol", &["ceo"]))?;
    let body: Value = h
        .client
        .get(format!("{}/", h.server.url()))
        .header("cookie", cookie)
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(body["data"]["authenticated"], true);
    assert_eq!(body["data"]["username"], "carol");
    let links = body["data"]["links"].as_array().unwrap();
    assert!(links.contains(&Value::from("/ceo")));
    assert!(!links.contains(&Value::from("/manager")));
    Ok(())
}

#[tokio::test]
async fn test_audience_enforced_when_configured() -> Result<(), anyhow::Error> {
    let idp = MockIdp::start().await;
    let key = TestSigningKey::rsa_primary()?;
    idp.mount_jwks(&[&key]).await;
    let server = TestGatewayServer::spawn_with(&idp, &[("JWT_AUDIENCE", "gatehouse")]).await?;
    let client = reqwest::Client::new();

    let wrong = TestTokenBuilder::new(&idp.issuer())
        .with_audience("account")
        .sign(&key)?;
    let right = TestTokenBuilder::new(&idp.issuer())
        .with_audience("gatehouse")
        .sign(&key)?;

    let status = |token: String| {
        let request = client
            .get(format!("{}/me", server.url()))
            .bearer_auth(token)
            .send();
        async move { request.await.unwrap().status() }
    };

    assert_eq!(status(wrong).await, StatusCode::UNAUTHORIZED);
    assert_eq!(status(right).await, StatusCode::OK);
    Ok(())
}
