//! Browser login flow and token refresh tests.
//!
//! Drives `/login` and `/callback` the way a browser would, with redirects
//! disabled so each hop can be inspected.

// Test code is allowed to use expect/unwrap for assertions
#![allow(clippy::unwrap_used, clippy::expect_used)]

use gatehouse_test_utils::{
    MockIdp, TestGatewayServer, TestSigningKey, TestTokenBuilder, TEST_CLIENT_ID,
};
use reqwest::{header, redirect, StatusCode, Url};
use serde_json::{json, Value};

fn browser() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(redirect::Policy::none())
        .build()
        .unwrap()
}

/// `name=value` part of the response's `Set-Cookie` header.
fn session_cookie(response: &reqwest::Response) -> String {
    let set_cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .expect("Set-Cookie header")
        .to_str()
        .unwrap();
    set_cookie.split(';').next().unwrap().to_string()
}

fn location(response: &reqwest::Response) -> String {
    response
        .headers()
        .get(header::LOCATION)
        .expect("Location header")
        .to_str()
        .unwrap()
        .to_string()
}

fn query_param(url: &str, name: &str) -> Option<String> {
    Url::parse(url)
        .unwrap()
        .query_pairs()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.into_owned())
}

/// Start a login; returns the pending session cookie and the OAuth state.
async fn begin_login(client: &reqwest::Client, server: &TestGatewayServer) -> (String, String) {
    let response = client
        .get(format!("{}/login", server.url()))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    let cookie = session_cookie(&response);
    let state = query_param(&location(&response), "state").expect("state parameter");
    (cookie, state)
}

#[tokio::test]
async fn test_login_redirects_to_authorization_endpoint() -> Result<(), anyhow::Error> {
    let idp = MockIdp::start().await;
    let server = TestGatewayServer::spawn(&idp).await?;

    let response = browser()
        .get(format!("{}/login", server.url()))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    let target = location(&response);
    assert!(target.starts_with(&format!(
        "{}/protocol/openid-connect/auth?",
        idp.issuer()
    )));
    assert_eq!(query_param(&target, "client_id").as_deref(), Some(TEST_CLIENT_ID));
    assert_eq!(query_param(&target, "response_type").as_deref(), Some("code"));
    assert_eq!(
        query_param(&target, "scope").as_deref(),
        Some("openid email profile")
    );
    assert_eq!(
        query_param(&target, "redirect_uri"),
        Some(format!("{}/callback", server.url()))
    );

    let set_cookie = response.headers()[header::SET_COOKIE].to_str()?;
    assert!(set_cookie.starts_with("gatehouse_session="));
    assert!(set_cookie.contains("HttpOnly"));
    assert!(set_cookie.contains("SameSite=Lax"));
    Ok(())
}

#[tokio::test]
async fn test_each_login_gets_fresh_state() -> Result<(), anyhow::Error> {
    let idp = MockIdp::start().await;
    let server = TestGatewayServer::spawn(&idp).await?;
    let client = browser();

    let (_, first) = begin_login(&client, &server).await;
    let (_, second) = begin_login(&client, &server).await;

    assert_ne!(first, second);
    assert!(first.len() >= 43);
    Ok(())
}

#[tokio::test]
async fn test_full_login_establishes_session() -> Result<(), anyhow::Error> {
    let idp = MockIdp::start().await;
    let key = TestSigningKey::rsa_primary()?;
    idp.mount_jwks(&[&key]).await;
    let access_token = TestTokenBuilder::new(&idp.issuer())
        .for_user("user-42")
        .with_username("dana")
        .with_email("dana@example.com")
        .with_roles(&["manager"])
        .sign(&key)?;
    idp.mount_code_exchange("auth-code-1", &access_token, "refresh-1")
        .await;
    let server = TestGatewayServer::spawn(&idp).await?;
    let client = browser();

    let (pending, state) = begin_login(&client, &server).await;

    let response = client
        .get(format!(
            "{}/callback?code=auth-code-1&state={}",
            server.url(),
            state
        ))
        .header(header::COOKIE, &pending)
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/");
    let signed_in = session_cookie(&response);

    let body: Value = client
        .get(format!("{}/me", server.url()))
        .header(header::COOKIE, &signed_in)
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(body["data"]["sub"], "user-42");
    assert_eq!(body["data"]["display_name"], "dana");
    assert_eq!(body["data"]["source"], "session");
    assert_eq!(body["data"]["roles"], json!(["manager"]));

    let response = client
        .get(format!("{}/manager", server.url()))
        .header(header::COOKIE, &signed_in)
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let body: Value = client
        .get(format!("{}/token", server.url()))
        .header(header::COOKIE, &signed_in)
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(body["data"]["access_token"], access_token.as_str());
    assert_eq!(body["data"]["refresh_token"], "refresh-1");
    Ok(())
}

#[tokio::test]
async fn test_callback_state_mismatch_is_rejected() -> Result<(), anyhow::Error> {
    let idp = MockIdp::start().await;
    let server = TestGatewayServer::spawn(&idp).await?;
    let client = browser();
    let (pending, _state) = begin_login(&client, &server).await;

    let response = client
        .get(format!(
            "{}/callback?code=auth-code-1&state=forged-state",
            server.url()
        ))
        .header(header::COOKIE, &pending)
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // and without any pending login at all
    let response = client
        .get(format!("{}/callback?code=auth-code-1&state=anything", server.url()))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // no code was exchanged either way
    assert_eq!(idp.requests_to(&idp.token_path()).await, 0);
    Ok(())
}

#[tokio::test]
async fn test_callback_without_code_or_with_idp_error() -> Result<(), anyhow::Error> {
    let idp = MockIdp::start().await;
    let server = TestGatewayServer::spawn(&idp).await?;
    let client = browser();

    let (pending, state) = begin_login(&client, &server).await;
    let response = client
        .get(format!("{}/callback?state={}", server.url(), state))
        .header(header::COOKIE, &pending)
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let (pending, state) = begin_login(&client, &server).await;
    let response = client
        .get(format!(
            "{}/callback?state={}&error=access_denied&error_description=User+cancelled",
            server.url(),
            state
        ))
        .header(header::COOKIE, &pending)
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn test_callback_rejected_code_is_unauthenticated() -> Result<(), anyhow::Error> {
    let idp = MockIdp::start().await;
    idp.mount_token_error(400).await;
    let server = TestGatewayServer::spawn(&idp).await?;
    let client = browser();
    let (pending, state) = begin_login(&client, &server).await;

    let response = client
        .get(format!("{}/callback?code=used-code&state={}", server.url(), state))
        .header(header::COOKIE, &pending)
        .send()
        .await?;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(response.headers().get(header::SET_COOKIE).is_none());
    Ok(())
}

#[tokio::test]
async fn test_callback_token_without_subject_is_refused() -> Result<(), anyhow::Error> {
    let idp = MockIdp::start().await;
    let key = TestSigningKey::rsa_primary()?;
    idp.mount_jwks(&[&key]).await;
    let access_token = TestTokenBuilder::new(&idp.issuer())
        .without_subject()
        .with_username("ghost")
        .sign(&key)?;
    idp.mount_code_exchange("auth-code-2", &access_token, "refresh-2")
        .await;
    let server = TestGatewayServer::spawn(&idp).await?;
    let client = browser();
    let (pending, state) = begin_login(&client, &server).await;

    let response = client
        .get(format!("{}/callback?code=auth-code-2&state={}", server.url(), state))
        .header(header::COOKIE, &pending)
        .send()
        .await?;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn test_logout_clears_session_and_redirects_to_idp() -> Result<(), anyhow::Error> {
    let idp = MockIdp::start().await;
    let server = TestGatewayServer::spawn(&idp).await?;

    let response = browser()
        .get(format!("{}/logout", server.url()))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    let target = location(&response);
    assert!(target.starts_with(&format!(
        "{}/protocol/openid-connect/logout?",
        idp.issuer()
    )));
    assert_eq!(
        query_param(&target, "post_logout_redirect_uri"),
        Some(format!("{}/", server.url()))
    );
    assert!(response.headers()[header::SET_COOKIE]
        .to_str()?
        .contains("Max-Age=0"));
    Ok(())
}

async fn post_refresh(server: &TestGatewayServer, body: Option<Value>) -> reqwest::Response {
    let request = reqwest::Client::new().post(format!("{}/refresh", server.url()));
    let request = match body {
        Some(body) => request.json(&body),
        None => request
            .header(header::CONTENT_TYPE, "application/json")
            .body("not json"),
    };
    request.send().await.unwrap()
}

#[tokio::test]
async fn test_refresh_requires_token_in_body() -> Result<(), anyhow::Error> {
    let idp = MockIdp::start().await;
    let server = TestGatewayServer::spawn(&idp).await?;

    for body in [None, Some(json!({})), Some(json!({ "refresh_token": "" }))] {
        let response = post_refresh(&server, body).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
    assert_eq!(idp.requests_to(&idp.token_path()).await, 0);
    Ok(())
}

#[tokio::test]
async fn test_refresh_returns_new_tokens() -> Result<(), anyhow::Error> {
    let idp = MockIdp::start().await;
    idp.mount_refresh("refresh-abc", "new-access-token").await;
    let server = TestGatewayServer::spawn(&idp).await?;

    let response = post_refresh(&server, Some(json!({ "refresh_token": "refresh-abc" }))).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body: Value = response.json().await?;
    assert_eq!(body["data"]["access_token"], "new-access-token");
    assert_eq!(body["data"]["refresh_token"], "rotated-refresh-token");
    assert_eq!(body["data"]["token_type"], "Bearer");
    assert_eq!(body["data"]["expires_in"], 300);
    Ok(())
}

#[tokio::test]
async fn test_refresh_rejected_by_idp() -> Result<(), anyhow::Error> {
    let idp = MockIdp::start().await;
    idp.mount_token_error(400).await;
    let server = TestGatewayServer::spawn(&idp).await?;

    let response = post_refresh(&server, Some(json!({ "refresh_token": "revoked" }))).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn test_refresh_idp_server_error_is_bad_gateway() -> Result<(), anyhow::Error> {
    let idp = MockIdp::start().await;
    idp.mount_token_error(500).await;
    let server = TestGatewayServer::spawn(&idp).await?;

    let response = post_refresh(&server, Some(json!({ "refresh_token": "whatever" }))).await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    Ok(())
}

#[tokio::test]
async fn test_refresh_idp_unreachable_is_service_unavailable() -> Result<(), anyhow::Error> {
    let idp = MockIdp::start().await;
    // nothing listens on the discard port
    let server =
        TestGatewayServer::spawn_with(&idp, &[("KEYCLOAK_SERVER_URL", "http://127.0.0.1:9")])
            .await?;

    let response = post_refresh(&server, Some(json!({ "refresh_token": "whatever" }))).await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    Ok(())
}
