//! CEO dashboard tests against a mocked admin API.

// Test code is allowed to use expect/unwrap for assertions
#![allow(clippy::unwrap_used, clippy::expect_used)]

use gatehouse_test_utils::{
    group_json, member_json, MockIdp, TestGatewayServer, TestSigningKey, TestTokenBuilder,
};
use reqwest::StatusCode;
use serde_json::{json, Value};

fn ceo_token(idp: &MockIdp, key: &TestSigningKey) -> String {
    TestTokenBuilder::new(&idp.issuer())
        .for_user("ceo-1")
        .with_username("frank")
        .with_email("frank@example.com")
        .with_roles(&["ceo"])
        .sign(key)
        .unwrap()
}

async fn get_ceo(server: &TestGatewayServer, token: &str) -> reqwest::Response {
    reqwest::Client::new()
        .get(format!("{}/ceo", server.url()))
        .bearer_auth(token)
        .send()
        .await
        .unwrap()
}

#[tokio::test]
async fn test_ceo_dashboard_lists_hierarchy() -> Result<(), anyhow::Error> {
    let idp = MockIdp::start().await;
    let key = TestSigningKey::rsa_primary()?;
    idp.mount_jwks(&[&key]).await;
    idp.mount_client_credentials(300, 1).await;

    let emea = group_json("g-emea", "emea", Vec::new());
    let sales = group_json("g-sales", "sales", vec![emea.clone()]);
    let engineering = group_json("g-eng", "engineering", Vec::new());
    idp.mount_groups(json!([sales.clone(), engineering.clone()])).await;
    idp.mount_group(
        sales,
        json!([member_json("u1", "sam"), member_json("u2", "sue")]),
    )
    .await;
    idp.mount_group(emea, json!([member_json("u3", "eve")])).await;
    idp.mount_group(engineering, json!([member_json("u4", "ed")]))
        .await;

    let server = TestGatewayServer::spawn(&idp).await?;
    let response = get_ceo(&server, &ceo_token(&idp, &key)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body: Value = response.json().await?;
    let data = &body["data"];
    assert_eq!(data["ceo"]["username"], "frank");
    assert_eq!(data["ceo"]["email"], "frank@example.com");
    assert_eq!(data["totalTeams"], 2);
    assert_eq!(data["totalEmployees"], 4);
    assert_eq!(data["teams"][0]["name"], "sales");
    assert_eq!(data["teams"][0]["members"][1]["username"], "sue");
    assert_eq!(data["teams"][0]["subGroups"][0]["name"], "emea");
    assert!(body["metadata"]["ttl"].is_object());
    Ok(())
}

#[tokio::test]
async fn test_admin_credential_reused_across_requests() -> Result<(), anyhow::Error> {
    let idp = MockIdp::start().await;
    let key = TestSigningKey::rsa_primary()?;
    idp.mount_jwks(&[&key]).await;
    // verified on drop: one grant for all three dashboards
    idp.mount_client_credentials(300, 1).await;
    idp.mount_groups(json!([])).await;

    let server = TestGatewayServer::spawn(&idp).await?;
    let token = ceo_token(&idp, &key);
    for _ in 0..3 {
        let response = get_ceo(&server, &token).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body: Value = response.json().await?;
        assert_eq!(body["data"]["totalTeams"], 0);
    }
    Ok(())
}

#[tokio::test]
async fn test_ceo_dashboard_without_admin_account() -> Result<(), anyhow::Error> {
    let idp = MockIdp::start().await;
    let key = TestSigningKey::rsa_primary()?;
    idp.mount_jwks(&[&key]).await;
    let server = TestGatewayServer::spawn_with(
        &idp,
        &[
            ("KEYCLOAK_ADMIN_CLIENT_ID", ""),
            ("KEYCLOAK_ADMIN_CLIENT_SECRET", ""),
        ],
    )
    .await?;

    let response = get_ceo(&server, &ceo_token(&idp, &key)).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = response.json().await?;
    assert_eq!(body["error"]["code"], "CONFIGURATION_ERROR");

    assert_eq!(idp.requests_to(&idp.token_path()).await, 0);
    Ok(())
}

#[tokio::test]
async fn test_admin_secret_missing_is_configuration_error() -> Result<(), anyhow::Error> {
    let idp = MockIdp::start().await;
    let key = TestSigningKey::rsa_primary()?;
    idp.mount_jwks(&[&key]).await;

    let server = TestGatewayServer::spawn_with(
        &idp,
        &[
            ("KEYCLOAK_ADMIN_CLIENT_ID", "gatehouse-admin"),
            ("KEYCLOAK_ADMIN_CLIENT_SECRET", ""),
        ],
    )
    .await?;

    let response = get_ceo(&server, &ceo_token(&idp, &key)).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = response.json().await?;
    assert_eq!(body["error"]["code"], "CONFIGURATION_ERROR");

    assert_eq!(idp.requests_to(&idp.token_path()).await, 0);
    Ok(())
}

#[tokio::test]
async fn test_admin_api_failure_is_bad_gateway() -> Result<(), anyhow::Error> {
    let idp = MockIdp::start().await;
    let key = TestSigningKey::rsa_primary()?;
    idp.mount_jwks(&[&key]).await;
    idp.mount_client_credentials(300, 1).await;
    idp.mount_groups_failure(500).await;

    let server = TestGatewayServer::spawn(&idp).await?;
    let response = get_ceo(&server, &ceo_token(&idp, &key)).await;

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    Ok(())
}

#[tokio::test]
async fn test_directory_is_not_consulted_for_access() -> Result<(), anyhow::Error> {
    let idp = MockIdp::start().await;
    let key = TestSigningKey::rsa_primary()?;
    idp.mount_jwks(&[&key]).await;
    let server = TestGatewayServer::spawn(&idp).await?;

    // group membership in the token does not stand in for the ceo role
    let token = TestTokenBuilder::new(&idp.issuer())
        .with_groups(&["/ceo", "/executives"])
        .with_roles(&["manager"])
        .sign(&key)?;
    let response = get_ceo(&server, &token).await;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(idp.requests_to(&idp.token_path()).await, 0);
    Ok(())
}
