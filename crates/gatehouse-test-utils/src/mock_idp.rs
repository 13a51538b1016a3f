//! Mock identity provider
//!
//! A `wiremock` server that answers the Keycloak endpoints Gatehouse calls:
//! the realm certs endpoint, the token endpoint and the admin group API.
//! Mounts that take an `expected_calls` argument are verified when the
//! `MockIdp` is dropped.

use crate::crypto_fixtures::{jwks_document, TestSigningKey};
use serde_json::{json, Value};
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Realm every mock path lives under.
pub const TEST_REALM: &str = "test";

/// Access token the mock issues for `client_credentials`.
pub const ADMIN_ACCESS_TOKEN: &str = "mock-admin-access-token";

pub struct MockIdp {
    server: MockServer,
}

impl MockIdp {
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    /// Server base URL (`KEYCLOAK_SERVER_URL`).
    pub fn url(&self) -> String {
        self.server.uri()
    }

    pub fn realm(&self) -> &'static str {
        TEST_REALM
    }

    /// `{url}/realms/test`, the issuer tokens must carry.
    pub fn issuer(&self) -> String {
        format!("{}/realms/{}", self.server.uri(), TEST_REALM)
    }

    pub fn certs_path(&self) -> String {
        format!("/realms/{TEST_REALM}/protocol/openid-connect/certs")
    }

    pub fn token_path(&self) -> String {
        format!("/realms/{TEST_REALM}/protocol/openid-connect/token")
    }

    fn admin_path(&self, suffix: &str) -> String {
        format!("/admin/realms/{TEST_REALM}{suffix}")
    }

    pub fn server(&self) -> &MockServer {
        &self.server
    }

    /// Publish `keys` at the certs endpoint.
    pub async fn mount_jwks(&self, keys: &[&TestSigningKey]) {
        Mock::given(method("GET"))
            .and(path(self.certs_path()))
            .respond_with(ResponseTemplate::new(200).set_body_json(jwks_document(keys)))
            .mount(&self.server)
            .await;
    }

    /// Publish `keys` and require exactly `expected_calls` fetches.
    pub async fn mount_jwks_expecting(&self, keys: &[&TestSigningKey], expected_calls: u64) {
        Mock::given(method("GET"))
            .and(path(self.certs_path()))
            .respond_with(ResponseTemplate::new(200).set_body_json(jwks_document(keys)))
            .expect(expected_calls)
            .mount(&self.server)
            .await;
    }

    /// Certs endpoint answering `status`.
    pub async fn mount_jwks_failure(&self, status: u16) {
        Mock::given(method("GET"))
            .and(path(self.certs_path()))
            .respond_with(ResponseTemplate::new(status))
            .mount(&self.server)
            .await;
    }

    /// `client_credentials` grant issuing [`ADMIN_ACCESS_TOKEN`].
    pub async fn mount_client_credentials(&self, expires_in: u64, expected_calls: u64) {
        Mock::given(method("POST"))
            .and(path(self.token_path()))
            .and(body_string_contains("grant_type=client_credentials"))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body(
                ADMIN_ACCESS_TOKEN,
                None,
                expires_in,
            )))
            .expect(expected_calls)
            .mount(&self.server)
            .await;
    }

    /// `authorization_code` grant for `code` issuing `access_token`.
    pub async fn mount_code_exchange(&self, code: &str, access_token: &str, refresh_token: &str) {
        Mock::given(method("POST"))
            .and(path(self.token_path()))
            .and(body_string_contains("grant_type=authorization_code"))
            .and(body_string_contains(format!("code={code}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body(
                access_token,
                Some(refresh_token),
                300,
            )))
            .mount(&self.server)
            .await;
    }

    /// `refresh_token` grant accepting `refresh_token`.
    pub async fn mount_refresh(&self, refresh_token: &str, new_access_token: &str) {
        Mock::given(method("POST"))
            .and(path(self.token_path()))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains(format!("refresh_token={refresh_token}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body(
                new_access_token,
                Some("rotated-refresh-token"),
                300,
            )))
            .mount(&self.server)
            .await;
    }

    /// Token endpoint answering `status` with an OAuth error body for every
    /// request not matched by an earlier mount.
    pub async fn mount_token_error(&self, status: u16) {
        Mock::given(method("POST"))
            .and(path(self.token_path()))
            .respond_with(ResponseTemplate::new(status).set_body_json(json!({
                "error": "invalid_grant",
                "error_description": "Token is not active"
            })))
            .mount(&self.server)
            .await;
    }

    /// Admin API: `GET /groups`.
    pub async fn mount_groups(&self, groups: Value) {
        Mock::given(method("GET"))
            .and(path(self.admin_path("/groups")))
            .and(header(
                "authorization",
                format!("Bearer {ADMIN_ACCESS_TOKEN}").as_str(),
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(groups))
            .mount(&self.server)
            .await;
    }

    /// Admin API: `GET /groups/{id}` (with `subGroups`) and its members.
    pub async fn mount_group(&self, group: Value, members: Value) {
        let id = group["id"].as_str().unwrap_or_default().to_string();
        Mock::given(method("GET"))
            .and(path(self.admin_path(&format!("/groups/{id}"))))
            .respond_with(ResponseTemplate::new(200).set_body_json(group))
            .mount(&self.server)
            .await;
        Mock::given(method("GET"))
            .and(path(self.admin_path(&format!("/groups/{id}/members"))))
            .respond_with(ResponseTemplate::new(200).set_body_json(members))
            .mount(&self.server)
            .await;
    }

    /// Admin API answering `status` for every group listing.
    pub async fn mount_groups_failure(&self, status: u16) {
        Mock::given(method("GET"))
            .and(path(self.admin_path("/groups")))
            .respond_with(ResponseTemplate::new(status))
            .mount(&self.server)
            .await;
    }

    /// Requests the mock has received on `path`.
    pub async fn requests_to(&self, request_path: &str) -> usize {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|r| r.url.path() == request_path)
            .count()
    }
}

fn token_body(access_token: &str, refresh_token: Option<&str>, expires_in: u64) -> Value {
    let mut body = json!({
        "access_token": access_token,
        "token_type": "Bearer",
        "expires_in": expires_in,
    });
    if let Some(refresh_token) = refresh_token {
        body["refresh_token"] = json!(refresh_token);
        body["refresh_expires_in"] = json!(1800);
    }
    body
}

/// Group JSON as the admin API returns it.
pub fn group_json(id: &str, name: &str, sub_groups: Vec<Value>) -> Value {
    json!({
        "id": id,
        "name": name,
        "path": format!("/{name}"),
        "subGroups": sub_groups,
    })
}

/// Member JSON as the admin API returns it.
pub fn member_json(id: &str, username: &str) -> Value {
    json!({
        "id": id,
        "username": username,
        "email": format!("{username}@example.com"),
    })
}
