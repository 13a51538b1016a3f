//! Builder patterns for test data construction
//!
//! Provides a fluent API for IdP-shaped access tokens.

use crate::crypto_fixtures::{FixtureError, TestSigningKey};
use chrono::{Duration, Utc};
use jsonwebtoken::{encode, Header};
use serde_json::{json, Map, Value};

/// Builder for Keycloak-style access tokens
///
/// # Example
/// ```rust,ignore
/// let token = TestTokenBuilder::new("http://idp/realms/test")
///     .for_user("alice")
///     .with_roles(&["manager"])
///     .with_scope("openid read:data")
///     .expires_in(300)
///     .sign(&key)?;
/// ```
pub struct TestTokenBuilder {
    claims: Map<String, Value>,
}

impl TestTokenBuilder {
    /// Token from `issuer` for `test-subject`, valid for one hour.
    pub fn new(issuer: &str) -> Self {
        let now = Utc::now();
        let mut claims = Map::new();
        claims.insert("iss".to_string(), json!(issuer));
        claims.insert("sub".to_string(), json!("test-subject"));
        claims.insert("iat".to_string(), json!(now.timestamp()));
        claims.insert(
            "exp".to_string(),
            json!((now + Duration::seconds(3600)).timestamp()),
        );
        claims.insert("typ".to_string(), json!("Bearer"));
        Self { claims }
    }

    /// Set the subject; also used as `preferred_username` unless one is set.
    pub fn for_user(mut self, subject: &str) -> Self {
        self.claims.insert("sub".to_string(), json!(subject));
        self.claims
            .entry("preferred_username")
            .or_insert_with(|| json!(subject));
        self
    }

    /// Drop `sub` entirely.
    pub fn without_subject(mut self) -> Self {
        self.claims.remove("sub");
        self
    }

    pub fn with_username(mut self, username: &str) -> Self {
        self.claims
            .insert("preferred_username".to_string(), json!(username));
        self
    }

    pub fn with_email(mut self, email: &str) -> Self {
        self.claims.insert("email".to_string(), json!(email));
        self
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.claims.insert("name".to_string(), json!(name));
        self
    }

    /// Set `realm_access.roles`
    pub fn with_roles(mut self, roles: &[&str]) -> Self {
        self.claims
            .insert("realm_access".to_string(), json!({ "roles": roles }));
        self
    }

    pub fn with_groups(mut self, groups: &[&str]) -> Self {
        self.claims.insert("groups".to_string(), json!(groups));
        self
    }

    /// Set the scope (space-separated)
    pub fn with_scope(mut self, scope: &str) -> Self {
        self.claims.insert("scope".to_string(), json!(scope));
        self
    }

    pub fn with_audience(mut self, audience: &str) -> Self {
        self.claims.insert("aud".to_string(), json!(audience));
        self
    }

    pub fn with_issuer(mut self, issuer: &str) -> Self {
        self.claims.insert("iss".to_string(), json!(issuer));
        self
    }

    /// Set expiration in seconds from now (negative for an expired token)
    pub fn expires_in(mut self, seconds: i64) -> Self {
        self.claims.insert(
            "exp".to_string(),
            json!((Utc::now() + Duration::seconds(seconds)).timestamp()),
        );
        self
    }

    /// Set issued-at timestamp
    pub fn issued_at(mut self, timestamp: i64) -> Self {
        self.claims.insert("iat".to_string(), json!(timestamp));
        self
    }

    /// Set not-before in seconds from now
    pub fn not_before_in(mut self, seconds: i64) -> Self {
        self.claims.insert(
            "nbf".to_string(),
            json!((Utc::now() + Duration::seconds(seconds)).timestamp()),
        );
        self
    }

    /// Any other claim.
    pub fn with_claim(mut self, name: &str, value: Value) -> Self {
        self.claims.insert(name.to_string(), value);
        self
    }

    /// Build the claims as a JSON value
    pub fn build(self) -> Value {
        Value::Object(self.claims)
    }

    /// Sign with `key`, putting its `kid` and algorithm in the header.
    pub fn sign(self, key: &TestSigningKey) -> Result<String, FixtureError> {
        let mut header = Header::new(key.algorithm());
        header.kid = Some(key.kid().to_string());
        self.sign_with_header(key, header)
    }

    /// Sign with an explicit header, e.g. a `kid` the key set lacks.
    pub fn sign_with_header(
        self,
        key: &TestSigningKey,
        header: Header,
    ) -> Result<String, FixtureError> {
        encode(&header, &self.build(), key.encoding_key())
            .map_err(|e| FixtureError::Crypto(format!("Failed to sign test token: {e}")))
    }
}
