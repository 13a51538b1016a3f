//! Typed claim map for verified tokens.
//!
//! Named fields cover every claim policy code reads, so a typo is a compile
//! error rather than a silent `None`. Anything else the IdP adds is kept in
//! `extra`. The `sub` and `email` fields are redacted in Debug output.

use serde::{Deserialize, Serialize};
use std::fmt;

/// `aud` may be a single string or a list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    One(String),
    Many(Vec<String>),
}

impl Audience {
    pub fn contains(&self, audience: &str) -> bool {
        match self {
            Audience::One(a) => a == audience,
            Audience::Many(list) => list.iter().any(|a| a == audience),
        }
    }
}

/// Keycloak's `realm_access` claim.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RealmAccess {
    #[serde(default)]
    pub roles: Vec<String>,
}

/// Decoded claims of a verified token.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClaimMap {
    /// Subject - redacted in Debug output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<Audience>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,

    /// Email - redacted in Debug output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_username: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub realm_access: Option<RealmAccess>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub groups: Option<Vec<String>>,

    /// Space-separated scopes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,

    /// Every claim without a named field.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl fmt::Debug for ClaimMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClaimMap")
            .field("sub", &self.sub.as_ref().map(|_| "[REDACTED]"))
            .field("iss", &self.iss)
            .field("aud", &self.aud)
            .field("exp", &self.exp)
            .field("iat", &self.iat)
            .field("email", &self.email.as_ref().map(|_| "[REDACTED]"))
            .field("preferred_username", &self.preferred_username)
            .field("realm_access", &self.realm_access)
            .field("groups", &self.groups)
            .field("scope", &self.scope)
            .field("extra_claims", &self.extra.len())
            .finish()
    }
}

impl ClaimMap {
    /// Realm roles, empty when the claim is absent.
    pub fn realm_roles(&self) -> &[String] {
        self.realm_access
            .as_ref()
            .map(|ra| ra.roles.as_slice())
            .unwrap_or_default()
    }

    /// Scopes split on whitespace; a missing claim yields no scopes.
    pub fn scopes(&self) -> impl Iterator<Item = &str> {
        self.scope.as_deref().unwrap_or_default().split_whitespace()
    }

    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes().any(|s| s == scope)
    }

    /// A claim without a named field, e.g. `resource_access` or `azp`.
    pub fn claim(&self, name: &str) -> Option<&serde_json::Value> {
        self.extra.get(name)
    }
}
