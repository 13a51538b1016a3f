//! Canonical principal and the two ways of obtaining one.
//!
//! `Principal::from_claims` normalizes a verified token; `Principal::from_session`
//! rebuilds the same shape from identity stored in the session cookie at
//! login. Neither re-verifies anything.

use crate::auth::claims::{ClaimMap, RealmAccess};
use crate::session::SessionUser;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;

/// Where a principal's trust comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PrincipalSource {
    /// Established at login, bounded by session lifetime.
    Session,
    /// Verified bearer token on this request.
    Bearer,
}

/// Authenticated identity for one request. Immutable once built.
#[derive(Clone, PartialEq)]
pub struct Principal {
    subject_id: String,
    display_name: String,
    email: Option<String>,
    roles: BTreeSet<String>,
    groups: BTreeSet<String>,
    raw_claims: ClaimMap,
    source: PrincipalSource,
}

impl fmt::Debug for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Principal")
            .field("subject_id", &"[REDACTED]")
            .field("display_name", &self.display_name)
            .field("roles", &self.roles)
            .field("groups", &self.groups)
            .field("source", &self.source)
            .finish()
    }
}

impl Principal {
    /// Normalize verified claims.
    ///
    /// Missing optional claims become empty values. A missing `sub` yields an
    /// empty subject; callers check [`Principal::has_subject`] and flag it.
    pub fn from_claims(claims: ClaimMap) -> Self {
        let subject_id = claims.sub.clone().unwrap_or_default();
        let display_name = display_name_for(
            claims.preferred_username.as_deref(),
            claims.name.as_deref(),
            claims.email.as_deref(),
            &subject_id,
        );
        let roles = claims.realm_roles().iter().cloned().collect();
        let groups = claims.groups.iter().flatten().cloned().collect();

        Self {
            subject_id,
            display_name,
            email: claims.email.clone(),
            roles,
            groups,
            raw_claims: claims,
            source: PrincipalSource::Bearer,
        }
    }

    /// Rebuild from session-stored identity. `None` without a subject.
    pub fn from_session(user: Option<&SessionUser>) -> Option<Self> {
        let user = user?;
        if user.sub.is_empty() {
            return None;
        }

        let raw_claims = ClaimMap {
            sub: Some(user.sub.clone()),
            email: user.email.clone(),
            preferred_username: user.preferred_username.clone(),
            name: user.name.clone(),
            realm_access: Some(RealmAccess {
                roles: user.roles.clone(),
            }),
            groups: Some(user.groups.clone()),
            scope: user.scope.clone(),
            ..ClaimMap::default()
        };

        Some(Self {
            subject_id: user.sub.clone(),
            display_name: display_name_for(
                user.preferred_username.as_deref(),
                user.name.as_deref(),
                user.email.as_deref(),
                &user.sub,
            ),
            email: user.email.clone(),
            roles: user.roles.iter().cloned().collect(),
            groups: user.groups.iter().cloned().collect(),
            raw_claims,
            source: PrincipalSource::Session,
        })
    }

    pub fn subject_id(&self) -> &str {
        &self.subject_id
    }

    /// False when the token carried no `sub`.
    pub fn has_subject(&self) -> bool {
        !self.subject_id.is_empty()
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    pub fn roles(&self) -> &BTreeSet<String> {
        &self.roles
    }

    pub fn groups(&self) -> &BTreeSet<String> {
        &self.groups
    }

    pub fn raw_claims(&self) -> &ClaimMap {
        &self.raw_claims
    }

    pub fn source(&self) -> PrincipalSource {
        self.source
    }

    /// Exact, case-sensitive role membership.
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }
}

fn display_name_for(
    preferred_username: Option<&str>,
    name: Option<&str>,
    email: Option<&str>,
    subject_id: &str,
) -> String {
    [preferred_username, name, email]
        .into_iter()
        .flatten()
        .find(|s| !s.is_empty())
        .unwrap_or(subject_id)
        .to_string()
}
