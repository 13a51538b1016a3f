//! Access decisions.
//!
//! Pure functions over a principal and a requirement. No IO, no clock, no
//! caches: the same inputs always produce the same decision.

use crate::auth::identity::Principal;
use std::fmt;

/// What a route demands of its caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessRequirement {
    /// Caller holds this realm role (exact match).
    Role(String),
    /// Caller's token was granted this scope.
    Scope(String),
}

impl AccessRequirement {
    pub fn role(name: impl Into<String>) -> Self {
        AccessRequirement::Role(name.into())
    }

    pub fn scope(name: impl Into<String>) -> Self {
        AccessRequirement::Scope(name.into())
    }
}

impl fmt::Display for AccessRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessRequirement::Role(role) => write!(f, "role:{role}"),
            AccessRequirement::Scope(scope) => write!(f, "scope:{scope}"),
        }
    }
}

/// Why a request was refused. The two reasons map to different status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    Unauthenticated,
    InsufficientPrivilege,
}

impl DenyReason {
    pub fn as_str(self) -> &'static str {
        match self {
            DenyReason::Unauthenticated => "unauthenticated",
            DenyReason::InsufficientPrivilege => "insufficient_privilege",
        }
    }
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(DenyReason),
}

impl Decision {
    pub fn is_allowed(self) -> bool {
        matches!(self, Decision::Allow)
    }
}

/// Decide whether `principal` satisfies `requirement`.
///
/// No principal is always `Unauthenticated`, never `InsufficientPrivilege`.
pub fn authorize(principal: Option<&Principal>, requirement: &AccessRequirement) -> Decision {
    let Some(principal) = principal else {
        return Decision::Deny(DenyReason::Unauthenticated);
    };

    let satisfied = match requirement {
        AccessRequirement::Role(role) => principal.has_role(role),
        AccessRequirement::Scope(scope) => principal.raw_claims().has_scope(scope),
    };

    if satisfied {
        Decision::Allow
    } else {
        Decision::Deny(DenyReason::InsufficientPrivilege)
    }
}

/// Route-level gate. `None` means the route only needs an authenticated caller.
pub fn enforce(principal: Option<&Principal>, requirement: Option<&AccessRequirement>) -> Decision {
    match (principal, requirement) {
        (None, _) => Decision::Deny(DenyReason::Unauthenticated),
        (Some(_), None) => Decision::Allow,
        (Some(principal), Some(requirement)) => authorize(Some(principal), requirement),
    }
}
