//! Authentication and authorization core.
//!
//! - `keyset` caches the IdP signing keys
//! - `verifier` turns a bearer token into verified claims
//! - `identity` normalizes claims or session data into a `Principal`
//! - `policy` decides, without side effects, whether a principal may proceed
//! - `gatekeeper` ties these together for request handling

pub mod claims;
pub mod gatekeeper;
pub mod identity;
pub mod keyset;
pub mod policy;
pub mod verifier;

pub use claims::ClaimMap;
pub use gatekeeper::{AuthenticationError, CacheStatusReport, Gatekeeper};
pub use identity::{Principal, PrincipalSource};
pub use keyset::{FetchError, KeySet, KeySetCache};
pub use policy::{authorize, enforce, AccessRequirement, Decision, DenyReason};
pub use verifier::{ClaimsVerifier, VerificationError};
