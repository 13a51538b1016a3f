//! Secret types for values that must never reach a log line.
//!
//! Re-exports [`secrecy`] so every crate in the workspace wraps OAuth client
//! secrets, admin credentials, session keys and raw bearer tokens the same way.
//! `SecretString` redacts itself in `Debug`, so a struct that derives `Debug`
//! stays safe to pass to `tracing`.
//!
//! ```rust
//! use common::secret::{ExposeSecret, SecretString};
//!
//! #[derive(Debug)]
//! struct AdminCredentials {
//!     client_id: String,
//!     client_secret: SecretString,
//! }
//!
//! let creds = AdminCredentials {
//!     client_id: "gatehouse-admin".to_string(),
//!     client_secret: SecretString::from("s3cr3t"),
//! };
//!
//! assert!(!format!("{creds:?}").contains("s3cr3t"));
//! assert_eq!(creds.client_secret.expose_secret(), "s3cr3t");
//! ```
//!
//! Reading the value requires an explicit `expose_secret()`, which keeps every
//! place a secret leaves its wrapper easy to grep for.

pub use secrecy::{ExposeSecret, SecretBox, SecretString};
