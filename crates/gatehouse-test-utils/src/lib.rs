//! # Gatehouse Test Utilities
//!
//! Shared test utilities for the Gatehouse service.
//!
//! This crate provides:
//! - Signing-key fixtures (fixed RSA keys, seeded Ed25519 keys)
//! - Test data builders (`TestTokenBuilder`)
//! - A wiremock-backed identity provider (`MockIdp`)
//! - Server test harness (`TestGatewayServer` for E2E tests)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use gatehouse_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() -> anyhow::Result<()> {
//!     let idp = MockIdp::start().await;
//!     let key = TestSigningKey::rsa_primary()?;
//!     idp.mount_jwks(&[&key]).await;
//!
//!     let server = TestGatewayServer::spawn(&idp).await?;
//!     let token = TestTokenBuilder::new(&idp.issuer())
//!         .for_user("alice")
//!         .with_roles(&["manager"])
//!         .sign(&key)?;
//!
//!     let response = reqwest::Client::new()
//!         .get(format!("{}/manager", server.url()))
//!         .bearer_auth(token)
//!         .send()
//!         .await?;
//!     assert_eq!(response.status(), 200);
//!     Ok(())
//! }
//! ```

pub mod crypto_fixtures;
pub mod mock_idp;
pub mod server_harness;
pub mod token_builders;

// Re-export commonly used items
pub use crypto_fixtures::*;
pub use mock_idp::*;
pub use server_harness::*;
pub use token_builders::*;
