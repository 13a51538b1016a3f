//! Identity provider clients: token endpoint, admin credential, directory.

pub mod credential;
pub mod directory;
pub mod token_client;

pub use credential::{AdminCredentialCache, CredentialError};
pub use directory::{DirectoryClient, DirectoryError, GroupNode, KeycloakDirectory, Member};
pub use token_client::{ClientCredentials, TokenClient, TokenError, TokenResponse};
