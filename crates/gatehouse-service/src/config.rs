//! Gatehouse configuration.
//!
//! Configuration is loaded from environment variables. Client secrets and the
//! session signing key are held as `SecretString` and redacted in Debug output.

use common::jwt::{DEFAULT_CLOCK_SKEW, MAX_CLOCK_SKEW};
use common::secret::{ExposeSecret, SecretString};
use jsonwebtoken::Algorithm;
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Default key-set cache TTL in seconds (10 minutes).
pub const DEFAULT_JWKS_CACHE_TTL_SECONDS: u64 = 600;

/// Default admin credential cache TTL in seconds (5 minutes).
pub const DEFAULT_ADMIN_TOKEN_CACHE_TTL_SECONDS: u64 = 300;

/// Default capacity for both verification caches.
pub const DEFAULT_CACHE_MAX_ENTRIES: usize = 10;

/// Default TTL advertised for user info responses.
pub const DEFAULT_USER_INFO_CACHE_TTL_SECONDS: u64 = 300;

/// Default timeout for every call to the identity provider.
pub const DEFAULT_IDP_HTTP_TIMEOUT_SECONDS: u64 = 10;

/// Default session lifetime (14 days).
pub const DEFAULT_SESSION_MAX_AGE_SECONDS: u64 = 14 * 24 * 60 * 60;

/// Minimum session signing key length in bytes.
pub const MIN_SESSION_SECRET_BYTES: usize = 32;

const DEV_SESSION_SECRET: &str = "gatehouse-development-session-secret-not-for-prod";

/// Deployment environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

/// Gatehouse configuration.
#[derive(Clone)]
pub struct Config {
    /// Deployment environment (default: development).
    pub environment: Environment,

    /// Server bind address (default: "0.0.0.0:8000").
    pub bind_address: String,

    /// Externally visible base URL, used to build the OAuth redirect URI.
    pub public_base_url: String,

    /// Identity provider base URL, without trailing slash.
    pub idp_server_url: String,

    /// Realm on the identity provider.
    pub realm: String,

    /// Exact issuer string tokens must carry.
    pub issuer: String,

    /// OAuth client used for the login and refresh flows.
    pub client_id: Option<String>,
    pub client_secret: Option<SecretString>,

    /// Service identity used for the administrative API.
    pub admin_client_id: Option<String>,
    pub admin_client_secret: Option<SecretString>,

    /// The single accepted signing algorithm.
    pub jwt_algorithm: Algorithm,

    /// Audience to require, if any.
    pub jwt_audience: Option<String>,

    /// Clock skew tolerance for `iat`.
    pub jwt_clock_skew: Duration,

    pub jwks_cache_ttl: Duration,
    pub jwks_cache_max_entries: usize,

    pub admin_token_cache_ttl: Duration,
    pub admin_token_cache_max_entries: usize,

    /// TTL advertised to clients of `/me`.
    pub user_info_cache_ttl: Duration,

    /// Timeout applied to every IdP request.
    pub idp_http_timeout: Duration,

    /// HMAC key for session cookies.
    pub session_secret: SecretString,

    /// Session cookie lifetime.
    pub session_max_age: Duration,

    /// Allowed CORS origins. Empty means any origin (development only).
    pub cors_allowed_origins: Vec<String>,
}

/// Custom Debug implementation that redacts secrets.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("environment", &self.environment)
            .field("bind_address", &self.bind_address)
            .field("public_base_url", &self.public_base_url)
            .field("idp_server_url", &self.idp_server_url)
            .field("realm", &self.realm)
            .field("issuer", &self.issuer)
            .field("client_id", &self.client_id)
            .field("client_secret", &redacted(self.client_secret.as_ref()))
            .field("admin_client_id", &self.admin_client_id)
            .field(
                "admin_client_secret",
                &redacted(self.admin_client_secret.as_ref()),
            )
            .field("jwt_algorithm", &self.jwt_algorithm)
            .field("jwt_audience", &self.jwt_audience)
            .field("jwt_clock_skew", &self.jwt_clock_skew)
            .field("jwks_cache_ttl", &self.jwks_cache_ttl)
            .field("jwks_cache_max_entries", &self.jwks_cache_max_entries)
            .field("admin_token_cache_ttl", &self.admin_token_cache_ttl)
            .field(
                "admin_token_cache_max_entries",
                &self.admin_token_cache_max_entries,
            )
            .field("user_info_cache_ttl", &self.user_info_cache_ttl)
            .field("idp_http_timeout", &self.idp_http_timeout)
            .field("session_secret", &"[REDACTED]")
            .field("session_max_age", &self.session_max_age)
            .field("cors_allowed_origins", &self.cors_allowed_origins)
            .finish()
    }
}

fn redacted(value: Option<&SecretString>) -> Option<&'static str> {
    value.map(|_| "[REDACTED]")
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid ENV value: {0}")]
    InvalidEnvironment(String),

    #[error("Invalid JWT algorithm: {0}")]
    InvalidAlgorithm(String),

    #[error("Invalid JWT clock skew configuration: {0}")]
    InvalidJwtClockSkew(String),

    #[error("Invalid numeric configuration: {0}")]
    InvalidNumber(String),

    #[error("Invalid session secret: {0}")]
    WeakSessionSecret(String),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let environment = match vars.get("ENV").map(|s| s.to_ascii_lowercase()).as_deref() {
            None | Some("development") | Some("dev") => Environment::Development,
            Some("production") | Some("prod") => Environment::Production,
            Some(other) => return Err(ConfigError::InvalidEnvironment(other.to_string())),
        };

        let bind_address = vars
            .get("BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| "0.0.0.0:8000".to_string());

        let public_base_url = vars
            .get("PUBLIC_BASE_URL")
            .map(|s| s.trim_end_matches('/').to_string())
            .unwrap_or_else(|| "http://localhost:8000".to_string());

        let idp_server_url = vars
            .get("KEYCLOAK_SERVER_URL")
            .map(|s| s.trim_end_matches('/').to_string())
            .unwrap_or_else(|| "http://localhost:8080".to_string());

        let realm = non_empty(vars, "KEYCLOAK_REALM")
            .ok_or_else(|| ConfigError::MissingEnvVar("KEYCLOAK_REALM".to_string()))?;

        let issuer = non_empty(vars, "KEYCLOAK_ISSUER")
            .unwrap_or_else(|| format!("{idp_server_url}/realms/{realm}"));

        let client_id = non_empty(vars, "KEYCLOAK_CLIENT_ID");
        let client_secret = non_empty(vars, "KEYCLOAK_CLIENT_SECRET").map(SecretString::from);
        let admin_client_id = non_empty(vars, "KEYCLOAK_ADMIN_CLIENT_ID");
        let admin_client_secret =
            non_empty(vars, "KEYCLOAK_ADMIN_CLIENT_SECRET").map(SecretString::from);

        let jwt_algorithm = match vars.get("JWT_ALGORITHM").map(String::as_str) {
            None => Algorithm::RS256,
            Some(value) => parse_algorithm(value)?,
        };

        let jwt_audience = non_empty(vars, "JWT_AUDIENCE");

        let jwt_clock_skew = if let Some(value_str) = vars.get("JWT_CLOCK_SKEW_SECONDS") {
            let value: u64 = value_str.parse().map_err(|e| {
                ConfigError::InvalidJwtClockSkew(format!(
                    "JWT_CLOCK_SKEW_SECONDS must be a valid integer, got '{}': {}",
                    value_str, e
                ))
            })?;

            if value == 0 {
                return Err(ConfigError::InvalidJwtClockSkew(
                    "JWT_CLOCK_SKEW_SECONDS must be positive".to_string(),
                ));
            }

            if value > MAX_CLOCK_SKEW.as_secs() {
                return Err(ConfigError::InvalidJwtClockSkew(format!(
                    "JWT_CLOCK_SKEW_SECONDS must not exceed {} seconds, got {}",
                    MAX_CLOCK_SKEW.as_secs(),
                    value
                )));
            }

            Duration::from_secs(value)
        } else {
            DEFAULT_CLOCK_SKEW
        };

        let jwks_cache_ttl = Duration::from_secs(positive(
            vars,
            "JWKS_CACHE_TTL",
            DEFAULT_JWKS_CACHE_TTL_SECONDS,
        )?);
        let jwks_cache_max_entries =
            positive_usize(vars, "JWKS_CACHE_MAXSIZE", DEFAULT_CACHE_MAX_ENTRIES)?;
        let admin_token_cache_ttl = Duration::from_secs(positive(
            vars,
            "ADMIN_TOKEN_CACHE_TTL",
            DEFAULT_ADMIN_TOKEN_CACHE_TTL_SECONDS,
        )?);
        let admin_token_cache_max_entries =
            positive_usize(vars, "ADMIN_TOKEN_CACHE_MAXSIZE", DEFAULT_CACHE_MAX_ENTRIES)?;
        let user_info_cache_ttl = Duration::from_secs(positive(
            vars,
            "USER_INFO_CACHE_TTL",
            DEFAULT_USER_INFO_CACHE_TTL_SECONDS,
        )?);
        let idp_http_timeout = Duration::from_secs(positive(
            vars,
            "IDP_HTTP_TIMEOUT_SECONDS",
            DEFAULT_IDP_HTTP_TIMEOUT_SECONDS,
        )?);
        let session_max_age = Duration::from_secs(positive(
            vars,
            "SESSION_MAX_AGE_SECONDS",
            DEFAULT_SESSION_MAX_AGE_SECONDS,
        )?);

        let session_secret = match (non_empty(vars, "SESSION_SECRET_KEY"), environment) {
            (Some(secret), _) => SecretString::from(secret),
            (None, Environment::Development) => SecretString::from(DEV_SESSION_SECRET),
            (None, Environment::Production) => {
                return Err(ConfigError::MissingEnvVar(
                    "SESSION_SECRET_KEY".to_string(),
                ))
            }
        };
        if session_secret.expose_secret().len() < MIN_SESSION_SECRET_BYTES {
            return Err(ConfigError::WeakSessionSecret(format!(
                "SESSION_SECRET_KEY must be at least {MIN_SESSION_SECRET_BYTES} bytes"
            )));
        }

        let cors_allowed_origins: Vec<String> = vars
            .get("CORS_ALLOWED_ORIGINS")
            .map(|s| {
                s.split(',')
                    .map(str::trim)
                    .filter(|o| !o.is_empty() && *o != "*")
                    .map(ToString::to_string)
                    .collect()
            })
            .unwrap_or_default();
        if environment == Environment::Production && cors_allowed_origins.is_empty() {
            return Err(ConfigError::MissingEnvVar(
                "CORS_ALLOWED_ORIGINS".to_string(),
            ));
        }

        Ok(Config {
            environment,
            bind_address,
            public_base_url,
            idp_server_url,
            realm,
            issuer,
            client_id,
            client_secret,
            admin_client_id,
            admin_client_secret,
            jwt_algorithm,
            jwt_audience,
            jwt_clock_skew,
            jwks_cache_ttl,
            jwks_cache_max_entries,
            admin_token_cache_ttl,
            admin_token_cache_max_entries,
            user_info_cache_ttl,
            idp_http_timeout,
            session_secret,
            session_max_age,
            cors_allowed_origins,
        })
    }

    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }

    /// `{server}/realms/{realm}`, the base of every OIDC endpoint.
    pub fn realm_url(&self) -> String {
        format!("{}/realms/{}", self.idp_server_url, self.realm)
    }

    pub fn certs_url(&self) -> String {
        format!("{}/protocol/openid-connect/certs", self.realm_url())
    }

    pub fn token_url(&self) -> String {
        format!("{}/protocol/openid-connect/token", self.realm_url())
    }

    pub fn authorization_url(&self) -> String {
        format!("{}/protocol/openid-connect/auth", self.realm_url())
    }

    pub fn logout_url(&self) -> String {
        format!("{}/protocol/openid-connect/logout", self.realm_url())
    }

    /// `{server}/admin/realms/{realm}`
    pub fn admin_api_url(&self) -> String {
        format!("{}/admin/realms/{}", self.idp_server_url, self.realm)
    }

    pub fn redirect_uri(&self) -> String {
        format!("{}/callback", self.public_base_url)
    }
}

fn non_empty(vars: &HashMap<String, String>, name: &str) -> Option<String> {
    vars.get(name)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(ToString::to_string)
}

fn positive(vars: &HashMap<String, String>, name: &str, default: u64) -> Result<u64, ConfigError> {
    let Some(value_str) = vars.get(name) else {
        return Ok(default);
    };
    let value: u64 = value_str.parse().map_err(|e| {
        ConfigError::InvalidNumber(format!(
            "{name} must be a valid positive integer, got '{value_str}': {e}"
        ))
    })?;
    if value == 0 {
        return Err(ConfigError::InvalidNumber(format!(
            "{name} must be greater than 0"
        )));
    }
    Ok(value)
}

fn positive_usize(
    vars: &HashMap<String, String>,
    name: &str,
    default: usize,
) -> Result<usize, ConfigError> {
    let value = positive(vars, name, default as u64)?;
    usize::try_from(value)
        .map_err(|_| ConfigError::InvalidNumber(format!("{name} is out of range, got {value}")))
}

/// Only asymmetric algorithms are accepted; the shared-secret HMAC family
/// would let anyone holding the public key forge tokens.
fn parse_algorithm(value: &str) -> Result<Algorithm, ConfigError> {
    match value {
        "RS256" => Ok(Algorithm::RS256),
        "RS384" => Ok(Algorithm::RS384),
        "RS512" => Ok(Algorithm::RS512),
        "PS256" => Ok(Algorithm::PS256),
        "EdDSA" => Ok(Algorithm::EdDSA),
        other => Err(ConfigError::InvalidAlgorithm(format!(
            "JWT_ALGORITHM must be one of RS256, RS384, RS512, PS256, EdDSA, got '{other}'"
        ))),
    }
}
