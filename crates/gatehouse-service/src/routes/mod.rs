//! HTTP routes for Gatehouse.
//!
//! Defines the Axum router and application state.

use crate::auth::keyset::build_http_client;
use crate::auth::{AccessRequirement, ClaimsVerifier, Gatekeeper, KeySetCache};
use crate::config::Config;
use crate::handlers;
use crate::idp::{
    AdminCredentialCache, ClientCredentials, DirectoryClient, KeycloakDirectory, TokenClient,
};
use crate::middleware::{http_metrics_middleware, require_access, AuthState};
use crate::session::SessionCodec;
use axum::{
    http::{header, HeaderValue, Method},
    middleware,
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Service configuration.
    pub config: Config,

    /// Authentication, authorization and cache administration.
    pub gatekeeper: Arc<Gatekeeper>,

    /// Session cookie codec.
    pub sessions: Arc<SessionCodec>,

    /// Token endpoint client for login and refresh.
    pub token_client: TokenClient,

    /// Group hierarchy for the CEO dashboard.
    pub directory: Arc<dyn DirectoryClient>,
}

impl AppState {
    /// Wire every component from configuration.
    ///
    /// One HTTP client, bounded by `idp_http_timeout`, is shared by every
    /// call to the identity provider.
    pub fn from_config(config: Config) -> Self {
        let http_client = build_http_client(config.idp_http_timeout);

        let key_sets = Arc::new(KeySetCache::with_client(
            config.certs_url(),
            config.jwks_cache_ttl,
            config.jwks_cache_max_entries,
            http_client.clone(),
        ));
        let verifier = ClaimsVerifier::new(
            key_sets,
            config.issuer.clone(),
            config.jwt_algorithm,
            config.jwt_clock_skew,
        );

        let token_client = TokenClient::new(config.token_url(), http_client.clone());
        let admin_credentials = config
            .admin_client_id
            .clone()
            .zip(config.admin_client_secret.clone())
            .map(|(id, secret)| ClientCredentials::new(id, Some(secret)));
        let credentials = Arc::new(AdminCredentialCache::new(
            token_client.clone(),
            admin_credentials,
            config.admin_token_cache_ttl,
            config.admin_token_cache_max_entries,
        ));

        let directory: Arc<dyn DirectoryClient> = Arc::new(KeycloakDirectory::new(
            config.admin_api_url(),
            http_client,
            Arc::clone(&credentials),
        ));

        let gatekeeper = Arc::new(Gatekeeper::new(
            verifier,
            credentials,
            config.jwt_audience.clone(),
        ));
        let sessions = Arc::new(SessionCodec::new(
            &config.session_secret,
            config.session_max_age,
            config.is_production(),
        ));

        Self {
            config,
            gatekeeper,
            sessions,
            token_client,
            directory,
        }
    }

    /// Login/refresh client identity, if configured.
    pub fn login_client(&self) -> Option<ClientCredentials> {
        self.config
            .client_id
            .clone()
            .map(|id| ClientCredentials::new(id, self.config.client_secret.clone()))
    }

    fn auth_layer_state(&self, requirement: Option<AccessRequirement>) -> Arc<AuthState> {
        Arc::new(AuthState::new(
            Arc::clone(&self.gatekeeper),
            Arc::clone(&self.sessions),
            requirement,
        ))
    }
}

/// Build the application routes.
///
/// Creates an Axum router with:
/// - `/`, `/health`, `/metrics` - public
/// - `/login`, `/callback`, `/logout`, `/refresh` - OAuth flow, public
/// - `/me`, `/token` - any authenticated caller
/// - `/manager`, `/api/data` - role `manager`
/// - `/ceo` - role `ceo`
/// - `/api/data/scoped` - scope `read:data`
/// - `/cache/info`, `/cache/clear` - role `admin`
/// - TraceLayer, 30 second timeout, CORS and HTTP metrics
pub fn build_routes(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let public_routes = Router::new()
        .route("/", get(handlers::home))
        .route("/health", get(handlers::health_check))
        .route("/login", get(handlers::login))
        .route("/callback", get(handlers::callback))
        .route("/logout", get(handlers::logout))
        .route("/refresh", post(handlers::refresh_token))
        .with_state(state.clone());

    let metrics_routes = Router::new()
        .route("/metrics", get(handlers::metrics_handler))
        .with_state(metrics_handle);

    let authenticated_routes = Router::new()
        .route("/me", get(handlers::get_me))
        .route("/token", get(handlers::get_token))
        .route_layer(middleware::from_fn_with_state(
            state.auth_layer_state(None),
            require_access,
        ))
        .with_state(state.clone());

    let manager_routes = Router::new()
        .route("/manager", get(handlers::manager_dashboard))
        .route("/api/data", get(handlers::api_data))
        .route_layer(middleware::from_fn_with_state(
            state.auth_layer_state(Some(AccessRequirement::role("manager"))),
            require_access,
        ))
        .with_state(state.clone());

    let ceo_routes = Router::new()
        .route("/ceo", get(handlers::ceo_dashboard))
        .route_layer(middleware::from_fn_with_state(
            state.auth_layer_state(Some(AccessRequirement::role("ceo"))),
            require_access,
        ))
        .with_state(state.clone());

    let scoped_routes = Router::new()
        .route("/api/data/scoped", get(handlers::api_data_scoped))
        .route_layer(middleware::from_fn_with_state(
            state.auth_layer_state(Some(AccessRequirement::scope("read:data"))),
            require_access,
        ))
        .with_state(state.clone());

    let admin_routes = Router::new()
        .route("/cache/info", get(handlers::cache_info))
        .route("/cache/clear", post(handlers::cache_clear))
        .route_layer(middleware::from_fn_with_state(
            state.auth_layer_state(Some(AccessRequirement::role("admin"))),
            require_access,
        ))
        .with_state(state.clone());

    let cors = cors_layer(&state.config.cors_allowed_origins);

    // Layer order (bottom-to-top execution):
    // 1. TimeoutLayer (innermost)
    // 2. TraceLayer
    // 3. CorsLayer
    // 4. http_metrics_middleware (outermost, sees every response)
    public_routes
        .merge(metrics_routes)
        .merge(authenticated_routes)
        .merge(manager_routes)
        .merge(ceo_routes)
        .merge(scoped_routes)
        .merge(admin_routes)
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(middleware::from_fn(http_metrics_middleware))
}

/// An empty list admits any origin without credentials; config loading
/// refuses an empty list in production.
fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    if allowed_origins.is_empty() {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(target: "gatehouse.routes", origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true)
}
