//! Test server harness for E2E testing
//!
//! Provides `TestGatewayServer` for spawning real Gatehouse instances wired
//! to a [`MockIdp`].

use crate::mock_idp::MockIdp;
use gatehouse_service::config::Config;
use gatehouse_service::routes::{self, AppState};
use gatehouse_service::session::{SessionData, SESSION_COOKIE};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// OAuth client id the harness configures.
pub const TEST_CLIENT_ID: &str = "gatehouse-test";

/// Session signing key the harness configures.
pub const TEST_SESSION_SECRET: &str = "test-session-secret-0123456789abcdef";

/// Test harness for spawning Gatehouse in E2E tests.
///
/// # Example
/// ```rust,ignore
/// let idp = MockIdp::start().await;
/// let server = TestGatewayServer::spawn(&idp).await?;
///
/// let response = reqwest::get(format!("{}/health", server.url())).await?;
/// assert_eq!(response.status(), 200);
/// ```
pub struct TestGatewayServer {
    addr: SocketAddr,
    state: Arc<AppState>,
    _handle: JoinHandle<()>,
}

impl TestGatewayServer {
    /// Spawn with the default test configuration.
    pub async fn spawn(idp: &MockIdp) -> Result<Self, anyhow::Error> {
        Self::spawn_with(idp, &[]).await
    }

    /// Spawn with extra or overriding environment variables.
    ///
    /// The server will:
    /// - Bind to a random available port (127.0.0.1:0)
    /// - Point every IdP call at `idp`
    /// - Start the HTTP server in the background
    pub async fn spawn_with(
        idp: &MockIdp,
        overrides: &[(&str, &str)],
    ) -> Result<Self, anyhow::Error> {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind test server: {}", e))?;

        let addr = listener
            .local_addr()
            .map_err(|e| anyhow::anyhow!("Failed to get local address: {}", e))?;

        let mut vars = HashMap::from([
            ("BIND_ADDRESS".to_string(), addr.to_string()),
            ("PUBLIC_BASE_URL".to_string(), format!("http://{addr}")),
            ("KEYCLOAK_SERVER_URL".to_string(), idp.url()),
            ("KEYCLOAK_REALM".to_string(), idp.realm().to_string()),
            ("KEYCLOAK_CLIENT_ID".to_string(), TEST_CLIENT_ID.to_string()),
            (
                "KEYCLOAK_CLIENT_SECRET".to_string(),
                "test-client-secret".to_string(),
            ),
            (
                "KEYCLOAK_ADMIN_CLIENT_ID".to_string(),
                "gatehouse-admin".to_string(),
            ),
            (
                "KEYCLOAK_ADMIN_CLIENT_SECRET".to_string(),
                "test-admin-secret".to_string(),
            ),
            (
                "SESSION_SECRET_KEY".to_string(),
                TEST_SESSION_SECRET.to_string(),
            ),
            ("IDP_HTTP_TIMEOUT_SECONDS".to_string(), "2".to_string()),
        ]);
        for (name, value) in overrides {
            vars.insert((*name).to_string(), (*value).to_string());
        }

        let config = Config::from_vars(&vars)
            .map_err(|e| anyhow::anyhow!("Failed to create config: {}", e))?;

        let state = Arc::new(AppState::from_config(config));

        // A recorder that is never installed globally, so tests can spawn
        // any number of servers in one process.
        let metrics_handle = PrometheusBuilder::new().build_recorder().handle();
        let app = routes::build_routes(state.clone(), metrics_handle);

        let handle = tokio::spawn(async move {
            let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
            if let Err(e) = axum::serve(listener, make_service).await {
                eprintln!("Test server error: {}", e);
            }
        });

        Ok(Self {
            addr,
            state,
            _handle: handle,
        })
    }

    /// Get the base URL of the test server.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Get the socket address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Shared state, for reaching the caches directly.
    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }

    pub fn config(&self) -> &Config {
        &self.state.config
    }

    /// `Cookie` header value carrying `session`, signed with the server's key.
    pub fn session_cookie(&self, session: &SessionData) -> Result<String, anyhow::Error> {
        let value = self
            .state
            .sessions
            .encode(session)
            .map_err(|e| anyhow::anyhow!("Failed to encode session: {}", e))?;
        Ok(format!("{SESSION_COOKIE}={value}"))
    }
}

impl Drop for TestGatewayServer {
    fn drop(&mut self) {
        self._handle.abort();
    }
}
