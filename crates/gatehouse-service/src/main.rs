//! Gatehouse
//!
//! Authentication gateway entry point.

use common::config::{LogFormat, ObservabilityConfig};
use gatehouse_service::config::Config;
use gatehouse_service::observability::metrics::init_metrics_recorder;
use gatehouse_service::routes::{self, AppState};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let vars: HashMap<String, String> = std::env::vars().collect();
    init_tracing(&ObservabilityConfig::from_vars(&vars));

    info!("Starting Gatehouse");

    let config = Config::from_vars(&vars).map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(
        environment = ?config.environment,
        bind_address = %config.bind_address,
        issuer = %config.issuer,
        jwt_clock_skew_seconds = config.jwt_clock_skew.as_secs(),
        jwks_cache_ttl_seconds = config.jwks_cache_ttl.as_secs(),
        "Configuration loaded successfully"
    );
    if config.client_id.is_none() {
        warn!("KEYCLOAK_CLIENT_ID is not set; /login, /callback and /refresh will fail");
    }
    if config.admin_client_id.is_none() || config.admin_client_secret.is_none() {
        warn!("KEYCLOAK_ADMIN_CLIENT_ID or KEYCLOAK_ADMIN_CLIENT_SECRET is not set; /ceo will fail");
    }

    let metrics_handle = init_metrics_recorder().map_err(|e| {
        error!("Failed to initialize metrics recorder: {}", e);
        e
    })?;

    let addr: SocketAddr = config.bind_address.parse().map_err(|e| {
        error!("Invalid bind address: {}", e);
        e
    })?;

    let state = Arc::new(AppState::from_config(config));
    let app = routes::build_routes(state, metrics_handle);

    info!("Gatehouse listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Gatehouse shutdown complete");

    Ok(())
}

fn init_tracing(observability: &ObservabilityConfig) {
    let filter = EnvFilter::try_new(&observability.log_filter)
        .unwrap_or_else(|_| EnvFilter::new(common::config::DEFAULT_LOG_FILTER));

    let registry = tracing_subscriber::registry().with(filter);
    match observability.log_format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

/// Listens for shutdown signals (SIGTERM, SIGINT).
/// Returns when a shutdown signal is received and drain period is complete.
async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received SIGINT, starting graceful shutdown..."),
            Err(e) => error!("Failed to listen for SIGINT: {}", e),
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received SIGTERM, starting graceful shutdown...");
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    let drain_secs: u64 = std::env::var("GATEHOUSE_DRAIN_SECONDS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(5);

    if drain_secs > 0 {
        warn!("Draining connections for {} seconds...", drain_secs);
        tokio::time::sleep(Duration::from_secs(drain_secs)).await;
        info!("Drain period complete");
    } else {
        info!("Skipping drain period (GATEHOUSE_DRAIN_SECONDS=0)");
    }
}
