//! HTTP server module
//!
//! Provides the Axum-based HTTP server. Every scrape of the metrics path
//! runs one collection cycle against the gateway.

pub mod handlers;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::{routing::get, Router};
use tokio::signal;
use tokio::sync::RwLock;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::check::VSphereCheck;
use crate::config::Config;
use crate::connection::{Connection, HttpConnection};
use crate::report::ExternalHostTags;

/// Application state shared across handlers
pub struct AppState<C> {
    /// Application configuration
    pub config: Arc<Config>,
    /// Configured vCenter instance
    pub check: Arc<VSphereCheck>,
    /// Gateway connection
    pub connection: Arc<C>,
    /// External host tags from the last completed cycle
    pub external_tags: Arc<RwLock<Vec<ExternalHostTags>>>,
}

impl<C> Clone for AppState<C> {
    fn clone(&self) -> Self {
        Self {
            config: Arc::clone(&self.config),
            check: Arc::clone(&self.check),
            connection: Arc::clone(&self.connection),
            external_tags: Arc::clone(&self.external_tags),
        }
    }
}

impl<C> AppState<C> {
    pub fn new(config: Config, connection: C) -> Self {
        let check = VSphereCheck::new(&config.check);
        Self {
            config: Arc::new(config),
            check: Arc::new(check),
            connection: Arc::new(connection),
            external_tags: Arc::new(RwLock::new(Vec::new())),
        }
    }
}

/// Build the router for `state`
pub fn router<C>(state: AppState<C>) -> Router
where
    C: Connection + Send + Sync + 'static,
{
    let metrics_path = state.config.server.path.clone();

    Router::new()
        .route("/", get(handlers::root::<C>))
        .route("/health", get(handlers::health))
        .route("/external_tags", get(handlers::external_tags::<C>))
        .route(&metrics_path, get(handlers::metrics::<C>))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run the HTTP server
///
/// # Arguments
/// * `config` - Application configuration
/// * `port` - Server port to bind to (overrides config.server.port)
///
/// # Errors
/// Returns an error if the gateway client cannot be built or the server
/// fails to start
pub async fn run(config: Config, port: u16) -> Result<()> {
    let bind_address = config.server.bind_address.clone();
    let metrics_path = config.server.path.clone();

    let connection = HttpConnection::new(&config.gateway.url, config.gateway.timeout_ms)?;
    let state = AppState::new(config, connection);
    let app = router(state);

    // "localhost" is accepted in addition to IP addresses
    let bind_addr: std::net::IpAddr = if bind_address == "localhost" {
        std::net::IpAddr::V4(std::net::Ipv4Addr::LOCALHOST)
    } else {
        bind_address
            .parse()
            .map_err(|e| {
                anyhow::anyhow!(
                    "Invalid bind_address '{}': {}. Use an IP address (e.g., '0.0.0.0', '127.0.0.1') or 'localhost'.",
                    bind_address,
                    e
                )
            })?
    };
    let addr = SocketAddr::from((bind_addr, port));
    info!(address = %addr, metrics_path = %metrics_path, "Server listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Wait for shutdown signal
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        }
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        }
    }
}
