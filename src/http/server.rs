//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the caching proxy handler
//! - Wire up middleware (request ID, tracing, timeout)
//! - Own the shared upstream client
//! - Bind server to listener and stop on shutdown

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{body::Body, extract::DefaultBodyLimit, routing::any, Router};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::cache::CacheStore;
use crate::config::validation::parse_origin;
use crate::config::ProxyConfig;
use crate::http::proxy::proxy_handler;
use crate::http::request::{propagate_request_id_layer, set_request_id_layer};
use crate::lifecycle::shutdown;
use crate::load_balancer::LoadBalancer;
use crate::observability::ProxyStats;

/// Errors starting or running the proxy listener.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("invalid origin: {0}")]
    InvalidOrigin(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: CacheStore,
    pub balancer: Option<Arc<LoadBalancer>>,
    pub client: Client<HttpConnector, Body>,
    /// Origin base URL without trailing slash.
    pub origin: Arc<str>,
    pub stats: Arc<ProxyStats>,
}

/// HTTP server for the caching proxy.
pub struct HttpServer {
    router: Router,
    state: AppState,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(
        config: &ProxyConfig,
        store: CacheStore,
        balancer: Option<Arc<LoadBalancer>>,
    ) -> Result<Self, ServerError> {
        let origin = parse_origin(&config.listener.origin).map_err(ServerError::InvalidOrigin)?;

        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(Duration::from_secs(config.timeouts.connect_secs)));
        let client = Client::builder(TokioExecutor::new()).build(connector);

        let state = AppState {
            store,
            balancer,
            client,
            origin: origin.into(),
            stats: Arc::new(ProxyStats::new()),
        };

        let router = Self::build_router(config, state.clone());
        Ok(Self { router, state })
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &ProxyConfig, state: AppState) -> Router {
        Router::new()
            .route("/{*path}", any(proxy_handler))
            .route("/", any(proxy_handler))
            .with_state(state)
            .layer(DefaultBodyLimit::max(config.listener.max_body_bytes))
            .layer(
                ServiceBuilder::new()
                    .layer(set_request_id_layer())
                    .layer(TraceLayer::new_for_http())
                    .layer(propagate_request_id_layer())
                    .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs))),
            )
    }

    /// Shared state, for the admin API.
    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Consume the server, returning its router.
    pub fn into_router(self) -> Router {
        self.router
    }

    /// Run the server until `shutdown` fires.
    pub async fn run(self, listener: TcpListener, shutdown: broadcast::Receiver<()>) -> Result<(), ServerError> {
        let addr: SocketAddr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            origin = %self.state.origin,
            load_balancing = self.state.balancer.is_some(),
            "HTTP server starting"
        );

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown::wait(shutdown))
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}
