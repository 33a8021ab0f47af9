use std::future::Future;
use std::net::SocketAddr;

use anyhow::{Context, Result};
use axum::{http::Method, routing::get, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::ServerConfig;
use crate::handlers::{banner, health_check, metrics_handler, stats};
use crate::registry::ConnectionRegistry;
use crate::router::RelayRouter;
use crate::state::PierState;
use crate::websocket::websocket_handler;

pub fn app(state: PierState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST]);

    Router::new()
        .route("/", get(banner))
        .route("/healthz", get(health_check))
        .route("/stats", get(stats))
        .route("/metrics", get(metrics_handler))
        .route("/ws", get(websocket_handler))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// A bound listener plus the registry it serves. Dropping it releases both.
pub struct PierServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    state: PierState,
}

impl PierServer {
    pub async fn bind(config: &ServerConfig, metrics: Option<PrometheusHandle>) -> Result<Self> {
        let listener = TcpListener::bind(config.listen_addr)
            .await
            .with_context(|| format!("failed to bind {}", config.listen_addr))?;
        let local_addr = listener
            .local_addr()
            .context("failed to read bound address")?;
        let router = RelayRouter::new(ConnectionRegistry::new());
        let state = PierState::new(router, config.outbound_buffer, metrics);
        Ok(Self {
            listener,
            local_addr,
            state,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn state(&self) -> &PierState {
        &self.state
    }

    pub async fn run<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        info!(listen_addr = %self.local_addr, "beach-pier listening");
        axum::serve(self.listener, app(self.state))
            .with_graceful_shutdown(shutdown)
            .await
            .context("server shutdown with error")?;
        info!("listener stopped");
        Ok(())
    }
}
