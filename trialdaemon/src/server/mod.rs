//! Coordination endpoint
//!
//! HTTP surface the experiment client talks to:
//! - `POST /api/state` submits a state change
//! - `GET /api/state` returns the current state
//! - `GET /api/status` and `GET /health` for operators

mod messages;
mod routes;

use std::future::Future;
use std::net::SocketAddr;

use axum::Router;
use axum::routing::get;
use eyre::{Context, Result};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, info};

use crate::state::StateManager;

pub use messages::{ErrorResponse, FetchResponse, SubmitResponse};

/// Build the router over a running StateManager
pub fn router(manager: StateManager) -> Router {
    debug!("router: called");
    Router::new()
        .route("/health", get(routes::health))
        .route("/api/state", get(routes::fetch_state).post(routes::submit_state))
        .route("/api/status", get(routes::status))
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .with_state(manager)
}

/// Bind the listener, returning the actual address (useful with port 0)
pub async fn bind(addr: SocketAddr) -> Result<(TcpListener, SocketAddr)> {
    debug!(%addr, "bind: called");
    let listener = TcpListener::bind(addr)
        .await
        .context(format!("Failed to bind {}", addr))?;
    let local = listener.local_addr().context("Failed to read local address")?;
    Ok((listener, local))
}

/// Serve requests until `shutdown` resolves
pub async fn serve<F>(listener: TcpListener, manager: StateManager, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr().context("Failed to read local address")?;
    info!("TrialDaemon listening on http://{}", addr);

    axum::serve(listener, router(manager))
        .with_graceful_shutdown(shutdown)
        .await
        .context("HTTP server exited unexpectedly")?;

    info!("HTTP server stopped");
    Ok(())
}
