//! The minimal HTTP surface the engine owns directly: push ingestion and a
//! health check (§6). Everything else — CRUD over monitors, groups,
//! channels, and the dashboards that consume them — is an external
//! collaborator per §1 and lives outside this crate.

pub mod error;
pub mod routes;

pub use error::{ApiError, ApiResult};

use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::recorder::Recorder;
use crate::repository::MonitorRepository;

/// Shared state handed to every route handler.
#[derive(Clone)]
pub struct ApiState {
    pub repository: Arc<dyn MonitorRepository>,
    pub recorder: Arc<Recorder>,
}

impl ApiState {
    pub fn new(repository: Arc<dyn MonitorRepository>, recorder: Arc<Recorder>) -> Self {
        Self {
            repository,
            recorder,
        }
    }
}

/// Builds the router: `GET /health` and `GET /api/push/:token`.
pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/api/push/:token", get(routes::push::ingest))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Binds `addr` and serves the router in a background task. Returns the
/// address actually bound (useful when `addr`'s port is `0`).
pub async fn spawn(addr: SocketAddr, state: ApiState) -> anyhow::Result<SocketAddr> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let local_addr = listener.local_addr()?;

    info!("push/health API listening on {local_addr}");
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "API server error");
        }
    });

    Ok(local_addr)
}
