//! Liveness and health surface for the hosting platform.

use crate::metrics::{Metrics, SystemStatus};
use anyhow::Result;
use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub async fn start_web_server(port: u16, metrics: Arc<Metrics>) -> Result<()> {
    let app = Router::new()
        .route("/", get(liveness))
        .route("/healthz", get(healthz))
        .layer(TraceLayer::new_for_http())
        .with_state(metrics);

    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("health endpoint listening on http://{}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

async fn liveness() -> &'static str {
    "watcher is running"
}

async fn healthz(State(metrics): State<Arc<Metrics>>) -> Json<SystemStatus> {
    Json(metrics.get_system_status())
}
