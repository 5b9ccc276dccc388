//! The one surviving use of `axum`+`tower-http` from the teacher's
//! dependency stack: a minimal `/metrics` scrape endpoint. The richer
//! websocket dashboard the teacher's `hip3-dashboard` served is dropped
//! per the UI/dashboards non-goal; a Prometheus scrape target is ambient
//! observability, not a dashboard.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};

async fn metrics_handler() -> impl IntoResponse {
    match optrade_telemetry::render_metrics() {
        Ok(body) => (StatusCode::OK, body),
        Err(err) => {
            error!(error = %err, "failed to render metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, String::new())
        }
    }
}

async fn health_handler() -> impl IntoResponse {
    StatusCode::OK
}

/// Binds `listen_addr` and serves `/metrics` and `/healthz` until
/// `cancel` fires. Returns the `JoinHandle` so the caller can await a
/// bounded shutdown.
pub fn spawn(listen_addr: String, cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        let app = Router::new()
            .route("/metrics", get(metrics_handler))
            .route("/healthz", get(health_handler))
            .layer(CorsLayer::permissive());

        let listener = match tokio::net::TcpListener::bind(&listen_addr).await {
            Ok(listener) => listener,
            Err(err) => {
                warn!(addr = %listen_addr, error = %err, "metrics server failed to bind, observability endpoint disabled");
                return;
            }
        };
        info!(addr = %listen_addr, "metrics server listening");

        let serve = axum::serve(listener, app.into_make_service());
        tokio::select! {
            result = serve => {
                if let Err(err) = result {
                    error!(error = %err, "metrics server exited with an error");
                }
            }
            _ = cancel.cancelled() => {
                info!("metrics server shutting down");
            }
        }
    })
}
