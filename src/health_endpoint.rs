//! Health HTTP endpoints.
//!
//! Exposes the derived [`HealthReport`](crate::health::HealthReport) and
//! the cost-ledger budget percentages for external observability tooling.
//!
//! ## Usage
//!
//! ```no_run
//! use backend_router::health_endpoint;
//! use backend_router::router::BackendRouter;
//! use std::sync::Arc;
//!
//! # async fn example(router: Arc<BackendRouter>) {
//! // Start the health server (non-blocking)
//! let handle = tokio::spawn(health_endpoint::start_server(
//!     "0.0.0.0:9090".to_string(),
//!     router,
//! ));
//!
//! // Your application code...
//!
//! handle.abort();
//! # }
//! ```
//!
//! ## Endpoints
//!
//! - `GET /health` - Current health report as JSON
//! - `GET /costs` - Spend snapshot with budget fractions as JSON

use crate::router::BackendRouter;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

/// Build the axum router serving the health endpoints.
///
/// Useful when embedding the routes into an existing HTTP server.
///
/// # Panics
///
/// This function never panics.
pub fn health_routes(router: Arc<BackendRouter>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/costs", get(costs_handler))
        .with_state(router)
}

/// Start the health HTTP server on the given address.
///
/// Runs until the task is aborted.
///
/// # Arguments
///
/// * `addr` - Socket address string, e.g. `"0.0.0.0:9090"`.
/// * `router` - The router instance to report on.
///
/// # Errors
///
/// Returns an error when the address cannot be parsed or bound.
///
/// # Panics
///
/// This function never panics.
pub async fn start_server(
    addr: String,
    router: Arc<BackendRouter>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr: SocketAddr = addr.parse()?;

    info!("starting health server on http://{}", addr);

    let app = health_routes(router);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!("health report at http://{}/health", addr);
    info!("cost snapshot at http://{}/costs", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Handler for the `/health` endpoint.
async fn health_handler(State(router): State<Arc<BackendRouter>>) -> Response {
    Json(router.health()).into_response()
}

/// Handler for the `/costs` endpoint.
async fn costs_handler(State(router): State<Arc<BackendRouter>>) -> Response {
    Json(router.cost_snapshot()).into_response()
}
