//! Health and readiness endpoints.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;
use streamgate_store::SessionStore;

use crate::state::GatewayState;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status.
    pub status: &'static str,
    /// Service version.
    pub version: &'static str,
}

/// Readiness response.
#[derive(Debug, Serialize)]
pub struct ReadyResponse {
    /// `ready` or `starting`.
    pub status: &'static str,
    /// Node address peers use.
    pub node: String,
    /// Sessions held by this node.
    pub local_sessions: usize,
}

/// Health check handler.
///
/// Returns 200 as long as the process is serving HTTP.
///
/// # Example
///
/// ```text
/// GET /health
///
/// Response: 200 OK
/// {
///   "status": "healthy",
///   "version": "0.1.0"
/// }
/// ```
pub async fn health() -> impl IntoResponse {
    let response = HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    };

    (StatusCode::OK, Json(response))
}

/// Readiness handler.
///
/// Returns 503 until startup has finished and the readiness event fired.
pub async fn ready<S: SessionStore + 'static>(
    State(state): State<Arc<GatewayState<S>>>,
) -> impl IntoResponse {
    let ready = state.is_ready();
    let response = ReadyResponse {
        status: if ready { "ready" } else { "starting" },
        node: state.manager.local_node().to_string(),
        local_sessions: state.manager.local_count(),
    };

    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(response))
}
