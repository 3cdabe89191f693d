//! Router configuration.
//!
//! This module sets up the Axum router with all routes and middleware.

use std::sync::Arc;

use axum::routing::{delete, get, post, put};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use streamgate_control::INTERNAL_SESSIONS_PATH;
use streamgate_store::SessionStore;

use crate::handlers::{health, internal, nodes, sessions, sse};
use crate::state::GatewayState;

/// Create the gateway router with all routes and middleware.
///
/// # Routes
///
/// ## Health
/// - `GET /health` - Liveness
/// - `GET /ready` - Readiness
///
/// ## Transport
/// - `GET /sse` - Open an SSE session (no request timeout)
/// - `POST /message?sessionId=` - Inbound activity
///
/// ## Sessions
/// - `GET /v1/sessions` - List sessions
/// - `GET /v1/sessions/:session_id` - Get session
/// - `DELETE /v1/sessions/:session_id` - Remove session
/// - `PUT /v1/sessions/:session_id/service` - Bind downstream service
/// - `GET /v1/nodes` - Active cluster nodes
///
/// ## Internal
/// - `DELETE /internal/v1/sessions/:session_id` - Release a local session
/// - `POST /internal/v1/sessions/:session_id/messages` - Push to a local session
/// - `GET /internal/health` - Peer health check
pub fn create_router<S: SessionStore + 'static>(state: GatewayState<S>) -> Router {
    let cors = build_cors_layer(&state.config.cors_origins);
    let max_body_bytes = state.config.max_body_bytes;
    let request_timeout = state.config.request_timeout();

    let state = Arc::new(state);

    Router::new()
        .route("/health", get(health::health))
        .route("/ready", get(health::ready::<S>))
        .route(sse::MESSAGE_PATH, post(sse::message::<S>))
        .route("/v1/sessions", get(sessions::list_sessions::<S>))
        .route(
            "/v1/sessions/:session_id",
            get(sessions::get_session::<S>).delete(sessions::close_session::<S>),
        )
        .route(
            "/v1/sessions/:session_id/service",
            put(sessions::bind_service::<S>),
        )
        .route("/v1/nodes", get(nodes::list_nodes::<S>))
        .route(
            &format!("{INTERNAL_SESSIONS_PATH}/:session_id"),
            delete(internal::release_session::<S>),
        )
        .route(
            &format!("{INTERNAL_SESSIONS_PATH}/:session_id/messages"),
            post(internal::push_message::<S>),
        )
        .route("/internal/health", get(internal::internal_health))
        // Everything above is request/response; streams below must outlive it.
        .layer(TimeoutLayer::new(request_timeout))
        .route("/sse", get(sse::connect::<S>))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .with_state(state)
}

/// Build the CORS layer from configured origins.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::testing::Fixture;
    use axum::http::StatusCode;

    #[test]
    fn cors_specific_origins() {
        let origins = vec![
            "http://localhost:3000".to_string(),
            "https://console.example.com".to_string(),
        ];
        let _layer = build_cors_layer(&origins);
    }

    #[tokio::test]
    async fn unknown_route_is_404() {
        let fixture = Fixture::new();
        fixture
            .server()
            .get("/v1/unknown")
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn oversized_body_rejected() {
        let mut fixture = Fixture::new();
        fixture.state.config.max_body_bytes = 16;
        let id = fixture.seed(crate::handlers::testing::local());

        fixture
            .server()
            .put(&format!("/v1/sessions/{id}/service"))
            .json(&serde_json::json!({"service_name": "com.acme.AVeryLongServiceName"}))
            .await
            .assert_status(StatusCode::PAYLOAD_TOO_LARGE);
    }
}
