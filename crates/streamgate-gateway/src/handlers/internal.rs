//! Internal API endpoints.
//!
//! These endpoints are used for node-to-node communication within the
//! cluster and should only be reachable from peer gateway nodes.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};

use streamgate_control::OutboundMessage;
use streamgate_store::SessionStore;

use super::parse_session_id;
use crate::error::ApiError;
use crate::state::GatewayState;

/// Request body for pushing a message to a locally held session.
#[derive(Debug, Deserialize)]
pub struct PushMessageRequest {
    /// SSE event name.
    #[serde(default = "PushMessageRequest::default_event")]
    pub event: String,
    /// Event payload.
    pub data: String,
}

impl PushMessageRequest {
    fn default_event() -> String {
        "message".to_string()
    }
}

/// Release a session this node holds.
///
/// Called by a peer that deleted the session's record. Returns 404 if the
/// session is not held here, which the caller treats as already released.
///
/// # Errors
///
/// Returns 400 for a malformed id.
pub async fn release_session<S: SessionStore + 'static>(
    State(state): State<Arc<GatewayState<S>>>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let session_id = parse_session_id(&session_id)?;

    if !state.manager.is_local(&session_id) {
        return Err(ApiError::NotFound(format!("session {session_id}")));
    }

    tracing::info!(session_id = %session_id, "Releasing session on peer request");
    state.manager.remove_session(&session_id).await;
    Ok(StatusCode::NO_CONTENT)
}

/// Deliver a message to a session held by this node.
///
/// # Errors
///
/// Returns 400 for a malformed id and 404 if the session is not held here.
pub async fn push_message<S: SessionStore + 'static>(
    State(state): State<Arc<GatewayState<S>>>,
    Path(session_id): Path<String>,
    Json(body): Json<PushMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let session_id = parse_session_id(&session_id)?;

    let message = OutboundMessage::new(body.event, body.data);
    if state.manager.send(&session_id, message).await {
        Ok(StatusCode::ACCEPTED)
    } else {
        Err(ApiError::NotFound(format!("session {session_id}")))
    }
}

/// Health check for peer nodes.
pub async fn internal_health() -> impl IntoResponse {
    #[derive(Serialize)]
    struct InternalHealthResponse {
        status: &'static str,
    }

    Json(InternalHealthResponse { status: "ok" })
}
