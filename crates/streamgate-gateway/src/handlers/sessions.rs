//! Session inspection and management endpoints.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use streamgate_core::NodeAddress;
use streamgate_store::{SessionRecord, SessionStore, TransportKind};

use super::parse_session_id;
use crate::error::ApiError;
use crate::state::GatewayState;

// =============================================================================
// Request/Response Types
// =============================================================================

/// A session as seen through the API.
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    /// Session ID.
    pub session_id: String,
    /// Transport kind.
    pub transport: TransportKind,
    /// Node holding the connection.
    pub owner: NodeAddress,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last inbound activity.
    pub last_active_at: DateTime<Utc>,
    /// Logical endpoint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    /// Bound downstream service.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_name: Option<String>,
    /// Whether the owner is currently an active cluster member.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_active: Option<bool>,
}

impl From<SessionRecord> for SessionResponse {
    fn from(record: SessionRecord) -> Self {
        Self {
            session_id: record.session_id.to_string(),
            transport: record.transport,
            owner: record.owner,
            created_at: record.created_at,
            last_active_at: record.last_active_at,
            endpoint: record.endpoint,
            service_name: record.service_name,
            owner_active: None,
        }
    }
}

/// Response for listing sessions.
#[derive(Debug, Serialize)]
pub struct ListSessionsResponse {
    /// Sessions across the cluster.
    pub sessions: Vec<SessionResponse>,
}

/// Request body for binding a session to a service.
#[derive(Debug, Deserialize)]
pub struct BindServiceRequest {
    /// Downstream service name.
    pub service_name: String,
}

// =============================================================================
// Handlers
// =============================================================================

/// List every session in the store.
///
/// # Errors
///
/// Returns an error if the store cannot be read.
pub async fn list_sessions<S: SessionStore + 'static>(
    State(state): State<Arc<GatewayState<S>>>,
) -> Result<impl IntoResponse, ApiError> {
    let mut records = state.store().list_all().await?;
    records.sort_by_key(|r| r.created_at);

    Ok(Json(ListSessionsResponse {
        sessions: records.into_iter().map(SessionResponse::from).collect(),
    }))
}

/// Get one session and whether its owner is alive.
///
/// # Errors
///
/// Returns an error if the id is malformed, the session does not exist, or
/// the store cannot be read.
pub async fn get_session<S: SessionStore + 'static>(
    State(state): State<Arc<GatewayState<S>>>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let session_id = parse_session_id(&session_id)?;

    let record = state
        .store()
        .get(&session_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("session {session_id}")))?;

    let owner_active = state.directory.is_active(&record.owner).await;
    let mut response = SessionResponse::from(record);
    response.owner_active = Some(owner_active);

    Ok(Json(response))
}

/// Remove a session wherever it lives.
///
/// Idempotent: removing an unknown session succeeds.
///
/// # Errors
///
/// Returns an error if the id is malformed or the store delete failed.
pub async fn close_session<S: SessionStore + 'static>(
    State(state): State<Arc<GatewayState<S>>>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let session_id = parse_session_id(&session_id)?;

    if state.manager.remove_session(&session_id).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::Unavailable(format!(
            "could not remove session {session_id}"
        )))
    }
}

/// Record the downstream service a session talks to.
///
/// # Errors
///
/// Returns an error if the id is malformed, the name is blank, or the
/// session does not exist.
pub async fn bind_service<S: SessionStore + 'static>(
    State(state): State<Arc<GatewayState<S>>>,
    Path(session_id): Path<String>,
    Json(body): Json<BindServiceRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let session_id = parse_session_id(&session_id)?;
    let service_name = body.service_name.trim();
    if service_name.is_empty() {
        return Err(ApiError::BadRequest("service_name must not be empty".to_string()));
    }

    if state.manager.bind_service(&session_id, service_name).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("session {session_id}")))
    }
}
