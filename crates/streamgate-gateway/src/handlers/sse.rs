//! SSE transport endpoints.
//!
//! `GET /sse` opens a session and streams its outbound messages. The first
//! event is `endpoint`, carrying the URL the client posts messages to. When
//! the client goes away the stream is dropped, and with it the guard that
//! removes the session.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::{self, Stream, StreamExt};
use serde::Deserialize;
use streamgate_control::SessionManager;
use streamgate_core::SessionId;
use streamgate_store::{SessionStore, TransportKind};
use tokio::sync::mpsc;
use tracing::debug;

use super::parse_session_id;
use crate::error::ApiError;
use crate::state::GatewayState;

/// Path clients post inbound messages to.
pub const MESSAGE_PATH: &str = "/message";

/// Query parameters for `GET /sse`.
#[derive(Debug, Deserialize)]
pub struct ConnectParams {
    /// Logical endpoint the client connects to.
    #[serde(default)]
    pub endpoint: Option<String>,
}

/// Query parameters for `POST /message`.
#[derive(Debug, Deserialize)]
pub struct MessageParams {
    /// Session the message belongs to.
    #[serde(rename = "sessionId")]
    pub session_id: String,
}

/// Removes the session when the response stream is dropped.
struct SessionGuard<S: SessionStore + 'static> {
    manager: Arc<SessionManager<S>>,
    session_id: SessionId,
}

impl<S: SessionStore + 'static> Drop for SessionGuard<S> {
    fn drop(&mut self) {
        let manager = Arc::clone(&self.manager);
        let session_id = self.session_id;
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            runtime.spawn(async move {
                debug!(session_id = %session_id, "SSE stream closed");
                manager.remove_session(&session_id).await;
            });
        }
    }
}

struct Connection<S: SessionStore + 'static> {
    receiver: mpsc::Receiver<streamgate_control::OutboundMessage>,
    _guard: SessionGuard<S>,
}

/// Open an SSE session.
///
/// # Errors
///
/// Returns 503 if the session cannot be registered in the store.
pub async fn connect<S: SessionStore + 'static>(
    State(state): State<Arc<GatewayState<S>>>,
    Query(params): Query<ConnectParams>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let handle = state
        .manager
        .create_session(TransportKind::Sse, params.endpoint)
        .await?;

    let session_id = handle.session_id;
    let message_url = format!("{MESSAGE_PATH}?sessionId={session_id}");

    let connection = Connection {
        receiver: handle.receiver,
        _guard: SessionGuard {
            manager: Arc::clone(&state.manager),
            session_id,
        },
    };

    let first = stream::once(async move {
        Ok::<_, Infallible>(Event::default().event("endpoint").data(message_url))
    });
    let messages = stream::unfold(connection, |mut conn| async move {
        let message = conn.receiver.recv().await?;
        let event = Event::default().event(message.event).data(message.data);
        Some((Ok::<_, Infallible>(event), conn))
    });

    Ok(Sse::new(first.chain(messages)).keep_alive(KeepAlive::default()))
}

/// Record inbound activity on a session.
///
/// Returns 202 if the session exists anywhere in the cluster.
///
/// # Errors
///
/// Returns 400 for a malformed id and 404 for an unknown session.
pub async fn message<S: SessionStore + 'static>(
    State(state): State<Arc<GatewayState<S>>>,
    Query(params): Query<MessageParams>,
) -> Result<StatusCode, ApiError> {
    let session_id = parse_session_id(&params.session_id)?;

    if state.manager.is_local(&session_id) {
        state.manager.touch(session_id);
        return Ok(StatusCode::ACCEPTED);
    }

    if state.manager.refresh(&session_id).await {
        Ok(StatusCode::ACCEPTED)
    } else {
        Err(ApiError::NotFound(format!("session {session_id}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::testing::{remote, settle, Fixture};
    use crate::routes::create_router;
    use axum::body::Body;
    use axum::http::Request;
    use streamgate_control::OutboundMessage;
    use tower::ServiceExt;

    async fn next_chunk(
        body: &mut (impl Stream<Item = Result<axum::body::Bytes, axum::Error>> + Unpin),
    ) -> String {
        let chunk = body.next().await.unwrap().unwrap();
        String::from_utf8(chunk.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn stream_lifecycle() {
        let fixture = Fixture::new();
        let app = create_router(fixture.state.clone());

        let response = app
            .oneshot(
                Request::get("/sse?endpoint=orders")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let mut body = response.into_body().into_data_stream();
        let first = next_chunk(&mut body).await;
        assert!(first.contains("event: endpoint"));
        assert!(first.contains("/message?sessionId="));

        let ids = fixture.state.manager.local_session_ids();
        assert_eq!(ids.len(), 1);
        let record = fixture.store.get(&ids[0]).await.unwrap().unwrap();
        assert_eq!(record.endpoint.as_deref(), Some("orders"));

        assert!(
            fixture
                .state
                .manager
                .send(&ids[0], OutboundMessage::new("message", "hello"))
                .await
        );
        let second = next_chunk(&mut body).await;
        assert!(second.contains("event: message"));
        assert!(second.contains("data: hello"));

        drop(body);
        settle().await;
        assert_eq!(fixture.state.manager.local_count(), 0);
        assert!(fixture.store.is_empty());
    }

    #[tokio::test]
    async fn store_failure_rejects_connection() {
        let fixture = Fixture::new();
        fixture.store.set_fail_writes(true);

        let response = fixture.server().get("/sse").await;

        response.assert_status(StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(fixture.state.manager.local_count(), 0);
    }

    #[tokio::test]
    async fn message_for_local_session() {
        let fixture = Fixture::new();
        let handle = fixture
            .state
            .manager
            .create_session(TransportKind::Sse, None)
            .await
            .unwrap();

        fixture
            .server()
            .post(MESSAGE_PATH)
            .add_query_param("sessionId", handle.session_id)
            .await
            .assert_status(StatusCode::ACCEPTED);
    }

    #[tokio::test]
    async fn message_for_remote_session() {
        let fixture = Fixture::new();
        let id = fixture.seed(remote());

        fixture
            .server()
            .post(MESSAGE_PATH)
            .add_query_param("sessionId", id)
            .await
            .assert_status(StatusCode::ACCEPTED);
    }

    #[tokio::test]
    async fn message_for_unknown_or_bad_session() {
        let fixture = Fixture::new();
        let server = fixture.server();

        server
            .post(MESSAGE_PATH)
            .add_query_param("sessionId", SessionId::generate())
            .await
            .assert_status(StatusCode::NOT_FOUND);
        server
            .post(MESSAGE_PATH)
            .add_query_param("sessionId", "nope")
            .await
            .assert_status(StatusCode::BAD_REQUEST);
    }
}
