//! Serving the router until shutdown.

use std::future::Future;
use std::sync::Arc;

use axum::Router;
use streamgate_control::SessionManager;
use streamgate_store::SessionStore;
use tokio::net::TcpListener;
use tracing::info;

/// Serve `app` on `listener` until `signal` resolves.
///
/// Open SSE streams never end on their own, so the local sessions are closed
/// as soon as the signal fires. Graceful shutdown then only has to drain
/// responses that are already finishing.
///
/// # Errors
///
/// Returns an error if accepting connections fails.
pub async fn serve<S, F>(
    listener: TcpListener,
    app: Router,
    manager: Arc<SessionManager<S>>,
    signal: F,
) -> std::io::Result<()>
where
    S: SessionStore + 'static,
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            signal.await;
            let removed = manager.shutdown().await;
            info!(removed, "Local sessions closed, draining connections");
        })
        .await
}
