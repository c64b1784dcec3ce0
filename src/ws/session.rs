//! Per-session context and the shared receive step.

use std::net::SocketAddr;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};

use super::connection_id::ConnectionId;
use super::route::Endpoint;

/// How long a server-initiated close waits for the peer's acknowledgement.
///
/// Applies even when the idle timeout is disabled.
pub const CLOSE_GRACE: Duration = Duration::from_secs(5);

/// Identity and limits of one upgraded connection.
#[derive(Debug, Clone, Copy)]
pub struct SessionContext {
    /// Log correlation id.
    pub id: ConnectionId,
    /// Remote socket address.
    pub peer: SocketAddr,
    /// Endpoint the connection was routed to.
    pub endpoint: Endpoint,
    /// How long to wait for the next frame, if bounded.
    pub idle_timeout: Option<Duration>,
}

/// Waits for the next frame.
///
/// Returns `None` when the peer is gone, the transport failed, or the
/// idle timeout elapsed. Callers treat all three as end of session.
pub(crate) async fn next_message(
    socket: &mut WebSocket,
    idle_timeout: Option<Duration>,
) -> Option<Message> {
    let next = match idle_timeout {
        Some(limit) => match tokio::time::timeout(limit, socket.recv()).await {
            Ok(next) => next,
            Err(_) => {
                tracing::info!(timeout_secs = limit.as_secs(), "closing idle connection");
                return None;
            }
        },
        None => socket.recv().await,
    };

    match next {
        Some(Ok(message)) => Some(message),
        Some(Err(e)) => {
            tracing::debug!(error = %e, "ws receive failed");
            None
        }
        None => None,
    }
}

/// Drains frames until the peer acknowledges our close frame, giving up
/// after [`CLOSE_GRACE`]. The socket is dropped either way.
pub(crate) async fn await_close_ack(mut socket: WebSocket) {
    let drained = tokio::time::timeout(CLOSE_GRACE, async {
        while let Some(Ok(_)) = socket.recv().await {}
    })
    .await;
    if drained.is_err() {
        tracing::info!(
            grace_secs = CLOSE_GRACE.as_secs(),
            "peer did not acknowledge close; dropping socket"
        );
    }
}
